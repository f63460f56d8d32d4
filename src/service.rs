//! Query service: the composition root behind every CLI command.
//!
//! Wires configuration, the auth provider, the HTTP transport and the SQL
//! directory into one [`StatementExecutor`], and turns every failure into a
//! structured [`QueryOutcome`] or report.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::api::{HttpTransport, SqlApiTransport};
use crate::auth::{self, AuthMethod, AuthProvider, CredentialIssuer, KeyPairConfig};
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::executor::{ExecutorOptions, QueryOutcome, StatementExecutor};
use crate::sql::{SqlDirectory, SqlTextProvider};

/// Statement run by the startup connection check.
pub const CONNECTION_CHECK_SQL: &str = "SELECT 1 AS TEST_COLUMN";

/// Service liveness summary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub auth_method: AuthMethod,
    pub account: String,
    pub queries: usize,
}

/// Result of a credential check.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthReport {
    pub success: bool,
    pub message: String,
    pub auth_method: AuthMethod,
    pub account: String,
}

/// What an administrator needs to register the public key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyPairInfo {
    pub username: String,
    pub public_key_fingerprint: String,
    pub public_key_pem: String,
    pub sql_command: String,
}

pub struct QueryService {
    config: Config,
    auth: Arc<dyn AuthProvider>,
    executor: StatementExecutor,
    queries: Arc<dyn SqlTextProvider>,
    shutdown: CancellationToken,
}

impl QueryService {
    /// Builds the production service: reqwest transport, configured auth
    /// provider, directory-backed SQL text.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let client = HttpTransport::build_client(Duration::from_secs(
            config.executor.request_timeout_secs,
        ))?;
        let transport = Arc::new(HttpTransport::new(client.clone(), config.base_url()?));
        let auth = auth::create_provider(&config, client)?;
        let queries = Arc::new(SqlDirectory::open(&config.sql.directory));

        Self::from_parts(config, transport, auth, queries)
    }

    /// Builds a service around caller-supplied collaborators.
    pub fn from_parts(
        config: Config,
        transport: Arc<dyn SqlApiTransport>,
        auth: Arc<dyn AuthProvider>,
        queries: Arc<dyn SqlTextProvider>,
    ) -> Result<Self> {
        let executor = StatementExecutor::new(transport, auth.clone(), config.statement_target()?)
            .with_options(config.executor.to_options());

        info!(
            account = ?config.snowflake.account,
            auth_method = %auth.method(),
            "Query service ready"
        );

        Ok(Self {
            config,
            auth,
            executor,
            queries,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that, once cancelled, aborts in-flight executions.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn account(&self) -> String {
        self.config.snowflake.account.clone().unwrap_or_default()
    }

    /// Runs the named query. Never fails; errors land in the outcome.
    pub async fn run_named(
        &self,
        name: &str,
        parameters: Option<&Map<String, Value>>,
        options: Option<&ExecutorOptions>,
    ) -> QueryOutcome {
        debug!(query = %name, "Running named query");
        match self.queries.resolve(name) {
            Ok(sql) => self.run_sql(&sql, parameters, options).await,
            Err(e) => {
                error!("{e}");
                QueryOutcome::from_error(&e)
            }
        }
    }

    /// Runs literal SQL. Never fails; errors land in the outcome.
    pub async fn run_sql(
        &self,
        sql: &str,
        parameters: Option<&Map<String, Value>>,
        options: Option<&ExecutorOptions>,
    ) -> QueryOutcome {
        let options = options.unwrap_or_else(|| self.executor.options());
        match self
            .executor
            .execute_with(sql, parameters, options, Some(&self.shutdown))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => QueryOutcome::from_error(&e),
        }
    }

    /// Names of the queries available to [`run_named`](Self::run_named).
    pub fn list_queries(&self) -> Vec<String> {
        self.queries.list()
    }

    pub async fn test_auth(&self) -> AuthReport {
        let success = self.auth.verify().await;
        let message = if success {
            "Authentication successful"
        } else {
            "Authentication failed"
        };

        AuthReport {
            success,
            message: message.to_string(),
            auth_method: self.auth.method(),
            account: self.account(),
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            auth_method: self.auth.method(),
            account: self.account(),
            queries: self.queries.list().len(),
        }
    }

    /// Public key details and the `ALTER USER` statement that registers them.
    ///
    /// Only meaningful for key-pair authentication.
    pub fn keypair_info(&self) -> Result<KeyPairInfo> {
        if self.config.auth.method != AuthMethod::KeyPair {
            return Err(RelayError::config(
                "Key-pair info is only available for key-pair authentication",
            ));
        }

        let issuer = CredentialIssuer::new(KeyPairConfig::from_config(&self.config)?);
        let credential = issuer.load_key()?;
        let username = issuer.config().username.clone();
        let body = credential.public_key_body()?;

        Ok(KeyPairInfo {
            sql_command: format!("ALTER USER {username} SET RSA_PUBLIC_KEY='{body}';"),
            public_key_fingerprint: credential.fingerprint().to_string(),
            public_key_pem: credential.public_key_pem()?,
            username,
        })
    }

    /// Verifies credentials and runs a trivial query end to end.
    pub async fn check_connection(&self) -> Result<QueryOutcome> {
        info!("Testing connection and authentication...");
        if !self.auth.verify().await {
            return Err(RelayError::auth("credential check failed"));
        }

        let outcome = self
            .executor
            .execute_with(CONNECTION_CHECK_SQL, None, self.executor.options(), Some(&self.shutdown))
            .await?;
        if outcome.is_empty() {
            return Err(RelayError::remote_query("connection check returned no rows"));
        }

        info!(query_id = ?outcome.query_id, "Connection check succeeded");
        Ok(outcome)
    }

    /// Aborts in-flight executions and releases the HTTP client.
    pub fn close(self) {
        self.shutdown.cancel();
        info!("Query service closed");
    }
}
