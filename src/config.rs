//! Configuration management for the relay.
//!
//! Handles loading configuration from a TOML file and environment variables.
//! Precedence, highest first: CLI flags, config file, environment variables.

use crate::auth::AuthMethod;
use crate::error::{RelayError, Result};
use crate::executor::{ExecutorOptions, StatementTarget};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote account and execution context.
    #[serde(default)]
    pub snowflake: SnowflakeConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Polling and deadline settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Where SQL text files live.
    #[serde(default)]
    pub sql: SqlConfig,

    /// Log level used when `RUST_LOG` is not set.
    pub log_level: Option<String>,
}

/// Account and execution context for submitted statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnowflakeConfig {
    /// Account identifier (e.g., "xy12345.us-east-1").
    pub account: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    pub role: Option<String>,

    /// Host suffix appended to the account to form the API host and token audience.
    #[serde(default = "default_host_suffix")]
    pub host_suffix: String,

    /// Overrides the derived `https://{account}.{host_suffix}` base URL.
    pub base_url: Option<String>,
}

fn default_host_suffix() -> String {
    "snowflakecomputing.com".to_string()
}

impl Default for SnowflakeConfig {
    fn default() -> Self {
        Self {
            account: None,
            warehouse: None,
            database: None,
            schema: None,
            role: None,
            host_suffix: default_host_suffix(),
            base_url: None,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// "keypair" or "sso".
    #[serde(default)]
    pub method: AuthMethod,

    /// User for key-pair authentication.
    pub username: Option<String>,

    /// Path to the PEM private key.
    pub private_key_path: Option<PathBuf>,

    /// Passphrase for an encrypted private key (prefer the OS keyring).
    pub private_key_passphrase: Option<String>,

    pub sso_username: Option<String>,
    pub sso_password: Option<String>,
}

/// Statement execution timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Delay between status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Client-side deadline for a whole execution, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How long the remote side may hold a submission before answering asynchronously.
    #[serde(default = "default_remote_wait_secs")]
    pub remote_wait_secs: u64,

    /// Per-request HTTP timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_remote_wait_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
            remote_wait_secs: default_remote_wait_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ExecutorConfig {
    /// Converts the configured timings into executor options.
    pub fn to_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            overall_timeout: Duration::from_secs(self.timeout_secs),
            remote_wait_secs: self.remote_wait_secs,
        }
    }
}

/// SQL text directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default = "default_sql_directory")]
    pub directory: PathBuf,
}

fn default_sql_directory() -> PathBuf {
    PathBuf::from("sql/queries")
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            directory: default_sql_directory(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snowflake-sql-relay")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            RelayError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies process environment variables as defaults for unset fields.
    pub fn apply_env_defaults(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Applies defaults from an arbitrary variable lookup.
    ///
    /// Only fields still unset after loading the file are filled in.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn fill<F: Fn(&str) -> Option<String>>(slot: &mut Option<String>, key: &str, lookup: &F) {
            if slot.is_none() {
                *slot = lookup(key);
            }
        }

        let sf = &mut self.snowflake;
        fill(&mut sf.account, "SNOWFLAKE_ACCOUNT", &lookup);
        fill(&mut sf.warehouse, "SNOWFLAKE_WAREHOUSE", &lookup);
        fill(&mut sf.database, "SNOWFLAKE_DATABASE", &lookup);
        fill(&mut sf.schema, "SNOWFLAKE_SCHEMA", &lookup);
        fill(&mut sf.role, "SNOWFLAKE_ROLE", &lookup);
        fill(&mut sf.base_url, "SNOWFLAKE_BASE_URL", &lookup);
        if sf.host_suffix == default_host_suffix() {
            if let Some(suffix) = lookup("SNOWFLAKE_HOST_SUFFIX") {
                sf.host_suffix = suffix;
            }
        }

        let auth = &mut self.auth;
        if auth.method == AuthMethod::default() {
            if let Some(method) = lookup("AUTH_METHOD").and_then(|m| m.parse().ok()) {
                auth.method = method;
            }
        }
        fill(&mut auth.username, "KEYPAIR_USERNAME", &lookup);
        fill(
            &mut auth.private_key_passphrase,
            "PRIVATE_KEY_PASSPHRASE",
            &lookup,
        );
        fill(&mut auth.sso_username, "SSO_USERNAME", &lookup);
        fill(&mut auth.sso_password, "SSO_PASSWORD", &lookup);
        if auth.private_key_path.is_none() {
            auth.private_key_path = lookup("PRIVATE_KEY_PATH").map(PathBuf::from);
        }

        if self.sql.directory == default_sql_directory() {
            if let Some(dir) = lookup("SQL_DIRECTORY") {
                self.sql.directory = PathBuf::from(dir);
            }
        }

        fill(&mut self.log_level, "LOG_LEVEL", &lookup);
    }

    /// Returns the configured log level, defaulting to "info".
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Returns the account identifier, or a configuration error if unset.
    pub fn account(&self) -> Result<&str> {
        self.snowflake
            .account
            .as_deref()
            .ok_or_else(|| RelayError::config("SNOWFLAKE_ACCOUNT is required"))
    }

    /// Returns the base URL of the SQL API.
    pub fn base_url(&self) -> Result<Url> {
        let raw = match &self.snowflake.base_url {
            Some(url) => url.clone(),
            None => format!(
                "https://{}.{}",
                self.account()?.to_lowercase(),
                self.snowflake.host_suffix
            ),
        };

        Url::parse(&raw).map_err(|e| RelayError::config(format!("Invalid base URL '{raw}': {e}")))
    }

    /// Builds the execution context shared by every submitted statement.
    pub fn statement_target(&self) -> Result<StatementTarget> {
        let sf = &self.snowflake;
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| RelayError::config(format!("{name} is required")))
        };

        Ok(StatementTarget {
            database: required(&sf.database, "SNOWFLAKE_DATABASE")?,
            schema: required(&sf.schema, "SNOWFLAKE_SCHEMA")?,
            warehouse: required(&sf.warehouse, "SNOWFLAKE_WAREHOUSE")?,
            role: sf.role.clone(),
        })
    }

    /// Checks that every field needed by the selected auth method is present.
    pub fn validate(&self) -> Result<()> {
        if self.executor.poll_interval_ms == 0 {
            return Err(RelayError::config("executor.poll_interval_ms must be at least 1"));
        }
        self.account()?;
        self.statement_target()?;
        self.base_url()?;

        match self.auth.method {
            AuthMethod::KeyPair => {
                if self.auth.username.is_none() {
                    return Err(RelayError::config(
                        "KEYPAIR_USERNAME is required for key-pair authentication",
                    ));
                }
                if self.auth.private_key_path.is_none() {
                    return Err(RelayError::config(
                        "PRIVATE_KEY_PATH is required for key-pair authentication",
                    ));
                }
            }
            AuthMethod::Sso => {
                if self.auth.sso_username.is_none() || self.auth.sso_password.is_none() {
                    return Err(RelayError::config(
                        "SSO_USERNAME and SSO_PASSWORD are required for SSO authentication",
                    ));
                }
            }
        }

        Ok(())
    }
}
