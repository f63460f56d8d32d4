//! SSO (username/password session) authentication.
//!
//! Logs in once to obtain a session token and reuses it for every request.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use super::{base_headers, AuthMethod, AuthProvider};
use crate::config::Config;
use crate::error::{RelayError, Result};

const LOGIN_PATH: &str = "session/authenticator-request";
const CLIENT_APP_ID: &str = "snowflake-sql-relay";

/// SSO login settings.
#[derive(Debug, Clone)]
pub struct SsoConfig {
    pub account: String,
    pub username: String,
    pub password: String,
    pub base_url: Url,
}

impl SsoConfig {
    pub fn from_config(config: &Config) -> Result<Self> {
        let username = config.auth.sso_username.clone().ok_or_else(|| {
            RelayError::config("SSO_USERNAME is required for SSO authentication")
        })?;
        let password = config.auth.sso_password.clone().ok_or_else(|| {
            RelayError::config("SSO_PASSWORD is required for SSO authentication")
        })?;

        Ok(Self {
            account: config.account()?.to_string(),
            username,
            password,
            base_url: config.base_url()?,
        })
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    data: LoginData<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginData<'a> {
    account_name: &'a str,
    login_name: &'a str,
    password: &'a str,
    client_app_id: &'a str,
    client_app_version: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<LoginResponseData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponseData {
    token: Option<String>,
}

/// Session-token provider. The first header request logs in if needed.
pub struct SsoAuthenticator {
    config: SsoConfig,
    client: Client,
    session: RwLock<Option<String>>,
}

impl SsoAuthenticator {
    pub fn new(config: SsoConfig, client: Client) -> Self {
        Self {
            config,
            client,
            session: RwLock::new(None),
        }
    }

    /// Creates an authenticator with an existing session token.
    pub fn with_session(config: SsoConfig, client: Client, token: impl Into<String>) -> Self {
        Self {
            config,
            client,
            session: RwLock::new(Some(token.into())),
        }
    }

    /// Performs the login exchange and stores the session token.
    pub async fn login(&self) -> Result<String> {
        let url = self
            .config
            .base_url
            .join(LOGIN_PATH)
            .map_err(|e| RelayError::config(format!("Invalid login URL: {e}")))?;

        let request = LoginRequest {
            data: LoginData {
                account_name: &self.config.account,
                login_name: &self.config.username,
                password: &self.config.password,
                client_app_id: CLIENT_APP_ID,
                client_app_version: env!("CARGO_PKG_VERSION"),
            },
        };

        debug!(%url, user = %self.config.username, "Requesting session token");
        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::auth(format!("SSO authentication error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::auth(format!("SSO login returned {status}")));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| RelayError::auth(format!("Malformed login response: {e}")))?;

        if !body.success {
            return Err(RelayError::auth(
                body.message
                    .unwrap_or_else(|| "login rejected".to_string()),
            ));
        }

        let token = body
            .data
            .and_then(|d| d.token)
            .ok_or_else(|| RelayError::auth("Login response carried no session token"))?;

        *self.session.write().await = Some(token.clone());
        Ok(token)
    }

    async fn session_token(&self) -> Result<String> {
        if let Some(token) = self.session.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.login().await
    }
}

#[async_trait]
impl AuthProvider for SsoAuthenticator {
    async fn auth_headers(&self) -> Result<HeaderMap> {
        let token = self.session_token().await?;

        let mut headers = base_headers();
        let value = HeaderValue::from_str(&format!("Snowflake Token=\"{token}\""))
            .map_err(|e| RelayError::auth(format!("Session token is not a valid header value: {e}")))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    async fn verify(&self) -> bool {
        match self.login().await {
            Ok(_) => true,
            Err(e) => {
                warn!("SSO authentication failed: {e}");
                false
            }
        }
    }

    fn method(&self) -> AuthMethod {
        AuthMethod::Sso
    }
}
