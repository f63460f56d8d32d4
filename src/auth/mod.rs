//! Authentication for SQL API requests.
//!
//! Two interchangeable providers sit behind [`AuthProvider`]: key-pair JWTs
//! and SSO session tokens. The provider is chosen once, from configuration.

pub mod keypair;
pub mod sso;

pub use keypair::{AuthToken, CredentialIssuer, KeyCredential, KeyPairConfig, TokenClaims};
pub use sso::{SsoAuthenticator, SsoConfig};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;

/// Identifies this client on every request.
pub const CLIENT_USER_AGENT: &str = concat!("snowflake-sql-relay/", env!("CARGO_PKG_VERSION"));

/// Capability that produces request headers for the SQL API.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns fresh headers for one request.
    async fn auth_headers(&self) -> Result<HeaderMap>;

    /// Checks that credentials are usable. Never errors; failures are logged.
    async fn verify(&self) -> bool;

    /// The method this provider implements.
    fn method(&self) -> AuthMethod;
}

/// Supported authentication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthMethod {
    #[default]
    #[serde(rename = "keypair")]
    KeyPair,
    #[serde(rename = "sso")]
    Sso,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyPair => "keypair",
            Self::Sso => "sso",
        }
    }
}

impl FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keypair" | "key-pair" | "key_pair" | "jwt" => Ok(Self::KeyPair),
            "sso" => Ok(Self::Sso),
            _ => Err(format!("Unknown auth method: {}", s)),
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Headers shared by both providers.
pub(crate) fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
    headers
}

/// Creates the provider selected by `config.auth.method`.
///
/// The HTTP client is only used by providers that talk to the network.
pub fn create_provider(config: &Config, client: reqwest::Client) -> Result<Arc<dyn AuthProvider>> {
    match config.auth.method {
        AuthMethod::KeyPair => Ok(Arc::new(CredentialIssuer::new(KeyPairConfig::from_config(
            config,
        )?))),
        AuthMethod::Sso => Ok(Arc::new(SsoAuthenticator::new(
            SsoConfig::from_config(config)?,
            client,
        ))),
    }
}
