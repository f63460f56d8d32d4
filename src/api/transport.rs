//! HTTP transport for the statement endpoints.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ApiResponse, StatementRequest, StatementResponse};
use crate::error::{RelayError, Result};

const STATEMENTS_PATH: [&str; 3] = ["api", "v2", "statements"];

/// The four remote operations the executor needs.
///
/// Non-2xx answers that still carry a body are returned as `Ok` so the
/// executor can classify them; only network failures and undecodable
/// success bodies are errors.
#[async_trait]
pub trait SqlApiTransport: Send + Sync {
    /// Submits a statement.
    async fn submit(&self, request: &StatementRequest, headers: HeaderMap) -> Result<ApiResponse>;

    /// Fetches the current status of a statement (and its first page once done).
    async fn status(&self, handle: &str, headers: HeaderMap) -> Result<ApiResponse>;

    /// Fetches a continuation page.
    async fn page(&self, handle: &str, token: &str, headers: HeaderMap) -> Result<ApiResponse>;

    /// Requests cancellation of a running statement.
    async fn cancel(&self, handle: &str, headers: HeaderMap) -> Result<()>;
}

/// reqwest-backed transport. The inner client is shared and cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Builds the shared HTTP client with the given request timeout.
    pub fn build_client(timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::transport(format!("Failed to create HTTP client: {e}")))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/api/v2/statements[/extra...]`, with each segment escaped.
    pub fn endpoint(&self, extra: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RelayError::config(format!("Base URL cannot have a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(STATEMENTS_PATH)
            .extend(extra);
        Ok(url)
    }

    fn map_send_error(e: reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::transport("Request timed out")
        } else if e.is_connect() {
            RelayError::transport(format!("Failed to connect to SQL API: {e}"))
        } else {
            RelayError::transport(format!("Request failed: {e}"))
        }
    }

    async fn read_response(response: Response) -> Result<ApiResponse> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::transport(format!("Failed to read response: {e}")))?;

        match serde_json::from_str::<StatementResponse>(&text) {
            Ok(body) => Ok(ApiResponse::new(status.as_u16(), body)),
            Err(e) if status.is_success() => Err(RelayError::transport(format!(
                "Failed to parse response: {e}"
            ))),
            Err(_) => {
                let message = if text.trim().is_empty() {
                    None
                } else {
                    Some(text.trim().to_string())
                };
                Ok(ApiResponse::new(
                    status.as_u16(),
                    StatementResponse {
                        message,
                        ..Default::default()
                    },
                ))
            }
        }
    }
}

#[async_trait]
impl SqlApiTransport for HttpTransport {
    async fn submit(&self, request: &StatementRequest, headers: HeaderMap) -> Result<ApiResponse> {
        let url = self.endpoint(&[])?;
        debug!(%url, "Submitting statement");

        let response = self
            .client
            .post(url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::read_response(response).await
    }

    async fn status(&self, handle: &str, headers: HeaderMap) -> Result<ApiResponse> {
        let url = self.endpoint(&[handle])?;

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::read_response(response).await
    }

    async fn page(&self, handle: &str, token: &str, headers: HeaderMap) -> Result<ApiResponse> {
        let mut url = self.endpoint(&[handle])?;
        url.query_pairs_mut().append_pair("page", token);

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        Self::read_response(response).await
    }

    async fn cancel(&self, handle: &str, headers: HeaderMap) -> Result<()> {
        let url = self.endpoint(&[handle, "cancel"])?;

        let response = self
            .client
            .post(url)
            .headers(headers)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::transport(format!(
                "Cancel returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn test_submit_endpoint() {
        let t = transport("https://acme.snowflakecomputing.com");
        assert_eq!(
            t.endpoint(&[]).unwrap().as_str(),
            "https://acme.snowflakecomputing.com/api/v2/statements"
        );
    }

    #[test]
    fn test_cancel_endpoint() {
        let t = transport("https://acme.snowflakecomputing.com/");
        assert_eq!(
            t.endpoint(&["01b2-abc", "cancel"]).unwrap().as_str(),
            "https://acme.snowflakecomputing.com/api/v2/statements/01b2-abc/cancel"
        );
    }

    #[test]
    fn test_endpoint_escapes_handle() {
        let t = transport("http://127.0.0.1:9000/proxy/");
        assert_eq!(
            t.endpoint(&["a/b"]).unwrap().as_str(),
            "http://127.0.0.1:9000/proxy/api/v2/statements/a%2Fb"
        );
    }

    #[test]
    fn test_build_client() {
        assert!(HttpTransport::build_client(Duration::from_secs(5)).is_ok());
    }
}
