//! Wire types for the asynchronous SQL API.
//!
//! Requests and responses of the statement endpoints, plus the status
//! classification the executor's state machine is driven by.

mod mock;
mod transport;

pub use mock::{MockTransport, RecordedCall};
pub use transport::{HttpTransport, SqlApiTransport};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bindings::Bindings;

/// Response code for a statement that finished successfully.
pub const SUCCESS_CODE: &str = "090001";

/// Response codes for a statement that is still executing.
pub const RUNNING_CODES: [&str; 2] = ["333333", "333334"];

/// HTTP status returned while a statement is still executing.
pub const HTTP_ACCEPTED: u16 = 202;

/// Body of a statement submission.
#[derive(Debug, Clone, Serialize)]
pub struct StatementRequest {
    pub statement: String,
    /// Seconds the remote side may wait before answering asynchronously.
    pub timeout: u64,
    pub database: String,
    pub schema: String,
    pub warehouse: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<Bindings>,
}

/// Column metadata entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowType {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub nullable: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    #[serde(default)]
    pub num_rows: Option<u64>,
    #[serde(default)]
    pub row_type: Vec<RowType>,
}

/// Some deployments report status as a bare string, others nest it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StatusField {
    Plain(String),
    Nested { status: Option<String> },
}

impl StatusField {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Plain(s) => Some(s),
            Self::Nested { status } => status.as_deref(),
        }
    }
}

/// Body of any statement endpoint response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sql_state: Option<String>,
    #[serde(default)]
    pub statement_handle: Option<String>,
    #[serde(default)]
    pub status: Option<StatusField>,
    #[serde(default)]
    pub result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Where a statement stands according to one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Running,
    Succeeded,
    Failed,
    /// A non-2xx answer carrying neither a response code nor a status, such
    /// as a gateway error page. Says nothing about the statement itself.
    Unavailable,
}

/// A response together with its HTTP status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub http_status: u16,
    pub body: StatementResponse,
}

impl ApiResponse {
    pub fn new(http_status: u16, body: StatementResponse) -> Self {
        Self { http_status, body }
    }

    /// A terminal success carrying one page of rows.
    pub fn success(
        handle: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
        next_page_token: Option<&str>,
    ) -> Self {
        let row_type = columns
            .iter()
            .map(|name| RowType {
                name: name.to_string(),
                ..Default::default()
            })
            .collect();

        Self::new(
            200,
            StatementResponse {
                code: Some(SUCCESS_CODE.to_string()),
                message: Some("Statement executed successfully.".to_string()),
                statement_handle: Some(handle.to_string()),
                result_set_meta_data: Some(ResultSetMetaData {
                    num_rows: Some(rows.len() as u64),
                    row_type,
                }),
                data: rows,
                next_page_token: next_page_token.map(String::from),
                ..Default::default()
            },
        )
    }

    /// A continuation page (no metadata).
    pub fn page(rows: Vec<Vec<Value>>, next_page_token: Option<&str>) -> Self {
        Self::new(
            200,
            StatementResponse {
                code: Some(SUCCESS_CODE.to_string()),
                data: rows,
                next_page_token: next_page_token.map(String::from),
                ..Default::default()
            },
        )
    }

    /// An "execution in progress" answer.
    pub fn running(handle: &str) -> Self {
        Self::new(
            HTTP_ACCEPTED,
            StatementResponse {
                code: Some(RUNNING_CODES[1].to_string()),
                message: Some("Asynchronous execution in progress.".to_string()),
                statement_handle: Some(handle.to_string()),
                ..Default::default()
            },
        )
    }

    /// A terminal failure.
    pub fn failure(http_status: u16, code: &str, message: &str) -> Self {
        Self::new(
            http_status,
            StatementResponse {
                code: Some(code.to_string()),
                message: Some(message.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn handle(&self) -> Option<&str> {
        self.body.statement_handle.as_deref()
    }

    pub fn is_http_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }

    /// True when the body carries a response code or a status field.
    pub fn is_classified(&self) -> bool {
        self.body.code.is_some() || self.body.status.is_some()
    }

    /// Classifies the response. An explicit HTTP 202 always means running;
    /// an explicit status field wins over the response code.
    pub fn remote_status(&self) -> RemoteStatus {
        if self.http_status == HTTP_ACCEPTED {
            return RemoteStatus::Running;
        }
        if !self.is_http_success() && !self.is_classified() {
            return RemoteStatus::Unavailable;
        }

        if let Some(status) = self.body.status.as_ref().and_then(StatusField::as_str) {
            match status.to_uppercase().as_str() {
                "SUCCESS" | "SUCCEEDED" => return RemoteStatus::Succeeded,
                "FAILED" | "ABORTED" | "FAILED_WITH_ERROR" | "FAILED_WITH_INCIDENT" => {
                    return RemoteStatus::Failed
                }
                "RUNNING" | "QUEUED" | "RESUMING_WAREHOUSE" | "BLOCKED" | "NO_DATA" => {
                    return RemoteStatus::Running
                }
                _ => {}
            }
        }

        match self.body.code.as_deref() {
            Some(SUCCESS_CODE) if self.http_status < 300 => RemoteStatus::Succeeded,
            Some(code) if RUNNING_CODES.contains(&code) => RemoteStatus::Running,
            _ => RemoteStatus::Failed,
        }
    }

    /// Human-readable failure description.
    pub fn failure_message(&self) -> String {
        match (&self.body.message, &self.body.code) {
            (Some(message), Some(code)) => format!("{message} (code {code})"),
            (Some(message), None) => message.clone(),
            (None, Some(code)) => format!("HTTP {} (code {code})", self.http_status),
            (None, None) => format!("HTTP {}", self.http_status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_success_response() {
        let body = json!({
            "resultSetMetaData": {
                "numRows": 2,
                "format": "jsonv2",
                "rowType": [
                    {"name": "ID", "type": "fixed", "nullable": false},
                    {"name": "NAME", "type": "text", "nullable": true}
                ]
            },
            "data": [["1", "alice"], ["2", null]],
            "code": "090001",
            "statementStatusUrl": "/api/v2/statements/01b2?requestId=x",
            "sqlState": "00000",
            "statementHandle": "01b2",
            "message": "Statement executed successfully.",
            "createdOn": 1700000000000u64
        });

        let parsed: StatementResponse = serde_json::from_value(body).unwrap();
        let response = ApiResponse::new(200, parsed);

        assert_eq!(response.remote_status(), RemoteStatus::Succeeded);
        assert_eq!(response.handle(), Some("01b2"));
        let meta = response.body.result_set_meta_data.unwrap();
        assert_eq!(meta.num_rows, Some(2));
        assert_eq!(meta.row_type[1].name, "NAME");
        assert_eq!(response.body.data[1][1], Value::Null);
    }

    #[test]
    fn test_accepted_is_running() {
        assert_eq!(ApiResponse::running("h").remote_status(), RemoteStatus::Running);

        let mut still_running = ApiResponse::running("h");
        still_running.http_status = 200;
        still_running.body.code = Some("333333".to_string());
        assert_eq!(still_running.remote_status(), RemoteStatus::Running);
    }

    #[test]
    fn test_status_field_variants() {
        let plain: StatementResponse =
            serde_json::from_value(json!({"status": "SUCCEEDED"})).unwrap();
        assert_eq!(ApiResponse::new(200, plain).remote_status(), RemoteStatus::Succeeded);

        let nested: StatementResponse =
            serde_json::from_value(json!({"status": {"status": "ABORTED"}, "message": "x"}))
                .unwrap();
        assert_eq!(ApiResponse::new(200, nested).remote_status(), RemoteStatus::Failed);

        let running: StatementResponse =
            serde_json::from_value(json!({"status": "RUNNING"})).unwrap();
        assert_eq!(ApiResponse::new(200, running).remote_status(), RemoteStatus::Running);
    }

    #[test]
    fn test_http_error_is_failed() {
        let response = ApiResponse::failure(422, "002003", "Object 'ORDERS' does not exist");
        assert_eq!(response.remote_status(), RemoteStatus::Failed);
        assert_eq!(
            response.failure_message(),
            "Object 'ORDERS' does not exist (code 002003)"
        );
    }

    #[test]
    fn test_gateway_error_is_unavailable() {
        let page = StatementResponse {
            message: Some("<html>Service Unavailable</html>".to_string()),
            ..Default::default()
        };
        assert_eq!(ApiResponse::new(503, page).remote_status(), RemoteStatus::Unavailable);
        assert_eq!(
            ApiResponse::new(429, StatementResponse::default()).remote_status(),
            RemoteStatus::Unavailable
        );

        // A remote error code means the statement itself failed.
        let failed = ApiResponse::failure(422, "000630", "Statement reached its timeout");
        assert_eq!(failed.remote_status(), RemoteStatus::Failed);
    }

    #[test]
    fn test_failure_message_without_body() {
        let response = ApiResponse::new(503, StatementResponse::default());
        assert_eq!(response.failure_message(), "HTTP 503");
    }

    #[test]
    fn test_request_omits_empty_optionals() {
        let request = StatementRequest {
            statement: "SELECT 1".to_string(),
            timeout: 60,
            database: "DB".to_string(),
            schema: "PUBLIC".to_string(),
            warehouse: "WH".to_string(),
            role: None,
            bindings: None,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "statement": "SELECT 1",
                "timeout": 60,
                "database": "DB",
                "schema": "PUBLIC",
                "warehouse": "WH"
            })
        );
    }
}
