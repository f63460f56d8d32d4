//! Normalizes raw statement responses into [`QueryOutcome`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{StatementResponse, SUCCESS_CODE};
use crate::error::{ErrorKind, RelayError, Result};

/// A row of JSON cells, in column order.
pub type Row = Vec<Value>;

/// The canonical result of one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryOutcome {
    pub success: bool,
    pub data: Vec<Row>,
    pub columns: Vec<String>,
    pub row_count: u64,
    /// Statement handle of the executed statement.
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl QueryOutcome {
    /// A failed outcome describing `err`.
    pub fn from_error(err: &RelayError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Maps a (fully paginated) response to an outcome.
///
/// Fails with `RemoteQuery` unless the response carries the success code.
/// `row_count` prefers the remote `numRows`, falling back to the rows held.
pub fn decode(response: StatementResponse) -> Result<QueryOutcome> {
    if response.code.as_deref() != Some(SUCCESS_CODE) {
        return Err(RelayError::remote_query(
            response
                .message
                .unwrap_or_else(|| format!("unexpected response code {:?}", response.code)),
        ));
    }

    let meta = response.result_set_meta_data.unwrap_or_default();
    let columns = meta.row_type.into_iter().map(|col| col.name).collect();
    let row_count = meta.num_rows.unwrap_or(response.data.len() as u64);

    Ok(QueryOutcome {
        success: true,
        data: response.data,
        columns,
        row_count,
        query_id: response.statement_handle,
        error: None,
        error_kind: None,
    })
}
