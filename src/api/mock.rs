//! Scripted transport for testing.
//!
//! Responses are queued per endpoint and every call is recorded, so tests can
//! assert both on outcomes and on the exact remote traffic.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use super::{ApiResponse, SqlApiTransport, StatementRequest};
use crate::error::{RelayError, Result};

/// One remote call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Submit {
        statement: String,
        bindings: Option<serde_json::Value>,
    },
    Status {
        handle: String,
    },
    Page {
        handle: String,
        token: String,
    },
    Cancel {
        handle: String,
    },
}

#[derive(Default)]
struct Script {
    submits: VecDeque<Result<ApiResponse>>,
    statuses: VecDeque<Result<ApiResponse>>,
    pages: VecDeque<Result<ApiResponse>>,
    cancel_fails: bool,
    calls: Vec<RecordedCall>,
}

/// A transport that replays queued responses.
///
/// When the status queue is exhausted the statement is reported as still
/// running, which is what deadline tests rely on.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<Script>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues the answer to the next submission.
    pub fn with_submit(self, response: ApiResponse) -> Self {
        self.script().submits.push_back(Ok(response));
        self
    }

    /// Queues a transport failure for the next submission.
    pub fn with_submit_error(self, message: &str) -> Self {
        self.script()
            .submits
            .push_back(Err(RelayError::transport(message)));
        self
    }

    /// Queues the answer to the next status poll.
    pub fn with_status(self, response: ApiResponse) -> Self {
        self.script().statuses.push_back(Ok(response));
        self
    }

    /// Queues a transport failure for the next status poll.
    pub fn with_status_error(self, message: &str) -> Self {
        self.script()
            .statuses
            .push_back(Err(RelayError::transport(message)));
        self
    }

    /// Queues the answer to the next page fetch.
    pub fn with_page(self, response: ApiResponse) -> Self {
        self.script().pages.push_back(Ok(response));
        self
    }

    /// Makes every cancel request fail.
    pub fn with_failing_cancel(self) -> Self {
        self.script().cancel_fails = true;
        self
    }

    /// All calls in the order they were made.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.script().calls.clone()
    }

    /// Statements submitted, in order.
    pub fn submitted_statements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Submit { statement, .. } => Some(statement),
                _ => None,
            })
            .collect()
    }

    pub fn status_calls(&self) -> usize {
        self.count(|call| matches!(call, RecordedCall::Status { .. }))
    }

    pub fn page_calls(&self) -> usize {
        self.count(|call| matches!(call, RecordedCall::Page { .. }))
    }

    pub fn cancel_calls(&self) -> usize {
        self.count(|call| matches!(call, RecordedCall::Cancel { .. }))
    }

    fn count(&self, predicate: impl Fn(&RecordedCall) -> bool) -> usize {
        self.script().calls.iter().filter(|call| predicate(call)).count()
    }
}

#[async_trait]
impl SqlApiTransport for MockTransport {
    async fn submit(&self, request: &StatementRequest, _headers: HeaderMap) -> Result<ApiResponse> {
        let mut script = self.script();
        script.calls.push(RecordedCall::Submit {
            statement: request.statement.clone(),
            bindings: request
                .bindings
                .as_ref()
                .and_then(|b| serde_json::to_value(b).ok()),
        });
        script
            .submits
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::transport("no scripted submit response")))
    }

    async fn status(&self, handle: &str, _headers: HeaderMap) -> Result<ApiResponse> {
        let mut script = self.script();
        script.calls.push(RecordedCall::Status {
            handle: handle.to_string(),
        });
        script
            .statuses
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::running(handle)))
    }

    async fn page(&self, handle: &str, token: &str, _headers: HeaderMap) -> Result<ApiResponse> {
        let mut script = self.script();
        script.calls.push(RecordedCall::Page {
            handle: handle.to_string(),
            token: token.to_string(),
        });
        script
            .pages
            .pop_front()
            .unwrap_or_else(|| Err(RelayError::transport("no scripted page response")))
    }

    async fn cancel(&self, handle: &str, _headers: HeaderMap) -> Result<()> {
        let mut script = self.script();
        script.calls.push(RecordedCall::Cancel {
            handle: handle.to_string(),
        });
        if script.cancel_fails {
            return Err(RelayError::transport("cancel rejected"));
        }
        Ok(())
    }
}
