//! Statement execution against the asynchronous SQL API.
//!
//! One call drives a statement through validation, submission, optional
//! polling and pagination, and returns a decoded [`QueryOutcome`]:
//!
//! ```text
//! Submitting -> Validating -> ExecutingSync  --\
//!                          \-> ExecutingAsync --+-> Paginating -> Done
//! any state -> Failed;  ExecutingAsync -> TimedOut | Cancelled
//! ```
//!
//! The client-side deadline (`overall_timeout`) is independent of the remote
//! wait window (`remote_wait_secs`); either can be tuned alone.

mod decoder;

pub use decoder::{decode, QueryOutcome, Row};

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{ApiResponse, RemoteStatus, SqlApiTransport, StatementRequest, StatementResponse};
use crate::auth::AuthProvider;
use crate::bindings::{self, Bindings};
use crate::error::{RelayError, Result};
use crate::sql::SqlTextProvider;

/// Database context every statement runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementTarget {
    pub database: String,
    pub schema: String,
    pub warehouse: String,
    pub role: Option<String>,
}

/// Timing parameters of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Client-side deadline, measured from the first submission.
    pub overall_timeout: Duration,
    /// Seconds the remote side may hold a submission before answering 202.
    pub remote_wait_secs: u64,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            overall_timeout: Duration::from_secs(60),
            remote_wait_secs: 60,
        }
    }
}

impl ExecutorOptions {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, overall_timeout: Duration) -> Self {
        self.overall_timeout = overall_timeout;
        self
    }
}

/// Protocol state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Submitting,
    Validating,
    ExecutingSync,
    ExecutingAsync,
    Paginating,
    Done,
    Failed,
    TimedOut,
    Cancelled,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitting => "submitting",
            Self::Validating => "validating",
            Self::ExecutingSync => "executing_sync",
            Self::ExecutingAsync => "executing_async",
            Self::Paginating => "paginating",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs statements through the submit/validate/poll/paginate pipeline.
///
/// Holds only shared, read-only collaborators; concurrent executions share
/// nothing else.
pub struct StatementExecutor {
    transport: Arc<dyn SqlApiTransport>,
    auth: Arc<dyn AuthProvider>,
    target: StatementTarget,
    options: ExecutorOptions,
}

impl StatementExecutor {
    pub fn new(
        transport: Arc<dyn SqlApiTransport>,
        auth: Arc<dyn AuthProvider>,
        target: StatementTarget,
    ) -> Self {
        Self {
            transport,
            auth,
            target,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn target(&self) -> &StatementTarget {
        &self.target
    }

    /// Executes `sql` with the default options.
    pub async fn execute(
        &self,
        sql: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<QueryOutcome> {
        self.execute_with(sql, parameters, &self.options, None).await
    }

    /// Resolves `name` and executes it. An unknown name fails before any
    /// remote call.
    pub async fn execute_named(
        &self,
        provider: &dyn SqlTextProvider,
        name: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<QueryOutcome> {
        let sql = provider.resolve(name)?;
        self.execute(&sql, parameters).await
    }

    /// Executes `sql` with explicit options and an optional caller
    /// cancellation token.
    pub async fn execute_with(
        &self,
        sql: &str,
        parameters: Option<&Map<String, Value>>,
        options: &ExecutorOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<QueryOutcome> {
        debug!(sql = %sql, "Executing SQL");

        let bindings = parameters
            .filter(|params| !params.is_empty())
            .map(bindings::encode);
        if let Some(bindings) = &bindings {
            debug!(count = bindings.len(), "With bindings");
        }

        let mut execution = Execution {
            executor: self,
            options,
            cancel,
            started: Instant::now(),
            state: ExecutionState::Submitting,
        };

        let result = execution.run(sql, bindings).await;
        match &result {
            Ok(outcome) => info!(
                rows = outcome.data.len(),
                query_id = ?outcome.query_id,
                elapsed_ms = execution.started.elapsed().as_millis() as u64,
                "Statement completed"
            ),
            Err(e) => {
                execution.enter(match e {
                    RelayError::TimedOut(_) => ExecutionState::TimedOut,
                    RelayError::Cancelled(_) => ExecutionState::Cancelled,
                    _ => ExecutionState::Failed,
                });
                warn!("Statement failed: {e}");
            }
        }
        result
    }

    fn request(&self, statement: String, bindings: Option<Bindings>, wait: u64) -> StatementRequest {
        StatementRequest {
            statement,
            timeout: wait,
            database: self.target.database.clone(),
            schema: self.target.schema.clone(),
            warehouse: self.target.warehouse.clone(),
            role: self.target.role.clone(),
            bindings,
        }
    }

    /// Plans the statement without running it.
    async fn validate(&self, sql: &str, bindings: Option<Bindings>, wait: u64) -> Result<()> {
        let request = self.request(format!("EXPLAIN {sql}"), bindings, wait);
        let headers = self.auth.auth_headers().await?;
        let response = self.transport.submit(&request, headers).await?;

        match response.remote_status() {
            RemoteStatus::Succeeded => Ok(()),
            RemoteStatus::Running => Err(RelayError::validation(
                "plan check did not finish within the remote wait window",
            )),
            RemoteStatus::Failed => Err(RelayError::validation(response.failure_message())),
            RemoteStatus::Unavailable => Err(RelayError::transport(response.failure_message())),
        }
    }

    async fn submit(&self, request: &StatementRequest) -> Result<ApiResponse> {
        let headers = self.auth.auth_headers().await?;
        self.transport.submit(request, headers).await
    }

    async fn status(&self, handle: &str) -> Result<ApiResponse> {
        let headers = self.auth.auth_headers().await?;
        self.transport.status(handle, headers).await
    }

    async fn page(&self, handle: &str, token: &str) -> Result<ApiResponse> {
        let headers = self.auth.auth_headers().await?;
        self.transport.page(handle, token, headers).await
    }

    /// Best-effort: failures are logged, never returned.
    async fn cancel_statement(&self, handle: &str) {
        let headers: HeaderMap = match self.auth.auth_headers().await {
            Ok(headers) => headers,
            Err(e) => {
                error!(handle = %handle, "Failed to cancel statement: {e}");
                return;
            }
        };

        match self.transport.cancel(handle, headers).await {
            Ok(()) => info!(handle = %handle, "Cancelled statement"),
            Err(e) => error!(handle = %handle, "Failed to cancel statement: {e}"),
        }
    }
}

/// Per-call state. Owns nothing shared with other executions.
struct Execution<'a> {
    executor: &'a StatementExecutor,
    options: &'a ExecutorOptions,
    cancel: Option<&'a CancellationToken>,
    started: Instant,
    state: ExecutionState,
}

impl Execution<'_> {
    fn enter(&mut self, next: ExecutionState) {
        debug!(from = %self.state, to = %next, "Execution state");
        self.state = next;
    }

    async fn run(&mut self, sql: &str, bindings: Option<Bindings>) -> Result<QueryOutcome> {
        let wait = self.options.remote_wait_secs;

        self.enter(ExecutionState::Validating);
        self.executor.validate(sql, bindings.clone(), wait).await?;

        let request = self.executor.request(sql.to_string(), bindings, wait);
        let response = self.executor.submit(&request).await?;
        let handle = response.handle().map(String::from);

        let body = match response.remote_status() {
            RemoteStatus::Succeeded => {
                self.enter(ExecutionState::ExecutingSync);
                response.body
            }
            RemoteStatus::Failed => {
                self.enter(ExecutionState::ExecutingSync);
                return Err(RelayError::remote_query(response.failure_message()));
            }
            RemoteStatus::Unavailable => {
                return Err(RelayError::transport(response.failure_message()));
            }
            RemoteStatus::Running => {
                self.enter(ExecutionState::ExecutingAsync);
                let handle = handle.as_deref().ok_or_else(|| {
                    RelayError::transport("running statement was returned without a handle")
                })?;
                self.await_completion(handle).await?
            }
        };

        self.enter(ExecutionState::Paginating);
        let handle = body.statement_handle.clone().or(handle);
        let body = self.fetch_remaining_pages(body, handle.as_deref()).await?;

        self.enter(ExecutionState::Done);
        decode(body)
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.is_some_and(CancellationToken::is_cancelled)
    }

    /// Polls until the statement finishes, the deadline passes, or the caller cancels.
    async fn await_completion(&mut self, handle: &str) -> Result<StatementResponse> {
        let mut polls = 0u32;

        loop {
            if self.started.elapsed() >= self.options.overall_timeout {
                self.executor.cancel_statement(handle).await;
                return Err(RelayError::timed_out(format!(
                    "statement {handle} did not finish within {:?} and was cancelled",
                    self.options.overall_timeout
                )));
            }
            if self.cancel_requested() {
                self.executor.cancel_statement(handle).await;
                return Err(RelayError::cancelled(format!("statement {handle}")));
            }

            let response = match self.executor.status(handle).await {
                Ok(response) => response,
                Err(e) => {
                    self.executor.cancel_statement(handle).await;
                    return Err(e);
                }
            };
            polls += 1;

            match response.remote_status() {
                RemoteStatus::Succeeded => {
                    debug!(handle = %handle, polls, "Statement finished");
                    return Ok(response.body);
                }
                RemoteStatus::Failed => {
                    return Err(RelayError::remote_query(response.failure_message()));
                }
                RemoteStatus::Unavailable => {
                    self.executor.cancel_statement(handle).await;
                    return Err(RelayError::transport(response.failure_message()));
                }
                RemoteStatus::Running => {}
            }

            let remaining = self
                .options
                .overall_timeout
                .saturating_sub(self.started.elapsed());
            let nap = self.options.poll_interval.min(remaining);

            match self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = tokio::time::sleep(nap) => {}
                        _ = token.cancelled() => {}
                    }
                }
                None => tokio::time::sleep(nap).await,
            }
        }
    }

    /// Appends every continuation page, in token order. Columns stay those of
    /// the first page. A 2xx page needs no response code.
    async fn fetch_remaining_pages(
        &mut self,
        mut body: StatementResponse,
        handle: Option<&str>,
    ) -> Result<StatementResponse> {
        let Some(handle) = handle else {
            body.next_page_token = None;
            return Ok(body);
        };

        while let Some(token) = body.next_page_token.take() {
            let page = self.executor.page(handle, &token).await?;
            match page.remote_status() {
                RemoteStatus::Unavailable => {
                    return Err(RelayError::transport(page.failure_message()));
                }
                RemoteStatus::Failed if page.is_classified() => {
                    return Err(RelayError::remote_query(page.failure_message()));
                }
                _ => {}
            }

            debug!(handle = %handle, rows = page.body.data.len(), "Fetched result page");
            body.data.extend(page.body.data);
            body.next_page_token = page.body.next_page_token;
        }

        Ok(body)
    }
}
