//! Statement execution integration tests.
//!
//! Drives the executor with a real key-pair provider and SQL directory over
//! the scripted transport.

use super::common;
use pretty_assertions::assert_eq;
use serde_json::json;
use snowflake_sql_relay::api::{ApiResponse, MockTransport, RecordedCall};
use snowflake_sql_relay::auth::{CredentialIssuer, KeyPairConfig};
use snowflake_sql_relay::error::RelayError;
use snowflake_sql_relay::executor::{ExecutorOptions, StatementExecutor};
use snowflake_sql_relay::sql::SqlDirectory;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

struct Fixture {
    _key: NamedTempFile,
    _sql: TempDir,
    queries: SqlDirectory,
    executor: StatementExecutor,
}

fn fixture(mock: &Arc<MockTransport>) -> Fixture {
    let key = common::key_file(None);
    let sql = common::sql_dir(&[
        (
            "orders_by_region.sql",
            "SELECT ID, TOTAL FROM ORDERS WHERE REGION = ? AND ACTIVE = ? ORDER BY ID",
        ),
        ("ping.sql", "SELECT 1"),
    ]);
    let config = common::keypair_config(key.path(), None, sql.path());

    let issuer = CredentialIssuer::new(KeyPairConfig::from_config(&config).unwrap());
    let executor = StatementExecutor::new(
        mock.clone(),
        Arc::new(issuer),
        config.statement_target().unwrap(),
    )
    .with_options(config.executor.to_options());

    Fixture {
        queries: SqlDirectory::open(sql.path()),
        _key: key,
        _sql: sql,
        executor,
    }
}

#[tokio::test]
async fn test_named_query_async_with_pages() {
    let mock = Arc::new(
        MockTransport::new()
            .with_submit(ApiResponse::success("explain", &["step"], vec![], None))
            .with_submit(ApiResponse::running("01b3"))
            .with_status(ApiResponse::running("01b3"))
            .with_status(ApiResponse::success(
                "01b3",
                &["ID", "TOTAL"],
                vec![vec![json!("1"), json!("10.5")]],
                Some("p2"),
            ))
            .with_page(ApiResponse::page(vec![vec![json!("2"), json!("7.25")]], None)),
    );
    let fixture = fixture(&mock);
    let params = json!({"region": "EMEA", "active": true});

    let outcome = fixture
        .executor
        .execute_named(&fixture.queries, "orders_by_region.sql", params.as_object())
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.columns, vec!["ID", "TOTAL"]);
    assert_eq!(
        outcome.data,
        vec![
            vec![json!("1"), json!("10.5")],
            vec![json!("2"), json!("7.25")],
        ]
    );
    assert_eq!(outcome.query_id.as_deref(), Some("01b3"));

    assert_eq!(
        mock.calls(),
        vec![
            RecordedCall::Submit {
                statement: "EXPLAIN SELECT ID, TOTAL FROM ORDERS WHERE REGION = ? AND ACTIVE = ? ORDER BY ID"
                    .to_string(),
                bindings: Some(json!({
                    "1": {"type": "TEXT", "value": "EMEA"},
                    "2": {"type": "BOOLEAN", "value": "true"},
                })),
            },
            RecordedCall::Submit {
                statement: "SELECT ID, TOTAL FROM ORDERS WHERE REGION = ? AND ACTIVE = ? ORDER BY ID"
                    .to_string(),
                bindings: Some(json!({
                    "1": {"type": "TEXT", "value": "EMEA"},
                    "2": {"type": "BOOLEAN", "value": "true"},
                })),
            },
            RecordedCall::Status { handle: "01b3".to_string() },
            RecordedCall::Status { handle: "01b3".to_string() },
            RecordedCall::Page {
                handle: "01b3".to_string(),
                token: "p2".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_unknown_query_name_makes_no_calls() {
    let mock = Arc::new(MockTransport::new());
    let fixture = fixture(&mock);

    let err = fixture
        .executor
        .execute_named(&fixture.queries, "nope", None)
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::SqlTextNotFound(_)));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_per_call_deadline_override() {
    let mock = Arc::new(
        MockTransport::new()
            .with_submit(ApiResponse::success("explain", &["step"], vec![], None))
            .with_submit(ApiResponse::running("01b4")),
    );
    let fixture = fixture(&mock);
    let options = ExecutorOptions::default()
        .with_poll_interval(Duration::from_millis(5))
        .with_timeout(Duration::from_millis(30));

    let started = std::time::Instant::now();
    let err = fixture
        .executor
        .execute_with("SELECT SYSTEM$WAIT(120)", None, &options, None)
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::TimedOut(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(mock.cancel_calls(), 1);
}

#[tokio::test]
async fn test_remote_failure_reported_without_cancel() {
    let mock = Arc::new(
        MockTransport::new()
            .with_submit(ApiResponse::success("explain", &["step"], vec![], None))
            .with_submit(ApiResponse::failure(
                422,
                "100051",
                "Division by zero",
            )),
    );
    let fixture = fixture(&mock);

    let err = fixture
        .executor
        .execute_named(&fixture.queries, "ping", None)
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::RemoteQuery(_)));
    assert!(err.to_string().contains("Division by zero"));
    assert_eq!(mock.cancel_calls(), 0);
}
