//! Query service integration tests.

use super::common;
use serde_json::json;
use snowflake_sql_relay::api::{ApiResponse, MockTransport};
use snowflake_sql_relay::auth::{self, AuthMethod};
use snowflake_sql_relay::config::Config;
use snowflake_sql_relay::error::{ErrorKind, RelayError};
use snowflake_sql_relay::service::{QueryService, CONNECTION_CHECK_SQL};
use snowflake_sql_relay::sql::SqlDirectory;
use std::sync::Arc;

#[test]
fn test_from_config_rejects_incomplete_config() {
    let mut config = Config::default();
    config.snowflake.account = Some("xy12345".to_string());

    let err = QueryService::from_config(config).err().unwrap();
    assert!(matches!(err, RelayError::Config(_)));
}

#[tokio::test]
async fn test_service_end_to_end() {
    let key = common::key_file(None);
    let sql = common::sql_dir(&[
        ("daily_sales.sql", "SELECT DAY, TOTAL FROM SALES WHERE DAY >= ?"),
        ("notes.md", "not a query"),
    ]);
    let config = common::keypair_config(key.path(), None, sql.path());

    let mock = Arc::new(
        MockTransport::new()
            .with_submit(ApiResponse::success("e1", &[], vec![], None))
            .with_submit(ApiResponse::success("c1", &["TEST_COLUMN"], vec![vec![json!("1")]], None))
            .with_submit(ApiResponse::success("e2", &[], vec![], None))
            .with_submit(ApiResponse::success(
                "q1",
                &["DAY", "TOTAL"],
                vec![vec![json!("2024-01-01"), json!("99")]],
                None,
            )),
    );
    let service = QueryService::from_parts(
        config.clone(),
        mock.clone(),
        auth::create_provider(&config, reqwest::Client::new()).unwrap(),
        Arc::new(SqlDirectory::open(sql.path())),
    )
    .unwrap();

    let health = service.health();
    assert_eq!(health.auth_method, AuthMethod::KeyPair);
    assert_eq!(health.queries, 1);
    assert_eq!(service.list_queries(), vec!["daily_sales"]);

    let auth = service.test_auth().await;
    assert!(auth.success);
    assert_eq!(auth.account, "xy12345");

    let probe = service.check_connection().await.unwrap();
    assert_eq!(probe.query_id.as_deref(), Some("c1"));

    let params = json!({"since": "2024-01-01"});
    let outcome = service
        .run_named("daily_sales", params.as_object(), None)
        .await;
    assert!(outcome.success);
    assert_eq!(outcome.row_count, 1);

    let statements = mock.submitted_statements();
    assert_eq!(statements[1], CONNECTION_CHECK_SQL);
    assert_eq!(statements[3], "SELECT DAY, TOTAL FROM SALES WHERE DAY >= ?");

    service.close();
}

#[tokio::test]
async fn test_outcome_json_shape_on_failure() {
    let key = common::key_file(None);
    let sql = common::sql_dir(&[]);
    let config = common::keypair_config(key.path(), None, sql.path());

    let service = QueryService::from_parts(
        config.clone(),
        Arc::new(MockTransport::new().with_submit_error("connection refused")),
        auth::create_provider(&config, reqwest::Client::new()).unwrap(),
        Arc::new(SqlDirectory::open(sql.path())),
    )
    .unwrap();

    let outcome = service.run_sql("SELECT 1", None, None).await;
    assert_eq!(outcome.error_kind, Some(ErrorKind::TransportError));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["data"], json!([]));
    assert_eq!(json["error_kind"], "transport_error");
    assert!(json["error"].as_str().unwrap().contains("connection refused"));
}
