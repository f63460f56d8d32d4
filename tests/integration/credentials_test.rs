//! Key-pair credential integration tests.
//!
//! Exercises key loading, token minting and header construction through the
//! public provider factory, the way the service wires them.

use super::common::{self, ACCOUNT, USERNAME};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use snowflake_sql_relay::api::MockTransport;
use snowflake_sql_relay::auth::{self, AuthMethod, CredentialIssuer, KeyPairConfig, TokenClaims};
use snowflake_sql_relay::error::{ErrorKind, RelayError};
use snowflake_sql_relay::service::QueryService;
use snowflake_sql_relay::sql::SqlDirectory;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::test]
async fn test_provider_headers_carry_verifiable_token() {
    let key = common::key_file(Some("s3cret"));
    let sql = common::sql_dir(&[]);
    let config = common::keypair_config(key.path(), Some("s3cret"), sql.path());

    let provider = auth::create_provider(&config, reqwest::Client::new()).unwrap();
    assert_eq!(provider.method(), AuthMethod::KeyPair);
    assert!(provider.verify().await);

    let headers = provider.auth_headers().await.unwrap();
    assert_eq!(headers["x-snowflake-authorization-token-type"], "KEYPAIR_JWT");
    let bearer = headers["authorization"].to_str().unwrap();
    let token = bearer.strip_prefix("Bearer ").unwrap();

    let issuer = CredentialIssuer::new(KeyPairConfig::from_config(&config).unwrap());
    let pem = issuer.export_public_key().unwrap();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["xy12345.snowflakecomputing.com"]);
    let claims = decode::<TokenClaims>(
        token,
        &DecodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap()
    .claims;

    assert_eq!(
        claims.iss,
        format!("XY12345.SVC_RELAY.SHA256:{}", issuer.fingerprint().unwrap())
    );
    assert_eq!(claims.sub, "XY12345.SVC_RELAY");
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[tokio::test]
async fn test_fresh_token_per_request() {
    let key = common::key_file(None);
    let sql = common::sql_dir(&[]);
    let config = common::keypair_config(key.path(), None, sql.path());
    let issuer = CredentialIssuer::new(KeyPairConfig::from_config(&config).unwrap());

    let first = issuer.issue_token().unwrap();
    let second = issuer.issue_token().unwrap();
    assert!(second.claims.iat >= first.claims.iat);
    assert_eq!(first.claims.iss, second.claims.iss);
}

#[tokio::test]
async fn test_wrong_passphrase_fails_before_any_remote_call() {
    let key = common::key_file(Some("right"));
    let sql = common::sql_dir(&[("probe.sql", "SELECT 1")]);
    let config = common::keypair_config(key.path(), Some("wrong"), sql.path());

    let mock = Arc::new(MockTransport::new());
    let provider = auth::create_provider(&config, reqwest::Client::new()).unwrap();
    assert!(!provider.verify().await);

    let service = QueryService::from_parts(
        config.clone(),
        mock.clone(),
        provider,
        Arc::new(SqlDirectory::open(sql.path())),
    )
    .unwrap();

    let outcome = service.run_named("probe", None, None).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::KeyDecryptionFailed));
    assert!(mock.calls().is_empty());
}

#[test]
fn test_missing_key_file() {
    let issuer = CredentialIssuer::new(KeyPairConfig {
        account: ACCOUNT.to_string(),
        username: USERNAME.to_string(),
        private_key_path: PathBuf::from("/nonexistent/rsa_key.p8"),
        passphrase: None,
        host_suffix: "snowflakecomputing.com".to_string(),
    });

    let err = issuer.issue_token().unwrap_err();
    assert!(matches!(err, RelayError::KeyUnreadable(_)));
}

#[test]
fn test_keypair_info_reports_registration_command() {
    let key = common::key_file(Some("s3cret"));
    let sql = common::sql_dir(&[]);
    let config = common::keypair_config(key.path(), Some("s3cret"), sql.path());

    let service = QueryService::from_parts(
        config.clone(),
        Arc::new(MockTransport::new()),
        auth::create_provider(&config, reqwest::Client::new()).unwrap(),
        Arc::new(SqlDirectory::open(sql.path())),
    )
    .unwrap();

    let info = service.keypair_info().unwrap();
    assert_eq!(info.username, USERNAME);
    assert!(info.public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert!(info
        .sql_command
        .starts_with("ALTER USER svc_relay SET RSA_PUBLIC_KEY='MII"));
    assert!(info.sql_command.ends_with("';"));
    assert!(!info.sql_command.contains("BEGIN PUBLIC KEY"));

    let issuer = CredentialIssuer::new(KeyPairConfig::from_config(&config).unwrap());
    assert_eq!(info.public_key_fingerprint, issuer.fingerprint().unwrap());
}
