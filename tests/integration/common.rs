//! Shared fixtures: a generated RSA key, key files and a ready config.

use pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use snowflake_sql_relay::auth::AuthMethod;
use snowflake_sql_relay::config::Config;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;
use tempfile::{NamedTempFile, TempDir};

pub const ACCOUNT: &str = "xy12345";
pub const USERNAME: &str = "svc_relay";

/// One 2048-bit key for the whole test binary.
pub fn test_key() -> RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap())
        .clone()
}

pub fn key_file(passphrase: Option<&str>) -> NamedTempFile {
    let pem = match passphrase {
        Some(passphrase) => test_key()
            .to_pkcs8_encrypted_pem(&mut rand::thread_rng(), passphrase, LineEnding::LF)
            .unwrap(),
        None => test_key().to_pkcs8_pem(LineEnding::LF).unwrap(),
    };

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(pem.as_bytes()).unwrap();
    file
}

/// A directory of `*.sql` files.
pub fn sql_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        std::fs::write(dir.path().join(name), contents).unwrap();
    }
    dir
}

/// A complete key-pair config pointing at `key_path`.
pub fn keypair_config(key_path: &Path, passphrase: Option<&str>, sql_dir: &Path) -> Config {
    let mut config = Config::default();
    config.snowflake.account = Some(ACCOUNT.to_string());
    config.snowflake.warehouse = Some("COMPUTE_WH".to_string());
    config.snowflake.database = Some("ANALYTICS".to_string());
    config.snowflake.schema = Some("PUBLIC".to_string());
    config.snowflake.role = Some("REPORTER".to_string());
    config.auth.method = AuthMethod::KeyPair;
    config.auth.username = Some(USERNAME.to_string());
    config.auth.private_key_path = Some(key_path.to_path_buf());
    config.auth.private_key_passphrase = passphrase.map(String::from);
    config.sql.directory = sql_dir.to_path_buf();
    config.executor.poll_interval_ms = 5;
    config.executor.timeout_secs = 2;
    config
}
