//! Logging configuration for the relay.
//!
//! Logs go to stderr so stdout stays clean for JSON results. A file sink in
//! the platform state directory is available for unattended runs.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const APP_DIR: &str = "snowflake-sql-relay";
const LOG_FILE: &str = "relay.log";

/// `RUST_LOG` wins; otherwise the given level.
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initializes logging to stderr.
pub fn init_stderr_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to [`get_log_path`], appending across runs.
///
/// Falls back to stderr if the file cannot be opened.
pub fn init_file_logging(default_level: &str) {
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging(default_level);
            return;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            init_stderr_logging(default_level);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Returns the path for the log file.
///
/// Uses the XDG state directory on Linux
/// (`~/.local/state/snowflake-sql-relay/relay.log`), or falls back to the
/// config directory on other platforms.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join(APP_DIR).join(LOG_FILE);
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join(APP_DIR).join(LOG_FILE);
    }

    std::env::temp_dir().join(LOG_FILE)
}
