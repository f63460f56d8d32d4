//! Command-line argument parsing for the relay.
//!
//! Uses clap derive; every command prints JSON on stdout.

use crate::error::{RelayError, Result};
use crate::executor::ExecutorOptions;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Indented JSON.
    #[default]
    Pretty,
    /// Single-line JSON.
    Compact,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "json" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(format!(
                "Invalid output format: {s}. Expected: pretty or compact"
            )),
        }
    }
}

/// Runs SQL through the asynchronous SQL API.
#[derive(Parser, Debug)]
#[command(name = "snowflake-sql-relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set (overrides the config file)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Write logs to the platform state directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Output format: pretty or compact
    #[arg(long, value_name = "FORMAT", default_value = "pretty", global = true)]
    pub output: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a query from the SQL directory by name
    Query {
        /// Query name, with or without the .sql suffix
        name: String,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Run literal SQL
    Sql {
        /// SQL text
        sql: String,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// List the queries found in the SQL directory
    ListQueries,

    /// Print the public key fingerprint and the ALTER USER statement registering it
    KeypairInfo,

    /// Check credentials without running a query
    TestAuth,

    /// Print a service status summary
    Health,

    /// Verify credentials and run a probe query
    Check,

    /// Store the private key passphrase in the OS keyring
    SetPassphrase {
        /// Passphrase (read from stdin when omitted)
        #[arg(long, env = "PRIVATE_KEY_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
}

/// Per-execution arguments shared by `query` and `sql`.
#[derive(Args, Debug, Default, Clone)]
pub struct ExecArgs {
    /// Bind parameter as NAME=VALUE, in positional order (repeatable)
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Bind parameters as a JSON object, applied before --param
    #[arg(long, value_name = "JSON")]
    pub params_json: Option<String>,

    /// Client-side deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Delay between status polls in milliseconds
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval: Option<u64>,
}

impl ExecArgs {
    /// Collects bind parameters in order. `None` when none were given.
    ///
    /// `--param` values that parse as JSON scalars keep their JSON type;
    /// anything else is bound as a string.
    pub fn parameters(&self) -> Result<Option<Map<String, Value>>> {
        let mut params = match &self.params_json {
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(RelayError::config("--params-json must be a JSON object"))
                }
                Err(e) => return Err(RelayError::config(format!("Invalid --params-json: {e}"))),
            },
            None => Map::new(),
        };

        for pair in &self.params {
            let (name, raw) = pair.split_once('=').ok_or_else(|| {
                RelayError::config(format!("Invalid parameter '{pair}'. Expected NAME=VALUE"))
            })?;
            params.insert(name.trim().to_string(), parse_param_value(raw));
        }

        Ok((!params.is_empty()).then_some(params))
    }

    /// Applies the per-call overrides on top of `base`.
    pub fn options(&self, base: &ExecutorOptions) -> ExecutorOptions {
        let mut options = base.clone();
        if let Some(secs) = self.timeout {
            options.overall_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_interval {
            options.poll_interval = Duration::from_millis(ms);
        }
        options
    }
}

/// Numbers are kept only when they survive parsing exactly; wider integers
/// stay text so they still bind as FIXED.
fn parse_param_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Null)) => value,
        Ok(Value::Number(n)) if n.is_i64() || n.is_u64() || n.to_string() == raw.trim() => {
            Value::Number(n)
        }
        _ => Value::String(raw.to_string()),
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }

    /// Parses the output format from the --output argument.
    pub fn parse_output_format(&self) -> std::result::Result<OutputFormat, String> {
        self.output.parse()
    }
}
