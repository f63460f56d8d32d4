//! snowflake-sql-relay - Run SQL through the asynchronous Snowflake SQL API.

use serde::Serialize;
use snowflake_sql_relay::cli::{Cli, Command, OutputFormat};
use snowflake_sql_relay::config::Config;
use snowflake_sql_relay::error::{RelayError, Result};
use snowflake_sql_relay::service::QueryService;
use snowflake_sql_relay::sql::{SqlDirectory, SqlTextProvider};
use snowflake_sql_relay::{logging, secrets};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    let config = load_config(&cli);

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.log_level().to_string()))
        .unwrap_or_else(|| "info".to_string());
    if cli.log_file {
        logging::init_file_logging(&level);
    } else {
        logging::init_stderr_logging(&level);
    }

    let outcome = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

/// Loads the config file, then fills unset fields from the environment.
fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config_path();
    let mut config = Config::load_from_file(&path)?;
    config.apply_env_defaults();
    Ok(config)
}

/// Runs one command. `Ok(false)` means the command ran but reported failure.
async fn run(cli: Cli, config: Config) -> Result<bool> {
    let format = cli.parse_output_format().map_err(RelayError::config)?;
    info!("Loaded config from: {}", cli.config_path().display());

    match cli.command {
        Command::ListQueries => {
            let queries = SqlDirectory::open(&config.sql.directory).list();
            emit(&queries, format)?;
            Ok(true)
        }
        Command::SetPassphrase { passphrase } => {
            let account = config.account()?.to_string();
            let username = config
                .auth
                .username
                .clone()
                .ok_or_else(|| RelayError::config("KEYPAIR_USERNAME is required"))?;
            let passphrase = match passphrase {
                Some(passphrase) => passphrase,
                None => read_passphrase()?,
            };

            secrets::store_passphrase(&account, &username, &passphrase)?;
            info!("Stored passphrase in keyring");
            emit(
                &serde_json::json!({
                    "stored": true,
                    "user": secrets::entry_user(&account, &username),
                }),
                format,
            )?;
            Ok(true)
        }
        command => {
            let service = QueryService::from_config(config)?;
            let shutdown = service.shutdown_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling running statements");
                    shutdown.cancel();
                }
            });

            let success = run_service_command(&service, command, format).await;
            service.close();
            success
        }
    }
}

async fn run_service_command(
    service: &QueryService,
    command: Command,
    format: OutputFormat,
) -> Result<bool> {
    let base_options = service.config().executor.to_options();

    match command {
        Command::Query { name, exec } => {
            let params = exec.parameters()?;
            let options = exec.options(&base_options);
            let outcome = service.run_named(&name, params.as_ref(), Some(&options)).await;
            emit(&outcome, format)?;
            Ok(outcome.success)
        }
        Command::Sql { sql, exec } => {
            let params = exec.parameters()?;
            let options = exec.options(&base_options);
            let outcome = service.run_sql(&sql, params.as_ref(), Some(&options)).await;
            emit(&outcome, format)?;
            Ok(outcome.success)
        }
        Command::KeypairInfo => {
            emit(&service.keypair_info()?, format)?;
            Ok(true)
        }
        Command::TestAuth => {
            let report = service.test_auth().await;
            emit(&report, format)?;
            Ok(report.success)
        }
        Command::Health => {
            emit(&service.health(), format)?;
            Ok(true)
        }
        Command::Check => {
            let outcome = service.check_connection().await?;
            emit(&outcome, format)?;
            Ok(true)
        }
        Command::ListQueries | Command::SetPassphrase { .. } => {
            Err(RelayError::config("command does not use the query service"))
        }
    }
}

fn emit<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value),
        OutputFormat::Compact => serde_json::to_string(value),
    }
    .map_err(|e| RelayError::config(format!("Failed to render output: {e}")))?;

    println!("{rendered}");
    Ok(())
}

fn read_passphrase() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| RelayError::config(format!("Failed to read passphrase from stdin: {e}")))?;

    let passphrase = line.trim_end_matches(['\r', '\n']).to_string();
    if passphrase.is_empty() {
        return Err(RelayError::config("Passphrase must not be empty"));
    }
    Ok(passphrase)
}
