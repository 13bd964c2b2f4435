//! pgrun - run SQL against PostgreSQL and print the result as JSON.

mod cli;

use cli::Cli;
use pg_query_runner::config::{Config, RunnerConfig};
use pg_query_runner::db::{Driver, MockDriver, Outcome};
use pg_query_runner::error::{Result, RunnerError};
use pg_query_runner::logging;
use pg_query_runner::runner::{PostgresRunner, QueryRunner};
use std::io::Read;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_stderr_logging();

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

/// Runs the command. Returns `false` when the statement itself failed.
async fn run() -> Result<bool> {
    let cli = Cli::parse_args();
    cli.validate().map_err(RunnerError::config)?;

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;
    let runner_config = resolve_runner_config(&cli, &config)?;

    if cli.mock_db {
        let runner = PostgresRunner::new(&runner_config, MockDriver::default())?;
        execute(&cli, &runner).await
    } else {
        let runner = PostgresRunner::connect(&runner_config)?;
        execute(&cli, &runner).await
    }
}

/// Resolves settings with precedence: CLI, then config file, then environment.
fn resolve_runner_config(cli: &Cli, config: &Config) -> Result<RunnerConfig> {
    let mut runner_config = config.runner.clone();
    runner_config.merge(&cli.to_runner_config()?);
    runner_config.apply_env_defaults();
    Ok(runner_config)
}

async fn execute<D: Driver>(cli: &Cli, runner: &PostgresRunner<D>) -> Result<bool> {
    if cli.schema {
        let schema = runner.get_schema().await?;
        let tables: Vec<_> = schema.values().collect();
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(true);
    }

    let sql = read_sql(cli.sql.as_deref().unwrap_or_default())?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling query");
                cancel.cancel();
            }
        }
    });

    let outcome = runner.run_query(&sql, &cancel).await;
    watcher.abort();

    match outcome? {
        Outcome::Success(payload) => {
            println!("{payload}");
            Ok(true)
        }
        Outcome::Failure(message) => {
            eprintln!("{message}");
            Ok(false)
        }
    }
}

fn read_sql(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }

    let mut sql = String::new();
    std::io::stdin()
        .read_to_string(&mut sql)
        .map_err(|e| RunnerError::config(format!("Failed to read SQL from stdin: {e}")))?;
    Ok(sql)
}
