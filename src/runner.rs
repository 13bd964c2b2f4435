//! The query runner capability exposed to hosts.

use crate::config::RunnerConfig;
use crate::db::{Driver, Outcome, PgDriver, QueryExecutor, Schema};
use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A data source that runs SQL and reports its schema.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Short identifier of the runner kind.
    fn runner_type(&self) -> &'static str;

    /// JSON Schema of the settings the runner accepts.
    fn configuration_schema(&self) -> serde_json::Value;

    /// Runs `sql`. Cancelling `cancel` aborts the statement on the server.
    async fn run_query(&self, sql: &str, cancel: &CancellationToken) -> Result<Outcome>;

    /// Lists tables and their columns.
    async fn get_schema(&self) -> Result<Schema>;
}

/// PostgreSQL runner.
pub struct PostgresRunner<D: Driver = PgDriver> {
    executor: QueryExecutor<D>,
}

impl<D: Driver> PostgresRunner<D> {
    /// Creates a runner. The connection string is built once, here.
    pub fn new(config: &RunnerConfig, driver: D) -> Result<Self> {
        let connection_string = config.to_connection_string()?;
        info!("Query runner for {}", config.display_string());

        Ok(Self {
            executor: QueryExecutor::new(driver, connection_string),
        })
    }
}

impl PostgresRunner<PgDriver> {
    /// Creates a runner backed by the PostgreSQL driver.
    pub fn connect(config: &RunnerConfig) -> Result<Self> {
        Self::new(config, PgDriver)
    }
}

#[async_trait]
impl<D: Driver> QueryRunner for PostgresRunner<D> {
    fn runner_type(&self) -> &'static str {
        "pg"
    }

    fn configuration_schema(&self) -> serde_json::Value {
        RunnerConfig::configuration_schema()
    }

    async fn run_query(&self, sql: &str, cancel: &CancellationToken) -> Result<Outcome> {
        self.executor.execute_cancellable(sql, cancel).await
    }

    async fn get_schema(&self) -> Result<Schema> {
        self.executor.fetch_schema().await
    }
}
