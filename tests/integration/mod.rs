//! Integration tests for the query runner.

pub mod query_test;
pub mod runner_test;
pub mod schema_test;

use pg_query_runner::config::RunnerConfig;
use pg_query_runner::runner::PostgresRunner;

/// Builds a runner for the database in DATABASE_URL, if set.
pub fn get_test_runner() -> Option<PostgresRunner> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = RunnerConfig::from_connection_string(&url).ok()?;
    PostgresRunner::connect(&config).ok()
}
