//! Query execution.
//!
//! One call opens one connection, drives it through connect and execute with
//! the readiness poller, builds the result payload, and closes the connection
//! again on every path.

use super::columns::normalize_columns;
use super::encode::{encode_row, DefaultEncoder, ValueEncoder};
use super::poller::{wait_until_ready, PollError};
use super::{Connection, Driver, DriverError, Outcome, QueryResult};
use crate::error::{Result, RunnerError};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where in the execution a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Executing,
    Materializing,
}

/// Runs SQL statements over single-use connections.
pub struct QueryExecutor<D: Driver> {
    driver: D,
    connection_string: String,
    encoder: Arc<dyn ValueEncoder>,
}

impl<D: Driver> QueryExecutor<D> {
    /// Creates an executor connecting with `connection_string`.
    pub fn new(driver: D, connection_string: impl Into<String>) -> Self {
        Self {
            driver,
            connection_string: connection_string.into(),
            encoder: Arc::new(DefaultEncoder),
        }
    }

    /// Replaces the encoder used for row values.
    pub fn with_encoder(mut self, encoder: Arc<dyn ValueEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Executes `sql` without a way to cancel it.
    pub async fn execute(&self, sql: &str) -> Result<Outcome> {
        self.execute_cancellable(sql, &CancellationToken::new()).await
    }

    /// Executes `sql`, giving up if `cancel` fires while waiting on the server.
    ///
    /// Recoverable failures (interrupted transport, database errors,
    /// cancellation) come back as [`Outcome::Failure`]. Anything else is
    /// returned as an error.
    pub async fn execute_cancellable(
        &self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let start = Instant::now();
        debug!("Opening connection");
        let mut conn = self
            .driver
            .connect(&self.connection_string)
            .map_err(RunnerError::Unexpected)?;

        let result = self.run(&mut conn, sql, cancel).await;
        conn.close().await;
        debug!(elapsed = ?start.elapsed(), "Connection closed");

        result
    }

    async fn run(
        &self,
        conn: &mut D::Conn,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if let Err(e) = wait_until_ready(conn, cancel).await {
            return self.classify(conn, Phase::Connecting, e).await;
        }
        debug!("Connected");

        if cancel.is_cancelled() {
            info!("Query cancelled before submission");
            return Ok(Outcome::cancelled());
        }

        debug!(sql, "Executing query");
        let submitted = match conn.submit(sql) {
            Ok(()) => wait_until_ready(conn, cancel).await,
            Err(e) => Err(PollError::Driver(e)),
        };
        if let Err(e) = submitted {
            return self.classify(conn, Phase::Executing, e).await;
        }

        let result = match self.materialize(conn) {
            Ok(result) => result,
            Err(e) => {
                return self
                    .classify(conn, Phase::Materializing, PollError::Driver(e))
                    .await
            }
        };
        debug!(rows = result.rows.len(), "Query finished");

        Ok(Outcome::Success(result.to_json()?))
    }

    /// Reads the finished statement's result and builds the payload.
    fn materialize(&self, conn: &mut D::Conn) -> std::result::Result<QueryResult, DriverError> {
        let mut cursor = conn.cursor()?;

        let columns = normalize_columns(cursor.description());
        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let rows = cursor
            .fetch_all()
            .iter()
            .map(|values| encode_row(&names, values, self.encoder.as_ref()))
            .collect();
        cursor.close();

        Ok(QueryResult::with_data(columns, rows))
    }

    /// Turns a failure into an outcome, or raises it if it is not one of the
    /// recoverable kinds.
    async fn classify(
        &self,
        conn: &mut D::Conn,
        phase: Phase,
        err: PollError,
    ) -> Result<Outcome> {
        match err {
            PollError::Cancelled => {
                if phase == Phase::Executing {
                    if let Err(e) = conn.cancel().await {
                        warn!(error = %e, "Cancel request failed");
                    }
                }
                info!(?phase, "Query cancelled by user");
                Ok(Outcome::cancelled())
            }
            PollError::UnknownState(_) | PollError::Interrupted(_) => {
                error!(?phase, error = %err, "Query interrupted");
                Ok(Outcome::interrupted())
            }
            PollError::Driver(DriverError::Database(message)) => {
                warn!(?phase, error = %message, "Database error");
                Ok(Outcome::Failure(message))
            }
            PollError::Driver(e) if e.is_transport() => {
                error!(?phase, error = %e, "Query interrupted");
                Ok(Outcome::interrupted())
            }
            PollError::Driver(e) => Err(RunnerError::Unexpected(e)),
        }
    }
}
