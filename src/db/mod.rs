//! Database layer.
//!
//! The executor talks to the database through two small traits: a [`Driver`]
//! that starts non-blocking connection attempts, and the [`Connection`]
//! handle it returns. A handle is advanced with [`Connection::poll`] and the
//! caller waits for socket readiness in between, the way libpq's
//! asynchronous API is driven.

mod columns;
mod encode;
mod executor;
mod mock;
mod poller;
mod postgres;
mod schema;
mod type_map;
mod types;

pub use columns::normalize_columns;
pub use encode::{encode_row, DefaultEncoder, ValueEncoder};
pub use executor::QueryExecutor;
pub use mock::{MockConnection, MockDriver, MockFailure, MockProbe, Step};
pub use poller::{wait_until_ready, PollError};
pub use postgres::{PgDriver, PgHandle};
pub use schema::{fold_schema_rows, Schema, SchemaEntry, DEFAULT_SCHEMA, SCHEMA_QUERY};
pub use type_map::portable_type;
pub use types::{
    ColumnDescriptor, Outcome, PortableType, QueryResult, RawColumn, Row, Value, QUERY_CANCELLED,
    QUERY_INTERRUPTED,
};

use async_trait::async_trait;
use std::io;
use thiserror::Error;

/// State reported by [`Connection::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// The pending operation has finished.
    Ok,
    /// The handle needs the socket to become readable.
    Read,
    /// The handle needs the socket to become writable.
    Write,
    /// A state code the poller does not understand.
    Unknown(i32),
}

/// Socket readiness to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// Errors raised by a driver.
#[derive(Error, Debug)]
pub enum DriverError {
    /// An error reported by the database server. Carries the server's message.
    #[error("{0}")]
    Database(String),

    /// The transport failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The driver and server disagree about the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Anything else: decode failures, driver bugs, misuse.
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DriverError {
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Other(err.into())
    }

    /// Returns true for failures of the connection itself rather than of the
    /// statement or the driver.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Protocol(_))
    }
}

/// Result set of a finished statement.
///
/// Drivers materialize the rows before handing out the cursor.
#[derive(Debug, Default)]
pub struct Cursor {
    description: Vec<RawColumn>,
    rows: Vec<Vec<Value>>,
    closed: bool,
}

impl Cursor {
    pub fn new(description: Vec<RawColumn>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            description,
            rows,
            closed: false,
        }
    }

    /// Column descriptions in result order.
    pub fn description(&self) -> &[RawColumn] {
        &self.description
    }

    /// Takes every remaining row.
    pub fn fetch_all(&mut self) -> Vec<Vec<Value>> {
        std::mem::take(&mut self.rows)
    }

    pub fn close(&mut self) {
        self.rows.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A single-use, non-blocking database session.
///
/// Connections are never shared: one execution owns one handle from connect
/// to close.
#[async_trait]
pub trait Connection: Send {
    /// Advances the pending operation (connect or statement) without blocking.
    fn poll(&mut self) -> Result<PollState, DriverError>;

    /// Blocks until the underlying transport is ready for `interest`.
    async fn wait_ready(&mut self, interest: Interest) -> io::Result<()>;

    /// Submits a statement. Completion is observed through [`Connection::poll`].
    fn submit(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Opens a cursor over the last finished statement.
    fn cursor(&mut self) -> Result<Cursor, DriverError>;

    /// Asks the server to cancel the statement in flight.
    async fn cancel(&mut self) -> Result<(), DriverError>;

    /// Closes the session. Calling it more than once has no further effect.
    async fn close(&mut self);
}

/// Opens connections for the executor.
pub trait Driver: Send + Sync {
    type Conn: Connection;

    /// Starts a non-blocking connection attempt. The returned handle still
    /// has to be polled until it reports [`PollState::Ok`].
    fn connect(&self, connection_string: &str) -> Result<Self::Conn, DriverError>;
}
