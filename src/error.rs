//! Error types for the query runner.
//!
//! Recoverable query failures are not errors at this level: they travel back
//! to the caller as [`Outcome::Failure`](crate::db::Outcome). Everything here
//! is raised.

use crate::db::DriverError;
use thiserror::Error;

/// Main error type for runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Configuration errors (missing dbname, unreadable config file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The schema query did not produce a result set.
    #[error("Failed getting schema.")]
    SchemaFetch,

    /// A result payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A driver failure outside the recoverable tier. The original error is
    /// kept as the source.
    #[error("Unexpected error: {0}")]
    Unexpected(#[source] DriverError),
}

impl RunnerError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "Configuration Error",
            Self::SchemaFetch => "Schema Error",
            Self::Serialization(_) => "Serialization Error",
            Self::Unexpected(_) => "Internal Error",
        }
    }
}

/// Result type alias using RunnerError.
pub type Result<T> = std::result::Result<T, RunnerError>;
