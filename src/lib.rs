//! PostgreSQL query runner.
//!
//! Runs SQL against PostgreSQL over single-use, cancellable connections and
//! returns results as a portable JSON payload, and lists the tables and
//! columns a host can query.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod runner;
