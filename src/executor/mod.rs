//! Query execution against the monitored server.
//!
//! The orchestrator only needs `execute(query) -> rows`. Connection handling,
//! authentication and encryption live behind the `QueryExecutor` trait:
//!
//! - `MssqlExecutor` talks to SQL Server over TDS (tiberius).
//! - `MockExecutor` replays scripted results for tests and demos.

pub mod mock;
mod mssql;

use std::future::Future;
use std::time::Duration;

use crate::collector::Row;

pub use mock::MockExecutor;
pub use mssql::{MssqlConfig, MssqlExecutor};

/// Error type for query execution.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Could not (re)establish the connection.
    Connection(String),
    /// The server rejected or failed the query.
    Query(String),
    /// The query did not finish within the allotted time.
    Timeout(Duration),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::Connection(msg) => write!(f, "SQL Server: {}", msg),
            QueryError::Query(msg) => write!(f, "SQL Server query error: {}", msg),
            QueryError::Timeout(d) => write!(f, "query timed out after {:?}", d),
        }
    }
}

impl std::error::Error for QueryError {}

/// Runs a query and returns its rows in projection order.
///
/// Implementations perform no retries and no caching.
pub trait QueryExecutor: Send {
    fn execute(&mut self, query: &str) -> impl Future<Output = Result<Vec<Row>, QueryError>> + Send;

    /// Drops any in-flight state after a cancelled query.
    ///
    /// The next `execute` starts from a clean connection.
    fn reset(&mut self) {}
}
