//! Scripted executor for tests and offline demos.
//!
//! Results are keyed by the exact query text. Unknown queries fail with
//! `QueryError::Query`, like an unknown view would on a real server.

use std::collections::HashMap;
use std::time::Duration;

use super::{QueryError, QueryExecutor};
use crate::collector::Row;

#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    responses: HashMap<String, Result<Vec<Row>, QueryError>>,
    delays: HashMap<String, Duration>,
    executed: Vec<String>,
    resets: usize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts `rows` as the result of `query`.
    pub fn with_rows(mut self, query: &str, rows: Vec<Row>) -> Self {
        self.responses.insert(query.to_string(), Ok(rows));
        self
    }

    /// Scripts a failure for `query`.
    pub fn with_error(mut self, query: &str, error: QueryError) -> Self {
        self.responses.insert(query.to_string(), Err(error));
        self
    }

    /// Makes `query` sleep before answering.
    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    /// Queries executed so far, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Number of `reset()` calls observed.
    pub fn resets(&self) -> usize {
        self.resets
    }
}

impl QueryExecutor for MockExecutor {
    async fn execute(&mut self, query: &str) -> Result<Vec<Row>, QueryError> {
        self.executed.push(query.to_string());

        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }

        match self.responses.get(query) {
            Some(result) => result.clone(),
            None => Err(QueryError::Query(format!(
                "no scripted result for query: {}",
                query.lines().next().unwrap_or_default().trim()
            ))),
        }
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}
