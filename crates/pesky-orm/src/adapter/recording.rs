//! In-memory adapter that records statements and replays canned results.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{Adapter, DbRow, ExecResult};
use crate::dialect::Dialect;
use crate::{OrmError, Result};

#[derive(Debug, Default)]
struct Recorded {
    statements: Vec<String>,
    row_sets: VecDeque<Vec<DbRow>>,
    exec_results: VecDeque<ExecResult>,
    errors: VecDeque<OrmError>,
}

/// Adapter that never touches a database.
///
/// Every statement is recorded. `query` pops the next queued row set (or
/// returns no rows), `execute` pops the next queued result (or reports one
/// affected row). A queued error fails the next call of either kind.
#[derive(Debug)]
pub struct RecordingAdapter {
    dialect: Dialect,
    inner: Mutex<Recorded>,
}

impl RecordingAdapter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            inner: Mutex::new(Recorded::default()),
        }
    }

    /// Queues a result set for the next `query`.
    pub fn push_rows(&self, rows: Vec<DbRow>) {
        self.inner.lock().row_sets.push_back(rows);
    }

    /// Queues a result for the next `execute`.
    pub fn push_exec(&self, result: ExecResult) {
        self.inner.lock().exec_results.push_back(result);
    }

    /// Fails the next call.
    pub fn push_error(&self, error: OrmError) {
        self.inner.lock().errors.push_back(error);
    }

    /// Statements received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.inner.lock().statements.clone()
    }

    pub fn last_statement(&self) -> Option<String> {
        self.inner.lock().statements.last().cloned()
    }

    /// Forgets recorded statements and queued results.
    pub fn clear(&self) {
        *self.inner.lock() = Recorded::default();
    }

    fn record(&self, sql: &str) -> Result<()> {
        debug!(dialect = %self.dialect, sql = %sql, "Recorded statement");
        let mut inner = self.inner.lock();
        inner.statements.push(sql.to_string());
        match inner.errors.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Adapter for RecordingAdapter {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn execute(&self, sql: &str) -> Result<ExecResult> {
        self.record(sql)?;
        Ok(self
            .inner
            .lock()
            .exec_results
            .pop_front()
            .unwrap_or(ExecResult::affected(1)))
    }

    async fn query(&self, sql: &str) -> Result<Vec<DbRow>> {
        self.record(sql)?;
        Ok(self.inner.lock().row_sets.pop_front().unwrap_or_default())
    }
}
