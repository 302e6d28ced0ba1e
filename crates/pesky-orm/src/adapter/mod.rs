//! Statement executors.
//!
//! The ORM renders complete SQL text (every value is already a quoted
//! literal), so an adapter is a thin executor: run a statement, report the
//! affected rows, or return rows as ordered column maps.

mod mysql;
mod postgres;
mod recording;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::ConnectionConfig;
use crate::dialect::Dialect;
use crate::value::Value;
use crate::Result;

pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use recording::RecordingAdapter;

/// One result row: column name to value, in select order.
pub type DbRow = IndexMap<String, Value>;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    pub rows_affected: u64,
    /// Auto-increment id generated by an INSERT (MySQL)
    pub last_insert_id: Option<i64>,
}

impl ExecResult {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            last_insert_id: None,
        }
    }
}

/// Executes rendered SQL against a database.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Runs a statement that returns no rows.
    async fn execute(&self, sql: &str) -> Result<ExecResult>;

    /// Runs a statement and returns every row.
    async fn query(&self, sql: &str) -> Result<Vec<DbRow>>;

    /// Runs a statement and returns the first row, if any.
    async fn query_one(&self, sql: &str) -> Result<Option<DbRow>> {
        Ok(self.query(sql).await?.into_iter().next())
    }
}

/// Connects with the adapter matching `config.driver`.
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn Adapter>> {
    Ok(match config.driver {
        Dialect::Postgres => Arc::new(PostgresAdapter::connect(config).await?),
        Dialect::MySql => Arc::new(MySqlAdapter::connect(config).await?),
    })
}

/// Statements run on every new connection to apply the session settings.
pub(crate) fn session_statements(config: &ConnectionConfig) -> Vec<String> {
    let dialect = config.driver;
    let mut statements = Vec::new();
    match dialect {
        Dialect::Postgres => {
            if let Some(charset) = &config.charset {
                statements.push(format!("SET client_encoding TO {}", dialect.quote_string(charset)));
            }
            if let Some(timezone) = &config.timezone {
                statements.push(format!("SET TIME ZONE {}", dialect.quote_string(timezone)));
            }
            if let Some(schema) = &config.schema {
                statements.push(format!("SET search_path TO {}", dialect.quote_identifier(schema)));
            }
        }
        Dialect::MySql => {
            if let Some(charset) = &config.charset {
                statements.push(format!("SET NAMES {}", dialect.quote_string(charset)));
            }
            if let Some(timezone) = &config.timezone {
                statements.push(format!("SET time_zone = {}", dialect.quote_string(timezone)));
            }
        }
    }
    statements
}

/// Shortened statement text for log fields.
pub(crate) fn sql_preview(sql: &str) -> String {
    sql.chars().take(100).collect()
}
