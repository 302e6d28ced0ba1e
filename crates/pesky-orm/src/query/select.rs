//! SELECT and COUNT assembly.

use tracing::debug;

use super::helpers::{render_reference, where_clause};
use super::types::{OrderBy, OrderDirection};
use crate::condition::Condition;
use crate::dialect::Dialect;
use crate::structure::TableStructure;
use crate::Result;

/// MySQL needs a LIMIT before OFFSET; this is the documented "no limit" value.
const MYSQL_NO_LIMIT: &str = "18446744073709551615";

/// SELECT statement over one table.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    columns: Option<Vec<String>>,
    with_heavy: bool,
    condition: Option<Condition>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit column list; by default every real, non-heavy column is read.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Includes heavy columns in the default column list.
    pub fn with_heavy(mut self) -> Self {
        self.with_heavy = true;
        self
    }

    /// Adds a condition, AND-ed with any existing one.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and_also(condition),
            None => condition,
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push(OrderBy {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Column names the statement reads, before quoting.
    pub fn selected_columns(&self, structure: &TableStructure) -> Vec<String> {
        match &self.columns {
            Some(columns) => columns.clone(),
            None if self.with_heavy => structure.real_columns().map(|c| c.name().to_string()).collect(),
            None => structure.default_select_columns(),
        }
    }

    /// Builds the SELECT statement.
    pub fn to_sql(&self, structure: &TableStructure, dialect: Dialect) -> Result<String> {
        let columns = self.selected_columns(structure);
        let column_list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| render_reference(structure, dialect, c))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let mut sql = format!(
            "SELECT {}{} FROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            column_list,
            structure.quoted_name(dialect)
        );
        sql.push_str(&where_clause(structure, dialect, self.condition.as_ref())?);

        if !self.order_by.is_empty() {
            let parts = self
                .order_by
                .iter()
                .map(|o| Ok(format!("{} {}", render_reference(structure, dialect, &o.column)?, o.direction.to_sql())))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }

        match (self.limit, self.offset, dialect) {
            (Some(limit), Some(offset), _) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None, _) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset), Dialect::Postgres) => sql.push_str(&format!(" OFFSET {}", offset)),
            (None, Some(offset), Dialect::MySql) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", MYSQL_NO_LIMIT, offset))
            }
            (None, None, _) => {}
        }

        debug!(table = %structure.table_name(), sql = %sql, "Built SELECT");
        Ok(sql)
    }

    /// Builds a `COUNT(*)` statement over the same rows.
    ///
    /// Ordering is dropped; DISTINCT, LIMIT and OFFSET are honored through a
    /// subquery.
    pub fn count_sql(&self, structure: &TableStructure, dialect: Dialect) -> Result<String> {
        let alias = dialect.quote_identifier("count");
        if self.distinct || self.limit.is_some() || self.offset.is_some() {
            let mut inner = self.clone();
            inner.order_by.clear();
            return Ok(format!(
                "SELECT COUNT(*) AS {} FROM ({}) AS {}",
                alias,
                inner.to_sql(structure, dialect)?,
                dialect.quote_identifier("counted")
            ));
        }
        Ok(format!(
            "SELECT COUNT(*) AS {} FROM {}{}",
            alias,
            structure.quoted_name(dialect),
            where_clause(structure, dialect, self.condition.as_ref())?
        ))
    }
}
