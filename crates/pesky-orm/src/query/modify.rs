//! INSERT, UPDATE and DELETE assembly.
//!
//! Values are rendered as literals through their columns, so every statement
//! is plain SQL text with no bind parameters.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use super::helpers::{where_clause, writable_column};
use crate::condition::Condition;
use crate::dialect::Dialect;
use crate::structure::TableStructure;
use crate::value::Value;
use crate::{OrmError, Result};

/// Column name to value map for one row.
pub type RowValues = IndexMap<String, Value>;

/// Builds a (multi-row) INSERT.
///
/// The column list is the union of all row keys in structure order; a row
/// missing one of them gets `DEFAULT`. `returning` is honored on Postgres
/// only.
pub fn build_insert(
    structure: &TableStructure,
    dialect: Dialect,
    rows: &[RowValues],
    returning: &[String],
) -> Result<String> {
    if rows.is_empty() {
        return Err(OrmError::Internal("Cannot insert with no rows".to_string()));
    }

    let mut names: IndexSet<&str> = IndexSet::new();
    for column in structure.real_columns() {
        if rows.iter().any(|row| row.contains_key(column.name())) {
            names.insert(column.name());
        }
    }
    for row in rows {
        for key in row.keys() {
            names.insert(key.as_str());
        }
    }

    let table = structure.quoted_name(dialect);
    let mut sql = if names.is_empty() {
        match dialect {
            Dialect::Postgres if rows.len() == 1 => format!("INSERT INTO {} DEFAULT VALUES", table),
            Dialect::Postgres => {
                return Err(OrmError::Internal(
                    "Cannot insert several rows without values".to_string(),
                ))
            }
            Dialect::MySql => format!(
                "INSERT INTO {} () VALUES {}",
                table,
                vec!["()"; rows.len()].join(", ")
            ),
        }
    } else {
        let columns = names
            .iter()
            .map(|name| writable_column(structure, name))
            .collect::<Result<Vec<_>>>()?;

        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let literals = columns
                .iter()
                .map(|column| match row.get(column.name()) {
                    Some(value) => column.format_for_sql(value, dialect),
                    None => Ok("DEFAULT".to_string()),
                })
                .collect::<Result<Vec<_>>>()?;
            tuples.push(format!("({})", literals.join(", ")));
        }

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            names
                .iter()
                .map(|name| dialect.quote_identifier(name))
                .collect::<Vec<_>>()
                .join(", "),
            tuples.join(", ")
        )
    };

    if !returning.is_empty() {
        if let Some(clause) = dialect.returning_clause(returning) {
            sql.push_str(&clause);
        }
    }

    debug!(table = %structure.table_name(), rows = rows.len(), "Built INSERT");
    Ok(sql)
}

/// Builds an UPDATE of `values` for rows matching `condition`.
///
/// An empty condition is rejected so that a whole-table update is always
/// spelled out explicitly.
pub fn build_update(
    structure: &TableStructure,
    dialect: Dialect,
    values: &RowValues,
    condition: &Condition,
) -> Result<String> {
    if values.is_empty() {
        return Err(OrmError::Internal("Cannot update with no values".to_string()));
    }

    let assignments = values
        .iter()
        .map(|(name, value)| {
            let column = writable_column(structure, name)?;
            Ok(format!(
                "{} = {}",
                dialect.quote_identifier(name),
                column.format_for_sql(value, dialect)?
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let filter = required_where(structure, dialect, condition, "UPDATE")?;
    Ok(format!(
        "UPDATE {} SET {}{}",
        structure.quoted_name(dialect),
        assignments.join(", "),
        filter
    ))
}

/// Builds a DELETE for rows matching `condition`; an empty condition is
/// rejected.
pub fn build_delete(structure: &TableStructure, dialect: Dialect, condition: &Condition) -> Result<String> {
    let filter = required_where(structure, dialect, condition, "DELETE")?;
    Ok(format!("DELETE FROM {}{}", structure.quoted_name(dialect), filter))
}

fn required_where(
    structure: &TableStructure,
    dialect: Dialect,
    condition: &Condition,
    statement: &str,
) -> Result<String> {
    let clause = where_clause(structure, dialect, Some(condition))?;
    if clause.is_empty() {
        return Err(OrmError::InvalidCondition(format!(
            "{} on '{}' requires a condition",
            statement,
            structure.table_name()
        )));
    }
    Ok(clause)
}
