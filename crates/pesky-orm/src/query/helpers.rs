//! Helpers shared by the statement builders.

use std::sync::Arc;

use crate::column::Column;
use crate::condition::{ColumnRef, Condition};
use crate::dialect::Dialect;
use crate::structure::TableStructure;
use crate::value::Value;
use crate::{OrmError, Result};

/// Resolves a column that is about to be written.
pub(crate) fn writable_column(structure: &TableStructure, name: &str) -> Result<Arc<Column>> {
    let column = structure.column(name)?;
    if !column.is_real() {
        return Err(OrmError::Configuration(format!(
            "Virtual column '{}.{}' cannot be stored",
            structure.table_name(),
            name
        )));
    }
    Ok(column)
}

/// Renders a column reference used in a SELECT list or ORDER BY.
pub(crate) fn render_reference(structure: &TableStructure, dialect: Dialect, raw: &str) -> Result<String> {
    let reference = ColumnRef::parse(raw)?;
    let own_table = reference
        .qualifier
        .as_deref()
        .map_or(true, |q| q == structure.table_name() || q == structure.qualified_name());
    if own_table {
        match structure.find_column(&reference.name) {
            Some(column) if !column.is_real() => {
                return Err(OrmError::InvalidCondition(format!(
                    "Virtual column '{}' cannot be selected",
                    reference.name
                )))
            }
            Some(_) => {}
            None if structure.allows_any_column() => {}
            None => {
                return Err(OrmError::UnknownColumn {
                    table: structure.table_name().to_string(),
                    column: reference.name.clone(),
                })
            }
        }
    }
    reference.render(dialect)
}

/// ` WHERE ...` clause, or an empty string for an empty condition.
pub(crate) fn where_clause(
    structure: &TableStructure,
    dialect: Dialect,
    condition: Option<&Condition>,
) -> Result<String> {
    let rendered = match condition {
        Some(condition) => condition.to_sql(structure, dialect)?,
        None => None,
    };
    Ok(rendered.map(|sql| format!(" WHERE {}", sql)).unwrap_or_default())
}

/// Condition matching one row by primary key.
pub fn primary_key_condition(structure: &TableStructure, key: impl Into<Value>) -> Result<Condition> {
    let name = structure.primary_key_name().ok_or_else(|| {
        OrmError::Configuration(format!("Table '{}' has no primary key", structure.table_name()))
    })?;
    let key = key.into();
    if key.is_null() {
        return Err(OrmError::ValueNotSet {
            table: structure.table_name().to_string(),
            column: name.to_string(),
        });
    }
    Ok(Condition::eq(name, key))
}
