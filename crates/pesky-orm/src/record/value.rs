//! Per-record, per-column value state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::column::{Column, ValueFormat};
use crate::value::Value;
use crate::{OrmError, Result};

#[derive(Debug, Clone, PartialEq)]
enum ValueState {
    Unset,
    Set { value: Value, from_db: bool },
}

/// Value container bound to one column of one record.
///
/// Tracks whether a value was assigned, whether it came from the database,
/// and caches formatted projections until the next assignment.
#[derive(Debug, Clone)]
pub struct RecordValue {
    column: Arc<Column>,
    table: Arc<str>,
    state: ValueState,
    formatted: HashMap<ValueFormat, Value>,
}

impl RecordValue {
    pub fn new(column: Arc<Column>, table: Arc<str>) -> Self {
        Self {
            column,
            table,
            state: ValueState::Unset,
            formatted: HashMap::new(),
        }
    }

    pub fn column(&self) -> &Arc<Column> {
        &self.column
    }

    /// Normalizes and stores a value, dropping cached projections.
    pub fn set_value(&mut self, raw: impl Into<Value>, is_from_db: bool) -> &mut Self {
        let value = self.column.normalize(raw.into(), is_from_db);
        self.state = ValueState::Set {
            value,
            from_db: is_from_db,
        };
        self.formatted.clear();
        self
    }

    /// Current value.
    ///
    /// An unset container falls back to the column default when
    /// `allow_default` is true; otherwise it fails with `ValueNotSet`.
    pub fn value(&self, allow_default: bool) -> Result<Value> {
        if let ValueState::Set { value, .. } = &self.state {
            return Ok(value.clone());
        }
        if allow_default {
            if let Some(default) = self.column.materialize_default() {
                return Ok(default);
            }
        }
        Err(self.not_set())
    }

    /// Like [`value`](Self::value), but an unset nullable column reads as
    /// NULL.
    pub fn value_or_null(&self, allow_default: bool) -> Result<Value> {
        match self.value(allow_default) {
            Err(OrmError::ValueNotSet { .. }) if self.column.is_nullable() => Ok(Value::Null),
            other => other,
        }
    }

    /// Raw stored value, without defaults.
    pub fn raw(&self) -> Option<&Value> {
        match &self.state {
            ValueState::Set { value, .. } => Some(value),
            ValueState::Unset => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self.state, ValueState::Set { .. })
    }

    /// Whether a value is present; `count_default` lets a column default
    /// stand in for an unset value.
    pub fn has_value(&self, count_default: bool) -> bool {
        self.is_set() || (count_default && self.column.has_default())
    }

    pub fn is_from_db(&self) -> bool {
        matches!(self.state, ValueState::Set { from_db: true, .. })
    }

    /// Assigned by the application and not yet persisted.
    pub fn is_dirty(&self) -> bool {
        matches!(self.state, ValueState::Set { from_db: false, .. })
    }

    /// Marks the stored value as persisted.
    pub fn mark_from_db(&mut self) {
        if let ValueState::Set { from_db, .. } = &mut self.state {
            *from_db = true;
        }
    }

    pub fn unset(&mut self) {
        self.state = ValueState::Unset;
        self.formatted.clear();
    }

    /// Projects the value through a format, caching the result for assigned
    /// values.
    pub fn formatted(&mut self, format: &ValueFormat, allow_default: bool) -> Result<Value> {
        if let Some(cached) = self.formatted.get(format) {
            return Ok(cached.clone());
        }
        let raw = self.value(allow_default)?;
        let projected = self.column.apply_format(&raw, format)?;
        if self.is_set() {
            self.formatted.insert(format.clone(), projected.clone());
        }
        Ok(projected)
    }

    /// Validates the stored value; an unset container has nothing to check.
    pub fn validate(&self) -> Vec<String> {
        match &self.state {
            ValueState::Set { value, from_db } => self.column.validate(value, *from_db),
            ValueState::Unset => Vec::new(),
        }
    }

    fn not_set(&self) -> OrmError {
        OrmError::ValueNotSet {
            table: self.table.to_string(),
            column: self.column.name().to_string(),
        }
    }
}
