//! Records: one row of a table.
//!
//! A [`Record`] owns one [`RecordValue`] per real column of its structure and
//! tracks which values came from the database. Persistence goes through an
//! [`Adapter`]; every value is validated before the first statement is sent.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pesky_orm::column::{Column, ColumnType};
//! use pesky_orm::record::Record;
//! use pesky_orm::structure::TableStructure;
//!
//! let users = Arc::new(
//!     TableStructure::builder("users")
//!         .column(Column::id("id")).unwrap()
//!         .column(Column::new("name", ColumnType::String)).unwrap()
//!         .build()
//!         .unwrap(),
//! );
//!
//! let mut user = Record::from_data(Arc::clone(&users), [("id", 1)], true).unwrap();
//! assert!(user.exists_in_db());
//! user.set("name", " Alice ").unwrap();
//! assert_eq!(user.dirty_columns(), vec!["name".to_string()]);
//! assert_eq!(user.get("name").unwrap().as_str(), Some("Alice"));
//! ```

pub mod value;

pub use value::RecordValue;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, instrument};

use crate::adapter::{Adapter, DbRow};
use crate::column::{error_keys, Column, ColumnType, ValueFormat};
use crate::condition::Condition;
use crate::dialect::Dialect;
use crate::query::{build_delete, build_insert, build_update, primary_key_condition, RowValues, SelectQuery};
use crate::structure::TableStructure;
use crate::value::Value;
use crate::{OrmError, Result, ValidationErrors};

/// One row of a table.
///
/// Records are plain owned state: clone one to keep a snapshot, share the
/// structure through its `Arc`.
#[derive(Debug, Clone)]
pub struct Record {
    structure: Arc<TableStructure>,
    table: Arc<str>,
    values: IndexMap<String, RecordValue>,
}

impl Record {
    /// Empty record with one unset container per real column.
    pub fn new(structure: Arc<TableStructure>) -> Self {
        let table: Arc<str> = Arc::from(structure.table_name());
        let values = structure
            .real_columns()
            .map(|column| {
                (
                    column.name().to_string(),
                    RecordValue::new(Arc::clone(column), Arc::clone(&table)),
                )
            })
            .collect();
        Self {
            structure,
            table,
            values,
        }
    }

    /// Record filled from a column map.
    ///
    /// Pass `is_from_db = true` for values read from the database.
    pub fn from_data<I, K, V>(structure: Arc<TableStructure>, data: I, is_from_db: bool) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut record = Self::new(structure);
        record.fill(data, is_from_db)?;
        Ok(record)
    }

    /// Record built from a fetched row.
    pub fn from_row(structure: Arc<TableStructure>, row: DbRow) -> Result<Self> {
        Self::from_data(structure, row, true)
    }

    /// Assigns several values at once.
    ///
    /// Every key is resolved before anything is assigned, so an unknown
    /// column leaves the record untouched. Values for virtual columns are
    /// ignored since they are always computed.
    pub fn fill<I, K, V>(&mut self, data: I, is_from_db: bool) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut resolved = Vec::new();
        for (name, value) in data {
            let column = self.structure.column(name.as_ref())?;
            if column.is_real() {
                resolved.push((column, value.into()));
            }
        }
        for (column, value) in resolved {
            self.assign(&column, value, is_from_db)?;
        }
        Ok(self)
    }

    pub fn structure(&self) -> &Arc<TableStructure> {
        &self.structure
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Whether the primary key value was read from (or written to) the
    /// database.
    pub fn exists_in_db(&self) -> bool {
        self.structure
            .primary_key_name()
            .and_then(|pk| self.values.get(pk))
            .map_or(false, RecordValue::is_from_db)
    }

    /// Stored primary key value, if any.
    pub fn primary_key_value(&self) -> Option<Value> {
        self.structure
            .primary_key_name()
            .and_then(|pk| self.values.get(pk))
            .and_then(|container| container.raw().cloned())
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Reads a column.
    ///
    /// Unset columns of a new record fall back to their defaults; records
    /// that exist in the database never report defaults. Virtual columns are
    /// computed on every read.
    pub fn get(&self, name: &str) -> Result<Value> {
        let column = self.structure.column(name)?;
        if !column.is_real() {
            return self.compute(&column);
        }
        match self.values.get(name) {
            Some(container) => container.value(!self.exists_in_db()),
            None => Err(value_not_set(&self.table, name)),
        }
    }

    /// Like [`get`](Self::get), but an unset nullable column reads as NULL.
    pub fn get_or_null(&self, name: &str) -> Result<Value> {
        let column = self.structure.column(name)?;
        if !column.is_real() {
            return self.compute(&column);
        }
        match self.values.get(name) {
            Some(container) => container.value_or_null(!self.exists_in_db()),
            None if column.is_nullable() => Ok(Value::Null),
            None => Err(value_not_set(&self.table, name)),
        }
    }

    /// Reads a column projected through a named format (`date`,
    /// `unix_ts`, a custom formatter, ...).
    pub fn get_formatted(&mut self, name: &str, format: &str) -> Result<Value> {
        let column = self.structure.column(name)?;
        let format = ValueFormat::from_name(format);
        if !column.is_real() {
            let value = self.compute(&column)?;
            return column.apply_format(&value, &format);
        }
        let allow_default = !self.exists_in_db();
        match self.values.get_mut(name) {
            Some(container) => container.formatted(&format, allow_default),
            None => Err(value_not_set(&self.table, name)),
        }
    }

    /// Assigns an application value, normalized through its column.
    ///
    /// The primary key of a stored record is fixed: assigning the same value
    /// again is a no-op, any other value fails.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let column = self.structure.column(name)?;
        if !column.is_real() {
            return Err(OrmError::Configuration(format!(
                "Virtual column '{}.{}' is computed and cannot be set",
                self.table, name
            )));
        }
        self.assign(&column, value.into(), false)?;
        Ok(self)
    }

    /// Whether the column has a value (or a usable default on a new record).
    pub fn has(&self, name: &str) -> bool {
        match self.structure.find_column(name) {
            Some(column) if !column.is_real() => column.is_computed(),
            _ => self
                .values
                .get(name)
                .map_or(false, |container| container.has_value(!self.exists_in_db())),
        }
    }

    pub fn unset(&mut self, name: &str) -> Result<&mut Self> {
        let column = self.structure.column(name)?;
        if column.is_primary_key() && self.exists_in_db() {
            return Err(OrmError::Configuration(format!(
                "Primary key '{}.{}' of a stored record cannot be unset",
                self.table, name
            )));
        }
        if let Some(container) = self.values.get_mut(name) {
            container.unset();
        }
        Ok(self)
    }

    /// Clears every value; the record no longer exists in the database.
    pub fn reset(&mut self) -> &mut Self {
        for container in self.values.values_mut() {
            container.unset();
        }
        self
    }

    /// Columns assigned by the application since the last save or load, in
    /// structure order.
    pub fn dirty_columns(&self) -> Vec<String> {
        self.values
            .iter()
            .filter(|(_, container)| container.is_dirty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.values.values().any(RecordValue::is_dirty)
    }

    /// Validates what [`save`](Self::save) would write.
    pub fn validate(&self) -> Result<()> {
        let errors = if self.exists_in_db() {
            self.validate_columns(&self.dirty_columns())
        } else {
            self.validate_insert(&self.insert_values())
        };
        errors.into_result(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Inserts a new record or updates a stored one.
    ///
    /// A new record is inserted with every set value plus materialized
    /// defaults. A stored record updates its dirty columns, or exactly
    /// `columns` when given; nothing to update is a successful no-op.
    /// Validation failures abort before any statement is sent.
    #[instrument(skip(self, adapter, columns), fields(table = %self.table))]
    pub async fn save(&mut self, adapter: &dyn Adapter, columns: Option<&[&str]>) -> Result<bool> {
        if self.exists_in_db() {
            self.update(adapter, columns).await
        } else {
            self.insert(adapter).await
        }
    }

    async fn insert(&mut self, adapter: &dyn Adapter) -> Result<bool> {
        let dialect = adapter.dialect();
        let row = self.insert_values();
        self.validate_insert(&row).into_result(())?;

        let returning: Vec<String> = match dialect {
            Dialect::Postgres => self
                .structure
                .real_columns()
                .filter(|column| !column.is_heavy() || row.contains_key(column.name()))
                .map(|column| column.name().to_string())
                .collect(),
            Dialect::MySql => Vec::new(),
        };
        let sql = build_insert(&self.structure, dialect, std::slice::from_ref(&row), &returning)?;

        info!(columns = row.len(), "Inserting record");
        if returning.is_empty() {
            let result = adapter.execute(&sql).await?;
            self.apply_saved(&row);
            if let (Some(id), Some(pk)) = (result.last_insert_id, self.structure.primary_key().cloned()) {
                let container = self.container_mut(&pk);
                if !container.is_set() {
                    container.set_value(id, true);
                }
            }
        } else {
            let returned = adapter.query_one(&sql).await?.ok_or_else(|| {
                OrmError::Database(format!("INSERT into '{}' returned no row", self.table))
            })?;
            self.apply_saved(&row);
            self.fill(returned, true)?;
        }
        info!(exists = self.exists_in_db(), "Insert complete");
        Ok(true)
    }

    async fn update(&mut self, adapter: &dyn Adapter, columns: Option<&[&str]>) -> Result<bool> {
        let names = match columns {
            Some(requested) => requested
                .iter()
                .map(|name| {
                    let column = self.structure.column(name)?;
                    if !column.is_real() {
                        return Err(OrmError::Configuration(format!(
                            "Virtual column '{}.{}' cannot be saved",
                            self.table, name
                        )));
                    }
                    Ok(name.to_string())
                })
                .collect::<Result<Vec<_>>>()?,
            None => self.dirty_columns(),
        };

        let mut values = RowValues::new();
        for name in &names {
            let container = self
                .values
                .get(name)
                .ok_or_else(|| value_not_set(&self.table, name))?;
            values.insert(name.clone(), container.value(false)?);
        }
        self.validate_columns(&names).into_result(())?;

        if values.is_empty() {
            debug!("Nothing to update");
            return Ok(true);
        }

        let condition = self.key_condition()?;
        let sql = build_update(&self.structure, adapter.dialect(), &values, &condition)?;

        info!(columns = values.len(), "Updating record");
        let affected = adapter.execute(&sql).await?.rows_affected;
        if affected == 0 {
            return Err(self.not_found());
        }
        self.apply_saved(&values);
        info!(affected, "Update complete");
        Ok(true)
    }

    /// Deletes the stored record by primary key.
    ///
    /// On success every value is cleared. Returns false when no row matched.
    #[instrument(skip(self, adapter), fields(table = %self.table))]
    pub async fn delete(&mut self, adapter: &dyn Adapter) -> Result<bool> {
        let condition = self.key_condition()?;
        let sql = build_delete(&self.structure, adapter.dialect(), &condition)?;

        info!("Deleting record");
        let affected = adapter.execute(&sql).await?.rows_affected;
        info!(affected, "Delete complete");
        if affected > 0 {
            self.reset();
        }
        Ok(affected > 0)
    }

    /// Fetches the named columns of a stored record, typically heavy ones
    /// skipped by the default select.
    #[instrument(skip(self, adapter), fields(table = %self.table))]
    pub async fn load_columns(&mut self, adapter: &dyn Adapter, columns: &[&str]) -> Result<()> {
        let condition = self.key_condition()?;
        let sql = SelectQuery::new()
            .columns(columns.iter().copied())
            .filter(condition)
            .limit(1)
            .to_sql(&self.structure, adapter.dialect())?;

        let row = adapter.query_one(&sql).await?.ok_or_else(|| self.not_found())?;
        self.fill(row, true)?;
        debug!(columns = columns.len(), "Columns loaded");
        Ok(())
    }

    /// Re-reads the record, dropping unsaved changes. Heavy columns that
    /// were loaded are read again too.
    #[instrument(skip(self, adapter), fields(table = %self.table))]
    pub async fn reload(&mut self, adapter: &dyn Adapter) -> Result<()> {
        let condition = self.key_condition()?;
        let mut columns = self.structure.default_select_columns();
        for (name, container) in &self.values {
            if container.column().is_heavy() && container.is_set() && !columns.contains(name) {
                columns.push(name.clone());
            }
        }
        let mut query = SelectQuery::new().filter(condition).limit(1);
        if !columns.is_empty() {
            query = query.columns(columns);
        }
        let sql = query.to_sql(&self.structure, adapter.dialect())?;

        let row = adapter.query_one(&sql).await?.ok_or_else(|| self.not_found())?;
        self.reset();
        self.fill(row, true)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Column values in structure order.
    ///
    /// Private columns are skipped unless requested, heavy columns only
    /// appear once loaded, and virtual columns are computed.
    pub fn to_map(&self, include_private: bool) -> Result<IndexMap<String, Value>> {
        let allow_default = !self.exists_in_db();
        let mut map = IndexMap::new();

        for column in self.structure.columns() {
            if column.is_private() && !include_private {
                continue;
            }
            let name = column.name();
            if !column.is_real() {
                if let Some(computed) = column.compute(self) {
                    map.insert(name.to_string(), computed?);
                }
                continue;
            }
            let Some(container) = self.values.get(name) else {
                continue;
            };
            if column.is_heavy() && !container.is_set() {
                continue;
            }
            if let Ok(value) = container.value_or_null(allow_default) {
                map.insert(name.to_string(), value);
            }
        }

        // ad-hoc columns of structures that allow any column
        for (name, container) in &self.values {
            if self.structure.has_column(name) {
                continue;
            }
            if let Some(value) = container.raw() {
                map.insert(name.clone(), value.clone());
            }
        }
        Ok(map)
    }

    pub fn to_json(&self, include_private: bool) -> Result<JsonValue> {
        let object: Map<String, JsonValue> = self
            .to_map(include_private)?
            .into_iter()
            .map(|(name, value)| (name, value.to_json()))
            .collect();
        Ok(JsonValue::Object(object))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn assign(&mut self, column: &Arc<Column>, value: Value, is_from_db: bool) -> Result<()> {
        if !is_from_db && column.is_primary_key() && self.exists_in_db() {
            let normalized = column.normalize(value.clone(), false);
            if self.values.get(column.name()).and_then(RecordValue::raw) == Some(&normalized) {
                return Ok(());
            }
            return Err(OrmError::Configuration(format!(
                "Primary key '{}.{}' of a stored record cannot be changed",
                self.table,
                column.name()
            )));
        }
        self.container_mut(column).set_value(value, is_from_db);
        Ok(())
    }

    fn container_mut(&mut self, column: &Arc<Column>) -> &mut RecordValue {
        let table = Arc::clone(&self.table);
        self.values
            .entry(column.name().to_string())
            .or_insert_with(|| RecordValue::new(Arc::clone(column), table))
    }

    fn compute(&self, column: &Column) -> Result<Value> {
        column
            .compute(self)
            .unwrap_or_else(|| Err(value_not_set(&self.table, column.name())))
    }

    /// Set values plus defaults for unset columns, in structure order.
    pub(crate) fn insert_values(&self) -> RowValues {
        let mut row = RowValues::new();
        for (name, container) in &self.values {
            let value = match container.raw() {
                Some(value) => Some(value.clone()),
                None => container.column().materialize_default(),
            };
            if let Some(value) = value {
                row.insert(name.clone(), value);
            }
        }
        row
    }

    pub(crate) fn validate_insert(&self, row: &RowValues) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for (name, container) in &self.values {
            let column = container.column();
            match row.get(name) {
                Some(value) => errors.extend_column(name, column.validate(value, container.is_from_db())),
                None if is_required(column) => errors.add(name, error_keys::REQUIRED),
                None => {}
            }
        }
        errors
    }

    fn validate_columns(&self, names: &[String]) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for name in names {
            if let Some(container) = self.values.get(name) {
                errors.extend_column(name, container.validate());
            }
        }
        errors
    }

    /// Marks written values as stored. Expressions were evaluated by the
    /// database, so their containers are cleared instead.
    fn apply_saved(&mut self, written: &RowValues) {
        for (name, value) in written {
            let Some(container) = self.values.get_mut(name) else {
                continue;
            };
            if value.is_expr() {
                container.unset();
            } else if container.is_set() {
                container.mark_from_db();
            } else {
                container.set_value(value.clone(), true);
            }
        }
    }

    fn key_condition(&self) -> Result<Condition> {
        if !self.exists_in_db() {
            return Err(match self.structure.primary_key_name() {
                Some(pk) => value_not_set(&self.table, pk),
                None => OrmError::Configuration(format!("Table '{}' has no primary key", self.table)),
            });
        }
        primary_key_condition(&self.structure, self.primary_key_value().unwrap_or(Value::Null))
    }

    fn not_found(&self) -> OrmError {
        OrmError::RecordNotFound {
            table: self.table.to_string(),
            key: self.primary_key_value().map(|key| key_text(&key)).unwrap_or_default(),
        }
    }
}

/// Unset, non-nullable columns without a default must be assigned before
/// insert. Auto-generated ids are filled by the database.
fn is_required(column: &Column) -> bool {
    !column.is_nullable()
        && !column.has_default()
        && !(column.is_primary_key() && column.column_type() == ColumnType::Id)
}

fn value_not_set(table: &str, column: &str) -> OrmError {
    OrmError::ValueNotSet {
        table: table.to_string(),
        column: column.to_string(),
    }
}

pub(crate) fn key_text(key: &Value) -> String {
    match key.as_str() {
        Some(s) => s.to_string(),
        None => key.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ExecResult, RecordingAdapter};
    use crate::value::DbExpr;
    use pretty_assertions::assert_eq;

    fn users() -> Arc<TableStructure> {
        Arc::new(
            TableStructure::builder("users")
                .column(Column::id("id"))
                .unwrap()
                .column(Column::new("name", ColumnType::String))
                .unwrap()
                .column(Column::new("email", ColumnType::Email).nullable().unwrap())
                .unwrap()
                .column(Column::new("age", ColumnType::Integer).nullable().unwrap())
                .unwrap()
                .column(Column::new("status", ColumnType::String).default_value("new").unwrap())
                .unwrap()
                .column(Column::new("bio", ColumnType::Text).nullable().unwrap().heavy())
                .unwrap()
                .column(Column::new("token", ColumnType::String).nullable().unwrap().private())
                .unwrap()
                .column(
                    Column::new("label", ColumnType::Virtual)
                        .computed(|record| {
                            let name = record.get("name")?;
                            Ok(Value::String(format!("#{}", name.as_str().unwrap_or_default())))
                        })
                        .unwrap(),
                )
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn stored(structure: &Arc<TableStructure>) -> Record {
        Record::from_data(
            Arc::clone(structure),
            [
                ("id", Value::Int(7)),
                ("name", Value::from("Alice")),
                ("email", Value::Null),
                ("age", Value::Int(30)),
                ("status", Value::from("active")),
            ],
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_new_record_reads_defaults() {
        let record = Record::new(users());
        assert!(!record.exists_in_db());
        assert_eq!(record.get("status").unwrap(), Value::from("new"));
        assert!(record.has("status"));
        assert!(!record.has("name"));
        assert!(matches!(record.get("name"), Err(OrmError::ValueNotSet { .. })));
        assert_eq!(record.get_or_null("age").unwrap(), Value::Null);
        // reading a default does not store it
        assert!(record.dirty_columns().is_empty());
    }

    #[test]
    fn test_stored_record_never_reports_defaults() {
        let structure = users();
        let record = Record::from_data(Arc::clone(&structure), [("id", 1)], true).unwrap();
        assert!(record.exists_in_db());
        assert!(matches!(record.get("status"), Err(OrmError::ValueNotSet { .. })));
        assert!(!record.has("status"));
    }

    #[test]
    fn test_from_data_rejects_unknown_columns() {
        let structure = users();
        let err = Record::from_data(Arc::clone(&structure), [("nope", 1)], false).unwrap_err();
        assert!(matches!(err, OrmError::UnknownColumn { ref column, .. } if column == "nope"));

        let mut record = stored(&structure);
        assert!(record.fill([("age", Value::Int(1)), ("nope", Value::Int(2))], false).is_err());
        // nothing was assigned
        assert_eq!(record.get("age").unwrap(), Value::Int(30));
    }

    #[test]
    fn test_fake_structure_accepts_any_column() {
        let structure = Arc::new(TableStructure::fake("events").unwrap());
        let mut record = Record::from_data(Arc::clone(&structure), [("kind", "click")], false).unwrap();
        record.set("source", "web").unwrap();
        assert_eq!(record.get("kind").unwrap(), Value::from("click"));
        assert_eq!(record.dirty_columns(), vec!["kind", "source"]);
        let map = record.to_map(false).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["kind", "source"]);
    }

    #[test]
    fn test_dirty_tracking() {
        let structure = users();
        let mut record = stored(&structure);
        assert!(!record.is_dirty());

        record.set("name", "Bob").unwrap();
        record.set("age", "31").unwrap();
        assert_eq!(record.dirty_columns(), vec!["name", "age"]);
        assert_eq!(record.get("age").unwrap(), Value::Int(31));
    }

    #[test]
    fn test_primary_key_is_fixed_once_stored() {
        let structure = users();
        let mut record = stored(&structure);
        record.set("id", 7).unwrap();
        assert!(!record.is_dirty());
        assert!(matches!(record.set("id", 8), Err(OrmError::Configuration(_))));
        assert!(matches!(record.unset("id"), Err(OrmError::Configuration(_))));

        let mut fresh = Record::new(Arc::clone(&structure));
        fresh.set("id", 8).unwrap();
        assert_eq!(fresh.primary_key_value(), Some(Value::Int(8)));
        assert!(!fresh.exists_in_db());
    }

    #[test]
    fn test_virtual_columns() {
        let structure = users();
        let mut record = stored(&structure);
        assert_eq!(record.get("label").unwrap(), Value::from("#Alice"));
        assert!(record.has("label"));
        assert!(matches!(record.set("label", "x"), Err(OrmError::Configuration(_))));

        // virtual values in input maps are skipped
        record.fill([("label", "ignored")], false).unwrap();
        assert!(!record.is_dirty());
    }

    #[test]
    fn test_get_formatted() {
        let structure = Arc::new(
            TableStructure::builder("posts")
                .column(Column::id("id"))
                .unwrap()
                .column(Column::new("created_at", ColumnType::Timestamp))
                .unwrap()
                .build()
                .unwrap(),
        );
        let mut record =
            Record::from_data(structure, [("id", Value::Int(1)), ("created_at", Value::from("2024-01-02 00:00:10"))], true)
                .unwrap();
        assert_eq!(record.get_formatted("created_at", "unix_ts").unwrap(), Value::Int(1_704_153_610));
        assert_eq!(
            record.get_formatted("created_at", "date").unwrap(),
            Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
    }

    #[test]
    fn test_to_map_skips_private_and_unloaded_heavy() {
        let structure = users();
        let mut record = stored(&structure);
        record.fill([("token", "secret")], true).unwrap();

        let map = record.to_map(false).unwrap();
        assert_eq!(
            map.keys().collect::<Vec<_>>(),
            vec!["id", "name", "email", "age", "status", "label"]
        );
        assert!(record.to_map(true).unwrap().contains_key("token"));

        record.fill([("bio", "long text")], true).unwrap();
        assert!(record.to_map(false).unwrap().contains_key("bio"));

        let json = record.to_json(false).unwrap();
        assert_eq!(json["name"], "Alice");
        assert_eq!(json["email"], JsonValue::Null);
    }

    #[test]
    fn test_validate_reports_every_failure() {
        let structure = users();
        let mut record = Record::new(Arc::clone(&structure));
        record.set("email", "not-an-email").unwrap();
        record.set("age", "abc").unwrap();

        let err = record.validate().unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.columns().collect::<Vec<_>>(), vec!["name", "email", "age"]);
        assert_eq!(errors.for_column("name").unwrap(), &[error_keys::REQUIRED.to_string()]);
        assert_eq!(errors.for_column("email").unwrap(), &[error_keys::EMAIL.to_string()]);
    }

    #[tokio::test]
    async fn test_insert_with_returning() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::Postgres);
        let mut returned = DbRow::new();
        returned.insert("id".to_string(), Value::Int(11));
        returned.insert("name".to_string(), Value::from("Alice"));
        returned.insert("email".to_string(), Value::Null);
        returned.insert("age".to_string(), Value::Null);
        returned.insert("status".to_string(), Value::from("new"));
        returned.insert("token".to_string(), Value::Null);
        adapter.push_rows(vec![returned]);

        let mut record = Record::new(Arc::clone(&structure));
        record.set("name", "Alice").unwrap();
        assert!(record.save(&adapter, None).await.unwrap());

        assert_eq!(
            adapter.statements(),
            vec![
                "INSERT INTO \"users\" (\"name\", \"status\") VALUES ('Alice', 'new') \
                 RETURNING \"id\", \"name\", \"email\", \"age\", \"status\", \"token\""
            ]
        );
        assert!(record.exists_in_db());
        assert!(!record.is_dirty());
        assert_eq!(record.primary_key_value(), Some(Value::Int(11)));
        assert_eq!(record.get("status").unwrap(), Value::from("new"));
    }

    #[tokio::test]
    async fn test_insert_uses_generated_id_on_mysql() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::MySql);
        adapter.push_exec(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(42),
        });

        let mut record = Record::new(Arc::clone(&structure));
        record.set("name", "O'Brien").unwrap();
        record.save(&adapter, None).await.unwrap();

        assert_eq!(
            adapter.last_statement().unwrap(),
            "INSERT INTO `users` (`name`, `status`) VALUES ('O''Brien', 'new')"
        );
        assert!(record.exists_in_db());
        assert_eq!(record.get("id").unwrap(), Value::Int(42));
        assert_eq!(record.get("status").unwrap(), Value::from("new"));
    }

    #[tokio::test]
    async fn test_expression_defaults_are_cleared_after_insert() {
        let structure = Arc::new(
            TableStructure::builder("logs")
                .column(Column::id("id"))
                .unwrap()
                .column(
                    Column::new("created_at", ColumnType::Timestamp)
                        .default_expression(DbExpr::new("NOW()"))
                        .unwrap(),
                )
                .unwrap()
                .build()
                .unwrap(),
        );
        let adapter = RecordingAdapter::new(Dialect::MySql);
        adapter.push_exec(ExecResult {
            rows_affected: 1,
            last_insert_id: Some(3),
        });

        let mut record = Record::new(structure);
        record.save(&adapter, None).await.unwrap();
        assert_eq!(
            adapter.last_statement().unwrap(),
            "INSERT INTO `logs` (`created_at`) VALUES (NOW())"
        );
        assert!(record.exists_in_db());
        assert!(matches!(record.get("created_at"), Err(OrmError::ValueNotSet { .. })));
    }

    #[tokio::test]
    async fn test_update_writes_dirty_columns_only() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::Postgres);
        let mut record = stored(&structure);

        // nothing dirty: no statement
        assert!(record.save(&adapter, None).await.unwrap());
        assert!(adapter.statements().is_empty());

        record.set("name", "Bob").unwrap();
        assert!(record.save(&adapter, None).await.unwrap());
        assert_eq!(
            adapter.statements(),
            vec!["UPDATE \"users\" SET \"name\" = 'Bob' WHERE \"id\" = 7"]
        );
        assert!(!record.is_dirty());

        record.save(&adapter, Some(&["age"][..])).await.unwrap();
        assert_eq!(
            adapter.last_statement().unwrap(),
            "UPDATE \"users\" SET \"age\" = 30 WHERE \"id\" = 7"
        );
    }

    #[tokio::test]
    async fn test_update_of_missing_row() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::Postgres);
        adapter.push_exec(ExecResult::affected(0));

        let mut record = stored(&structure);
        record.set("age", 40).unwrap();
        let err = record.save(&adapter, None).await.unwrap_err();
        assert!(matches!(err, OrmError::RecordNotFound { ref key, .. } if key == "7"));
        assert!(record.is_dirty());
    }

    #[tokio::test]
    async fn test_invalid_update_sends_nothing() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::Postgres);
        let mut record = stored(&structure);
        record.set("email", "broken").unwrap();
        record.set("name", Value::Null).unwrap();

        let err = record.save(&adapter, None).await.unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.columns().collect::<Vec<_>>(), vec!["name", "email"]);
        assert!(adapter.statements().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::MySql);

        let mut fresh = Record::new(Arc::clone(&structure));
        assert!(matches!(fresh.delete(&adapter).await, Err(OrmError::ValueNotSet { .. })));

        let mut record = stored(&structure);
        assert!(record.delete(&adapter).await.unwrap());
        assert_eq!(adapter.last_statement().unwrap(), "DELETE FROM `users` WHERE `id` = 7");
        assert!(!record.exists_in_db());
        assert!(record.primary_key_value().is_none());

        adapter.push_exec(ExecResult::affected(0));
        let mut gone = stored(&structure);
        assert!(!gone.delete(&adapter).await.unwrap());
        assert!(gone.exists_in_db());
    }

    #[tokio::test]
    async fn test_load_heavy_columns() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::Postgres);
        let mut row = DbRow::new();
        row.insert("bio".to_string(), Value::from("Long story"));
        adapter.push_rows(vec![row]);

        let mut record = stored(&structure);
        assert!(!record.to_map(false).unwrap().contains_key("bio"));
        record.load_columns(&adapter, &["bio"]).await.unwrap();
        assert_eq!(
            adapter.last_statement().unwrap(),
            "SELECT \"bio\" FROM \"users\" WHERE \"id\" = 7 LIMIT 1"
        );
        assert_eq!(record.get("bio").unwrap(), Value::from("Long story"));
        assert!(!record.is_dirty());

        let err = record.load_columns(&adapter, &["bio"]).await.unwrap_err();
        assert!(matches!(err, OrmError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_reload_drops_changes() {
        let structure = users();
        let adapter = RecordingAdapter::new(Dialect::Postgres);
        let mut row = DbRow::new();
        row.insert("id".to_string(), Value::Int(7));
        row.insert("name".to_string(), Value::from("Alice"));
        row.insert("age".to_string(), Value::Int(30));
        adapter.push_rows(vec![row]);

        let mut record = stored(&structure);
        record.set("name", "Changed").unwrap();
        record.reload(&adapter).await.unwrap();

        assert_eq!(
            adapter.last_statement().unwrap(),
            "SELECT \"id\", \"name\", \"email\", \"age\", \"status\", \"token\" FROM \"users\" WHERE \"id\" = 7 LIMIT 1"
        );
        assert_eq!(record.get("name").unwrap(), Value::from("Alice"));
        assert!(!record.is_dirty());
        assert!(record.exists_in_db());
    }
}
