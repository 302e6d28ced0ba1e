//! Table structures.
//!
//! A [`TableStructure`] is the immutable schema of one table: its name,
//! ordered columns, primary key and relations. Structures are built once
//! (through [`TableStructureBuilder`] or a [`TableDefinition`]) and shared
//! behind `Arc` by every record of the table.

pub mod description;
pub mod registry;
pub mod relation;

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::column::{Column, ColumnType};
use crate::dialect::Dialect;
use crate::{OrmError, Result};

pub use description::{ColumnDescription, TableDescription};
pub use registry::StructureRegistry;
pub use relation::{Relation, RelationKind};

/// Declarative table definition.
///
/// Implementations register their columns and relations on a builder; the
/// registry turns them into a shared [`TableStructure`] exactly once.
pub trait TableDefinition: Send + Sync + 'static {
    fn table_name(&self) -> &str;

    fn schema_name(&self) -> Option<&str> {
        None
    }

    fn register_columns(&self, builder: &mut TableStructureBuilder) -> Result<()>;

    fn register_relations(&self, _builder: &mut TableStructureBuilder) -> Result<()> {
        Ok(())
    }
}

/// Immutable table schema.
#[derive(Debug, Clone)]
pub struct TableStructure {
    table_name: String,
    schema_name: Option<String>,
    columns: IndexMap<String, Arc<Column>>,
    primary_key: Option<String>,
    relations: IndexMap<String, Relation>,
    allow_any_column: bool,
}

impl TableStructure {
    pub fn builder(table_name: impl Into<String>) -> TableStructureBuilder {
        TableStructureBuilder::new(table_name)
    }

    /// Builds a structure from a definition.
    pub fn from_definition<D: TableDefinition + ?Sized>(definition: &D) -> Result<Self> {
        let mut builder = TableStructureBuilder::new(definition.table_name());
        if let Some(schema) = definition.schema_name() {
            builder.schema_name = Some(schema.to_string());
        }
        definition.register_columns(&mut builder)?;
        definition.register_relations(&mut builder)?;
        builder.build()
    }

    /// Structure that accepts any column name, used for ad-hoc tables.
    pub fn fake(table_name: impl Into<String>) -> Result<Self> {
        TableStructureBuilder::new(table_name).allow_any_column().build()
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    /// `schema.table` or just `table`.
    pub fn qualified_name(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{}.{}", schema, self.table_name),
            None => self.table_name.clone(),
        }
    }

    pub fn quoted_name(&self, dialect: Dialect) -> String {
        dialect.quote_identifier(&self.qualified_name())
    }

    pub fn allows_any_column(&self) -> bool {
        self.allow_any_column
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Declared column, if any.
    pub fn find_column(&self, name: &str) -> Option<&Arc<Column>> {
        self.columns.get(name)
    }

    /// Declared column, or a nullable string column for structures that
    /// allow any column.
    pub fn column(&self, name: &str) -> Result<Arc<Column>> {
        if let Some(column) = self.columns.get(name) {
            return Ok(Arc::clone(column));
        }
        if self.allow_any_column {
            Dialect::Postgres.validate_identifier_part(name)?;
            let column = Column::new(name, ColumnType::String)
                .trim_values(false)
                .convert_empty_string_to_null(false)
                .nullable()?;
            return Ok(Arc::new(column));
        }
        Err(OrmError::UnknownColumn {
            table: self.table_name.clone(),
            column: name.to_string(),
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.columns.values()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn real_columns(&self) -> impl Iterator<Item = &Arc<Column>> {
        self.columns.values().filter(|c| c.is_real())
    }

    /// Real, non-heavy columns in declaration order.
    pub fn default_select_columns(&self) -> Vec<String> {
        self.columns
            .values()
            .filter(|c| c.is_real() && !c.is_heavy())
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn primary_key(&self) -> Option<&Arc<Column>> {
        self.primary_key.as_ref().and_then(|name| self.columns.get(name))
    }

    pub fn primary_key_name(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.relations.get(name).ok_or_else(|| {
            OrmError::Configuration(format!(
                "Table '{}' has no relation named '{}'",
                self.table_name, name
            ))
        })
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }
}

/// Builder for [`TableStructure`].
#[derive(Debug)]
pub struct TableStructureBuilder {
    table_name: String,
    schema_name: Option<String>,
    columns: IndexMap<String, Arc<Column>>,
    primary_key: Option<String>,
    relations: IndexMap<String, Relation>,
    allow_any_column: bool,
}

impl TableStructureBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: None,
            columns: IndexMap::new(),
            primary_key: None,
            relations: IndexMap::new(),
            allow_any_column: false,
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    pub fn allow_any_column(mut self) -> Self {
        self.allow_any_column = true;
        self
    }

    pub fn column(mut self, column: Column) -> Result<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    pub fn relation(mut self, relation: Relation) -> Result<Self> {
        self.add_relation(relation)?;
        Ok(self)
    }

    /// Adds a column; duplicate names and a second primary key are rejected.
    pub fn add_column(&mut self, column: Column) -> Result<&mut Self> {
        column.check()?;
        if self.columns.contains_key(column.name()) {
            return Err(OrmError::Configuration(format!(
                "Column '{}' is declared twice in table '{}'",
                column.name(),
                self.table_name
            )));
        }
        if column.is_primary_key() {
            if let Some(existing) = &self.primary_key {
                return Err(OrmError::Configuration(format!(
                    "Table '{}' already has primary key '{}', cannot add '{}'",
                    self.table_name,
                    existing,
                    column.name()
                )));
            }
            self.primary_key = Some(column.name().to_string());
        }
        self.columns.insert(column.name().to_string(), Arc::new(column));
        Ok(self)
    }

    pub fn add_relation(&mut self, relation: Relation) -> Result<&mut Self> {
        if self.relations.contains_key(relation.name()) {
            return Err(OrmError::Configuration(format!(
                "Relation '{}' is declared twice in table '{}'",
                relation.name(),
                self.table_name
            )));
        }
        self.relations.insert(relation.name().to_string(), relation);
        Ok(self)
    }

    pub fn build(self) -> Result<TableStructure> {
        Dialect::Postgres.validate_identifier_part(&self.table_name)?;
        if let Some(schema) = &self.schema_name {
            Dialect::Postgres.validate_identifier_part(schema)?;
        }
        if self.columns.is_empty() && !self.allow_any_column {
            return Err(OrmError::Configuration(format!(
                "Table '{}' has no columns",
                self.table_name
            )));
        }

        for column in self.columns.values() {
            if let Some(unique) = column.unique_constraint() {
                for other in unique.columns() {
                    if !self.columns.contains_key(other) {
                        return Err(OrmError::Configuration(format!(
                            "Unique constraint of '{}' references unknown column '{}'",
                            column.name(),
                            other
                        )));
                    }
                }
            }
        }

        for relation in self.relations.values() {
            let local = self.columns.get(relation.local_column()).ok_or_else(|| {
                OrmError::Configuration(format!(
                    "Relation '{}' uses unknown local column '{}'",
                    relation.name(),
                    relation.local_column()
                ))
            })?;
            if !local.is_real() {
                return Err(OrmError::Configuration(format!(
                    "Relation '{}' cannot use virtual column '{}'",
                    relation.name(),
                    relation.local_column()
                )));
            }
            Dialect::Postgres.validate_identifier_part(relation.foreign_table())?;
            Dialect::Postgres.validate_identifier_part(relation.foreign_column())?;
        }

        debug!(
            table = %self.table_name,
            columns = self.columns.len(),
            relations = self.relations.len(),
            "Table structure built"
        );

        Ok(TableStructure {
            table_name: self.table_name,
            schema_name: self.schema_name,
            columns: self.columns,
            primary_key: self.primary_key,
            relations: self.relations,
            allow_any_column: self.allow_any_column,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::UniqueConstraint;

    fn users() -> TableStructure {
        TableStructure::builder("users")
            .column(Column::id("id"))
            .unwrap()
            .column(Column::new("name", ColumnType::String))
            .unwrap()
            .column(Column::new("bio", ColumnType::Text).heavy())
            .unwrap()
            .column(Column::new("label", ColumnType::Virtual))
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_columns_keep_declaration_order() {
        let structure = users();
        let names: Vec<&str> = structure.column_names().collect();
        assert_eq!(names, vec!["id", "name", "bio", "label"]);
        assert_eq!(structure.primary_key_name(), Some("id"));
        assert_eq!(structure.default_select_columns(), vec!["id", "name"]);
        assert_eq!(structure.real_columns().count(), 3);
    }

    #[test]
    fn test_unknown_column() {
        let structure = users();
        assert!(matches!(
            structure.column("missing"),
            Err(OrmError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_second_primary_key_rejected() {
        let result = TableStructure::builder("t")
            .column(Column::id("id"))
            .unwrap()
            .column(Column::new("other", ColumnType::Integer).primary_key().unwrap());
        assert!(matches!(result, Err(OrmError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = TableStructure::builder("t")
            .column(Column::id("id"))
            .unwrap()
            .column(Column::new("id", ColumnType::Integer));
        assert!(result.is_err());
    }

    #[test]
    fn test_fake_structure_accepts_any_column() {
        let structure = TableStructure::fake("anything").unwrap();
        let column = structure.column("whatever").unwrap();
        assert_eq!(column.column_type(), ColumnType::String);
        assert!(column.is_nullable());
        assert!(structure.column("bad name").is_err());
    }

    #[test]
    fn test_unique_with_unknown_column_rejected() {
        let result = TableStructure::builder("t")
            .column(Column::id("id"))
            .unwrap()
            .column(
                Column::new("email", ColumnType::Email)
                    .unique(UniqueConstraint::new().with_columns(["tenant"]))
                    .unwrap(),
            )
            .unwrap()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_relation_validation() {
        let result = TableStructure::builder("posts")
            .column(Column::id("id"))
            .unwrap()
            .relation(Relation::belongs_to("author", "author_id", "users", "id"))
            .unwrap()
            .build();
        assert!(matches!(result, Err(OrmError::Configuration(_))));

        let structure = TableStructure::builder("posts")
            .column(Column::id("id"))
            .unwrap()
            .column(Column::new("author_id", ColumnType::ForeignKey))
            .unwrap()
            .relation(Relation::belongs_to("author", "author_id", "users", "id"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(structure.relation("author").unwrap().kind(), RelationKind::BelongsTo);
        assert!(structure.relation("comments").is_err());
    }

    struct Tags;

    impl TableDefinition for Tags {
        fn table_name(&self) -> &str {
            "tags"
        }

        fn schema_name(&self) -> Option<&str> {
            Some("blog")
        }

        fn register_columns(&self, builder: &mut TableStructureBuilder) -> Result<()> {
            builder
                .add_column(Column::id("id"))?
                .add_column(Column::new("slug", ColumnType::String))?;
            Ok(())
        }
    }

    #[test]
    fn test_from_definition() {
        let structure = TableStructure::from_definition(&Tags).unwrap();
        assert_eq!(structure.qualified_name(), "blog.tags");
        assert_eq!(structure.quoted_name(Dialect::Postgres), "\"blog\".\"tags\"");
        assert!(structure.has_column("slug"));
    }
}
