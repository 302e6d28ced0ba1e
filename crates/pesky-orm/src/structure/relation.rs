//! Relations between tables.

use crate::condition::Condition;

/// Relation cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Local key referenced by exactly one foreign row
    HasOne,
    /// Local key referenced by many foreign rows
    HasMany,
    /// Local foreign key pointing at one foreign row
    BelongsTo,
}

/// Named link from a local column to a column of another table.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    name: String,
    kind: RelationKind,
    local_column: String,
    foreign_table: String,
    foreign_column: String,
    condition: Option<Condition>,
}

impl Relation {
    pub fn new(
        name: impl Into<String>,
        kind: RelationKind,
        local_column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            local_column: local_column.into(),
            foreign_table: foreign_table.into(),
            foreign_column: foreign_column.into(),
            condition: None,
        }
    }

    pub fn has_one(
        name: impl Into<String>,
        local_column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasOne, local_column, foreign_table, foreign_column)
    }

    pub fn has_many(
        name: impl Into<String>,
        local_column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::HasMany, local_column, foreign_table, foreign_column)
    }

    pub fn belongs_to(
        name: impl Into<String>,
        local_column: impl Into<String>,
        foreign_table: impl Into<String>,
        foreign_column: impl Into<String>,
    ) -> Self {
        Self::new(name, RelationKind::BelongsTo, local_column, foreign_table, foreign_column)
    }

    /// Extra condition applied to the foreign rows.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn local_column(&self) -> &str {
        &self.local_column
    }

    pub fn foreign_table(&self) -> &str {
        &self.foreign_table
    }

    pub fn foreign_column(&self) -> &str {
        &self.foreign_column
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn is_many(&self) -> bool {
        self.kind == RelationKind::HasMany
    }
}
