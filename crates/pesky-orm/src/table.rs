//! Table façade: a structure bound to an adapter.

use std::sync::Arc;

use tracing::{debug, field, info, instrument, Span};

use crate::adapter::Adapter;
use crate::condition::Condition;
use crate::dialect::Dialect;
use crate::query::{build_delete, build_insert, build_update, primary_key_condition, RowValues, SelectQuery};
use crate::record::{key_text, Record};
use crate::structure::TableStructure;
use crate::value::Value;
use crate::{OrmError, Result, ValidationErrors};

/// Records fetched through a relation.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Related {
    pub fn len(&self) -> usize {
        match self {
            Related::One(record) => usize::from(record.is_some()),
            Related::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Entry point for reading and writing rows of one table.
#[derive(Clone)]
pub struct Table {
    structure: Arc<TableStructure>,
    adapter: Arc<dyn Adapter>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("table", &self.structure.qualified_name())
            .field("dialect", &self.adapter.dialect())
            .finish()
    }
}

impl Table {
    pub fn new(structure: Arc<TableStructure>, adapter: Arc<dyn Adapter>) -> Self {
        Self { structure, adapter }
    }

    pub fn structure(&self) -> &Arc<TableStructure> {
        &self.structure
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    pub fn new_record(&self) -> Record {
        Record::new(Arc::clone(&self.structure))
    }

    /// Saves a record through this table's adapter.
    pub async fn save(&self, record: &mut Record, columns: Option<&[&str]>) -> Result<bool> {
        record.save(self.adapter.as_ref(), columns).await
    }

    pub async fn delete(&self, record: &mut Record) -> Result<bool> {
        record.delete(self.adapter.as_ref()).await
    }

    /// Fetches a record by primary key.
    #[instrument(skip(self, key), fields(table = %self.structure.table_name()))]
    pub async fn find_by_pk(&self, key: impl Into<Value>) -> Result<Record> {
        let key = key.into();
        let condition = primary_key_condition(&self.structure, key.clone())?;
        self.find_one(SelectQuery::new().filter(condition))
            .await?
            .ok_or_else(|| OrmError::RecordNotFound {
                table: self.structure.table_name().to_string(),
                key: key_text(&key),
            })
    }

    /// First record matching the query, or `None`.
    pub async fn find_one(&self, query: SelectQuery) -> Result<Option<Record>> {
        Ok(self.select(query.limit(1)).await?.into_iter().next())
    }

    #[instrument(skip(self, query), fields(table = %self.structure.table_name()))]
    pub async fn select(&self, query: SelectQuery) -> Result<Vec<Record>> {
        let sql = query.to_sql(&self.structure, self.dialect())?;
        let rows = self.adapter.query(&sql).await?;
        debug!(rows = rows.len(), "Rows fetched");
        rows.into_iter()
            .map(|row| Record::from_row(Arc::clone(&self.structure), row))
            .collect()
    }

    /// Number of rows the query would return.
    #[instrument(skip(self, query), fields(table = %self.structure.table_name()))]
    pub async fn count(&self, query: &SelectQuery) -> Result<u64> {
        let sql = query.count_sql(&self.structure, self.dialect())?;
        let row = self.adapter.query_one(&sql).await?.ok_or_else(|| {
            OrmError::Database(format!("COUNT on '{}' returned no row", self.structure.table_name()))
        })?;
        row.get("count")
            .and_then(Value::as_i64)
            .and_then(|count| u64::try_from(count).ok())
            .ok_or_else(|| OrmError::Serialization("COUNT returned a non-integer value".to_string()))
    }

    /// Inserts several rows with one statement.
    ///
    /// Every row is normalized and validated first; errors are keyed as
    /// `<row index>.<column>`. Returns the number of inserted rows.
    #[instrument(skip(self, rows), fields(table = %self.structure.table_name(), row_count = field::Empty))]
    pub async fn insert_many<I, R, K, V>(&self, rows: I) -> Result<u64>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut prepared = Vec::new();
        let mut errors = ValidationErrors::new();
        for (index, data) in rows.into_iter().enumerate() {
            let record = Record::from_data(Arc::clone(&self.structure), data, false)?;
            let values = record.insert_values();
            for (column, messages) in record.validate_insert(&values).iter() {
                errors.extend_column(format!("{}.{}", index, column), messages.to_vec());
            }
            prepared.push(values);
        }
        Span::current().record("row_count", prepared.len());
        errors.into_result(())?;
        if prepared.is_empty() {
            return Ok(0);
        }

        let sql = build_insert(&self.structure, self.dialect(), &prepared, &[])?;
        info!("Inserting rows");
        let affected = self.adapter.execute(&sql).await?.rows_affected;
        info!(affected, "Insert complete");
        Ok(affected)
    }

    /// Updates every row matching `condition`. Values are normalized and
    /// validated like record assignments.
    #[instrument(skip(self, values, condition), fields(table = %self.structure.table_name()))]
    pub async fn update_where(&self, values: RowValues, condition: &Condition) -> Result<u64> {
        let mut normalized = RowValues::with_capacity(values.len());
        let mut errors = ValidationErrors::new();
        for (name, value) in values {
            let column = self.structure.column(&name)?;
            if !column.is_real() {
                return Err(OrmError::Configuration(format!(
                    "Virtual column '{}.{}' cannot be stored",
                    self.structure.table_name(),
                    name
                )));
            }
            let value = column.normalize(value, false);
            errors.extend_column(name.as_str(), column.validate(&value, false));
            normalized.insert(name, value);
        }
        errors.into_result(())?;

        let sql = build_update(&self.structure, self.dialect(), &normalized, condition)?;
        info!(columns = normalized.len(), "Updating rows");
        let affected = self.adapter.execute(&sql).await?.rows_affected;
        info!(affected, "Update complete");
        Ok(affected)
    }

    #[instrument(skip(self, condition), fields(table = %self.structure.table_name()))]
    pub async fn delete_where(&self, condition: &Condition) -> Result<u64> {
        let sql = build_delete(&self.structure, self.dialect(), condition)?;
        info!("Deleting rows");
        let affected = self.adapter.execute(&sql).await?.rows_affected;
        info!(affected, "Delete complete");
        Ok(affected)
    }

    /// Loads the records linked to `record` through a named relation.
    ///
    /// `related` must be the table the relation points at. A NULL local key
    /// yields no records without a query.
    #[instrument(skip(self, record, related), fields(table = %self.structure.table_name()))]
    pub async fn fetch_related(&self, record: &Record, relation: &str, related: &Table) -> Result<Related> {
        let relation = self.structure.relation(relation)?;
        if related.structure.table_name() != relation.foreign_table() {
            return Err(OrmError::Configuration(format!(
                "Relation '{}' points at '{}', not '{}'",
                relation.name(),
                relation.foreign_table(),
                related.structure.table_name()
            )));
        }

        let local = record.get_or_null(relation.local_column())?;
        if local.is_null() {
            return Ok(if relation.is_many() {
                Related::Many(Vec::new())
            } else {
                Related::One(None)
            });
        }

        let mut condition = Condition::eq(relation.foreign_column(), local);
        if let Some(extra) = relation.condition() {
            condition = condition.and_also(extra.clone());
        }
        let query = SelectQuery::new().filter(condition);

        if relation.is_many() {
            Ok(Related::Many(related.select(query).await?))
        } else {
            Ok(Related::One(related.find_one(query).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DbRow, ExecResult, RecordingAdapter};
    use crate::column::{error_keys, Column, ColumnType};
    use crate::structure::Relation;
    use pretty_assertions::assert_eq;

    fn authors() -> Arc<TableStructure> {
        Arc::new(
            TableStructure::builder("authors")
                .column(Column::id("id"))
                .unwrap()
                .column(Column::new("name", ColumnType::String))
                .unwrap()
                .relation(Relation::has_many("posts", "id", "posts", "author_id"))
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn posts() -> Arc<TableStructure> {
        Arc::new(
            TableStructure::builder("posts")
                .column(Column::id("id"))
                .unwrap()
                .column(Column::new("author_id", ColumnType::ForeignKey).nullable().unwrap())
                .unwrap()
                .column(Column::new("title", ColumnType::String))
                .unwrap()
                .relation(Relation::belongs_to("author", "author_id", "authors", "id"))
                .unwrap()
                .build()
                .unwrap(),
        )
    }

    fn row(pairs: &[(&str, Value)]) -> DbRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_find_by_pk() {
        let adapter = Arc::new(RecordingAdapter::new(Dialect::Postgres));
        adapter.push_rows(vec![row(&[("id", Value::Int(1)), ("name", Value::from("Ann"))])]);
        let table = Table::new(authors(), adapter.clone());

        let author = table.find_by_pk(1).await.unwrap();
        assert!(author.exists_in_db());
        assert_eq!(author.get("name").unwrap(), Value::from("Ann"));
        assert_eq!(
            adapter.last_statement().unwrap(),
            "SELECT \"id\", \"name\" FROM \"authors\" WHERE \"id\" = 1 LIMIT 1"
        );

        let err = table.find_by_pk(2).await.unwrap_err();
        assert!(matches!(err, OrmError::RecordNotFound { ref key, .. } if key == "2"));
    }

    #[tokio::test]
    async fn test_empty_select_is_not_an_error() {
        let adapter = Arc::new(RecordingAdapter::new(Dialect::MySql));
        let table = Table::new(authors(), adapter);
        let found = table
            .select(SelectQuery::new().filter(Condition::eq("name", "nobody")))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_count() {
        let adapter = Arc::new(RecordingAdapter::new(Dialect::Postgres));
        adapter.push_rows(vec![row(&[("count", Value::Int(12))])]);
        let table = Table::new(authors(), adapter.clone());
        assert_eq!(table.count(&SelectQuery::new()).await.unwrap(), 12);
        assert_eq!(
            adapter.last_statement().unwrap(),
            "SELECT COUNT(*) AS \"count\" FROM \"authors\""
        );
    }

    #[tokio::test]
    async fn test_insert_many_validates_every_row_first() {
        let adapter = Arc::new(RecordingAdapter::new(Dialect::MySql));
        let table = Table::new(posts(), adapter.clone());

        let err = table
            .insert_many(vec![
                vec![("title", Value::from("First"))],
                vec![("author_id", Value::Int(3))],
            ])
            .await
            .unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.columns().collect::<Vec<_>>(), vec!["1.title"]);
        assert_eq!(errors.for_column("1.title").unwrap(), &[error_keys::REQUIRED.to_string()]);
        assert!(adapter.statements().is_empty());

        adapter.push_exec(ExecResult::affected(2));
        let inserted = table
            .insert_many(vec![
                vec![("title", Value::from("First"))],
                vec![("title", Value::from("Second")), ("author_id", Value::Int(3))],
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(
            adapter.last_statement().unwrap(),
            "INSERT INTO `posts` (`author_id`, `title`) VALUES (DEFAULT, 'First'), (3, 'Second')"
        );
    }

    #[tokio::test]
    async fn test_insert_many_accepts_lazy_iterators() {
        let adapter = Arc::new(RecordingAdapter::new(Dialect::MySql));
        let table = Table::new(posts(), adapter.clone());

        adapter.push_exec(ExecResult::affected(3));
        let rows = (1..=3).map(|n| vec![("title", Value::from(format!("Post {}", n)))]);
        assert_eq!(table.insert_many(rows).await.unwrap(), 3);
        assert_eq!(
            adapter.last_statement().unwrap(),
            "INSERT INTO `posts` (`title`) VALUES ('Post 1'), ('Post 2'), ('Post 3')"
        );

        let none = std::iter::empty::<Vec<(&str, Value)>>();
        assert_eq!(table.insert_many(none).await.unwrap(), 0);
        assert_eq!(adapter.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_where() {
        let adapter = Arc::new(RecordingAdapter::new(Dialect::Postgres));
        adapter.push_exec(ExecResult::affected(4));
        let table = Table::new(posts(), adapter.clone());

        let mut values = RowValues::new();
        values.insert("title".to_string(), Value::from("  Draft "));
        let affected = table
            .update_where(values, &Condition::eq("author_id", 3))
            .await
            .unwrap();
        assert_eq!(affected, 4);
        assert_eq!(
            adapter.last_statement().unwrap(),
            "UPDATE \"posts\" SET \"title\" = 'Draft' WHERE \"author_id\" = 3"
        );

        table.delete_where(&Condition::is_null("author_id")).await.unwrap();
        assert_eq!(
            adapter.last_statement().unwrap(),
            "DELETE FROM \"posts\" WHERE \"author_id\" IS NULL"
        );

        let err = table.delete_where(&Condition::and(vec![])).await.unwrap_err();
        assert!(matches!(err, OrmError::InvalidCondition(_)));
    }

    #[tokio::test]
    async fn test_fetch_related() {
        let adapter = Arc::new(RecordingAdapter::new(Dialect::Postgres));
        let authors_table = Table::new(authors(), adapter.clone());
        let posts_table = Table::new(posts(), adapter.clone());

        adapter.push_rows(vec![
            row(&[("id", Value::Int(10)), ("author_id", Value::Int(1)), ("title", Value::from("A"))]),
            row(&[("id", Value::Int(11)), ("author_id", Value::Int(1)), ("title", Value::from("B"))]),
        ]);
        let author = Record::from_data(authors(), [("id", Value::Int(1))], true).unwrap();
        let related = authors_table
            .fetch_related(&author, "posts", &posts_table)
            .await
            .unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(
            adapter.last_statement().unwrap(),
            "SELECT \"id\", \"author_id\", \"title\" FROM \"posts\" WHERE \"author_id\" = 1"
        );

        // NULL foreign key: nothing to fetch
        let orphan = Record::from_data(posts(), [("id", Value::Int(5)), ("author_id", Value::Null)], true).unwrap();
        adapter.clear();
        let related = posts_table
            .fetch_related(&orphan, "author", &authors_table)
            .await
            .unwrap();
        assert!(matches!(related, Related::One(None)));
        assert!(adapter.statements().is_empty());

        let err = posts_table
            .fetch_related(&orphan, "author", &posts_table)
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Configuration(_)));
    }
}
