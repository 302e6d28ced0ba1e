//! Table descriptions produced by database introspection.
//!
//! A [`TableDescription`] is the plain data a schema introspector returns.
//! [`TableStructure::from_description`] turns it into a usable structure,
//! mapping database types onto column types and parsing column defaults.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use super::{TableStructure, TableStructureBuilder};
use crate::adapter::{Adapter, DbRow};
use crate::column::{Column, ColumnType, DefaultValue, Sha256PasswordHasher, UniqueConstraint};
use crate::dialect::Dialect;
use crate::value::{DbExpr, Value};
use crate::{OrmError, Result};

/// Description of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub columns: Vec<ColumnDescription>,
}

/// Description of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescription {
    pub name: String,
    /// Database type name as reported by the server
    pub db_type: String,
    /// Explicit ORM type name, overrides `db_type` mapping
    #[serde(default)]
    pub orm_type: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    /// Raw default expression as reported by the server
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub is_pk: bool,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_fk: bool,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub precision: Option<u32>,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, db_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
            orm_type: None,
            nullable: false,
            default: None,
            is_pk: false,
            is_unique: false,
            is_fk: false,
            limit: None,
            precision: None,
        }
    }

    /// Resolved column type.
    pub fn column_type(&self) -> ColumnType {
        let resolved = self
            .orm_type
            .as_deref()
            .and_then(ColumnType::from_name)
            .or_else(|| ColumnType::from_name(&self.db_type));

        let column_type = match resolved {
            Some(t) => t,
            None => {
                warn!(
                    column = %self.name,
                    db_type = %self.db_type,
                    "Unknown database type, treating column as string"
                );
                ColumnType::String
            }
        };

        match column_type {
            ColumnType::Integer if self.is_pk => ColumnType::Id,
            ColumnType::Integer if self.is_fk => ColumnType::ForeignKey,
            // descriptions carry no allowed values or computers
            ColumnType::Enum | ColumnType::Virtual => ColumnType::String,
            other => other,
        }
    }

    fn has_timezone(&self) -> bool {
        let db_type = self.db_type.to_lowercase();
        db_type.contains("with time zone") || db_type == "timestamptz" || db_type == "timetz"
    }
}

static QUOTED_DEFAULT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^'((?:[^']|'')*)'(?:::[\w\s\[\]"]+)*$"#).expect("valid default regex")
});

static CAST_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"::[\w\s\[\]"]+$"#).expect("valid cast regex"));

/// Parses a server-reported default into a [`DefaultValue`].
///
/// Returns `None` for auto-increment sequences. Function calls and other
/// expressions become [`DefaultValue::Expression`].
pub fn parse_default(raw: &str, column: &Column) -> Option<DefaultValue> {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();

    if lower.starts_with("nextval(") || lower == "auto_increment" {
        return None;
    }
    if lower == "null" || lower.starts_with("null::") {
        return Some(DefaultValue::Literal(Value::Null));
    }
    if let Some(captures) = QUOTED_DEFAULT.captures(trimmed) {
        let text = captures.get(1).map_or("", |m| m.as_str()).replace("''", "'");
        return Some(literal_or_expression(Value::String(text), trimmed, column));
    }
    if lower == "true" || lower == "false" {
        return Some(DefaultValue::Literal(Value::Bool(lower == "true")));
    }

    let bare = CAST_SUFFIX.replace(trimmed, "");
    let bare = bare.trim_start_matches('(').trim_end_matches(')');
    if let Ok(i) = bare.parse::<i64>() {
        return Some(literal_or_expression(Value::Int(i), trimmed, column));
    }
    if let Ok(f) = bare.parse::<f64>() {
        return Some(literal_or_expression(Value::Float(f), trimmed, column));
    }

    let is_expression = trimmed.contains('(')
        || matches!(
            lower.as_str(),
            "current_timestamp" | "current_date" | "current_time" | "localtimestamp" | "localtime"
        );
    if is_expression {
        return Some(DefaultValue::Expression(DbExpr::new(trimmed)));
    }

    // MySQL reports string defaults unquoted
    Some(literal_or_expression(Value::String(trimmed.to_string()), trimmed, column))
}

fn literal_or_expression(value: Value, raw: &str, column: &Column) -> DefaultValue {
    let normalized = column.normalize(value.clone(), false);
    if column.validate(&normalized, false).is_empty() {
        DefaultValue::Literal(value)
    } else {
        DefaultValue::Expression(DbExpr::new(raw))
    }
}

impl TableStructure {
    /// Builds a structure from an introspected description.
    pub fn from_description(description: &TableDescription) -> Result<Self> {
        let mut builder = TableStructureBuilder::new(&description.name);
        if let Some(schema) = &description.schema {
            builder = builder.schema(schema);
        }

        for desc in &description.columns {
            builder.add_column(column_from_description(desc)?)?;
        }
        builder.build()
    }
}

fn column_from_description(desc: &ColumnDescription) -> Result<Column> {
    let column_type = desc.column_type();
    let mut column = Column::new(&desc.name, column_type);

    if desc.is_pk {
        column = column.primary_key()?;
    } else if desc.nullable {
        column = column.nullable()?;
    }
    if desc.is_unique && !desc.is_pk && column_type.supports_uniqueness() {
        column = column.unique(UniqueConstraint::new())?;
    }
    if column_type.supports_timezone() && desc.has_timezone() {
        column = column.with_timezone()?;
    }
    if column_type == ColumnType::Password {
        column = column.password_hasher(Sha256PasswordHasher)?;
    }
    if let Some(limit) = desc.limit {
        if column_type.is_text_like() {
            column = column.max_length(limit as usize);
        }
    }

    if let Some(raw) = &desc.default {
        if column_type.supports_default() {
            column = match parse_default(raw, &column) {
                Some(DefaultValue::Literal(v)) => column.default_value(v)?,
                Some(DefaultValue::Expression(e)) => column.default_expression(e)?,
                Some(DefaultValue::Generated(_)) | None => column,
            };
        }
    }
    Ok(column)
}

impl TableDescription {
    /// Introspects a table through `information_schema`.
    ///
    /// Without a schema, PostgreSQL uses `public` and MySQL the connected
    /// database.
    #[instrument(skip(adapter), fields(dialect = %adapter.dialect()))]
    pub async fn fetch(adapter: &dyn Adapter, table: &str, schema: Option<&str>) -> Result<Self> {
        let dialect = adapter.dialect();
        dialect.validate_identifier_part(table)?;
        if let Some(schema) = schema {
            dialect.validate_identifier_part(schema)?;
        }

        let sql = match dialect {
            Dialect::Postgres => postgres_describe_sql(table, schema.unwrap_or("public")),
            Dialect::MySql => mysql_describe_sql(table, schema),
        };
        let rows = adapter.query(&sql).await?;
        if rows.is_empty() {
            return Err(OrmError::Configuration(format!(
                "Table '{}' does not exist or has no columns",
                table
            )));
        }

        let columns = rows
            .iter()
            .map(|row| describe_row(row, dialect))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: table.to_string(),
            schema: schema.map(str::to_string),
            columns,
        })
    }
}

fn postgres_describe_sql(table: &str, schema: &str) -> String {
    let d = Dialect::Postgres;
    let constraint = |kind: &str| {
        format!(
            "EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage k \
             ON tc.constraint_name = k.constraint_name AND tc.table_schema = k.table_schema \
             WHERE tc.table_schema = c.table_schema AND tc.table_name = c.table_name \
             AND k.column_name = c.column_name AND tc.constraint_type = '{}')",
            kind
        )
    };
    format!(
        "SELECT c.column_name AS name, \
         CASE WHEN c.data_type = 'USER-DEFINED' THEN c.udt_name ELSE c.data_type END AS db_type, \
         c.is_nullable = 'YES' AS nullable, c.column_default AS default_value, \
         c.character_maximum_length::bigint AS max_length, c.numeric_precision::bigint AS num_precision, \
         {} AS is_pk, {} AS is_unique, {} AS is_fk \
         FROM information_schema.columns c \
         WHERE c.table_schema = {} AND c.table_name = {} \
         ORDER BY c.ordinal_position",
        constraint("PRIMARY KEY"),
        constraint("UNIQUE"),
        constraint("FOREIGN KEY"),
        d.quote_string(schema),
        d.quote_string(table),
    )
}

fn mysql_describe_sql(table: &str, schema: Option<&str>) -> String {
    let d = Dialect::MySql;
    let schema_sql = schema.map_or_else(|| "DATABASE()".to_string(), |s| d.quote_string(s));
    format!(
        "SELECT c.COLUMN_NAME AS name, c.COLUMN_TYPE AS db_type, \
         c.IS_NULLABLE = 'YES' AS nullable, c.COLUMN_DEFAULT AS default_value, \
         c.CHARACTER_MAXIMUM_LENGTH AS max_length, c.NUMERIC_PRECISION AS num_precision, \
         c.COLUMN_KEY = 'PRI' AS is_pk, c.COLUMN_KEY = 'UNI' AS is_unique, \
         EXISTS (SELECT 1 FROM information_schema.KEY_COLUMN_USAGE k \
         WHERE k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME \
         AND k.COLUMN_NAME = c.COLUMN_NAME AND k.REFERENCED_TABLE_NAME IS NOT NULL) AS is_fk \
         FROM information_schema.COLUMNS c \
         WHERE c.TABLE_SCHEMA = {} AND c.TABLE_NAME = {} \
         ORDER BY c.ORDINAL_POSITION",
        schema_sql,
        d.quote_string(table),
    )
}

fn describe_row(row: &DbRow, dialect: Dialect) -> Result<ColumnDescription> {
    let text = |key: &str| -> Option<String> {
        match row.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Bytes(b)) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    };
    let flag = |key: &str| -> bool {
        match row.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(i)) => *i != 0,
            _ => false,
        }
    };
    let number = |key: &str| -> Option<u32> {
        match row.get(key) {
            Some(Value::Int(i)) => u32::try_from(*i).ok(),
            _ => None,
        }
    };

    let name = text("name").ok_or_else(|| {
        OrmError::Serialization(format!("{} column description without a name", dialect))
    })?;
    let db_type = text("db_type").unwrap_or_default();

    Ok(ColumnDescription {
        name,
        db_type,
        orm_type: None,
        nullable: flag("nullable"),
        default: text("default_value"),
        is_pk: flag("is_pk"),
        is_unique: flag("is_unique"),
        is_fk: flag("is_fk"),
        limit: number("max_length"),
        precision: number("num_precision"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::RecordingAdapter;
    use indexmap::IndexMap;
    use serde_json::json;

    fn column(name: &str, column_type: ColumnType) -> Column {
        Column::new(name, column_type).nullable().unwrap()
    }

    #[test]
    fn test_parse_default_literals() {
        let text = column("status", ColumnType::String);
        match parse_default("'draft'::character varying", &text) {
            Some(DefaultValue::Literal(Value::String(s))) => assert_eq!(s, "draft"),
            other => panic!("unexpected {:?}", other),
        }
        match parse_default("'it''s'::text", &text) {
            Some(DefaultValue::Literal(Value::String(s))) => assert_eq!(s, "it's"),
            other => panic!("unexpected {:?}", other),
        }
        // MySQL reports string defaults without quotes
        match parse_default("draft", &text) {
            Some(DefaultValue::Literal(Value::String(s))) => assert_eq!(s, "draft"),
            other => panic!("unexpected {:?}", other),
        }

        let int = column("count", ColumnType::Integer);
        assert!(matches!(
            parse_default("0", &int),
            Some(DefaultValue::Literal(Value::Int(0)))
        ));
        assert!(matches!(
            parse_default("(-1)", &int),
            Some(DefaultValue::Literal(Value::Int(-1)))
        ));

        let flag = column("active", ColumnType::Boolean);
        assert!(matches!(
            parse_default("true", &flag),
            Some(DefaultValue::Literal(Value::Bool(true)))
        ));
        assert!(matches!(
            parse_default("NULL::character varying", &text),
            Some(DefaultValue::Literal(Value::Null))
        ));
    }

    #[test]
    fn test_parse_default_expressions() {
        let id = Column::id("id");
        assert!(parse_default("nextval('users_id_seq'::regclass)", &id).is_none());

        let ts = column("created_at", ColumnType::Timestamp);
        assert!(matches!(
            parse_default("now()", &ts),
            Some(DefaultValue::Expression(_))
        ));
        assert!(matches!(
            parse_default("CURRENT_TIMESTAMP", &ts),
            Some(DefaultValue::Expression(_))
        ));
    }

    #[test]
    fn test_from_description() {
        let description: TableDescription = serde_json::from_value(json!({
            "name": "users",
            "schema": "public",
            "columns": [
                {"name": "id", "dbType": "integer", "isPk": true,
                 "default": "nextval('users_id_seq'::regclass)"},
                {"name": "email", "dbType": "character varying", "ormType": "email",
                 "isUnique": true, "limit": 120},
                {"name": "team_id", "dbType": "bigint", "nullable": true, "isFk": true},
                {"name": "created_at", "dbType": "timestamp with time zone",
                 "default": "now()"},
                {"name": "status", "dbType": "varchar", "default": "'new'::character varying"},
                {"name": "shape", "dbType": "geometry", "nullable": true}
            ]
        }))
        .unwrap();

        let structure = TableStructure::from_description(&description).unwrap();
        assert_eq!(structure.qualified_name(), "public.users");

        let id = structure.column("id").unwrap();
        assert_eq!(id.column_type(), ColumnType::Id);
        assert!(id.is_primary_key());
        assert!(!id.has_default());

        let email = structure.column("email").unwrap();
        assert_eq!(email.column_type(), ColumnType::Email);
        assert!(email.is_unique());
        assert_eq!(
            email.validate(&Value::from(format!("{}@x.io", "a".repeat(130))), false),
            vec!["value_is_too_long"]
        );

        assert_eq!(structure.column("team_id").unwrap().column_type(), ColumnType::ForeignKey);
        assert!(structure.column("created_at").unwrap().has_timezone());
        assert_eq!(
            structure.column("status").unwrap().materialize_default(),
            Some(Value::from("new"))
        );
        assert_eq!(structure.column("shape").unwrap().column_type(), ColumnType::String);
    }

    #[tokio::test]
    async fn test_fetch_from_information_schema() {
        let adapter = RecordingAdapter::new(Dialect::Postgres);
        let mut row: DbRow = IndexMap::new();
        row.insert("name".to_string(), Value::from("id"));
        row.insert("db_type".to_string(), Value::from("integer"));
        row.insert("nullable".to_string(), Value::Bool(false));
        row.insert("default_value".to_string(), Value::Null);
        row.insert("max_length".to_string(), Value::Null);
        row.insert("num_precision".to_string(), Value::Int(32));
        row.insert("is_pk".to_string(), Value::Bool(true));
        row.insert("is_unique".to_string(), Value::Bool(false));
        row.insert("is_fk".to_string(), Value::Bool(false));
        adapter.push_rows(vec![row]);

        let description = TableDescription::fetch(&adapter, "users", None).await.unwrap();
        assert_eq!(description.columns.len(), 1);
        assert!(description.columns[0].is_pk);
        assert_eq!(description.columns[0].precision, Some(32));

        let statements = adapter.statements();
        assert!(statements[0].contains("information_schema.columns"));
        assert!(statements[0].contains("c.table_schema = 'public' AND c.table_name = 'users'"));
    }

    #[tokio::test]
    async fn test_fetch_missing_table() {
        let adapter = RecordingAdapter::new(Dialect::MySql);
        let result = TableDescription::fetch(&adapter, "ghost", None).await;
        assert!(matches!(result, Err(OrmError::Configuration(_))));
        assert!(adapter.statements()[0].contains("DATABASE()"));
    }
}
