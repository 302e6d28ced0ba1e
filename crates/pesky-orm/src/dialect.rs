//! SQL dialect differences between PostgreSQL and MySQL.
//!
//! Everything that turns a [`Value`] or a name into SQL text lives here so the
//! condition and statement builders stay dialect agnostic.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::value::{hex_encode, DbExpr, Value};
use crate::{OrmError, Result};

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[serde(alias = "postgresql", alias = "pgsql")]
    Postgres,
    #[serde(alias = "mariadb")]
    MySql,
}

/// Predicate that is always true, used for empty `NOT IN` lists.
pub const ALWAYS_TRUE: &str = "1 = 1";
/// Predicate that is always false, used for empty `IN` lists.
pub const ALWAYS_FALSE: &str = "1 = 0";

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::MySql => write!(f, "mysql"),
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pgsql" => Ok(Dialect::Postgres),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            other => Err(OrmError::Configuration(format!("Unknown database driver '{}'", other))),
        }
    }
}

impl Dialect {
    /// Maximum identifier length in bytes.
    pub fn max_identifier_len(self) -> usize {
        match self {
            Dialect::Postgres => 63,
            Dialect::MySql => 64,
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::Postgres => '"',
            Dialect::MySql => '`',
        }
    }

    /// Quotes a SQL identifier.
    ///
    /// Handles qualified names (`schema.table`, `table.column`) by quoting
    /// each part separately.
    pub fn quote_identifier(self, name: &str) -> String {
        let q = self.quote_char();
        let doubled = format!("{q}{q}");
        name.split('.')
            .map(|part| format!("{q}{}{q}", part.replace(q, &doubled)))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Validates a table or column name.
    ///
    /// Accepts `name` or `qualifier.name`.
    pub fn validate_identifier(self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(OrmError::Configuration("Identifier cannot be empty".to_string()));
        }

        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 {
            return Err(OrmError::Configuration(format!(
                "Invalid qualified identifier '{}': must be in format 'qualifier.name'",
                name
            )));
        }
        for part in parts {
            self.validate_identifier_part(part)?;
        }
        Ok(())
    }

    /// Validates a single identifier part (no dots allowed).
    pub fn validate_identifier_part(self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(OrmError::Configuration("Identifier part cannot be empty".to_string()));
        }

        // NFKC folds unicode confusables before the ASCII checks below
        let name = name.nfkc().collect::<String>();

        if name.len() > self.max_identifier_len() {
            return Err(OrmError::Configuration(format!(
                "Identifier '{}' exceeds maximum length of {}",
                name,
                self.max_identifier_len()
            )));
        }

        let first_char = name.chars().next().ok_or_else(|| {
            OrmError::Configuration(format!("Identifier '{}' is empty or invalid", name))
        })?;
        if !first_char.is_ascii_alphabetic() && first_char != '_' {
            return Err(OrmError::Configuration(format!(
                "Identifier '{}' must start with a letter or underscore",
                name
            )));
        }

        if let Some(ch) = name.chars().find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_') {
            return Err(OrmError::Configuration(format!(
                "Identifier '{}' contains invalid character '{}'",
                name, ch
            )));
        }

        Ok(())
    }

    /// Quotes a string literal.
    ///
    /// PostgreSQL runs with `standard_conforming_strings`, so only quotes are
    /// doubled. MySQL additionally treats backslash as an escape character.
    pub fn quote_string(self, value: &str) -> String {
        match self {
            Dialect::Postgres => format!("'{}'", value.replace('\'', "''")),
            Dialect::MySql => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push('\'');
                for ch in value.chars() {
                    match ch {
                        '\'' => out.push_str("''"),
                        '\\' => out.push_str("\\\\"),
                        '\0' => out.push_str("\\0"),
                        '\n' => out.push_str("\\n"),
                        '\r' => out.push_str("\\r"),
                        '\x1a' => out.push_str("\\Z"),
                        other => out.push(other),
                    }
                }
                out.push('\'');
                out
            }
        }
    }

    pub fn bool_literal(self, value: bool) -> &'static str {
        match (self, value) {
            (Dialect::Postgres, true) => "TRUE",
            (Dialect::Postgres, false) => "FALSE",
            (Dialect::MySql, true) => "1",
            (Dialect::MySql, false) => "0",
        }
    }

    /// Renders a JSON document literal.
    pub fn json_literal(self, json: &serde_json::Value) -> String {
        let text = json.to_string();
        match self {
            Dialect::Postgres => format!("{}::jsonb", self.quote_string(&text)),
            Dialect::MySql => self.quote_string(&text),
        }
    }

    /// Renders a value as a SQL literal without any column context.
    pub fn quote_value(self, value: &Value) -> Result<String> {
        Ok(match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(v) => self.bool_literal(*v).to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => {
                if !v.is_finite() {
                    return Err(OrmError::Serialization(format!(
                        "Non-finite float {} cannot be rendered as SQL",
                        v
                    )));
                }
                format!("{:?}", v)
            }
            Value::Decimal(v) => v.to_string(),
            Value::String(v) => self.quote_string(v),
            Value::Bytes(v) => match self {
                Dialect::Postgres => format!("'\\x{}'::bytea", hex_encode(v)),
                Dialect::MySql => format!("X'{}'", hex_encode(v)),
            },
            Value::Uuid(v) => self.quote_string(&v.to_string()),
            Value::Date(v) => self.quote_string(&v.format("%Y-%m-%d").to_string()),
            Value::Time(v) => self.quote_string(&v.format("%H:%M:%S%.f").to_string()),
            Value::Timestamp(v) => self.quote_string(&v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::TimestampTz(v) => match self {
                Dialect::Postgres => {
                    self.quote_string(&v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string())
                }
                // DATETIME has no zone; sessions run in UTC
                Dialect::MySql => self.quote_string(
                    &v.with_timezone(&Utc).format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                ),
            },
            Value::Json(v) => self.json_literal(v),
            Value::Array(items) => match self {
                Dialect::Postgres => {
                    if items.is_empty() {
                        "'{}'".to_string()
                    } else {
                        let rendered = items
                            .iter()
                            .map(|item| self.quote_value(item))
                            .collect::<Result<Vec<_>>>()?;
                        format!("ARRAY[{}]", rendered.join(", "))
                    }
                }
                Dialect::MySql => self.quote_string(&value.to_json().to_string()),
            },
            Value::Expr(expr) => self.render_expr(expr)?,
        })
    }

    /// Renders a raw expression, substituting its positional bindings.
    pub fn render_expr(self, expr: &DbExpr) -> Result<String> {
        let mut out = String::with_capacity(expr.sql().len());
        let mut bindings = expr.bindings().iter();
        let mut chars = expr.sql().chars().peekable();
        let mut in_string = false;

        while let Some(ch) = chars.next() {
            match ch {
                '\'' => {
                    in_string = !in_string;
                    out.push(ch);
                }
                '?' if !in_string => {
                    if chars.peek() == Some(&'?') {
                        chars.next();
                        out.push('?');
                        continue;
                    }
                    let value = bindings.next().ok_or_else(|| {
                        OrmError::InvalidCondition(format!(
                            "Expression '{}' has more placeholders than bindings",
                            expr.sql()
                        ))
                    })?;
                    out.push_str(&self.quote_value(value)?);
                }
                _ => out.push(ch),
            }
        }

        if bindings.next().is_some() {
            return Err(OrmError::InvalidCondition(format!(
                "Expression '{}' has more bindings than placeholders",
                expr.sql()
            )));
        }
        Ok(out)
    }

    /// Applies a cast to an already rendered expression.
    pub fn cast(self, expr: &str, type_name: &str) -> Result<String> {
        if type_name.is_empty()
            || !type_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ','))
        {
            return Err(OrmError::InvalidCondition(format!("Invalid cast type '{}'", type_name)));
        }
        Ok(match self {
            Dialect::Postgres => format!("{}::{}", expr, type_name),
            Dialect::MySql => {
                let lower = type_name.to_lowercase();
                let mysql_type = match lower.as_str() {
                    "int" | "integer" | "bigint" | "smallint" | "int4" | "int8" => "SIGNED",
                    "text" | "varchar" | "string" => "CHAR",
                    "timestamp" | "timestamptz" | "datetime" => "DATETIME",
                    "numeric" | "decimal" => "DECIMAL",
                    "float" | "double precision" | "real" => "DOUBLE",
                    "jsonb" => "JSON",
                    _ => type_name,
                };
                format!("CAST({} AS {})", expr, mysql_type.to_uppercase())
            }
        })
    }

    /// Renders a JSON path access on a quoted column.
    ///
    /// `as_text` selects the final text extraction (`->>` in PostgreSQL).
    pub fn json_path(self, column: &str, keys: &[String], as_text: bool) -> String {
        match self {
            Dialect::Postgres => {
                let mut out = column.to_string();
                for (i, key) in keys.iter().enumerate() {
                    let arrow = if as_text && i + 1 == keys.len() { "->>" } else { "->" };
                    if key.parse::<i64>().is_ok() {
                        out.push_str(&format!("{}{}", arrow, key));
                    } else {
                        out.push_str(&format!("{}{}", arrow, self.quote_string(key)));
                    }
                }
                out
            }
            Dialect::MySql => {
                let mut path = String::from("$");
                for key in keys {
                    if key.parse::<u64>().is_ok() {
                        path.push_str(&format!("[{}]", key));
                    } else {
                        path.push_str(&format!(".\"{}\"", key.replace('"', "\\\"")));
                    }
                }
                let extract = format!("JSON_EXTRACT({}, {})", column, self.quote_string(&path));
                if as_text {
                    format!("JSON_UNQUOTE({})", extract)
                } else {
                    extract
                }
            }
        }
    }

    /// Renders a case-insensitive LIKE.
    pub fn ilike(self, column: &str, pattern: &str, negated: bool) -> String {
        let not = if negated { "NOT " } else { "" };
        match self {
            Dialect::Postgres => format!("{} {}ILIKE {}", column, not, pattern),
            Dialect::MySql => format!("LOWER({}) {}LIKE LOWER({})", column, not, pattern),
        }
    }

    /// Renders a regular expression match.
    pub fn regex(self, column: &str, pattern: &str, case_insensitive: bool, negated: bool) -> String {
        match self {
            Dialect::Postgres => {
                let op = match (negated, case_insensitive) {
                    (false, false) => "~",
                    (false, true) => "~*",
                    (true, false) => "!~",
                    (true, true) => "!~*",
                };
                format!("{} {} {}", column, op, pattern)
            }
            Dialect::MySql => {
                let flags = if case_insensitive { "'i'" } else { "'c'" };
                let not = if negated { "NOT " } else { "" };
                format!("{}REGEXP_LIKE({}, {}, {})", not, column, pattern, flags)
            }
        }
    }

    /// Statement suffix that returns the given columns of affected rows.
    ///
    /// MySQL has no `RETURNING`, callers fall back to `last_insert_id`.
    pub fn returning_clause(self, columns: &[String]) -> Option<String> {
        match self {
            Dialect::Postgres => Some(format!(
                " RETURNING {}",
                columns
                    .iter()
                    .map(|c| self.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Dialect::MySql => None,
        }
    }
}
