//! Column references used in conditions and ORDER BY.
//!
//! Syntax: `name`, `qualifier.name`, optionally followed by a JSON path
//! (`data->a->>b`) and a cast (`created_at::date`).

use crate::dialect::Dialect;
use crate::{OrmError, Result};

/// Parsed column reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
    pub json_path: Vec<String>,
    /// Last path step extracts text (`->>`)
    pub json_as_text: bool,
    pub cast: Option<String>,
}

impl ColumnRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            OrmError::InvalidCondition(format!("Invalid column reference '{}': {}", raw, reason))
        };

        let raw_trimmed = raw.trim();
        let (body, cast) = match raw_trimmed.split_once("::") {
            Some((body, cast)) => {
                let cast = cast.trim();
                if cast.is_empty() {
                    return Err(invalid("empty cast"));
                }
                (body.trim(), Some(cast.to_string()))
            }
            None => (raw_trimmed, None),
        };

        let (column_part, path_part) = match body.find("->") {
            Some(idx) => (&body[..idx], Some(&body[idx..])),
            None => (body, None),
        };

        let mut json_path = Vec::new();
        let mut json_as_text = false;
        if let Some(mut rest) = path_part {
            while !rest.is_empty() {
                if json_as_text {
                    return Err(invalid("'->>' must be the last path step"));
                }
                let after = if let Some(stripped) = rest.strip_prefix("->>") {
                    json_as_text = true;
                    stripped
                } else if let Some(stripped) = rest.strip_prefix("->") {
                    stripped
                } else {
                    return Err(invalid("malformed JSON path"));
                };
                let end = after.find("->").unwrap_or(after.len());
                let key = unquote(after[..end].trim());
                if key.is_empty() {
                    return Err(invalid("empty JSON path key"));
                }
                json_path.push(key.to_string());
                rest = &after[end..];
            }
        }

        let column_part = column_part.trim();
        let (qualifier, name) = match column_part.rsplit_once('.') {
            Some((qualifier, name)) => (Some(qualifier.to_string()), name.to_string()),
            None => (None, column_part.to_string()),
        };
        if let Some(qualifier) = &qualifier {
            Dialect::Postgres
                .validate_identifier(qualifier)
                .map_err(|e| invalid(&e.to_string()))?;
        }
        Dialect::Postgres
            .validate_identifier_part(&name)
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            qualifier,
            name,
            json_path,
            json_as_text,
            cast,
        })
    }

    pub fn has_json_path(&self) -> bool {
        !self.json_path.is_empty()
    }

    /// Whether the reference is a bare column (no path, no cast).
    pub fn is_plain(&self) -> bool {
        self.json_path.is_empty() && self.cast.is_none()
    }

    pub fn render(&self, dialect: Dialect) -> Result<String> {
        let qualified = match &self.qualifier {
            Some(qualifier) => format!("{}.{}", qualifier, self.name),
            None => self.name.clone(),
        };
        let mut sql = dialect.quote_identifier(&qualified);
        if self.has_json_path() {
            sql = dialect.json_path(&sql, &self.json_path, self.json_as_text);
        }
        if let Some(cast) = &self.cast {
            // `::` binds tighter than the JSON operators
            if self.has_json_path() && dialect == Dialect::Postgres {
                sql = format!("({})", sql);
            }
            sql = dialect.cast(&sql, cast)?;
        }
        Ok(sql)
    }
}

fn unquote(key: &str) -> &str {
    for quote in ['\'', '"'] {
        if key.len() >= 2 && key.starts_with(quote) && key.ends_with(quote) {
            return &key[1..key.len() - 1];
        }
    }
    key
}
