//! Condition rendering.

use crate::column::{Column, ColumnType};
use crate::dialect::{Dialect, ALWAYS_FALSE, ALWAYS_TRUE};
use crate::structure::TableStructure;
use crate::value::Value;
use crate::{OrmError, Result};

use super::{BoolOp, ColumnRef, Condition, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Root,
    Compound(BoolOp),
}

/// Renders conditions for one table and dialect.
#[derive(Debug, Clone, Copy)]
pub struct ConditionRenderer<'a> {
    structure: &'a TableStructure,
    dialect: Dialect,
}

impl<'a> ConditionRenderer<'a> {
    pub fn new(structure: &'a TableStructure, dialect: Dialect) -> Self {
        Self { structure, dialect }
    }

    /// Renders a condition tree; `None` when nothing remains after skipping
    /// empty compounds.
    pub fn render(&self, condition: &Condition) -> Result<Option<String>> {
        self.render_node(condition, Parent::Root)
    }

    fn render_node(&self, condition: &Condition, parent: Parent) -> Result<Option<String>> {
        match condition {
            Condition::Column {
                column,
                operator,
                value,
            } => self.render_column(column, operator, value).map(Some),
            Condition::Raw(expr) => {
                let sql = self.dialect.render_expr(expr)?;
                if sql.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(match parent {
                    Parent::Root => sql,
                    Parent::Compound(_) => format!("({})", sql),
                }))
            }
            Condition::Compound { op, children } => {
                let mut parts = Vec::with_capacity(children.len());
                let mut survivor = None;
                for child in children {
                    if let Some(sql) = self.render_node(child, Parent::Compound(*op))? {
                        parts.push(sql);
                        survivor = Some(child);
                    }
                }
                match (parts.len(), survivor) {
                    (0, _) => Ok(None),
                    // a lone child takes this compound's place under `parent`
                    (1, Some(child)) => self.render_node(child, parent),
                    _ => {
                        let joined = parts.join(op.as_sql());
                        Ok(Some(match parent {
                            Parent::Compound(parent_op) if parent_op != *op => format!("({})", joined),
                            _ => joined,
                        }))
                    }
                }
            }
            Condition::Not(inner) => Ok(self
                .render_node(inner, Parent::Root)?
                .map(|sql| format!("NOT ({})", sql))),
        }
    }

    fn render_column(&self, column: &str, operator: &str, value: &Value) -> Result<String> {
        let operator: Operator = operator.parse()?;
        let column_ref = ColumnRef::parse(column)?;
        let target = self.lookup(&column_ref)?;
        // path and cast expressions no longer carry the column type
        let typed = if column_ref.is_plain() { target.as_deref() } else { None };
        let lhs = column_ref.render(self.dialect)?;
        let (operator, value) = coerce_operator(operator, value.clone());

        let d = self.dialect;
        Ok(match operator {
            Operator::IsNull => format!("{} IS NULL", lhs),
            Operator::IsNotNull => format!("{} IS NOT NULL", lhs),
            Operator::Is | Operator::IsNot => {
                let Value::Bool(flag) = value else {
                    return Err(invalid(column, operator, "expects NULL or a boolean"));
                };
                let keyword = if flag { "TRUE" } else { "FALSE" };
                format!("{} {} {}", lhs, operator.as_str(), keyword)
            }
            op if op.is_scalar_comparison() => {
                if value.is_null() {
                    return Err(invalid(column, op, "cannot compare with NULL"));
                }
                if matches!(value, Value::Array(_)) {
                    return Err(invalid(column, op, "expects a single value"));
                }
                format!("{} {} {}", lhs, op.as_str(), self.literal(typed, column, value)?)
            }
            Operator::In | Operator::NotIn => {
                let Value::Array(items) = value else {
                    return Err(invalid(column, operator, "expects a list of values"));
                };
                if items.is_empty() {
                    return Ok(if operator == Operator::In { ALWAYS_FALSE } else { ALWAYS_TRUE }.to_string());
                }
                let negated = operator == Operator::NotIn;
                let (nulls, items): (Vec<Value>, Vec<Value>) = items.into_iter().partition(Value::is_null);
                let null_check = if negated { "IS NOT NULL" } else { "IS NULL" };
                if items.is_empty() {
                    return Ok(format!("{} {}", lhs, null_check));
                }
                let rendered = items
                    .into_iter()
                    .map(|item| self.literal(typed, column, item))
                    .collect::<Result<Vec<_>>>()?;
                let list = format!("{} {} ({})", lhs, operator.as_str(), rendered.join(", "));
                // NULL never matches inside a list
                if nulls.is_empty() {
                    list
                } else {
                    let join = if negated { "AND" } else { "OR" };
                    format!("({} {} {} {})", list, join, lhs, null_check)
                }
            }
            Operator::Between | Operator::NotBetween => {
                let bounds = match value {
                    Value::Array(items) if items.len() == 2 => items,
                    _ => return Err(invalid(column, operator, "expects exactly two values")),
                };
                if bounds.iter().any(Value::is_null) {
                    return Err(invalid(column, operator, "bounds cannot be NULL"));
                }
                let mut bounds = bounds.into_iter();
                let (Some(low), Some(high)) = (bounds.next(), bounds.next()) else {
                    return Err(invalid(column, operator, "expects exactly two values"));
                };
                format!(
                    "{} {} {} AND {}",
                    lhs,
                    operator.as_str(),
                    self.literal(typed, column, low)?,
                    self.literal(typed, column, high)?
                )
            }
            Operator::Like | Operator::NotLike => {
                let pattern = pattern_literal(d, column, operator, &value)?;
                format!("{} {} {}", lhs, operator.as_str(), pattern)
            }
            Operator::ILike | Operator::NotILike => {
                let pattern = pattern_literal(d, column, operator, &value)?;
                d.ilike(&lhs, &pattern, operator == Operator::NotILike)
            }
            Operator::Regex | Operator::NotRegex | Operator::IRegex | Operator::NotIRegex => {
                let pattern = pattern_literal(d, column, operator, &value)?;
                let case_insensitive = matches!(operator, Operator::IRegex | Operator::NotIRegex);
                let negated = matches!(operator, Operator::NotRegex | Operator::NotIRegex);
                d.regex(&lhs, &pattern, case_insensitive, negated)
            }
            Operator::JsonContains | Operator::JsonContainedBy => {
                let document = json_document(&value);
                match (d, operator) {
                    (Dialect::Postgres, _) => {
                        format!("{} {} {}", lhs, operator.as_str(), d.json_literal(&document))
                    }
                    (Dialect::MySql, Operator::JsonContains) => {
                        format!("JSON_CONTAINS({}, {})", lhs, d.quote_string(&document.to_string()))
                    }
                    (Dialect::MySql, _) => {
                        format!("JSON_CONTAINS({}, {})", d.quote_string(&document.to_string()), lhs)
                    }
                }
            }
            Operator::JsonHasKey => {
                let Value::String(key) = value else {
                    return Err(invalid(column, operator, "expects a string key"));
                };
                match d {
                    Dialect::Postgres => format!("{} ? {}", lhs, d.quote_string(&key)),
                    Dialect::MySql => format!(
                        "JSON_CONTAINS_PATH({}, 'one', {})",
                        lhs,
                        d.quote_string(&json_key_path(&key))
                    ),
                }
            }
            Operator::JsonHasAnyKeys | Operator::JsonHasAllKeys => {
                let keys = string_list(&value)
                    .ok_or_else(|| invalid(column, operator, "expects a list of string keys"))?;
                let any = operator == Operator::JsonHasAnyKeys;
                if keys.is_empty() {
                    return Ok(if any { ALWAYS_FALSE } else { ALWAYS_TRUE }.to_string());
                }
                match d {
                    Dialect::Postgres => format!(
                        "{} {} ARRAY[{}]",
                        lhs,
                        operator.as_str(),
                        keys.iter().map(|k| d.quote_string(k)).collect::<Vec<_>>().join(", ")
                    ),
                    Dialect::MySql => format!(
                        "JSON_CONTAINS_PATH({}, '{}', {})",
                        lhs,
                        if any { "one" } else { "all" },
                        keys.iter()
                            .map(|k| d.quote_string(&json_key_path(k)))
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }
            }
            // scalar comparisons are handled by the guard above
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                return Err(invalid(column, operator, "unsupported comparison"))
            }
        })
    }

    /// Resolves the referenced column. References qualified with another
    /// table are not checked.
    fn lookup(&self, column_ref: &ColumnRef) -> Result<Option<std::sync::Arc<Column>>> {
        if let Some(qualifier) = &column_ref.qualifier {
            if qualifier != self.structure.table_name() && *qualifier != self.structure.qualified_name() {
                return Ok(None);
            }
        }
        match self.structure.find_column(&column_ref.name) {
            Some(column) if !column.is_real() => Err(OrmError::InvalidCondition(format!(
                "Virtual column '{}' cannot be used in conditions",
                column.name()
            ))),
            Some(column) => Ok(Some(std::sync::Arc::clone(column))),
            None if self.structure.allows_any_column() => Ok(None),
            None => Err(OrmError::UnknownColumn {
                table: self.structure.table_name().to_string(),
                column: column_ref.name.clone(),
            }),
        }
    }

    /// Quotes a comparison value, coercing it through the column when known.
    fn literal(&self, column: Option<&Column>, reference: &str, value: Value) -> Result<String> {
        let Some(column) = column else {
            return self.dialect.quote_value(&value);
        };
        let coerced = column.coerce(value);
        if !is_comparable(column.column_type(), &coerced) {
            return Err(OrmError::InvalidCondition(format!(
                "Value of type {} cannot be compared with {} column '{}'",
                coerced.type_name(),
                column.column_type(),
                reference
            )));
        }
        column.format_for_sql(&coerced, self.dialect)
    }
}

/// Rewrites operators whose meaning depends on the value shape.
fn coerce_operator(operator: Operator, value: Value) -> (Operator, Value) {
    let value = match (operator, value) {
        (Operator::In | Operator::NotIn, Value::Json(serde_json::Value::Array(items))) => {
            Value::Array(items.into_iter().map(Value::from_json).collect())
        }
        (_, value) => value,
    };

    let is_null = value.is_null();
    let is_list = matches!(value, Value::Array(_));
    let operator = match operator {
        Operator::Eq | Operator::Is | Operator::In if is_null => Operator::IsNull,
        Operator::Ne | Operator::IsNot | Operator::NotIn if is_null => Operator::IsNotNull,
        Operator::Eq if is_list => Operator::In,
        Operator::Ne if is_list => Operator::NotIn,
        Operator::In if !is_list => Operator::Eq,
        Operator::NotIn if !is_list => Operator::Ne,
        other => other,
    };
    (operator, value)
}

fn is_comparable(column_type: ColumnType, value: &Value) -> bool {
    if value.is_null() || value.is_expr() {
        return true;
    }
    match column_type {
        ColumnType::Id | ColumnType::Integer | ColumnType::ForeignKey | ColumnType::UnixTimestamp => {
            matches!(value, Value::Int(_))
        }
        ColumnType::Float => matches!(value, Value::Int(_) | Value::Float(_)),
        ColumnType::Decimal => matches!(value, Value::Decimal(_) | Value::Int(_) | Value::Float(_)),
        ColumnType::Boolean => matches!(value, Value::Bool(_)),
        ColumnType::String
        | ColumnType::Text
        | ColumnType::Email
        | ColumnType::Password
        | ColumnType::Enum
        | ColumnType::TimezoneOffset => matches!(value, Value::String(_)),
        ColumnType::Uuid => matches!(value, Value::Uuid(_)),
        ColumnType::Timestamp => matches!(value, Value::Timestamp(_) | Value::TimestampTz(_)),
        ColumnType::Date => matches!(value, Value::Date(_)),
        ColumnType::Time => matches!(value, Value::Time(_)),
        ColumnType::Json => true,
        ColumnType::Blob => matches!(value, Value::Bytes(_)),
        ColumnType::Virtual => false,
    }
}

fn invalid(column: &str, operator: Operator, reason: &str) -> OrmError {
    OrmError::InvalidCondition(format!("'{}' {} {}", column, operator, reason))
}

fn pattern_literal(dialect: Dialect, column: &str, operator: Operator, value: &Value) -> Result<String> {
    match value {
        Value::String(pattern) => Ok(dialect.quote_string(pattern)),
        Value::Expr(expr) => dialect.render_expr(expr),
        _ => Err(invalid(column, operator, "expects a string pattern")),
    }
}

fn json_document(value: &Value) -> serde_json::Value {
    match value {
        Value::String(raw) => {
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.clone()))
        }
        other => other.to_json(),
    }
}

fn json_key_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        Value::Json(serde_json::Value::Array(items)) => {
            items.iter().map(|v| v.as_str().map(str::to_string)).collect()
        }
        Value::String(single) => Some(vec![single.clone()]),
        _ => None,
    }
}
