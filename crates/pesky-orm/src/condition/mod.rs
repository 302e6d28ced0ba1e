//! Condition and expression builder.
//!
//! A [`Condition`] is a tree of column comparisons, raw SQL fragments and
//! boolean combinators. It is rendered against a [`TableStructure`] so that
//! column names are checked and comparison values are coerced through their
//! columns before being quoted.
//!
//! # Example
//!
//! ```rust
//! use pesky_orm::condition::Condition;
//! use pesky_orm::dialect::Dialect;
//! use pesky_orm::structure::TableStructure;
//!
//! let structure = TableStructure::fake("users").unwrap();
//! let condition = Condition::or(vec![
//!     Condition::and(vec![Condition::eq("a", 1), Condition::eq("b", 2)]),
//!     Condition::eq("c", 3),
//! ]);
//! let sql = condition.to_sql(&structure, Dialect::Postgres).unwrap().unwrap();
//! assert_eq!(sql, "(\"a\" = 1 AND \"b\" = 2) OR \"c\" = 3");
//! ```

mod column_ref;
mod operator;
mod render;

#[cfg(test)]
mod tests;

use serde_json::Value as JsonValue;

use crate::dialect::Dialect;
use crate::structure::TableStructure;
use crate::value::{DbExpr, Value};
use crate::{OrmError, Result};

pub use column_ref::ColumnRef;
pub use operator::Operator;
pub use render::ConditionRenderer;

/// Boolean combinator of a compound condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            BoolOp::And => " AND ",
            BoolOp::Or => " OR ",
        }
    }
}

/// WHERE clause tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column operator value`; the operator is resolved at render time
    Column {
        column: String,
        operator: String,
        value: Value,
    },
    /// Raw SQL fragment with optional bindings
    Raw(DbExpr),
    /// Children joined with AND/OR; empty compounds render nothing
    Compound { op: BoolOp, children: Vec<Condition> },
    /// Negation
    Not(Box<Condition>),
}

impl Condition {
    /// Column condition with an operator given as text (`"="`, `"not in"`, ...).
    pub fn new(column: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Column {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }

    pub fn with_operator(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::new(column, operator.as_str(), value)
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_operator(column, Operator::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_operator(column, Operator::Ne, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_operator(column, Operator::Gt, value)
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_operator(column, Operator::Gte, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_operator(column, Operator::Lt, value)
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::with_operator(column, Operator::Lte, value)
    }

    pub fn in_list<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::with_operator(column, Operator::In, collect_values(values))
    }

    pub fn not_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::with_operator(column, Operator::NotIn, collect_values(values))
    }

    pub fn between(column: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Self::with_operator(column, Operator::Between, Value::Array(vec![low.into(), high.into()]))
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_operator(column, Operator::Like, Value::String(pattern.into()))
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_operator(column, Operator::ILike, Value::String(pattern.into()))
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::with_operator(column, Operator::IsNull, Value::Null)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::with_operator(column, Operator::IsNotNull, Value::Null)
    }

    pub fn json_contains(column: impl Into<String>, document: JsonValue) -> Self {
        Self::with_operator(column, Operator::JsonContains, Value::Json(document))
    }

    pub fn raw(sql: impl Into<String>) -> Self {
        Condition::Raw(DbExpr::new(sql))
    }

    pub fn raw_with(sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        Condition::Raw(DbExpr::with_bindings(sql, bindings))
    }

    pub fn and(children: Vec<Condition>) -> Self {
        Condition::Compound {
            op: BoolOp::And,
            children,
        }
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Condition::Compound {
            op: BoolOp::Or,
            children,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    /// Combines with another condition using AND, flattening nested ANDs.
    pub fn and_also(self, other: Condition) -> Self {
        match self {
            Condition::Compound {
                op: BoolOp::And,
                mut children,
            } => {
                children.push(other);
                Condition::and(children)
            }
            first => Condition::and(vec![first, other]),
        }
    }

    /// Whether the tree renders nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Condition::Compound { children, .. } => children.iter().all(Condition::is_empty),
            Condition::Not(inner) => inner.is_empty(),
            _ => false,
        }
    }

    /// Renders the condition; `None` when the tree is empty.
    pub fn to_sql(&self, structure: &TableStructure, dialect: Dialect) -> Result<Option<String>> {
        ConditionRenderer::new(structure, dialect).render(self)
    }

    /// Builds a condition from a JSON object.
    ///
    /// Keys are `"column"` or `"column operator"` (`"age >="`, `"name not like"`);
    /// `AND`, `OR` and `NOT` keys nest further objects (or arrays of objects).
    /// Sibling keys are joined with AND.
    pub fn from_json(json: &JsonValue) -> Result<Self> {
        Self::from_json_with(json, BoolOp::And)
    }

    fn from_json_with(json: &JsonValue, op: BoolOp) -> Result<Self> {
        let children = match json {
            JsonValue::Object(map) => map
                .iter()
                .map(|(key, value)| Self::from_json_entry(key, value))
                .collect::<Result<Vec<_>>>()?,
            JsonValue::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(OrmError::InvalidCondition(format!(
                    "Expected an object or array of conditions, got {}",
                    other
                )))
            }
        };
        Ok(Condition::Compound { op, children })
    }

    fn from_json_entry(key: &str, value: &JsonValue) -> Result<Self> {
        match key.trim().to_uppercase().as_str() {
            "AND" => return Self::from_json_with(value, BoolOp::And),
            "OR" => return Self::from_json_with(value, BoolOp::Or),
            "NOT" => return Ok(Condition::not(Self::from_json(value)?)),
            _ => {}
        }

        let key = key.trim();
        let (column, operator) = match key.split_once(char::is_whitespace) {
            Some((column, operator)) => (column, operator.trim()),
            None => (key, "="),
        };
        Ok(Condition::new(column, operator, Value::from_json(value.clone())))
    }
}

fn collect_values<I, V>(values: I) -> Value
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    Value::Array(values.into_iter().map(Into::into).collect())
}
