//! SQL statement assembly.
//!
//! Statements are built as plain SQL text: every value is rendered as a
//! literal through its column, and conditions go through the
//! [`Condition`](crate::condition::Condition) renderer.
//!
//! # Examples
//!
//! ```rust
//! use pesky_orm::column::{Column, ColumnType};
//! use pesky_orm::condition::Condition;
//! use pesky_orm::dialect::Dialect;
//! use pesky_orm::query::{OrderDirection, SelectQuery};
//! use pesky_orm::structure::TableStructure;
//!
//! let users = TableStructure::builder("users")
//!     .column(Column::id("id")).unwrap()
//!     .column(Column::new("name", ColumnType::String)).unwrap()
//!     .build()
//!     .unwrap();
//!
//! let sql = SelectQuery::new()
//!     .filter(Condition::gte("id", 10))
//!     .order_by("name", OrderDirection::Asc)
//!     .limit(5)
//!     .to_sql(&users, Dialect::Postgres)
//!     .unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT \"id\", \"name\" FROM \"users\" WHERE \"id\" >= 10 ORDER BY \"name\" ASC LIMIT 5"
//! );
//! ```

mod helpers;
mod modify;
mod select;
mod types;

#[cfg(test)]
mod tests;

pub use helpers::primary_key_condition;
pub use modify::{build_delete, build_insert, build_update, RowValues};
pub use select::SelectQuery;
pub use types::{OrderBy, OrderDirection};
