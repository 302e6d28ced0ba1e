//! Typed column, record and condition layer for PostgreSQL and MySQL.
//!
//! This crate turns application values into correctly typed, correctly
//! quoted SQL and back, while tracking per-record, per-column state before
//! any I/O happens.
//!
//! # Architecture
//!
//! ```text
//! Table (structure + adapter)
//!           |
//!   Record ──> RecordValue ──> Column (normalize / validate / format)
//!           |
//!   Condition + SelectQuery / build_insert / build_update / build_delete
//!           |
//!   Adapter (PostgresAdapter, MySqlAdapter over sqlx; RecordingAdapter)
//! ```
//!
//! # Key Features
//!
//! - **Typed columns**: normalization on assignment (trim, empty-to-null,
//!   lowercase, type coercion, password hashing), format validation with
//!   stable error keys, defaults (literal, SQL expression, generated),
//!   read-time formats and virtual columns.
//! - **Records**: dirty tracking, all-or-nothing validation before save,
//!   insert/update/delete by primary key, lazy loading of heavy columns.
//! - **Conditions**: operator aliases, NULL and list rewrites, JSON paths,
//!   casts and raw fragments, rendered for either dialect.
//! - **Adapters**: sqlx pools with connection retry, per-connection session
//!   settings and slow statement logging.
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pesky_orm::{adapter, Condition, ConnectionConfig, SelectQuery, Table, TableStructure};
//!
//! # async fn example(users: Arc<TableStructure>) -> pesky_orm::Result<()> {
//! let config = ConnectionConfig::from_env("PESKY")?;
//! let db = adapter::connect(&config).await?;
//! let table = Table::new(users, db);
//!
//! let mut user = table.find_by_pk(1).await?;
//! user.set("name", "Alice")?;
//! table.save(&mut user, None).await?;
//!
//! let active = table
//!     .select(SelectQuery::new().filter(Condition::eq("active", true)).limit(20))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod column;
pub mod condition;
pub mod config;
pub mod dialect;
pub mod query;
pub mod record;
pub mod structure;
pub mod table;
pub mod value;

pub use adapter::{Adapter, DbRow, ExecResult, MySqlAdapter, PostgresAdapter, RecordingAdapter};
pub use column::{Column, ColumnType, DefaultValue, UniqueConstraint, ValueFormat};
pub use condition::{ColumnRef, Condition, Operator};
pub use config::{ConnectionConfig, ExecutorConfig, PoolConfig, RetryConfig};
pub use dialect::Dialect;
pub use query::{OrderDirection, SelectQuery};
pub use record::{Record, RecordValue};
pub use structure::{Relation, RelationKind, StructureRegistry, TableDefinition, TableStructure};
pub use table::{Related, Table};
pub use value::{DbExpr, Value};

pub use pesky_common::{OrmError, Result, ValidationErrors};
