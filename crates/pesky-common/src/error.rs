//! Error types for pesky

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for pesky operations
pub type Result<T> = std::result::Result<T, OrmError>;

/// Per-column validation messages collected during a single operation.
///
/// Columns keep the order in which they were validated so callers can
/// present errors in structure order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: IndexMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Create empty validation errors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one message for a column.
    pub fn add(&mut self, column: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(column.into()).or_default().push(message.into());
    }

    /// Add several messages for a column. An empty list is ignored.
    pub fn extend_column(&mut self, column: impl Into<String>, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        self.errors.entry(column.into()).or_default().extend(messages);
    }

    /// Merge another collection into this one.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (column, messages) in other.errors {
            self.extend_column(column, messages);
        }
    }

    /// Check if there are any errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of columns with at least one error.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Messages recorded for a column.
    pub fn for_column(&self, column: &str) -> Option<&[String]> {
        self.errors.get(column).map(|v| v.as_slice())
    }

    /// Names of the columns that failed, in validation order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(|k| k.as_str())
    }

    /// Iterate over (column, messages) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Convert to Result.
    pub fn into_result<T>(self, value: T) -> Result<T> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(OrmError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(column, messages)| format!("{}: {}", column, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Unified error type for all pesky operations
#[derive(Error, Debug, Clone)]
pub enum OrmError {
    /// Invalid column or structure setup. Raised while structures are built.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// One or more column values failed normalization or validation.
    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    /// Malformed condition tree, detected before any SQL is sent.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Value for column '{table}.{column}' is not set")]
    ValueNotSet { table: String, column: String },

    /// A load by key found nothing.
    #[error("Record not found in table '{table}' for key {key}")]
    RecordNotFound { table: String, key: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Unique constraint violation (SQLSTATE 23505, MySQL 1062)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Foreign key constraint violation (SQLSTATE 23503, MySQL 1451/1452)
    #[error("Foreign key constraint violation: {0}")]
    ForeignKey(String),

    /// Deadlock detected (SQLSTATE 40P01, MySQL 1213) - retryable
    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    /// Connection timeout - retryable
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient error that may succeed on retry
    #[error("Transient error: {0}")]
    Transient(String),
}

impl OrmError {
    /// Shortcut for a single-column validation failure.
    pub fn validation(column: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(column, message);
        OrmError::Validation(errors)
    }

    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrmError::Deadlock(_) | OrmError::Timeout(_) | OrmError::Transient(_)
        )
    }

    /// Returns true if this is a constraint violation error
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, OrmError::Conflict(_) | OrmError::ForeignKey(_))
    }

    /// Returns the collected validation messages, if this is a validation error.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            OrmError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

// Driver error conversions (when sqlx-errors feature is enabled)
#[cfg(feature = "sqlx-errors")]
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error;
        match &err {
            Error::Configuration(_) => OrmError::Connection(err.to_string()),
            Error::Database(db_err) => {
                // MySQL reports a generic SQLSTATE; the server error number is precise
                if let Some(mysql_err) = db_err.try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>() {
                    if let Some(classified) = classify_sql_state(&mysql_err.number().to_string(), err.to_string()) {
                        return classified;
                    }
                }
                if let Some(code) = db_err.code() {
                    if let Some(classified) = classify_sql_state(&code, err.to_string()) {
                        return classified;
                    }
                }
                OrmError::Database(err.to_string())
            }
            Error::Io(_) => OrmError::Connection(err.to_string()),
            Error::Tls(_) => OrmError::Connection(err.to_string()),
            Error::Protocol(_) => OrmError::Connection(err.to_string()),
            Error::RowNotFound => OrmError::Database("Row not found".to_string()),
            Error::TypeNotFound { .. } => OrmError::Serialization(err.to_string()),
            Error::ColumnIndexOutOfBounds { .. } => OrmError::Database(err.to_string()),
            Error::ColumnNotFound(_) => OrmError::Database(err.to_string()),
            Error::ColumnDecode { .. } => OrmError::Serialization(err.to_string()),
            Error::Decode(_) => OrmError::Serialization(err.to_string()),
            Error::PoolTimedOut => OrmError::Timeout("Connection pool timed out".to_string()),
            Error::PoolClosed => OrmError::Connection("Connection pool closed".to_string()),
            Error::WorkerCrashed => OrmError::Internal("Worker thread crashed".to_string()),
            _ => OrmError::Database(err.to_string()),
        }
    }
}

/// Classify a driver error code.
///
/// PostgreSQL reports five-character SQLSTATE codes, MySQL reports numeric
/// server error codes. Returns `None` for codes without a dedicated variant.
pub fn classify_sql_state(code: &str, message: String) -> Option<OrmError> {
    // See: https://www.postgresql.org/docs/current/errcodes-appendix.html
    let classified = match code {
        // Unique constraint violation
        "23505" | "1062" => OrmError::Conflict(message),
        // Foreign key violation
        "23503" | "1451" | "1452" => OrmError::ForeignKey(message),
        // Not null / check constraint violation
        "23502" | "23514" | "1048" | "3819" => {
            OrmError::validation("database", message)
        }
        // Exclusion constraint violation
        "23P01" => OrmError::Conflict(message),
        // Deadlock detected
        "40P01" | "1213" => OrmError::Deadlock(message),
        // Serialization failure (can retry)
        "40001" => OrmError::Transient(message),
        // Lock wait timeout
        "1205" => OrmError::Timeout(message),
        code if code.len() == 5 && code.starts_with("40") => OrmError::Transient(message),
        // Connection errors (class 08)
        code if code.len() == 5 && code.starts_with("08") => OrmError::Connection(message),
        // Operator intervention / admin shutdown (class 57)
        "57P01" | "57P02" | "57P03" => OrmError::Transient(message),
        _ => return None,
    };
    Some(classified)
}
