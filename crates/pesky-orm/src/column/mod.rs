//! Column definitions.
//!
//! A [`Column`] is configured once with a fluent builder and then shared
//! read-only through its table structure. Configuration methods that can
//! conflict with the column type return `Result` and fail with
//! [`OrmError::Configuration`].
//!
//! # Example
//!
//! ```rust
//! use pesky_orm::column::{Column, ColumnType, UniqueConstraint};
//!
//! let email = Column::new("email", ColumnType::Email)
//!     .unique(UniqueConstraint::new().case_insensitive())
//!     .unwrap();
//! assert!(email.is_unique());
//! assert!(!email.is_unique_constraint_case_sensitive());
//! ```

pub mod format;
pub mod password;
pub mod types;
pub mod validator;

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::dialect::Dialect;
use crate::record::Record;
use crate::value::{DbExpr, Value};
use crate::{OrmError, Result, ValidationErrors};

pub use format::{FormatterFn, ValueFormat};
pub use password::{PasswordHasher, Sha256PasswordHasher};
pub use types::{error_keys, ColumnType};
pub use validator::{FnValidator, LengthValidator, PatternValidator, RangeValidator, ValueValidator};

/// Computes the value of a virtual column from the rest of the record.
pub type ValueComputer = Arc<dyn Fn(&Record) -> Result<Value> + Send + Sync>;

/// Default used when a value was never set.
#[derive(Clone)]
pub enum DefaultValue {
    /// Plain value, normalized like any assigned value
    Literal(Value),
    /// SQL expression evaluated by the database (e.g. `NOW()`)
    Expression(DbExpr),
    /// Generated on each use (e.g. a fresh UUID)
    Generated(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            DefaultValue::Expression(e) => f.debug_tuple("Expression").field(e).finish(),
            DefaultValue::Generated(_) => f.write_str("Generated(..)"),
        }
    }
}

/// Uniqueness metadata.
///
/// Uniqueness is enforced by the database; the ORM only records it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    case_sensitive: bool,
    with_columns: Vec<String>,
}

impl Default for UniqueConstraint {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            with_columns: Vec::new(),
        }
    }
}

impl UniqueConstraint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Additional columns forming a composite unique key.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn columns(&self) -> &[String] {
        &self.with_columns
    }
}

/// Column definition.
#[derive(Clone)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    primary_key: bool,
    nullable: bool,
    heavy: bool,
    private: bool,
    has_timezone: bool,
    trim: bool,
    lowercase: bool,
    empty_string_to_null: Option<bool>,
    allow_null_from_db: bool,
    unique: Option<UniqueConstraint>,
    default: Option<DefaultValue>,
    allowed_values: Vec<String>,
    validators: Vec<Arc<dyn ValueValidator>>,
    formatters: IndexMap<String, FormatterFn>,
    declared_formats: Vec<ValueFormat>,
    password_hasher: Option<Arc<dyn PasswordHasher>>,
    computer: Option<ValueComputer>,
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("column_type", &self.column_type)
            .field("primary_key", &self.primary_key)
            .field("nullable", &self.nullable)
            .field("heavy", &self.heavy)
            .field("private", &self.private)
            .field("unique", &self.unique)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: false,
            heavy: false,
            private: matches!(column_type, ColumnType::Password),
            has_timezone: false,
            trim: column_type.trims_by_default(),
            lowercase: column_type.lowercases_by_default(),
            empty_string_to_null: None,
            allow_null_from_db: true,
            unique: None,
            default: None,
            allowed_values: Vec::new(),
            validators: Vec::new(),
            formatters: IndexMap::new(),
            declared_formats: Vec::new(),
            password_hasher: None,
            computer: None,
        }
    }

    /// Auto-generated integer primary key.
    pub fn id(name: impl Into<String>) -> Self {
        let mut column = Self::new(name, ColumnType::Id);
        column.primary_key = true;
        column
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn primary_key(mut self) -> Result<Self> {
        if self.nullable {
            return Err(self.config_error("a primary key cannot be nullable"));
        }
        if self.column_type == ColumnType::Virtual {
            return Err(self.config_error("a virtual column cannot be a primary key"));
        }
        self.primary_key = true;
        Ok(self)
    }

    pub fn nullable(mut self) -> Result<Self> {
        if self.primary_key {
            return Err(self.config_error("a primary key cannot be nullable"));
        }
        self.nullable = true;
        Ok(self)
    }

    /// Excluded from default selects; loaded on demand.
    pub fn heavy(mut self) -> Self {
        self.heavy = true;
        self
    }

    /// Excluded from serialized output unless explicitly requested.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn with_timezone(mut self) -> Result<Self> {
        if !self.column_type.supports_timezone() {
            return Err(self.config_error("this column type does not support timezones"));
        }
        self.has_timezone = true;
        Ok(self)
    }

    pub fn trim_values(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    pub fn lowercase_values(mut self, lowercase: bool) -> Self {
        self.lowercase = lowercase;
        self
    }

    /// Overrides empty-string handling, which otherwise follows nullability.
    pub fn convert_empty_string_to_null(mut self, convert: bool) -> Self {
        self.empty_string_to_null = Some(convert);
        self
    }

    /// Rejects NULL values loaded from the database for non-nullable columns.
    pub fn disallow_null_from_db(mut self) -> Self {
        self.allow_null_from_db = false;
        self
    }

    pub fn unique(mut self, constraint: UniqueConstraint) -> Result<Self> {
        if !self.column_type.supports_uniqueness() {
            return Err(self.config_error("this column type cannot be unique"));
        }
        self.unique = Some(constraint);
        Ok(self)
    }

    pub fn default_value(self, value: impl Into<Value>) -> Result<Self> {
        self.set_default(DefaultValue::Literal(value.into()))
    }

    pub fn default_expression(self, expr: DbExpr) -> Result<Self> {
        self.set_default(DefaultValue::Expression(expr))
    }

    pub fn default_generator<F>(self, generator: F) -> Result<Self>
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.set_default(DefaultValue::Generated(Arc::new(generator)))
    }

    fn set_default(mut self, default: DefaultValue) -> Result<Self> {
        if !self.column_type.supports_default() {
            return Err(self.config_error("this column type cannot have a default value"));
        }
        self.default = Some(default);
        Ok(self)
    }

    pub fn allowed_values<I, S>(mut self, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.column_type != ColumnType::Enum {
            return Err(self.config_error("allowed values apply to enum columns only"));
        }
        self.allowed_values = values.into_iter().map(Into::into).collect();
        Ok(self)
    }

    /// Shorthand for a [`LengthValidator`] with a maximum.
    pub fn max_length(self, max: usize) -> Self {
        self.validator(LengthValidator::new().max(max))
    }

    pub fn validator(mut self, validator: impl ValueValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Declares a named format; fails for formats the type cannot produce.
    ///
    /// Declared formats are listed by [`Column::formatter_names`].
    pub fn formatter(mut self, name: &str) -> Result<Self> {
        let format = ValueFormat::from_name(name);
        let known = match &format {
            ValueFormat::Custom(custom) => self.formatters.contains_key(custom),
            builtin => self.column_type.supports_format(builtin),
        };
        if !known {
            return Err(self.config_error(&format!("unknown formatter '{}'", name)));
        }
        if !self.declared_formats.contains(&format) {
            self.declared_formats.push(format);
        }
        Ok(self)
    }

    pub fn custom_formatter<F>(mut self, name: impl Into<String>, formatter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.formatters.insert(name.into(), Arc::new(formatter));
        self
    }

    pub fn password_hasher(mut self, hasher: impl PasswordHasher + 'static) -> Result<Self> {
        if self.column_type != ColumnType::Password {
            return Err(self.config_error("a password hasher applies to password columns only"));
        }
        self.password_hasher = Some(Arc::new(hasher));
        Ok(self)
    }

    pub fn computed<F>(mut self, computer: F) -> Result<Self>
    where
        F: Fn(&Record) -> Result<Value> + Send + Sync + 'static,
    {
        if self.column_type != ColumnType::Virtual {
            return Err(self.config_error("only virtual columns can be computed"));
        }
        self.computer = Some(Arc::new(computer));
        Ok(self)
    }

    /// Cross-attribute checks run when the owning structure is built.
    pub(crate) fn check(&self) -> Result<()> {
        Dialect::Postgres.validate_identifier_part(&self.name)?;

        if self.column_type == ColumnType::Password && self.password_hasher.is_none() {
            return Err(self.config_error("password columns require a password hasher"));
        }
        if self.column_type == ColumnType::Enum && self.allowed_values.is_empty() {
            return Err(self.config_error("enum columns require allowed values"));
        }
        if let Some(DefaultValue::Literal(literal)) = &self.default {
            let normalized = self.normalize(literal.clone(), false);
            let errors = self.validate(&normalized, false);
            if !errors.is_empty() {
                return Err(self.config_error(&format!(
                    "default value is invalid: {}",
                    errors.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn config_error(&self, message: &str) -> OrmError {
        OrmError::Configuration(format!("Column '{}': {}", self.name, message))
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Whether the column is stored in the table.
    pub fn is_real(&self) -> bool {
        self.column_type != ColumnType::Virtual
    }

    pub fn is_heavy(&self) -> bool {
        self.heavy
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn has_timezone(&self) -> bool {
        self.has_timezone
    }

    pub fn is_unique(&self) -> bool {
        self.unique.is_some()
    }

    pub fn unique_constraint(&self) -> Option<&UniqueConstraint> {
        self.unique.as_ref()
    }

    pub fn is_unique_constraint_case_sensitive(&self) -> bool {
        self.unique.as_ref().map_or(true, UniqueConstraint::is_case_sensitive)
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed_values
    }

    pub fn is_computed(&self) -> bool {
        self.computer.is_some()
    }

    /// Names of the declared formats followed by the remaining custom
    /// formatters, in registration order.
    pub fn formatter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.declared_formats.iter().map(ValueFormat::name).collect();
        for custom in self.formatters.keys() {
            if !names.contains(&custom.as_str()) {
                names.push(custom);
            }
        }
        names
    }

    pub fn password_hasher_ref(&self) -> Option<&Arc<dyn PasswordHasher>> {
        self.password_hasher.as_ref()
    }

    /// Empty strings become NULL when enabled, or by default when nullable.
    pub fn converts_empty_string_to_null(&self) -> bool {
        self.empty_string_to_null.unwrap_or(self.nullable)
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Produces the default value, if any, normalized like an assignment.
    pub fn materialize_default(&self) -> Option<Value> {
        match self.default.as_ref()? {
            DefaultValue::Literal(v) => Some(self.normalize(v.clone(), false)),
            DefaultValue::Expression(expr) => Some(Value::Expr(expr.clone())),
            DefaultValue::Generated(generate) => Some(self.normalize(generate(), false)),
        }
    }

    /// Normalizes a value before storing it.
    ///
    /// Application values are trimmed, empty-checked, lowercased, coerced to
    /// the column type and hashed (passwords), in that order. Database values
    /// are only coerced. Raw expressions pass through untouched.
    pub fn normalize(&self, value: Value, is_from_db: bool) -> Value {
        if value.is_expr() {
            return value;
        }
        let value = if is_from_db {
            value
        } else {
            self.prepare_input(value)
        };
        let value = self.column_type.coerce(value, self.has_timezone);

        match (&self.password_hasher, value) {
            (Some(hasher), Value::String(plain)) if !is_from_db && !hasher.is_hash(&plain) => {
                Value::String(hasher.hash(&plain))
            }
            (_, value) => value,
        }
    }

    /// Type coercion only, for comparison values in conditions.
    pub fn coerce(&self, value: Value) -> Value {
        self.column_type.coerce(value, self.has_timezone)
    }

    fn prepare_input(&self, value: Value) -> Value {
        let Value::String(s) = value else {
            return value;
        };
        let s = if self.trim { s.trim().to_string() } else { s };
        if s.is_empty() && self.converts_empty_string_to_null() {
            return Value::Null;
        }
        if self.lowercase {
            Value::String(s.to_lowercase())
        } else {
            Value::String(s)
        }
    }

    /// Validates a normalized value, returning error keys.
    ///
    /// NULL from the database is accepted unless the column disallows it.
    /// Database values are checked against type format only; application
    /// values also run the allowed-values list and extra validators.
    pub fn validate(&self, value: &Value, is_from_db: bool) -> Vec<String> {
        if value.is_null() {
            let accepted = self.nullable || (is_from_db && self.allow_null_from_db);
            return if accepted {
                Vec::new()
            } else {
                vec![error_keys::NOT_NULL.to_string()]
            };
        }
        if value.is_expr() {
            return Vec::new();
        }
        if let Some(key) = self.column_type.check(value) {
            return vec![key.to_string()];
        }

        let mut errors = Vec::new();
        if self.column_type == ColumnType::Enum {
            if let Value::String(s) = value {
                if !self.allowed_values.iter().any(|allowed| allowed == s) {
                    errors.push(error_keys::NOT_ALLOWED.to_string());
                }
            }
        }
        if !is_from_db {
            for validator in &self.validators {
                errors.extend(validator.validate(value));
            }
        }
        errors
    }

    /// Renders a normalized value as a SQL literal for this column.
    pub fn format_for_sql(&self, value: &Value, dialect: Dialect) -> Result<String> {
        match (self.column_type, value) {
            (ColumnType::Json, Value::Null | Value::Expr(_)) => dialect.quote_value(value),
            (ColumnType::Json, Value::String(raw)) => Ok(match dialect {
                Dialect::Postgres => format!("{}::jsonb", dialect.quote_string(raw)),
                Dialect::MySql => dialect.quote_string(raw),
            }),
            (ColumnType::Json, other) => Ok(dialect.json_literal(&other.to_json())),
            _ => dialect.quote_value(value),
        }
    }

    /// Projects a value through a named format.
    ///
    /// The value is re-checked against the type format first (NULL passes
    /// through unformatted).
    pub fn apply_format(&self, value: &Value, format: &ValueFormat) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(key) = self.column_type.check(value) {
            let mut errors = ValidationErrors::new();
            errors.add(&self.name, key);
            return Err(OrmError::Validation(errors));
        }
        match format {
            ValueFormat::Custom(name) => {
                let formatter = self
                    .formatters
                    .get(name)
                    .ok_or_else(|| self.config_error(&format!("unknown formatter '{}'", name)))?;
                formatter(value)
            }
            builtin if self.column_type.supports_format(builtin) => builtin.apply_builtin(value),
            builtin => Err(self.config_error(&format!("unknown formatter '{}'", builtin))),
        }
    }

    /// Computes a virtual column value.
    pub fn compute(&self, record: &Record) -> Option<Result<Value>> {
        self.computer.as_ref().map(|compute| compute(record))
    }
}
