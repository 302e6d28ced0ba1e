//! Extra value validators attached to columns.
//!
//! Validators run after type-format validation succeeded, and only for
//! values that come from the application. Each returns a list of error keys.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::value::Value;
use crate::{OrmError, Result};

/// Trait for column value validators.
pub trait ValueValidator: Send + Sync {
    /// Validator name, for diagnostics.
    fn name(&self) -> &str;

    /// Validates a non-null, type-checked value.
    fn validate(&self, value: &Value) -> Vec<String>;
}

impl fmt::Debug for dyn ValueValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueValidator({})", self.name())
    }
}

/// Basic email shape check: one `@`, non-empty local part and a dotted domain.
pub fn is_valid_email(value: &str) -> bool {
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

/// String length validator (counted in characters).
#[derive(Debug, Clone, Default)]
pub struct LengthValidator {
    min: Option<usize>,
    max: Option<usize>,
}

impl LengthValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set minimum length.
    pub fn min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    /// Set maximum length.
    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }
}

impl ValueValidator for LengthValidator {
    fn name(&self) -> &str {
        "length"
    }

    fn validate(&self, value: &Value) -> Vec<String> {
        let Value::String(s) = value else {
            return Vec::new();
        };
        let len = s.chars().count();
        let mut errors = Vec::new();
        if let Some(min) = self.min {
            if len < min {
                errors.push("value_is_too_short".to_string());
            }
        }
        if let Some(max) = self.max {
            if len > max {
                errors.push("value_is_too_long".to_string());
            }
        }
        errors
    }
}

/// Numeric range validator.
#[derive(Debug, Clone, Default)]
pub struct RangeValidator {
    min: Option<f64>,
    max: Option<f64>,
    exclusive_min: bool,
    exclusive_max: bool,
}

impl RangeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Greater than or equal.
    pub fn ge(mut self, min: f64) -> Self {
        self.min = Some(min);
        self.exclusive_min = false;
        self
    }

    /// Strictly greater than.
    pub fn gt(mut self, min: f64) -> Self {
        self.min = Some(min);
        self.exclusive_min = true;
        self
    }

    /// Less than or equal.
    pub fn le(mut self, max: f64) -> Self {
        self.max = Some(max);
        self.exclusive_max = false;
        self
    }

    /// Strictly less than.
    pub fn lt(mut self, max: f64) -> Self {
        self.max = Some(max);
        self.exclusive_max = true;
        self
    }
}

impl ValueValidator for RangeValidator {
    fn name(&self) -> &str {
        "range"
    }

    fn validate(&self, value: &Value) -> Vec<String> {
        use rust_decimal::prelude::ToPrimitive;

        let number = match value {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Decimal(d) => match d.to_f64() {
                Some(f) => f,
                None => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        let mut errors = Vec::new();
        if let Some(min) = self.min {
            if number < min || (self.exclusive_min && number == min) {
                errors.push("value_is_too_small".to_string());
            }
        }
        if let Some(max) = self.max {
            if number > max || (self.exclusive_max && number == max) {
                errors.push("value_is_too_large".to_string());
            }
        }
        errors
    }
}

/// Regular expression validator for string values.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    pattern: Regex,
}

impl PatternValidator {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| OrmError::Configuration(format!("Invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self { pattern })
    }
}

impl ValueValidator for PatternValidator {
    fn name(&self) -> &str {
        "pattern"
    }

    fn validate(&self, value: &Value) -> Vec<String> {
        match value {
            Value::String(s) if !self.pattern.is_match(s) => {
                vec!["value_does_not_match_pattern".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

/// Closure based validator.
#[derive(Clone)]
pub struct FnValidator {
    name: String,
    check: Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>,
}

impl FnValidator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

impl ValueValidator for FnValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, value: &Value) -> Vec<String> {
        (self.check)(value)
    }
}
