//! Read-time value formats.
//!
//! A format projects a stored value into another shape (`created_at` as a
//! date, `settings` as an object) without touching the stored value.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::value::Value;
use crate::{OrmError, Result};

/// Named value format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueFormat {
    /// Date part of a temporal value
    Date,
    /// Time part of a temporal value
    Time,
    /// Seconds since the unix epoch
    UnixTs,
    /// Timezone-aware date-time object
    DateTime,
    /// JSON array decoded into a value list
    Array,
    /// JSON object
    Object,
    /// Formatter registered on the column under this name
    Custom(String),
}

impl ValueFormat {
    /// Parses a format name. Unknown names are treated as custom formats.
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim();
        let base = trimmed.strip_prefix("as_").unwrap_or(trimmed);
        match base {
            "date" => ValueFormat::Date,
            "time" => ValueFormat::Time,
            "unix_ts" | "timestamp" => ValueFormat::UnixTs,
            "datetime" | "carbon" => ValueFormat::DateTime,
            "array" => ValueFormat::Array,
            "object" => ValueFormat::Object,
            _ => ValueFormat::Custom(trimmed.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ValueFormat::Date => "date",
            ValueFormat::Time => "time",
            ValueFormat::UnixTs => "unix_ts",
            ValueFormat::DateTime => "datetime",
            ValueFormat::Array => "array",
            ValueFormat::Object => "object",
            ValueFormat::Custom(name) => name,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, ValueFormat::Custom(_))
    }

    /// Applies a built-in format to a type-checked, non-null value.
    pub(crate) fn apply_builtin(&self, value: &Value) -> Result<Value> {
        let unsupported = || {
            OrmError::Configuration(format!(
                "Format '{}' cannot be applied to a {} value",
                self.name(),
                value.type_name()
            ))
        };

        match self {
            ValueFormat::Date => Ok(Value::Date(as_datetime(value).ok_or_else(unsupported)?.date_naive())),
            ValueFormat::Time => Ok(Value::Time(as_datetime(value).ok_or_else(unsupported)?.time())),
            ValueFormat::UnixTs => Ok(Value::Int(as_datetime(value).ok_or_else(unsupported)?.timestamp())),
            ValueFormat::DateTime => Ok(Value::TimestampTz(as_datetime(value).ok_or_else(unsupported)?)),
            ValueFormat::Array => match value {
                Value::Json(serde_json::Value::Array(items)) => {
                    Ok(Value::Array(items.iter().cloned().map(Value::from_json).collect()))
                }
                Value::Array(items) => Ok(Value::Array(items.clone())),
                _ => Err(unsupported()),
            },
            ValueFormat::Object => match value {
                Value::Json(json @ serde_json::Value::Object(_)) => Ok(Value::Json(json.clone())),
                _ => Err(unsupported()),
            },
            ValueFormat::Custom(_) => Err(unsupported()),
        }
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn as_datetime(value: &Value) -> Option<DateTime<FixedOffset>> {
    match value {
        Value::TimestampTz(ts) => Some(*ts),
        Value::Timestamp(ts) => Some(naive_utc(ts)),
        Value::Date(d) => Some(naive_utc(&d.and_time(chrono::NaiveTime::MIN))),
        Value::Int(secs) => DateTime::<Utc>::from_timestamp(*secs, 0).map(|ts| ts.fixed_offset()),
        _ => None,
    }
}

fn naive_utc(ts: &NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(ts).fixed_offset()
}

/// Custom formatter closure registered on a column.
pub type FormatterFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
