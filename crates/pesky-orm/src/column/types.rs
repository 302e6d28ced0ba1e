//! Column type registry.
//!
//! Each [`ColumnType`] knows how to coerce loose application input into its
//! canonical [`Value`] variant, how to check that a value has the right shape,
//! and which column capabilities it supports.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::format::ValueFormat;
use super::validator::is_valid_email;
use crate::value::Value;

/// Error keys reported by type-format validation.
pub mod error_keys {
    pub const NOT_NULL: &str = "value_cannot_be_null";
    pub const REQUIRED: &str = "value_is_required";
    pub const INTEGER: &str = "value_must_be_integer";
    pub const POSITIVE_INTEGER: &str = "value_must_be_positive_integer";
    pub const FLOAT: &str = "value_must_be_float";
    pub const DECIMAL: &str = "value_must_be_decimal";
    pub const BOOLEAN: &str = "value_must_be_boolean";
    pub const STRING: &str = "value_must_be_string";
    pub const EMAIL: &str = "value_must_be_email";
    pub const UUID: &str = "value_must_be_uuid";
    pub const TIMESTAMP: &str = "value_must_be_timestamp";
    pub const UNIX_TIMESTAMP: &str = "value_must_be_unix_timestamp";
    pub const DATE: &str = "value_must_be_date";
    pub const TIME: &str = "value_must_be_time";
    pub const TIMEZONE_OFFSET: &str = "value_must_be_timezone_offset";
    pub const JSON: &str = "value_must_be_json";
    pub const BLOB: &str = "value_must_be_blob";
    pub const NOT_ALLOWED: &str = "value_is_not_allowed";
}

/// Logical column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Auto-generated positive integer primary key
    Id,
    Integer,
    Float,
    Decimal,
    Boolean,
    /// Short string, trimmed by default
    String,
    /// Long text, never trimmed by default
    Text,
    /// Lowercased, format-checked email address
    Email,
    /// Hashed on assignment through the column's password hasher
    Password,
    /// String restricted to a list of allowed values
    Enum,
    Timestamp,
    Date,
    Time,
    /// Seconds since the unix epoch stored as an integer
    UnixTimestamp,
    /// UTC offset such as `+03:00`
    TimezoneOffset,
    Json,
    Blob,
    Uuid,
    /// Integer reference to another table's primary key
    ForeignKey,
    /// Computed at read time, never stored
    Virtual,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ColumnType::from_name(s).ok_or_else(|| format!("Unknown column type '{}'", s))
    }
}

impl ColumnType {
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Id => "id",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Decimal => "decimal",
            ColumnType::Boolean => "boolean",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Email => "email",
            ColumnType::Password => "password",
            ColumnType::Enum => "enum",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::UnixTimestamp => "unix_timestamp",
            ColumnType::TimezoneOffset => "timezone_offset",
            ColumnType::Json => "json",
            ColumnType::Blob => "blob",
            ColumnType::Uuid => "uuid",
            ColumnType::ForeignKey => "foreign_key",
            ColumnType::Virtual => "virtual",
        }
    }

    /// Resolves an ORM type name or a database type name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        // strip length/precision suffixes: varchar(255), numeric(10,2)
        let base = lower.split('(').next().unwrap_or("").trim();
        // MySQL integer modifiers: int unsigned zerofill
        let base = base.trim_end_matches(" zerofill").trim_end_matches(" unsigned").trim();
        Some(match base {
            "id" | "serial" | "bigserial" | "pk" => ColumnType::Id,
            "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "mediumint"
            | "tinyint" => ColumnType::Integer,
            "float" | "float4" | "float8" | "real" | "double" | "double precision" => ColumnType::Float,
            "decimal" | "numeric" | "money" => ColumnType::Decimal,
            "bool" | "boolean" => ColumnType::Boolean,
            "string" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "citext" | "name" => ColumnType::String,
            "text" | "tinytext" | "mediumtext" | "longtext" => ColumnType::Text,
            "email" => ColumnType::Email,
            "password" => ColumnType::Password,
            "enum" | "set" => ColumnType::Enum,
            "timestamp" | "timestamptz" | "timestamp with time zone"
            | "timestamp without time zone" | "datetime" => ColumnType::Timestamp,
            "date" => ColumnType::Date,
            "time" | "timetz" | "time with time zone" | "time without time zone" => ColumnType::Time,
            "unix_timestamp" | "unixtimestamp" => ColumnType::UnixTimestamp,
            "timezone_offset" | "timezone" => ColumnType::TimezoneOffset,
            "json" | "jsonb" => ColumnType::Json,
            "blob" | "bytea" | "binary" | "varbinary" | "tinyblob" | "mediumblob" | "longblob" => {
                ColumnType::Blob
            }
            "uuid" => ColumnType::Uuid,
            "foreign_key" | "fk" => ColumnType::ForeignKey,
            "virtual" => ColumnType::Virtual,
            _ => return None,
        })
    }

    pub fn is_integer_like(self) -> bool {
        matches!(
            self,
            ColumnType::Id | ColumnType::Integer | ColumnType::ForeignKey | ColumnType::UnixTimestamp
        )
    }

    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            ColumnType::String | ColumnType::Text | ColumnType::Email | ColumnType::Password | ColumnType::Enum
        )
    }

    pub fn supports_uniqueness(self) -> bool {
        !matches!(
            self,
            ColumnType::Virtual | ColumnType::Blob | ColumnType::Json | ColumnType::Password | ColumnType::Boolean
        )
    }

    pub fn supports_timezone(self) -> bool {
        matches!(self, ColumnType::Timestamp | ColumnType::Time)
    }

    pub fn supports_default(self) -> bool {
        !matches!(self, ColumnType::Virtual | ColumnType::Password | ColumnType::Blob)
    }

    /// String types trimmed unless configured otherwise.
    pub fn trims_by_default(self) -> bool {
        matches!(
            self,
            ColumnType::String | ColumnType::Email | ColumnType::Enum | ColumnType::Uuid
        )
    }

    pub fn lowercases_by_default(self) -> bool {
        matches!(self, ColumnType::Email)
    }

    /// Whether a built-in format applies to values of this type.
    pub fn supports_format(self, format: &ValueFormat) -> bool {
        match self {
            ColumnType::Timestamp => matches!(
                format,
                ValueFormat::Date | ValueFormat::Time | ValueFormat::UnixTs | ValueFormat::DateTime
            ),
            ColumnType::Date => matches!(format, ValueFormat::UnixTs | ValueFormat::DateTime),
            ColumnType::UnixTimestamp => {
                matches!(format, ValueFormat::Date | ValueFormat::Time | ValueFormat::DateTime)
            }
            ColumnType::Json => matches!(format, ValueFormat::Array | ValueFormat::Object),
            _ => false,
        }
    }

    /// Coerces a non-null value into this type's canonical representation.
    ///
    /// Values that cannot be coerced are returned unchanged so that
    /// [`ColumnType::check`] reports them. Applying this twice yields the
    /// same result as applying it once.
    pub fn coerce(self, value: Value, has_timezone: bool) -> Value {
        if value.is_null() || value.is_expr() {
            return value;
        }
        match self {
            ColumnType::Id | ColumnType::Integer | ColumnType::ForeignKey => coerce_integer(value),
            ColumnType::UnixTimestamp => match value {
                Value::Timestamp(ts) => Value::Int(ts.and_utc().timestamp()),
                Value::TimestampTz(ts) => Value::Int(ts.timestamp()),
                Value::Date(d) => Value::Int(midnight(d).and_utc().timestamp()),
                Value::String(s) => match parse_datetime(s.trim()) {
                    Some(ParsedDateTime::Naive(ts)) => Value::Int(ts.and_utc().timestamp()),
                    Some(ParsedDateTime::Zoned(ts)) => Value::Int(ts.timestamp()),
                    None => coerce_integer(Value::String(s)),
                },
                other => coerce_integer(other),
            },
            ColumnType::Float => match value {
                Value::Int(i) => Value::Float(i as f64),
                Value::Decimal(d) => d.to_f64().map(Value::Float).unwrap_or(Value::Decimal(d)),
                Value::String(s) => match s.trim().parse::<f64>() {
                    Ok(f) if f.is_finite() => Value::Float(f),
                    _ => Value::String(s),
                },
                other => other,
            },
            ColumnType::Decimal => match value {
                Value::Int(i) => Value::Decimal(Decimal::from(i)),
                Value::Float(f) => Decimal::from_f64(f).map(Value::Decimal).unwrap_or(Value::Float(f)),
                Value::String(s) => match Decimal::from_str(s.trim()) {
                    Ok(d) => Value::Decimal(d),
                    Err(_) => Value::String(s),
                },
                other => other,
            },
            ColumnType::Boolean => match value {
                Value::Int(0) => Value::Bool(false),
                Value::Int(1) => Value::Bool(true),
                Value::String(s) => match s.trim().to_lowercase().as_str() {
                    "1" | "true" | "t" | "yes" | "y" | "on" => Value::Bool(true),
                    "0" | "false" | "f" | "no" | "n" | "off" => Value::Bool(false),
                    _ => Value::String(s),
                },
                other => other,
            },
            ColumnType::String
            | ColumnType::Text
            | ColumnType::Email
            | ColumnType::Password
            | ColumnType::Enum => match value {
                Value::Int(i) => Value::String(i.to_string()),
                Value::Float(f) => Value::String(f.to_string()),
                Value::Decimal(d) => Value::String(d.to_string()),
                Value::Bool(b) => Value::String(if b { "1" } else { "0" }.to_string()),
                Value::Uuid(u) => Value::String(u.to_string()),
                other => other,
            },
            ColumnType::Uuid => match value {
                Value::String(s) => match Uuid::parse_str(s.trim()) {
                    Ok(u) => Value::Uuid(u),
                    Err(_) => Value::String(s),
                },
                other => other,
            },
            ColumnType::Timestamp => coerce_timestamp(value, has_timezone),
            ColumnType::Date => match value {
                Value::Timestamp(ts) => Value::Date(ts.date()),
                Value::TimestampTz(ts) => Value::Date(ts.date_naive()),
                Value::Int(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
                    .map(|ts| Value::Date(ts.date_naive()))
                    .unwrap_or(Value::Int(secs)),
                Value::String(s) => match parse_datetime(s.trim()) {
                    Some(ParsedDateTime::Naive(ts)) => Value::Date(ts.date()),
                    Some(ParsedDateTime::Zoned(ts)) => Value::Date(ts.date_naive()),
                    None => Value::String(s),
                },
                other => other,
            },
            ColumnType::Time => match value {
                Value::Timestamp(ts) => Value::Time(ts.time()),
                Value::TimestampTz(ts) => Value::Time(ts.time()),
                Value::String(s) => match parse_time(s.trim()) {
                    Some(t) => Value::Time(t),
                    None => Value::String(s),
                },
                other => other,
            },
            ColumnType::TimezoneOffset => match value {
                Value::Int(secs) => match FixedOffset::east_opt(secs as i32) {
                    Some(offset) if i32::try_from(secs).is_ok() => Value::String(offset.to_string()),
                    _ => Value::Int(secs),
                },
                Value::String(s) => match parse_offset(s.trim()) {
                    Some(offset) => Value::String(offset.to_string()),
                    None => Value::String(s),
                },
                other => other,
            },
            ColumnType::Json => match value {
                Value::String(s) => match serde_json::from_str::<serde_json::Value>(&s) {
                    Ok(json) => Value::Json(json),
                    Err(_) => Value::String(s),
                },
                Value::Json(json) => Value::Json(json),
                Value::Array(_) | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                    Value::Json(value.to_json())
                }
                other => other,
            },
            ColumnType::Blob => match value {
                Value::String(s) => Value::Bytes(s.into_bytes()),
                other => other,
            },
            ColumnType::Virtual => value,
        }
    }

    /// Checks that a coerced value has this type's shape.
    ///
    /// Nulls and raw expressions are not checked here.
    pub fn check(self, value: &Value) -> Option<&'static str> {
        use error_keys::*;

        if value.is_null() || value.is_expr() {
            return None;
        }
        let ok = match self {
            ColumnType::Integer => matches!(value, Value::Int(_)),
            ColumnType::Id | ColumnType::ForeignKey => {
                return match value {
                    Value::Int(i) if *i > 0 => None,
                    Value::Int(_) => Some(POSITIVE_INTEGER),
                    _ => Some(INTEGER),
                };
            }
            ColumnType::UnixTimestamp => {
                return match value {
                    Value::Int(i) if *i >= 0 => None,
                    _ => Some(UNIX_TIMESTAMP),
                };
            }
            ColumnType::Float => matches!(value, Value::Float(_) | Value::Int(_)),
            ColumnType::Decimal => matches!(value, Value::Decimal(_) | Value::Int(_)),
            ColumnType::Boolean => matches!(value, Value::Bool(_)),
            ColumnType::String | ColumnType::Text | ColumnType::Password | ColumnType::Enum => {
                matches!(value, Value::String(_))
            }
            ColumnType::Email => {
                return match value {
                    Value::String(s) if is_valid_email(s) => None,
                    Value::String(_) => Some(EMAIL),
                    _ => Some(STRING),
                };
            }
            ColumnType::Uuid => matches!(value, Value::Uuid(_)),
            ColumnType::Timestamp => matches!(value, Value::Timestamp(_) | Value::TimestampTz(_)),
            ColumnType::Date => matches!(value, Value::Date(_)),
            ColumnType::Time => matches!(value, Value::Time(_)),
            ColumnType::TimezoneOffset => {
                matches!(value, Value::String(s) if parse_offset(s).is_some())
            }
            ColumnType::Json => matches!(value, Value::Json(_)),
            ColumnType::Blob => matches!(value, Value::Bytes(_)),
            ColumnType::Virtual => true,
        };
        if ok {
            None
        } else {
            Some(self.type_error_key())
        }
    }

    fn type_error_key(self) -> &'static str {
        use error_keys::*;
        match self {
            ColumnType::Id | ColumnType::Integer | ColumnType::ForeignKey => INTEGER,
            ColumnType::UnixTimestamp => UNIX_TIMESTAMP,
            ColumnType::Float => FLOAT,
            ColumnType::Decimal => DECIMAL,
            ColumnType::Boolean => BOOLEAN,
            ColumnType::String | ColumnType::Text | ColumnType::Password | ColumnType::Enum => STRING,
            ColumnType::Email => EMAIL,
            ColumnType::Uuid => UUID,
            ColumnType::Timestamp => TIMESTAMP,
            ColumnType::Date => DATE,
            ColumnType::Time => TIME,
            ColumnType::TimezoneOffset => TIMEZONE_OFFSET,
            ColumnType::Json => JSON,
            ColumnType::Blob => BLOB,
            ColumnType::Virtual => STRING,
        }
    }
}

fn coerce_integer(value: Value) -> Value {
    match value {
        Value::Float(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Value::Int(f as i64)
        }
        Value::Decimal(d) if d.fract().is_zero() => d.to_i64().map(Value::Int).unwrap_or(Value::Decimal(d)),
        Value::Bool(b) => Value::Int(i64::from(b)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Value::Int(i);
            }
            match trimmed.parse::<f64>() {
                Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Value::Int(f as i64)
                }
                _ => Value::String(s),
            }
        }
        other => other,
    }
}

fn coerce_timestamp(value: Value, has_timezone: bool) -> Value {
    let parsed = match value {
        Value::Timestamp(ts) => ParsedDateTime::Naive(ts),
        Value::TimestampTz(ts) => ParsedDateTime::Zoned(ts),
        Value::Date(d) => ParsedDateTime::Naive(midnight(d)),
        Value::Int(secs) => match DateTime::<Utc>::from_timestamp(secs, 0) {
            Some(ts) => ParsedDateTime::Zoned(ts.fixed_offset()),
            None => return Value::Int(secs),
        },
        Value::String(s) => match parse_datetime(s.trim()) {
            Some(parsed) => parsed,
            None => return Value::String(s),
        },
        other => return other,
    };

    match (parsed, has_timezone) {
        (ParsedDateTime::Zoned(ts), true) => Value::TimestampTz(ts),
        (ParsedDateTime::Naive(ts), true) => Value::TimestampTz(Utc.from_utc_datetime(&ts).fixed_offset()),
        (ParsedDateTime::Zoned(ts), false) => Value::Timestamp(ts.naive_utc()),
        (ParsedDateTime::Naive(ts), false) => Value::Timestamp(ts),
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

enum ParsedDateTime {
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn parse_datetime(s: &str) -> Option<ParsedDateTime> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ParsedDateTime::Zoned(ts));
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ParsedDateTime::Zoned(ts));
    }
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ParsedDateTime::Naive(ts));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| ParsedDateTime::Naive(midnight(d)))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Parses `+HH:MM`, `-HHMM`, `+HH` or `Z` within +-14 hours.
pub(crate) fn parse_offset(s: &str) -> Option<FixedOffset> {
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 14 || minutes >= 60 || (hours == 14 && minutes > 0) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
