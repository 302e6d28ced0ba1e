//! Comparison operators.

use std::fmt;
use std::str::FromStr;

use crate::OrmError;

/// Comparison operator of a column condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Gte,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// IN list
    In,
    /// NOT IN list
    NotIn,
    /// BETWEEN two bounds
    Between,
    /// NOT BETWEEN two bounds
    NotBetween,
    /// LIKE pattern matching
    Like,
    /// NOT LIKE
    NotLike,
    /// Case-insensitive LIKE
    ILike,
    /// Case-insensitive NOT LIKE
    NotILike,
    /// Regular expression match (~)
    Regex,
    /// Regular expression mismatch (!~)
    NotRegex,
    /// Case-insensitive regular expression match (~*)
    IRegex,
    /// Case-insensitive regular expression mismatch (!~*)
    NotIRegex,
    /// IS (NULL / TRUE / FALSE)
    Is,
    /// IS NOT (NULL / TRUE / FALSE)
    IsNot,
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
    /// JSON contains (@>)
    JsonContains,
    /// JSON contained by (<@)
    JsonContainedBy,
    /// JSON key exists (?)
    JsonHasKey,
    /// JSON any key exists (?|)
    JsonHasAnyKeys,
    /// JSON all keys exist (?&)
    JsonHasAllKeys,
}

impl Operator {
    /// Parses an operator, accepting symbolic and word aliases.
    /// Underscores in word aliases are treated as spaces (`not_in`).
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Some(match normalized.as_str() {
            "=" | "==" | "eq" => Operator::Eq,
            "!=" | "<>" | "ne" | "neq" => Operator::Ne,
            ">" | "gt" => Operator::Gt,
            ">=" | "gte" | "ge" => Operator::Gte,
            "<" | "lt" => Operator::Lt,
            "<=" | "lte" | "le" => Operator::Lte,
            "in" => Operator::In,
            "not in" | "!in" | "nin" => Operator::NotIn,
            "between" => Operator::Between,
            "not between" | "!between" => Operator::NotBetween,
            "like" => Operator::Like,
            "not like" | "!like" => Operator::NotLike,
            "ilike" => Operator::ILike,
            "not ilike" | "!ilike" => Operator::NotILike,
            "~" | "regex" | "regexp" => Operator::Regex,
            "!~" | "not regex" | "not regexp" => Operator::NotRegex,
            "~*" | "iregex" | "iregexp" => Operator::IRegex,
            "!~*" | "not iregex" | "not iregexp" => Operator::NotIRegex,
            "is" => Operator::Is,
            "is not" | "!is" => Operator::IsNot,
            "is null" => Operator::IsNull,
            "is not null" => Operator::IsNotNull,
            "@>" | "contains" => Operator::JsonContains,
            "<@" | "contained by" => Operator::JsonContainedBy,
            "?" | "has key" => Operator::JsonHasKey,
            "?|" | "has any keys" => Operator::JsonHasAnyKeys,
            "?&" | "has all keys" => Operator::JsonHasAllKeys,
            _ => return None,
        })
    }

    /// Canonical spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Between => "BETWEEN",
            Operator::NotBetween => "NOT BETWEEN",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::Regex => "~",
            Operator::NotRegex => "!~",
            Operator::IRegex => "~*",
            Operator::NotIRegex => "!~*",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::JsonContains => "@>",
            Operator::JsonContainedBy => "<@",
            Operator::JsonHasKey => "?",
            Operator::JsonHasAnyKeys => "?|",
            Operator::JsonHasAllKeys => "?&",
        }
    }

    /// Operators comparing a column against a single scalar.
    pub fn is_scalar_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }

    pub fn is_json(self) -> bool {
        matches!(
            self,
            Operator::JsonContains
                | Operator::JsonContainedBy
                | Operator::JsonHasKey
                | Operator::JsonHasAnyKeys
                | Operator::JsonHasAllKeys
        )
    }

    pub fn is_pattern(self) -> bool {
        matches!(
            self,
            Operator::Like
                | Operator::NotLike
                | Operator::ILike
                | Operator::NotILike
                | Operator::Regex
                | Operator::NotRegex
                | Operator::IRegex
                | Operator::NotIRegex
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s).ok_or_else(|| OrmError::InvalidCondition(format!("Unknown operator '{}'", s)))
    }
}
