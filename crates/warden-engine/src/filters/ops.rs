//! Comparison operators shared by value-style and age-style filters.

use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A comparison operator. Aliases follow the shared operator enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Contains,
    Regex,
    Intersect,
}

impl Operator {
    /// Parse an operator name or alias.
    pub fn parse(name: &str) -> Option<Self> {
        let op = match name {
            "eq" | "equal" => Operator::Eq,
            "ne" | "not-equal" => Operator::Ne,
            "gt" | "greater-than" => Operator::Gt,
            "ge" | "gte" => Operator::Ge,
            "lt" | "less-than" => Operator::Lt,
            "le" | "lte" => Operator::Le,
            "in" => Operator::In,
            "ni" | "not-in" => Operator::NotIn,
            "contains" => Operator::Contains,
            "regex" => Operator::Regex,
            "intersect" => Operator::Intersect,
            _ => return None,
        };
        Some(op)
    }

    /// Whether this operator orders two scalars.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le
        )
    }

    /// Compare two numbers. Non-ordering operators never match.
    pub fn compare_numbers(self, left: f64, right: f64) -> bool {
        match left.partial_cmp(&right) {
            Some(ordering) => self.accepts(ordering),
            None => false,
        }
    }

    /// Apply the operator to a resource value and the configured value.
    ///
    /// `pattern` is the compiled form of the configured value for `regex`.
    pub fn apply(self, actual: &Value, expected: &Value, pattern: Option<&Regex>) -> bool {
        match self {
            Operator::Eq => values_equal(actual, expected),
            Operator::Ne => !values_equal(actual, expected),
            Operator::Gt | Operator::Ge | Operator::Lt | Operator::Le => {
                match compare_values(actual, expected) {
                    Some(ordering) => self.accepts(ordering),
                    None => false,
                }
            }
            Operator::In => contained_in(actual, expected),
            Operator::NotIn => !contained_in(actual, expected),
            Operator::Contains => match actual {
                Value::Array(items) => items.iter().any(|item| values_equal(item, expected)),
                Value::String(haystack) => expected
                    .as_str()
                    .is_some_and(|needle| haystack.contains(needle)),
                _ => false,
            },
            Operator::Regex => match (pattern, scalar_text(actual)) {
                (Some(pattern), Some(text)) => pattern.is_match(&text),
                _ => false,
            },
            Operator::Intersect => match (actual, expected) {
                (Value::Array(left), Value::Array(right)) => left
                    .iter()
                    .any(|l| right.iter().any(|r| values_equal(l, r))),
                _ => false,
            },
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::Contains => "contains",
            Operator::Regex => "regex",
            Operator::Intersect => "intersect",
        };
        f.write_str(name)
    }
}

/// Equality with numbers compared by value (`1 == 1.0`).
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) if left.is_number() && right.is_number() => l == r,
        _ => left == right,
    }
}

/// Order two numbers or two strings; other combinations are unordered.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn contained_in(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
        other => values_equal(actual, other),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
