//! Generic key/value matching.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value, json};
use warden_core::Resource;
use warden_schema::TypeSchema;
use warden_schema::definitions::{COMPARISON_OPERATORS_REF, VALUE_TYPES_REF};

use super::ops::{Operator, values_equal};
use super::{Filter, FilterContext};
use crate::error::{ConfigurationError, EngineError};

/// Coercion applied before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Trim and lowercase strings.
    Normalize,
    /// Parse strings as integers.
    Integer,
    /// Compare the length of a string, array or mapping.
    Size,
}

impl ValueType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "normalize" => Some(ValueType::Normalize),
            "integer" => Some(ValueType::Integer),
            "size" => Some(ValueType::Size),
            _ => None,
        }
    }

    fn coerce(self, value: &Value) -> Value {
        match (self, value) {
            (ValueType::Normalize, Value::String(s)) => Value::String(s.trim().to_lowercase()),
            (ValueType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => json!(n),
                Err(_) => value.clone(),
            },
            (ValueType::Size, Value::String(s)) => json!(s.chars().count()),
            (ValueType::Size, Value::Array(items)) => json!(items.len()),
            (ValueType::Size, Value::Object(map)) => json!(map.len()),
            _ => value.clone(),
        }
    }
}

/// Values with a meaning of their own instead of a literal comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Special {
    Absent,
    Present,
    NotNull,
    Empty,
}

impl Special {
    fn parse(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "absent" => Some(Special::Absent),
            "present" => Some(Special::Present),
            "not-null" => Some(Special::NotNull),
            "empty" => Some(Special::Empty),
            _ => None,
        }
    }

    fn matches(self, actual: Option<&Value>) -> bool {
        let actual = actual.filter(|v| !v.is_null());
        match self {
            Special::Absent => actual.is_none(),
            Special::Present => actual.is_some(),
            Special::NotNull => actual.is_some_and(is_truthy),
            Special::Empty => !actual.is_some_and(is_truthy),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Match a resource field against a configured value.
///
/// ```yaml
/// - type: value
///   key: status
///   op: in
///   value: [active, queued]
/// ```
#[derive(Debug, Clone)]
pub struct ValueFilter {
    key: String,
    value: Value,
    op: Operator,
    value_type: Option<ValueType>,
    pattern: Option<Regex>,
}

impl ValueFilter {
    pub const TYPE: &'static str = "value";

    /// Option set of the value filter; other filters inherit it.
    pub fn schema() -> TypeSchema {
        TypeSchema::new(Self::TYPE)
            .property("key", json!({"type": "string"}))
            .property("value", json!({}))
            .property("op", json!({"$ref": COMPARISON_OPERATORS_REF}))
            .property("value_type", json!({"$ref": VALUE_TYPES_REF}))
            .required(&["key"])
    }

    /// Build from validated options. `kind` names the filter in errors.
    pub fn from_config(kind: &str, config: &Map<String, Value>) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidFilterConfiguration {
            filter: kind.to_string(),
            reason,
        };

        let key = config
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("'key' must be a string".to_string()))?
            .to_string();

        let op = match config.get("op").and_then(Value::as_str) {
            Some(name) => {
                Operator::parse(name).ok_or_else(|| invalid(format!("unknown operator '{name}'")))?
            }
            None => Operator::Eq,
        };

        let value_type = match config.get("value_type").and_then(Value::as_str) {
            Some(name) => Some(
                ValueType::parse(name)
                    .ok_or_else(|| invalid(format!("unknown value_type '{name}'")))?,
            ),
            None => None,
        };

        let value = config.get("value").cloned().unwrap_or(Value::Null);
        let value = match value_type {
            Some(ValueType::Normalize) => ValueType::Normalize.coerce(&value),
            _ => value,
        };

        let pattern = if op == Operator::Regex {
            let source = value
                .as_str()
                .ok_or_else(|| invalid("regex value must be a string".to_string()))?;
            let compiled = Regex::new(&format!("^(?:{source})"))
                .map_err(|e| invalid(format!("invalid regex '{source}': {e}")))?;
            Some(compiled)
        } else {
            None
        };

        Ok(Self {
            key,
            value,
            op,
            value_type,
            pattern,
        })
    }

    /// Convenience constructor for `{key, value}` equality.
    pub fn equals(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            op: Operator::Eq,
            value_type: None,
            pattern: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    /// Whether `resource` matches.
    pub fn matches(&self, resource: &Resource) -> bool {
        self.matches_value(resource.get_path(&self.key))
    }

    /// Whether a looked-up field value matches. `None` means the key is absent.
    pub fn matches_value(&self, actual: Option<&Value>) -> bool {
        if let Some(special) = Special::parse(&self.value) {
            return special.matches(actual);
        }

        let actual = match actual {
            Some(v) if !v.is_null() => v,
            _ => {
                let lists_null = self
                    .value
                    .as_array()
                    .is_some_and(|items| items.iter().any(Value::is_null));
                return match self.op {
                    Operator::Eq => self.value.is_null(),
                    Operator::Ne => !self.value.is_null(),
                    Operator::In => lists_null,
                    Operator::NotIn => !lists_null,
                    _ => false,
                };
            }
        };

        let actual = match self.value_type {
            Some(value_type) => value_type.coerce(actual),
            None => actual.clone(),
        };

        match self.op {
            Operator::Eq if self.value_type == Some(ValueType::Integer) => {
                values_equal(&actual, &ValueType::Integer.coerce(&self.value))
            }
            op => op.apply(&actual, &self.value, self.pattern.as_ref()),
        }
    }
}

#[async_trait]
impl Filter for ValueFilter {
    fn kind(&self) -> &str {
        Self::TYPE
    }

    async fn process(
        &self,
        resources: Vec<Resource>,
        _ctx: &FilterContext<'_>,
    ) -> Result<Vec<Resource>, EngineError> {
        Ok(resources.into_iter().filter(|r| self.matches(r)).collect())
    }
}
