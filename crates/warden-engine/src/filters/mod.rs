//! Filters: configuration-driven predicates that narrow a resource collection.
//!
//! Built-in kinds available to every resource type:
//!
//! | Kind | Description |
//! |------|-------------|
//! | `value` | generic key/value match with comparison operators |
//! | `and` / `or` / `not` | boolean composition of nested filters |
//!
//! Reusable building blocks for resource modules: [`AgeFilter`],
//! [`AttributeFilter`] and [`CrossAccountFilter`].

pub mod age;
pub mod attribute;
pub mod boolean;
pub mod cross_account;
pub mod ops;
pub mod value;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::fmt;
use warden_core::{ExecutionConfig, Resource, ResourceTypeInfo};

use crate::client::CloudClient;
use crate::error::{ConfigurationError, EngineError};
use crate::report::Diagnostics;

pub use age::AgeFilter;
pub use attribute::AttributeFilter;
pub use boolean::{BooleanFilter, BooleanOp};
pub use cross_account::{CrossAccountFilter, Exposure, MembershipLookup};
pub use ops::Operator;
pub use value::{ValueFilter, ValueType};

/// Everything a filter may use while processing one batch.
pub struct FilterContext<'a> {
    pub client: &'a dyn CloudClient,
    pub resource_type: &'a ResourceTypeInfo,
    pub execution: &'a ExecutionConfig,
    /// Reference time for age comparisons, fixed for the whole run.
    pub now: DateTime<Utc>,
    pub diagnostics: &'a Diagnostics,
}

/// A configured filter.
///
/// `process` receives the current surviving set and returns a subset of it in
/// the same relative order.
#[async_trait]
pub trait Filter: Send + Sync + fmt::Debug {
    /// The kind this filter was registered under.
    fn kind(&self) -> &str;

    async fn process(
        &self,
        resources: Vec<Resource>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<Resource>, EngineError>;
}

/// Normalize a policy filter entry into `(kind, options)`.
///
/// Accepted shapes:
/// - `{type: <kind>, ...}`
/// - `{or: [...]}`, `{and: [...]}`, `{not: [...]}`
/// - `{<key>: <value>}` shorthand for `{type: value, key, value}`
pub fn normalize_filter(entry: &Value) -> Result<(String, Map<String, Value>), ConfigurationError> {
    let invalid = || ConfigurationError::InvalidEntry {
        kind: "filter",
        entry: entry.to_string(),
    };

    let map = entry.as_object().ok_or_else(invalid)?;

    if let Some(kind) = map.get("type") {
        let kind = kind.as_str().ok_or_else(invalid)?;
        return Ok((kind.to_string(), map.clone()));
    }

    if map.len() != 1 {
        return Err(invalid());
    }
    let Some((key, value)) = map.iter().next() else {
        return Err(invalid());
    };

    let normalized = match BooleanOp::from_key(key) {
        Some(op) => json!({"type": op.as_str(), "filters": value}),
        None => json!({"type": ValueFilter::TYPE, "key": key, "value": value}),
    };
    match normalized {
        Value::Object(options) => {
            let kind = options["type"].as_str().unwrap_or_default().to_string();
            Ok((kind, options))
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_typed_entry() {
        let (kind, options) =
            normalize_filter(&json!({"type": "image-age", "days": 30})).unwrap();
        assert_eq!(kind, "image-age");
        assert_eq!(options["days"], 30);
    }

    #[test]
    fn test_normalize_shorthand_value() {
        let (kind, options) = normalize_filter(&json!({"name": "test"})).unwrap();
        assert_eq!(kind, "value");
        assert_eq!(options["key"], "name");
        assert_eq!(options["value"], "test");
    }

    #[test]
    fn test_normalize_boolean_block() {
        let (kind, options) =
            normalize_filter(&json!({"or": [{"name": "a"}, {"name": "b"}]})).unwrap();
        assert_eq!(kind, "or");
        assert_eq!(options["filters"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_normalize_rejects_bad_entries() {
        assert!(normalize_filter(&json!("image-age")).is_err());
        assert!(normalize_filter(&json!({"a": 1, "b": 2})).is_err());
        assert!(normalize_filter(&json!({"type": 3})).is_err());
        assert!(normalize_filter(&json!({})).is_err());
    }
}
