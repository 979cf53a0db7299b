//! Shared schema definitions referenced by filter schemas.
//!
//! Option shapes may point at these with `{"$ref": "#/definitions/..."}`.
//! References are expanded when a schema is compiled.

use crate::error::SchemaValidationError;
use serde_json::{Map, Value, json};

/// Reference to the shared comparison operator enumeration.
pub const COMPARISON_OPERATORS_REF: &str = "#/definitions/filters_common/comparison_operators";

/// Reference to the shared value type enumeration.
pub const VALUE_TYPES_REF: &str = "#/definitions/filters_common/value_types";

/// Comparison operators accepted by value-style and age-style filters.
pub const COMPARISON_OPERATORS: &[&str] = &[
    "eq",
    "equal",
    "ne",
    "not-equal",
    "gt",
    "greater-than",
    "ge",
    "gte",
    "le",
    "lte",
    "lt",
    "less-than",
    "in",
    "ni",
    "not-in",
    "contains",
    "regex",
    "intersect",
];

/// Value coercions accepted by value-style filters.
pub const VALUE_TYPES: &[&str] = &["normalize", "integer", "size"];

/// The full definitions document.
pub fn definitions() -> Value {
    json!({
        "filters_common": {
            "comparison_operators": { "enum": COMPARISON_OPERATORS },
            "value_types": { "enum": VALUE_TYPES },
        }
    })
}

/// Resolve a `#/definitions/...` pointer.
pub fn resolve_ref(reference: &str) -> Option<Value> {
    let pointer = reference.strip_prefix("#/definitions")?;
    definitions().pointer(pointer).cloned()
}

/// Replace every `$ref` in `shape` with the referenced definition.
pub fn expand_refs(type_name: &str, shape: &Value) -> Result<Value, SchemaValidationError> {
    match shape {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                let resolved = resolve_ref(reference).ok_or_else(|| {
                    SchemaValidationError::invalid_schema(
                        type_name,
                        format!("unresolvable reference '{}'", reference),
                    )
                })?;
                return expand_refs(type_name, &resolved);
            }
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), expand_refs(type_name, value)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| expand_refs(type_name, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaErrorKind;

    #[test]
    fn test_resolve_comparison_operators() {
        let resolved = resolve_ref(COMPARISON_OPERATORS_REF).unwrap();
        let ops = resolved["enum"].as_array().unwrap();
        assert!(ops.contains(&json!("gte")));
        assert!(ops.contains(&json!("less-than")));
    }

    #[test]
    fn test_expand_nested_refs() {
        let shape = json!({"items": {"$ref": VALUE_TYPES_REF}});
        let expanded = expand_refs("value", &shape).unwrap();
        assert_eq!(expanded["items"]["enum"][0], "normalize");
    }

    #[test]
    fn test_unknown_ref() {
        let err = expand_refs("value", &json!({"$ref": "#/definitions/nope"})).unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::InvalidSchema);
        assert!(err.message.contains("#/definitions/nope"));
    }
}
