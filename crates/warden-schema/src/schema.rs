//! Declared option sets.

use crate::error::SchemaValidationError;
use crate::validator::SchemaValidator;
use serde_json::{Map, Value, json};

/// The option set a filter or action kind accepts.
///
/// Every schema carries a `type` property restricted to its own name, which is
/// also always required.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    type_name: String,
    properties: Map<String, Value>,
    required: Vec<String>,
    allow_additional: bool,
}

impl TypeSchema {
    /// Create a schema accepting only `type: <type_name>`.
    pub fn new(type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let mut properties = Map::new();
        properties.insert("type".to_string(), json!({ "enum": [type_name] }));
        Self {
            type_name,
            properties,
            required: vec!["type".to_string()],
            allow_additional: false,
        }
    }

    /// Create a schema that starts from `base`'s option set (`rinherit`).
    ///
    /// Properties, required keys and the extras flag are copied; the `type`
    /// property is rebound to `type_name`. Later calls to [`property`] add to
    /// or override the inherited options.
    ///
    /// [`property`]: TypeSchema::property
    pub fn inherit(type_name: impl Into<String>, base: &TypeSchema) -> Self {
        let type_name = type_name.into();
        let mut properties = base.properties.clone();
        properties.insert("type".to_string(), json!({ "enum": [type_name] }));
        Self {
            type_name,
            properties,
            required: base.required.clone(),
            allow_additional: base.allow_additional,
        }
    }

    /// Declare (or override) one option.
    pub fn property(mut self, key: impl Into<String>, shape: Value) -> Self {
        self.properties.insert(key.into(), shape);
        self
    }

    /// Mark options as required.
    pub fn required(mut self, keys: &[&str]) -> Self {
        for key in keys {
            if !self.required.iter().any(|k| k == key) {
                self.required.push((*key).to_string());
            }
        }
        self
    }

    /// Accept keys that are not declared.
    pub fn allow_additional(mut self) -> Self {
        self.allow_additional = true;
        self
    }

    /// The filter/action kind this schema belongs to.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared options.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Required option names in declaration order.
    pub fn required_keys(&self) -> &[String] {
        &self.required
    }

    /// Whether undeclared keys are accepted.
    pub fn allows_additional(&self) -> bool {
        self.allow_additional
    }

    /// Render as a JSON Schema object (references left unexpanded).
    pub fn to_json(&self) -> Value {
        json!({
            "type": "object",
            "additionalProperties": self.allow_additional,
            "required": self.required,
            "properties": self.properties,
        })
    }

    /// Compile into a reusable validator.
    pub fn compile(&self) -> Result<SchemaValidator, SchemaValidationError> {
        SchemaValidator::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::COMPARISON_OPERATORS_REF;

    fn value_schema() -> TypeSchema {
        TypeSchema::new("value")
            .property("key", json!({"type": "string"}))
            .property("value", json!({}))
            .property("op", json!({"$ref": COMPARISON_OPERATORS_REF}))
            .required(&["key"])
    }

    #[test]
    fn test_new_schema_requires_type() {
        let schema = TypeSchema::new("deregister");
        assert_eq!(schema.required_keys(), &["type".to_string()]);
        assert_eq!(schema.properties()["type"], json!({"enum": ["deregister"]}));
    }

    #[test]
    fn test_inherit_rebinds_type_and_keeps_options() {
        let base = value_schema();
        let derived = TypeSchema::inherit("image-attribute", &base)
            .property("attribute", json!({"enum": ["status", "__os_type"]}))
            .required(&["attribute"]);

        assert_eq!(derived.type_name(), "image-attribute");
        assert_eq!(
            derived.properties()["type"],
            json!({"enum": ["image-attribute"]})
        );
        assert!(derived.properties().contains_key("key"));
        assert!(derived.properties().contains_key("op"));
        assert_eq!(
            derived.required_keys(),
            &["type".to_string(), "key".to_string(), "attribute".to_string()]
        );

        // base is untouched
        assert!(!base.properties().contains_key("attribute"));
        assert_eq!(base.properties()["type"], json!({"enum": ["value"]}));
    }

    #[test]
    fn test_inherit_override() {
        let derived = TypeSchema::inherit("strict-value", &value_schema())
            .property("key", json!({"enum": ["name"]}));
        assert_eq!(derived.properties()["key"], json!({"enum": ["name"]}));
    }

    #[test]
    fn test_required_is_deduplicated() {
        let schema = TypeSchema::new("copy").required(&["name", "name", "type"]);
        assert_eq!(
            schema.required_keys(),
            &["type".to_string(), "name".to_string()]
        );
    }

    #[test]
    fn test_to_json() {
        let rendered = TypeSchema::new("copy")
            .property("name", json!({"type": "string"}))
            .to_json();
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["additionalProperties"], false);
        assert_eq!(rendered["properties"]["name"]["type"], "string");
    }
}
