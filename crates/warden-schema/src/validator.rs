//! Compiled schema validation.
//!
//! Validation runs in three passes so the reported error names the offending
//! key precisely:
//! 1. required keys present
//! 2. no undeclared keys (unless the schema allows extras)
//! 3. each present value matches its declared shape (JSON Schema)

use crate::definitions::expand_refs;
use crate::error::SchemaValidationError;
use crate::schema::TypeSchema;
use serde_json::{Map, Value};
use std::fmt;

/// A [`TypeSchema`] compiled for repeated validation.
pub struct SchemaValidator {
    schema: TypeSchema,
    /// Property shapes with references expanded.
    resolved: Map<String, Value>,
    compiled: jsonschema::Validator,
}

impl SchemaValidator {
    /// Expand references and compile `schema`.
    pub fn new(schema: TypeSchema) -> Result<Self, SchemaValidationError> {
        let type_name = schema.type_name().to_string();

        let mut resolved = Map::new();
        for (key, shape) in schema.properties() {
            resolved.insert(key.clone(), expand_refs(&type_name, shape)?);
        }

        let document = serde_json::json!({
            "type": "object",
            "properties": resolved,
        });
        let compiled = jsonschema::validator_for(&document)
            .map_err(|e| SchemaValidationError::invalid_schema(&type_name, e.to_string()))?;

        Ok(Self {
            schema,
            resolved,
            compiled,
        })
    }

    /// The declared schema.
    pub fn schema(&self) -> &TypeSchema {
        &self.schema
    }

    /// Validate a configuration mapping.
    pub fn validate(&self, config: &Value) -> Result<(), SchemaValidationError> {
        let type_name = self.schema.type_name();
        let map = config
            .as_object()
            .ok_or_else(|| SchemaValidationError::not_a_mapping(type_name))?;

        for key in self.schema.required_keys() {
            if !map.contains_key(key) {
                return Err(SchemaValidationError::missing_required(
                    type_name,
                    key,
                    &self.expected(key),
                ));
            }
        }

        if !self.schema.allows_additional() {
            if let Some(key) = map.keys().find(|k| !self.resolved.contains_key(*k)) {
                let allowed: Vec<&str> = self.resolved.keys().map(String::as_str).collect();
                return Err(SchemaValidationError::unknown_key(type_name, key, &allowed));
            }
        }

        if let Some(error) = self.compiled.iter_errors(config).next() {
            let path = error.instance_path().to_string();
            let key = path
                .trim_start_matches('/')
                .split('/')
                .next()
                .filter(|k| !k.is_empty())
                .unwrap_or("(root)")
                .to_string();
            tracing::debug!(schema = %type_name, key = %key, "option failed schema validation");
            return Err(SchemaValidationError::invalid_value(
                type_name,
                &key,
                &self.expected(&key),
                &error.to_string(),
            ));
        }

        Ok(())
    }

    fn expected(&self, key: &str) -> String {
        self.resolved
            .get(key)
            .map(Value::to_string)
            .unwrap_or_else(|| "any value".to_string())
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}
