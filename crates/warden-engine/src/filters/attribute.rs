//! Attribute projection filters.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use warden_core::Resource;
use warden_schema::TypeSchema;

use super::value::ValueFilter;
use super::{Filter, FilterContext};
use crate::error::{ConfigurationError, EngineError};

/// Projects one whitelisted resource field into an annotation and matches it.
///
/// For `attribute: status` and annotation prefix `image:attribute-`, every
/// resource gets `image:attribute-status = {"Value": <raw status>}` and the
/// value options (usually `key: Value`) are evaluated against that wrapper.
#[derive(Debug, Clone)]
pub struct AttributeFilter {
    kind: String,
    attribute: String,
    annotation_key: String,
    matcher: ValueFilter,
}

impl AttributeFilter {
    /// The value filter option set plus a required `attribute` enum.
    pub fn schema(type_name: &str, attributes: &[&str]) -> TypeSchema {
        TypeSchema::inherit(type_name, &ValueFilter::schema())
            .property("attribute", json!({"enum": attributes}))
            .required(&["attribute"])
    }

    pub fn from_config(
        kind: &str,
        annotation_prefix: &str,
        config: &Map<String, Value>,
    ) -> Result<Self, ConfigurationError> {
        let attribute = config
            .get("attribute")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigurationError::InvalidFilterConfiguration {
                filter: kind.to_string(),
                reason: "'attribute' must be a string".to_string(),
            })?
            .to_string();

        Ok(Self {
            kind: kind.to_string(),
            annotation_key: format!("{annotation_prefix}{attribute}"),
            attribute,
            matcher: ValueFilter::from_config(kind, config)?,
        })
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn annotation_key(&self) -> &str {
        &self.annotation_key
    }

    /// Attach the annotation to `resource`.
    pub fn annotate(&self, resource: &mut Resource) {
        let raw = resource.get(&self.attribute).cloned().unwrap_or(Value::Null);
        resource.annotate(self.annotation_key.clone(), json!({ "Value": raw }));
    }

    /// Whether an annotated resource matches.
    pub fn matches(&self, resource: &Resource) -> bool {
        match resource.get(&self.annotation_key) {
            Some(Value::Object(wrapper)) => self.matcher.matches(&Resource::from(wrapper.clone())),
            _ => false,
        }
    }
}

#[async_trait]
impl Filter for AttributeFilter {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn process(
        &self,
        resources: Vec<Resource>,
        _ctx: &FilterContext<'_>,
    ) -> Result<Vec<Resource>, EngineError> {
        Ok(resources
            .into_iter()
            .filter_map(|mut resource| {
                self.annotate(&mut resource);
                self.matches(&resource).then_some(resource)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_schema::SchemaErrorKind;

    const ATTRIBUTES: &[&str] = &["status", "__os_type"];

    fn filter(config: Value) -> AttributeFilter {
        AttributeFilter::from_config("image-attribute", "image:attribute-", config.as_object().unwrap())
            .unwrap()
    }

    #[test]
    fn test_schema_inherits_value_options() {
        let validator = AttributeFilter::schema("image-attribute", ATTRIBUTES)
            .compile()
            .unwrap();
        assert!(
            validator
                .validate(&json!({
                    "type": "image-attribute",
                    "attribute": "__os_type",
                    "key": "Value",
                    "op": "eq",
                    "value": "Windows"
                }))
                .is_ok()
        );

        let err = validator
            .validate(&json!({"type": "image-attribute", "attribute": "owner", "key": "Value"}))
            .unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::InvalidValue);
        assert_eq!(err.key, "attribute");

        let err = validator
            .validate(&json!({"type": "image-attribute", "key": "Value"}))
            .unwrap_err();
        assert_eq!(err.kind, SchemaErrorKind::MissingRequired);
    }

    #[test]
    fn test_annotation_and_match() {
        let f = filter(json!({"attribute": "__os_type", "key": "Value", "value": "Windows"}));

        let mut windows = Resource::from_value(json!({"id": "a", "__os_type": "Windows"})).unwrap();
        f.annotate(&mut windows);
        assert_eq!(
            windows.get("image:attribute-__os_type"),
            Some(&json!({"Value": "Windows"}))
        );
        assert!(f.matches(&windows));

        let mut linux = Resource::from_value(json!({"id": "b", "__os_type": "Linux"})).unwrap();
        f.annotate(&mut linux);
        assert!(!f.matches(&linux));
    }

    #[test]
    fn test_missing_attribute_projects_null() {
        let f = filter(json!({"attribute": "status", "key": "Value", "value": "absent"}));
        let mut resource = Resource::from_value(json!({"id": "a"})).unwrap();
        f.annotate(&mut resource);
        assert_eq!(resource.get("image:attribute-status"), Some(&json!({"Value": null})));
        assert!(f.matches(&resource));
    }
}
