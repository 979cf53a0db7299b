//! Policy declarations.
//!
//! A policy names a resource type, an ordered list of filters and an ordered
//! list of actions. Filter and action entries are kept as raw JSON values here;
//! the engine normalizes and validates them against the registered schemas.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// One declared policy. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDefinition {
    /// Policy name (unique within a file).
    pub name: String,

    /// Resource type key (e.g. `huaweicloud.ims`).
    pub resource: String,

    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ordered filter entries.
    #[serde(default)]
    pub filters: Vec<Value>,

    /// Ordered action entries. Each is a bare string or a mapping with `type`.
    #[serde(default)]
    pub actions: Vec<Value>,
}

impl PolicyDefinition {
    /// Create a policy with no filters and no actions.
    pub fn new(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            description: None,
            filters: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Append a filter entry.
    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filters.push(filter);
        self
    }

    /// Append an action entry.
    pub fn with_action(mut self, action: Value) -> Self {
        self.actions.push(action);
        self
    }
}

/// A policy file: `policies: [...]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub policies: Vec<PolicyDefinition>,
}

impl PolicyFile {
    /// Load policies from a YAML or JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse policies from YAML (JSON is accepted as a YAML subset).
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let file: Self = serde_yaml::from_str(content)?;
        file.check_unique_names()?;
        Ok(file)
    }

    /// Get a policy by name.
    pub fn get(&self, name: &str) -> Option<&PolicyDefinition> {
        self.policies.iter().find(|p| p.name == name)
    }

    fn check_unique_names(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for policy in &self.policies {
            if !seen.insert(policy.name.as_str()) {
                return Err(ConfigError::Config(format!(
                    "duplicate policy name '{}'",
                    policy.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const POLICIES: &str = r#"
policies:
  - name: ims-deregister-test
    resource: huaweicloud.ims
    filters:
      - type: value
        key: name
        value: "test"
    actions:
      - deregister
  - name: ims-share-image
    resource: huaweicloud.ims
    actions:
      - type: set-permissions
        remove_projects: ["05e35909a28026fc2fd0c00c65df4426"]
"#;

    #[test]
    fn test_parse_policy_file() {
        let file = PolicyFile::from_yaml(POLICIES).unwrap();
        assert_eq!(file.policies.len(), 2);

        let first = file.get("ims-deregister-test").unwrap();
        assert_eq!(first.resource, "huaweicloud.ims");
        assert_eq!(
            first.filters,
            vec![json!({"type": "value", "key": "name", "value": "test"})]
        );
        assert_eq!(first.actions, vec![json!("deregister")]);

        let second = file.get("ims-share-image").unwrap();
        assert!(second.filters.is_empty());
        assert_eq!(second.actions[0]["type"], "set-permissions");
    }

    #[test]
    fn test_duplicate_policy_names_rejected() {
        let yaml = r#"
policies:
  - name: dup
    resource: huaweicloud.ims
  - name: dup
    resource: huaweicloud.ims
"#;
        let err = PolicyFile::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate policy name 'dup'"));
    }

    #[test]
    fn test_from_file_accepts_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"policies": [{{"name": "q", "resource": "huaweicloud.ims"}}]}}"#
        )
        .unwrap();

        let parsed = PolicyFile::from_file(file.path()).unwrap();
        assert_eq!(parsed.policies, vec![PolicyDefinition::new("q", "huaweicloud.ims")]);
    }

    #[test]
    fn test_missing_resource_is_an_error() {
        let yaml = "policies:\n  - name: broken\n";
        assert!(matches!(
            PolicyFile::from_yaml(yaml),
            Err(ConfigError::Yaml(_))
        ));
    }
}
