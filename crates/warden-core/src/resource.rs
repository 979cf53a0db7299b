//! Resource records and resource type descriptors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One remote object as returned by the client layer.
///
/// Resources are materialized fresh on every enumeration. Filters may attach
/// derived annotation fields (for example `image:attribute-status`) which later
/// filters read; nothing else mutates them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Map<String, Value>);

impl Resource {
    /// Create an empty resource.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a resource from a JSON value. Returns `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Get a top-level field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolve a dotted path (`a.b.0.c`) through nested objects and arrays.
    ///
    /// A key that exists verbatim at the top level wins over path splitting, so
    /// annotation keys containing dots still resolve.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.0.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The identity of this resource, read from `id_field`.
    ///
    /// Strings are returned as-is and numbers are stringified; anything else
    /// has no usable identity.
    pub fn id(&self, id_field: &str) -> Option<String> {
        match self.0.get(id_field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Attach a derived annotation field.
    pub fn annotate(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Resource {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// How the client layer lists resources of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnumSpec {
    /// Remote list operation (e.g. `list_images`).
    pub operation: &'static str,
    /// Key of the result array in the list response (e.g. `images`).
    pub result_key: &'static str,
    /// Client/service name the operation belongs to.
    pub client: &'static str,
}

/// Static metadata for a resource type. Registered once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceTypeInfo {
    /// Service identifier (e.g. `ims`).
    pub service: &'static str,
    /// Enumeration call descriptor.
    pub enum_spec: EnumSpec,
    /// Name of the identity field on every resource.
    pub id_field: &'static str,
    /// Label used when tagging resources of this type, if taggable.
    pub tag_resource_type: Option<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image() -> Resource {
        Resource::from_value(json!({
            "id": "2d25ed0b-0392-4921-b457-d1451809a07c",
            "name": "test",
            "size": 40,
            "tags": [{"key": "env", "value": "prod"}],
            "image:attribute-status": {"Value": "active"}
        }))
        .unwrap()
    }

    #[test]
    fn test_id_from_string_and_number() {
        let r = image();
        assert_eq!(
            r.id("id").as_deref(),
            Some("2d25ed0b-0392-4921-b457-d1451809a07c")
        );
        assert_eq!(r.id("size").as_deref(), Some("40"));
        assert_eq!(r.id("tags"), None);
        assert_eq!(r.id("missing"), None);
    }

    #[test]
    fn test_get_path_nested() {
        let r = image();
        assert_eq!(r.get_path("tags.0.key"), Some(&json!("env")));
        assert_eq!(r.get_path("tags.3.key"), None);
        assert_eq!(r.get_path("name.inner"), None);
    }

    #[test]
    fn test_get_path_prefers_verbatim_key() {
        let r = image();
        assert_eq!(
            r.get_path("image:attribute-status"),
            Some(&json!({"Value": "active"}))
        );
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(Resource::from_value(json!([1, 2])).is_none());
        assert!(Resource::from_value(json!("id")).is_none());
    }

    #[test]
    fn test_annotate() {
        let mut r = image();
        r.annotate("derived", json!({"Value": 1}));
        assert_eq!(r.get("derived"), Some(&json!({"Value": 1})));
    }
}
