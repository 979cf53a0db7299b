//! Registry of resource types, filters and actions.
//!
//! Populated once at startup by resource modules, then only read. Filter and
//! action keys are scoped per resource type, so `copy` can mean different
//! things for different types. The `value`, `and`, `or` and `not` filters are
//! available to every type unless a type registers its own under the same key.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use warden_core::ResourceTypeInfo;
use warden_schema::{SchemaValidationError, SchemaValidator, TypeSchema};

use crate::actions::{Action, normalize_action};
use crate::error::ConfigurationError;
use crate::filters::{BooleanFilter, BooleanOp, Filter, ValueFilter, normalize_filter};

type FilterBuild = dyn Fn(&Map<String, Value>, &FilterLoader<'_>) -> Result<Box<dyn Filter>, ConfigurationError>
    + Send
    + Sync;

type ActionBuild = dyn Fn(&Map<String, Value>) -> Result<Box<dyn Action>, ConfigurationError> + Send + Sync;

// ============================================================================
// Factories
// ============================================================================

/// Schema compiled on first use and cached.
struct CompiledSchema {
    schema: TypeSchema,
    validator: OnceLock<Result<SchemaValidator, SchemaValidationError>>,
}

impl CompiledSchema {
    fn new(schema: TypeSchema) -> Self {
        Self {
            schema,
            validator: OnceLock::new(),
        }
    }

    fn validator(&self) -> Result<&SchemaValidator, ConfigurationError> {
        self.validator
            .get_or_init(|| self.schema.compile())
            .as_ref()
            .map_err(|e| ConfigurationError::Schema(e.clone()))
    }

    fn validate(&self, options: &Map<String, Value>) -> Result<(), ConfigurationError> {
        self.validator()?.validate(&Value::Object(options.clone()))?;
        Ok(())
    }
}

/// Schema plus constructor for one filter kind.
pub struct FilterFactory {
    schema: CompiledSchema,
    build: Box<FilterBuild>,
}

impl FilterFactory {
    /// `build` receives options that already passed `schema`.
    pub fn new<F>(schema: TypeSchema, build: F) -> Self
    where
        F: Fn(&Map<String, Value>, &FilterLoader<'_>) -> Result<Box<dyn Filter>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            schema: CompiledSchema::new(schema),
            build: Box::new(build),
        }
    }

    pub fn schema(&self) -> &TypeSchema {
        &self.schema.schema
    }
}

impl fmt::Debug for FilterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFactory")
            .field("schema", self.schema())
            .finish_non_exhaustive()
    }
}

/// Schema plus constructor for one action kind.
pub struct ActionFactory {
    schema: CompiledSchema,
    build: Box<ActionBuild>,
}

impl ActionFactory {
    /// `build` receives options that already passed `schema`.
    pub fn new<F>(schema: TypeSchema, build: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Box<dyn Action>, ConfigurationError> + Send + Sync + 'static,
    {
        Self {
            schema: CompiledSchema::new(schema),
            build: Box::new(build),
        }
    }

    pub fn schema(&self) -> &TypeSchema {
        &self.schema.schema
    }
}

impl fmt::Debug for ActionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFactory")
            .field("schema", self.schema())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Builds nested filter entries for one resource type.
#[derive(Debug, Clone, Copy)]
pub struct FilterLoader<'a> {
    registry: &'a Registry,
    resource_type: &'a str,
}

impl<'a> FilterLoader<'a> {
    pub fn resource_type(&self) -> &'a str {
        self.resource_type
    }

    /// Normalize, validate and build one filter entry.
    pub fn load(&self, entry: &Value) -> Result<Box<dyn Filter>, ConfigurationError> {
        self.registry.build_filter(self.resource_type, entry)
    }
}

/// Process-wide registry.
#[derive(Debug)]
pub struct Registry {
    resource_types: BTreeMap<String, ResourceTypeInfo>,
    filters: BTreeMap<String, BTreeMap<String, FilterFactory>>,
    actions: BTreeMap<String, BTreeMap<String, ActionFactory>>,
    builtin_filters: BTreeMap<String, FilterFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry holding only the built-in filters.
    pub fn new() -> Self {
        let mut builtin_filters = BTreeMap::new();
        builtin_filters.insert(
            ValueFilter::TYPE.to_string(),
            FilterFactory::new(ValueFilter::schema(), |options, _| {
                Ok(Box::new(ValueFilter::from_config(ValueFilter::TYPE, options)?))
            }),
        );
        for op in BooleanOp::ALL {
            builtin_filters.insert(
                op.as_str().to_string(),
                FilterFactory::new(BooleanFilter::schema(op), move |options, loader| {
                    Ok(Box::new(BooleanFilter::from_config(op, options, loader)?))
                }),
            );
        }

        Self {
            resource_types: BTreeMap::new(),
            filters: BTreeMap::new(),
            actions: BTreeMap::new(),
            builtin_filters,
        }
    }

    /// Bind a resource type key to its descriptor.
    pub fn register_resource_type(
        &mut self,
        key: impl Into<String>,
        info: ResourceTypeInfo,
    ) -> Result<(), ConfigurationError> {
        let key = key.into();
        if self.resource_types.contains_key(&key) {
            return Err(ConfigurationError::DuplicateKey {
                kind: "resource type",
                key,
            });
        }
        tracing::debug!(resource_type = %key, service = info.service, "Registered resource type");
        self.resource_types.insert(key, info);
        Ok(())
    }

    /// Bind a filter key for one resource type. The schema is compiled here.
    pub fn register_filter(
        &mut self,
        resource_type: &str,
        key: impl Into<String>,
        factory: FilterFactory,
    ) -> Result<(), ConfigurationError> {
        self.resolve(resource_type)?;
        factory.schema.validator()?;

        let key = key.into();
        let scoped = self.filters.entry(resource_type.to_string()).or_default();
        if scoped.contains_key(&key) {
            return Err(ConfigurationError::DuplicateKey {
                kind: "filter",
                key: format!("{resource_type}.{key}"),
            });
        }
        scoped.insert(key, factory);
        Ok(())
    }

    /// Bind an action key for one resource type. The schema is compiled here.
    pub fn register_action(
        &mut self,
        resource_type: &str,
        key: impl Into<String>,
        factory: ActionFactory,
    ) -> Result<(), ConfigurationError> {
        self.resolve(resource_type)?;
        factory.schema.validator()?;

        let key = key.into();
        let scoped = self.actions.entry(resource_type.to_string()).or_default();
        if scoped.contains_key(&key) {
            return Err(ConfigurationError::DuplicateKey {
                kind: "action",
                key: format!("{resource_type}.{key}"),
            });
        }
        scoped.insert(key, factory);
        Ok(())
    }

    /// Descriptor of a registered resource type.
    pub fn resolve(&self, resource_type: &str) -> Result<&ResourceTypeInfo, ConfigurationError> {
        self.resource_types
            .get(resource_type)
            .ok_or_else(|| ConfigurationError::UnknownResourceType(resource_type.to_string()))
    }

    /// Filter factory for `key`, preferring the type's own registration.
    pub fn filter(&self, resource_type: &str, key: &str) -> Result<&FilterFactory, ConfigurationError> {
        self.resolve(resource_type)?;
        self.filters
            .get(resource_type)
            .and_then(|scoped| scoped.get(key))
            .or_else(|| self.builtin_filters.get(key))
            .ok_or_else(|| ConfigurationError::UnknownFilter {
                resource_type: resource_type.to_string(),
                key: key.to_string(),
            })
    }

    /// Action factory for `key`.
    pub fn action(&self, resource_type: &str, key: &str) -> Result<&ActionFactory, ConfigurationError> {
        self.resolve(resource_type)?;
        self.actions
            .get(resource_type)
            .and_then(|scoped| scoped.get(key))
            .ok_or_else(|| ConfigurationError::UnknownAction {
                resource_type: resource_type.to_string(),
                key: key.to_string(),
            })
    }

    /// Normalize, validate and build a filter entry.
    pub fn build_filter(
        &self,
        resource_type: &str,
        entry: &Value,
    ) -> Result<Box<dyn Filter>, ConfigurationError> {
        let (kind, options) = normalize_filter(entry)?;
        let factory = self.filter(resource_type, &kind)?;
        factory.schema.validate(&options)?;

        let loader = FilterLoader {
            registry: self,
            resource_type,
        };
        (factory.build)(&options, &loader)
    }

    /// Normalize, validate and build an action entry.
    pub fn build_action(
        &self,
        resource_type: &str,
        entry: &Value,
    ) -> Result<Box<dyn Action>, ConfigurationError> {
        let (kind, options) = normalize_action(entry)?;
        let factory = self.action(resource_type, &kind)?;
        factory.schema.validate(&options)?;
        (factory.build)(&options)
    }

    /// Registered resource types, sorted by key.
    pub fn resource_types(&self) -> impl Iterator<Item = (&str, &ResourceTypeInfo)> {
        self.resource_types.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Filter keys usable with `resource_type`, built-ins included.
    pub fn filter_keys(&self, resource_type: &str) -> Result<Vec<&str>, ConfigurationError> {
        self.resolve(resource_type)?;
        let mut keys: Vec<&str> = self
            .builtin_filters
            .keys()
            .chain(self.filters.get(resource_type).into_iter().flat_map(|m| m.keys()))
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    /// Action keys registered for `resource_type`.
    pub fn action_keys(&self, resource_type: &str) -> Result<Vec<&str>, ConfigurationError> {
        self.resolve(resource_type)?;
        Ok(self
            .actions
            .get(resource_type)
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================
