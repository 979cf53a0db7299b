//! Error types for the engine.
//!
//! Three categories with different propagation:
//! - [`ConfigurationError`]: found while loading a policy, aborts that run
//!   before any remote call
//! - [`RemoteCallError`]: one resource/operation pair failed, recorded and
//!   isolated
//! - [`DataError`]: a resource lacks data a filter needs, the resource is
//!   excluded from that filter's matches

use crate::client::ClientError;
use thiserror::Error;
use warden_schema::SchemaValidationError;

/// Any engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Remote(#[from] RemoteCallError),

    #[error(transparent)]
    Data(#[from] DataError),
}

impl EngineError {
    /// Whether this error was raised by the load-time validation gate.
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

/// Problems with declared configuration. Always detected before side effects.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A registry key was bound twice.
    #[error("{kind} '{key}' is already registered")]
    DuplicateKey { kind: &'static str, key: String },

    /// No resource type registered under this key.
    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),

    /// No filter registered under this key for the resource type.
    #[error("unknown filter '{key}' for resource type '{resource_type}'")]
    UnknownFilter { resource_type: String, key: String },

    /// No action registered under this key for the resource type.
    #[error("unknown action '{key}' for resource type '{resource_type}'")]
    UnknownAction { resource_type: String, key: String },

    /// A policy entry is neither a string nor a mapping of the expected form.
    #[error("invalid {kind} entry: {entry}")]
    InvalidEntry { kind: &'static str, entry: String },

    /// Options failed schema validation.
    #[error(transparent)]
    Schema(#[from] SchemaValidationError),

    /// Filter options passed the schema but cannot be used (e.g. a bad regex).
    #[error("invalid configuration for filter '{filter}': {reason}")]
    InvalidFilterConfiguration { filter: String, reason: String },

    /// Action options passed the schema but select no usable mode.
    #[error("invalid configuration for action '{action}': {reason}")]
    InvalidActionConfiguration { action: String, reason: String },

    /// The policy as a whole is malformed.
    #[error("invalid policy '{policy}': {reason}")]
    InvalidPolicy { policy: String, reason: String },
}

/// A remote call failed for one resource.
#[derive(Debug, Error)]
#[error("remote call '{operation}' failed for resource '{resource_id}': {source}")]
pub struct RemoteCallError {
    pub resource_id: String,
    pub operation: String,
    #[source]
    pub source: ClientError,
}

impl RemoteCallError {
    pub fn new(resource_id: impl Into<String>, operation: impl Into<String>, source: ClientError) -> Self {
        Self {
            resource_id: resource_id.into(),
            operation: operation.into(),
            source,
        }
    }
}

/// A resource lacks data a filter or the runner needs.
#[derive(Debug, Error)]
pub enum DataError {
    /// The timestamp field is absent or unparseable.
    #[error("resource '{resource_id}' has no usable '{field}' timestamp: {reason}")]
    InvalidAgeValue {
        resource_id: String,
        field: String,
        reason: String,
    },

    /// The identity field is absent.
    #[error("resource has no identity field '{field}'")]
    MissingIdentity { field: String },
}
