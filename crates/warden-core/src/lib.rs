//! # warden-core
//!
//! Types shared across all Warden crates:
//!
//! - [`Resource`]: one remote object, a structured record with an identity field
//! - [`ResourceTypeInfo`]: static metadata describing how a resource type is enumerated
//! - [`PolicyDefinition`] / [`PolicyFile`]: declared resource type + filters + actions
//! - [`config`]: runtime configuration loaded from `warden.yaml`

pub mod config;
pub mod policy;
pub mod resource;

pub use config::{
    ConfigError, ExecutionConfig, LoggingConfig, ProviderConfig, WardenConfig,
};
pub use policy::{PolicyDefinition, PolicyFile};
pub use resource::{EnumSpec, Resource, ResourceTypeInfo};
