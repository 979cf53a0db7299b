//! Actions: configuration-driven operations applied to each matched resource.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::fmt;
use std::time::Duration;
use warden_core::{Resource, ResourceTypeInfo};

use crate::client::{ClientError, ClientResponse, CloudClient, invoke_with_timeout};
use crate::error::ConfigurationError;

/// What an action may use while acting on one resource.
pub struct ActionContext<'a> {
    pub client: &'a dyn CloudClient,
    pub resource_type: &'a ResourceTypeInfo,
    /// Network-level timeout applied to every call.
    pub timeout: Duration,
}

impl ActionContext<'_> {
    /// Invoke `operation` with the configured timeout.
    pub async fn invoke(&self, operation: &str, body: Value) -> Result<ClientResponse, ClientError> {
        invoke_with_timeout(self.client, operation, body, self.timeout).await
    }
}

/// A configured action.
///
/// Configuration problems (including mode selection for multi-mode actions)
/// are resolved when the action is built; `perform` only talks to the client.
#[async_trait]
pub trait Action: Send + Sync + fmt::Debug {
    /// The kind this action was registered under.
    fn kind(&self) -> &str;

    /// Remote operation `perform` invokes.
    fn operation(&self) -> &str;

    /// Apply the action to one resource and return the raw response.
    async fn perform(
        &self,
        resource: &Resource,
        resource_id: &str,
        ctx: &ActionContext<'_>,
    ) -> Result<ClientResponse, ClientError>;
}

/// Normalize a policy action entry into `(kind, options)`.
///
/// A bare string `deregister` means `{type: deregister}`.
pub fn normalize_action(entry: &Value) -> Result<(String, Map<String, Value>), ConfigurationError> {
    let invalid = || ConfigurationError::InvalidEntry {
        kind: "action",
        entry: entry.to_string(),
    };

    match entry {
        Value::String(kind) => {
            let mut options = Map::new();
            options.insert("type".to_string(), json!(kind));
            Ok((kind.clone(), options))
        }
        Value::Object(map) => {
            let kind = map.get("type").and_then(Value::as_str).ok_or_else(invalid)?;
            Ok((kind.to_string(), map.clone()))
        }
        _ => Err(invalid()),
    }
}
