//! A client that serves recorded fixtures.
//!
//! Fixture format (JSON or YAML):
//!
//! ```json
//! {
//!   "resources": { "list_images": [ { "id": "...", "name": "test" } ] },
//!   "responses": [
//!     { "operation": "glance_delete_image", "status_code": 204 },
//!     { "operation": "glance_list_image_members", "resource_id": "abc",
//!       "payload": { "members": [ { "member_id": "p1" } ] } },
//!     { "operation": "batch_add_members", "error": "quota exceeded", "status_code": 400 }
//!   ]
//! }
//! ```
//!
//! A response with `resource_id` only answers requests whose body mentions that
//! id; it takes precedence over a response without one. Every invocation is
//! recorded.

use super::{ClientError, ClientResponse, CloudClient, Invocation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use warden_core::{ConfigError, EnumSpec, Resource};

/// Recorded enumeration results and operation responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFixture {
    /// Resources per list operation.
    #[serde(default)]
    pub resources: HashMap<String, Vec<Value>>,

    /// Canned responses.
    #[serde(default)]
    pub responses: Vec<RecordedResponse>,
}

/// One canned response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedResponse {
    pub operation: String,

    /// Only answer requests mentioning this resource id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(default = "default_status_code")]
    pub status_code: u16,

    #[serde(default)]
    pub payload: Value,

    /// Fail the call with this message instead of responding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Delay before answering, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

impl RecordedResponse {
    pub fn new(operation: impl Into<String>, status_code: u16, payload: Value) -> Self {
        Self {
            operation: operation.into(),
            resource_id: None,
            status_code,
            payload,
            error: None,
            delay_ms: 0,
        }
    }

    /// Restrict this response to requests mentioning `resource_id`.
    pub fn for_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Fail instead of responding.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Delay the answer.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    fn answers(&self, body: &Value) -> bool {
        match &self.resource_id {
            Some(id) => mentions(body, id),
            None => true,
        }
    }
}

fn default_status_code() -> u16 {
    200
}

/// Whether `id` appears as a string anywhere in `value`.
fn mentions(value: &Value, id: &str) -> bool {
    match value {
        Value::String(s) => s == id,
        Value::Array(items) => items.iter().any(|v| mentions(v, id)),
        Value::Object(map) => map.values().any(|v| mentions(v, id)),
        _ => false,
    }
}

/// Fixture-backed [`CloudClient`].
#[derive(Debug, Default)]
pub struct ReplayClient {
    fixture: ReplayFixture,
    invocations: Mutex<Vec<Invocation>>,
    enumerations: AtomicUsize,
}

impl ReplayClient {
    /// Create a client with no recorded data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client serving `fixture`.
    pub fn from_fixture(fixture: ReplayFixture) -> Self {
        Self {
            fixture,
            ..Self::default()
        }
    }

    /// Load a fixture file (JSON or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let fixture: ReplayFixture = serde_yaml::from_str(&content)?;
        Ok(Self::from_fixture(fixture))
    }

    /// Add resources returned by the list operation `operation`.
    pub fn with_resources(mut self, operation: impl Into<String>, resources: Vec<Value>) -> Self {
        self.fixture
            .resources
            .entry(operation.into())
            .or_default()
            .extend(resources);
        self
    }

    /// Add a canned response.
    pub fn with_response(mut self, response: RecordedResponse) -> Self {
        self.fixture.responses.push(response);
        self
    }

    /// Every invocation so far, in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Invocations of one operation.
    pub fn invocations_of(&self, operation: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|i| i.operation == operation)
            .collect()
    }

    /// Number of enumeration calls so far.
    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    fn lookup(&self, operation: &str, body: &Value) -> Option<&RecordedResponse> {
        let candidates = || {
            self.fixture
                .responses
                .iter()
                .filter(move |r| r.operation == operation && r.answers(body))
        };
        candidates()
            .find(|r| r.resource_id.is_some())
            .or_else(|| candidates().next())
    }
}

#[async_trait]
impl CloudClient for ReplayClient {
    async fn enumerate(&self, spec: &EnumSpec) -> Result<Vec<Resource>, ClientError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);

        let records = self
            .fixture
            .resources
            .get(spec.operation)
            .cloned()
            .unwrap_or_default();

        records
            .into_iter()
            .map(|record| {
                Resource::from_value(record).ok_or_else(|| ClientError::MalformedResponse {
                    operation: spec.operation.to_string(),
                    message: format!("'{}' entries must be objects", spec.result_key),
                })
            })
            .collect()
    }

    async fn invoke(&self, operation: &str, body: Value) -> Result<ClientResponse, ClientError> {
        let recorded = self.lookup(operation, &body).cloned();

        self.invocations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Invocation {
                operation: operation.to_string(),
                body,
            });

        let Some(recorded) = recorded else {
            return Err(ClientError::Request {
                operation: operation.to_string(),
                status_code: 404,
                message: "no recorded response".to_string(),
            });
        };

        if recorded.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(recorded.delay_ms)).await;
        }

        match recorded.error {
            Some(message) => Err(ClientError::Request {
                operation: operation.to_string(),
                status_code: recorded.status_code,
                message,
            }),
            None => Ok(ClientResponse::new(recorded.status_code, recorded.payload)),
        }
    }
}
