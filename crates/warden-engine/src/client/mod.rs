//! The boundary to the cloud SDK.
//!
//! The engine only needs two calls: list the resources of a type, and invoke
//! a named operation with a JSON request body. Retries belong to the client
//! implementation; the engine applies a timeout and reports failures.

pub mod replay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use warden_core::{EnumSpec, Resource};

/// Response of one remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub status_code: u16,
    #[serde(default)]
    pub payload: Value,
}

impl ClientResponse {
    pub fn new(status_code: u16, payload: Value) -> Self {
        Self {
            status_code,
            payload,
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Turn a non-2xx response into a [`ClientError::Request`].
    pub fn error_for_status(self, operation: &str) -> Result<Self, ClientError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ClientError::Request {
            operation: operation.to_string(),
            status_code: self.status_code,
            message: self.payload.to_string(),
        })
    }
}

/// One recorded remote invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub operation: String,
    pub body: Value,
}

/// Errors raised by the client layer.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The provider rejected the request.
    #[error("request '{operation}' failed with status {status_code}: {message}")]
    Request {
        operation: String,
        status_code: u16,
        message: String,
    },

    /// No response within the configured timeout.
    #[error("request '{operation}' timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The response could not be interpreted.
    #[error("malformed response for '{operation}': {message}")]
    MalformedResponse { operation: String, message: String },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    /// Status code reported by the provider, if the request got that far.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Request { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Cloud client used by the engine.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// List every resource described by `spec`. Called once per policy run.
    async fn enumerate(&self, spec: &EnumSpec) -> Result<Vec<Resource>, ClientError>;

    /// Invoke a named operation.
    async fn invoke(&self, operation: &str, body: Value) -> Result<ClientResponse, ClientError>;
}

/// Invoke `operation`, failing with [`ClientError::Timeout`] after `timeout`.
pub async fn invoke_with_timeout(
    client: &dyn CloudClient,
    operation: &str,
    body: Value,
    timeout: Duration,
) -> Result<ClientResponse, ClientError> {
    match tokio::time::timeout(timeout, client.invoke(operation, body)).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            operation: operation.to_string(),
            after: timeout,
        }),
    }
}

/// Enumerate, failing with [`ClientError::Timeout`] after `timeout`.
pub async fn enumerate_with_timeout(
    client: &dyn CloudClient,
    spec: &EnumSpec,
    timeout: Duration,
) -> Result<Vec<Resource>, ClientError> {
    match tokio::time::timeout(timeout, client.enumerate(spec)).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            operation: spec.operation.to_string(),
            after: timeout,
        }),
    }
}
