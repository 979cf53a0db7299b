//! Run results: per-resource outcomes, diagnostics and the run report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

use crate::client::ClientResponse;

/// Lifecycle of one policy run.
///
/// `Idle -> Enumerating -> Filtering -> Acting -> Reported`, with `Error`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Enumerating,
    Filtering,
    Acting,
    Reported,
    Error,
}

impl RunState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Reported | RunState::Error)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (from, Error) => !from.is_terminal(),
            (Idle, Enumerating) => true,
            (Enumerating, Filtering) => true,
            (Filtering, Acting) => true,
            (Acting, Reported) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Enumerating => "enumerating",
            RunState::Filtering => "filtering",
            RunState::Acting => "acting",
            RunState::Reported => "reported",
            RunState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Result of one action invocation against one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub resource_id: String,
    pub action: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Full response payload as returned by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    /// Outcome of a call that returned a response (success iff 2xx).
    pub fn from_response(
        resource_id: impl Into<String>,
        action: impl Into<String>,
        response: ClientResponse,
    ) -> Self {
        let success = response.is_success();
        Self {
            resource_id: resource_id.into(),
            action: action.into(),
            success,
            status_code: Some(response.status_code),
            payload: Some(response.payload),
            error: None,
        }
    }

    /// Outcome of a call that failed before producing a response.
    pub fn failed(
        resource_id: impl Into<String>,
        action: impl Into<String>,
        status_code: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            action: action.into(),
            success: false,
            status_code,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// A non-fatal problem observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Phase the problem occurred in.
    pub stage: RunState,
    /// Filter or action kind, or `enumerate`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: RunState, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            source: source.into(),
            resource_id: None,
            message: message.into(),
        }
    }

    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

/// Collector for diagnostics, shared by reference with filters.
#[derive(Debug, Default)]
pub struct Diagnostics(Mutex<Vec<Diagnostic>>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(diagnostic);
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

/// Report of one completed policy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub policy: String,
    pub resource_type: String,
    pub state: RunState,
    pub dry_run: bool,
    /// Number of resources returned by enumeration.
    pub enumerated: usize,
    /// Identities of the resources that survived filtering, in enumeration order.
    pub matched_resource_ids: Vec<String>,
    /// Outcomes per action, in filtered-resource order. Keyed by kind; a
    /// repeated kind is keyed `kind#2`, `kind#3`, ...
    pub per_action_outcomes: BTreeMap<String, Vec<Outcome>>,
    pub diagnostics: Vec<Diagnostic>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Outcomes recorded for one action kind.
    pub fn outcomes(&self, action: &str) -> &[Outcome] {
        self.per_action_outcomes
            .get(action)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of failed outcomes across all actions.
    pub fn failure_count(&self) -> usize {
        self.per_action_outcomes
            .values()
            .flatten()
            .filter(|o| !o.success)
            .count()
    }
}
