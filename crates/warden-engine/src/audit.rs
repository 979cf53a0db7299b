//! Audit trail of action outcomes.

use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

use crate::report::Outcome;

/// One action outcome, tagged with its run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub run_id: Uuid,
    pub policy: String,
    pub resource_type: String,
    pub action: String,
    pub resource_id: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn from_outcome(run_id: Uuid, policy: &str, resource_type: &str, outcome: &Outcome) -> Self {
        Self {
            run_id,
            policy: policy.to_string(),
            resource_type: resource_type.to_string(),
            action: outcome.action.clone(),
            resource_id: outcome.resource_id.clone(),
            success: outcome.success,
            status_code: outcome.status_code,
            error: outcome.error.clone(),
        }
    }
}

/// Trait boundary for outcome persistence. Storage lives outside the engine.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Emits every event as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "warden::audit",
            run_id = %event.run_id,
            policy = %event.policy,
            resource_type = %event.resource_type,
            action = %event.action,
            resource_id = %event.resource_id,
            success = event.success,
            status_code = ?event.status_code,
            error = ?event.error,
            "Action outcome"
        );
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientResponse;
    use serde_json::json;

    #[test]
    fn test_memory_sink_records_outcomes() {
        let sink = MemoryAuditSink::new();
        let run_id = Uuid::new_v4();
        let ok = Outcome::from_response("img-1", "deregister", ClientResponse::new(204, json!({})));
        let failed = Outcome::failed("img-2", "deregister", Some(500), "internal error");

        sink.record(AuditEvent::from_outcome(run_id, "cleanup", "huaweicloud.ims", &ok));
        sink.record(AuditEvent::from_outcome(run_id, "cleanup", "huaweicloud.ims", &failed));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].success);
        assert_eq!(events[1].status_code, Some(500));
        assert_eq!(events[1].error.as_deref(), Some("internal error"));
        assert!(events.iter().all(|e| e.run_id == run_id));
    }
}
