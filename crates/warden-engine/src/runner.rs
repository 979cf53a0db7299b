//! Policy orchestration: enumerate, filter, act, report.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use warden_core::{ExecutionConfig, PolicyDefinition, Resource, ResourceTypeInfo};

use crate::actions::Action;
use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::client::{CloudClient, enumerate_with_timeout};
use crate::error::{ConfigurationError, DataError, EngineError, RemoteCallError};
use crate::executor::ActionExecutor;
use crate::filters::FilterContext;
use crate::pipeline::FilterPipeline;
use crate::registry::Registry;
use crate::report::{Diagnostic, Diagnostics, Outcome, RunReport, RunState};

// ============================================================================
// Loaded Policies
// ============================================================================

/// A policy that passed the validation gate.
#[derive(Debug)]
pub struct LoadedPolicy {
    name: String,
    resource_type_key: String,
    resource_type: ResourceTypeInfo,
    pipeline: FilterPipeline,
    actions: Vec<Box<dyn Action>>,
    /// Report key of each action, parallel to `actions`.
    outcome_keys: Vec<String>,
}

impl LoadedPolicy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type_key
    }

    pub fn filter_kinds(&self) -> Vec<&str> {
        self.pipeline.kinds()
    }

    pub fn action_kinds(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.kind()).collect()
    }

    /// Keys under which each action's outcomes are reported.
    pub fn outcome_keys(&self) -> &[String] {
        &self.outcome_keys
    }
}

/// The first action of a kind is reported under the kind itself; later ones
/// of the same kind get `#2`, `#3`, ...
fn outcome_keys(actions: &[Box<dyn Action>]) -> Vec<String> {
    let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
    actions
        .iter()
        .map(|action| {
            let count = seen.entry(action.kind()).or_default();
            *count += 1;
            match *count {
                1 => action.kind().to_string(),
                n => format!("{}#{}", action.kind(), n),
            }
        })
        .collect()
}

// ============================================================================
// Runner
// ============================================================================

/// Logs every phase change of one run.
struct RunTracker<'a> {
    policy: &'a str,
    state: RunState,
}

impl<'a> RunTracker<'a> {
    fn new(policy: &'a str) -> Self {
        Self {
            policy,
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::info!(policy = %self.policy, from = %self.state, to = %next, "Run state changed");
        self.state = next;
    }
}

/// Runs policies against one client.
///
/// The registry is borrowed read-only; many runners may share it.
pub struct PolicyRunner<'r> {
    registry: &'r Registry,
    client: Arc<dyn CloudClient>,
    execution: ExecutionConfig,
    audit: Arc<dyn AuditSink>,
    clock: Option<DateTime<Utc>>,
}

impl<'r> PolicyRunner<'r> {
    pub fn new(registry: &'r Registry, client: Arc<dyn CloudClient>) -> Self {
        Self {
            registry,
            client,
            execution: ExecutionConfig::default(),
            audit: Arc::new(TracingAuditSink),
            clock: None,
        }
    }

    pub fn with_execution(mut self, execution: ExecutionConfig) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Pin the reference time used by age filters.
    pub fn with_clock(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    /// Validate `policy` and build its filters and actions. No remote calls.
    pub fn load(&self, policy: &PolicyDefinition) -> Result<LoadedPolicy, ConfigurationError> {
        if policy.name.trim().is_empty() {
            return Err(ConfigurationError::InvalidPolicy {
                policy: policy.name.clone(),
                reason: "name must not be empty".to_string(),
            });
        }

        let resource_type = *self.registry.resolve(&policy.resource)?;

        let filters = policy
            .filters
            .iter()
            .map(|entry| self.registry.build_filter(&policy.resource, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let actions = policy
            .actions
            .iter()
            .map(|entry| self.registry.build_action(&policy.resource, entry))
            .collect::<Result<Vec<_>, _>>()?;

        let outcome_keys = outcome_keys(&actions);
        Ok(LoadedPolicy {
            name: policy.name.clone(),
            resource_type_key: policy.resource.clone(),
            resource_type,
            pipeline: FilterPipeline::new(filters),
            actions,
            outcome_keys,
        })
    }

    /// Load and run `policy`.
    ///
    /// Configuration errors are returned before any remote call. An
    /// enumeration failure also aborts the run; every later failure is
    /// recorded in the report instead.
    pub async fn run(&self, policy: &PolicyDefinition) -> Result<RunReport, EngineError> {
        let loaded = self.load(policy).map_err(|e| {
            tracing::error!(policy = %policy.name, error = %e, "Policy failed validation");
            e
        })?;
        self.execute(&loaded).await
    }

    /// Run an already loaded policy.
    pub async fn execute(&self, policy: &LoadedPolicy) -> Result<RunReport, EngineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let now = self.clock.unwrap_or(started_at);
        let client = self.client.as_ref();
        let diagnostics = Diagnostics::new();
        let mut tracker = RunTracker::new(&policy.name);

        tracing::info!(
            run_id = %run_id,
            policy = %policy.name,
            resource_type = %policy.resource_type_key,
            dry_run = self.execution.dry_run,
            "Starting policy run"
        );

        tracker.advance(RunState::Enumerating);
        let enum_spec = &policy.resource_type.enum_spec;
        let resources = match enumerate_with_timeout(client, enum_spec, self.execution.invoke_timeout()).await {
            Ok(resources) => resources,
            Err(e) => {
                tracker.advance(RunState::Error);
                let err = RemoteCallError::new(&policy.resource_type_key, enum_spec.operation, e);
                tracing::error!(policy = %policy.name, error = %err, "Enumeration failed");
                return Err(err.into());
            }
        };
        let enumerated = resources.len();
        let resources = self.with_identity(resources, &policy.resource_type, &diagnostics);

        tracker.advance(RunState::Filtering);
        let ctx = FilterContext {
            client,
            resource_type: &policy.resource_type,
            execution: &self.execution,
            now,
            diagnostics: &diagnostics,
        };
        let matched = policy.pipeline.apply(resources, &ctx).await;
        let id_field = policy.resource_type.id_field;
        let matched_resource_ids: Vec<String> = matched.iter().filter_map(|r| r.id(id_field)).collect();
        tracing::info!(
            policy = %policy.name,
            enumerated,
            matched = matched_resource_ids.len(),
            "Filtering complete"
        );

        tracker.advance(RunState::Acting);
        let mut per_action_outcomes: BTreeMap<String, Vec<Outcome>> = BTreeMap::new();
        let executor = ActionExecutor::new(client, &self.execution);
        for (action, key) in policy.actions.iter().zip(&policy.outcome_keys) {
            let slot = per_action_outcomes.entry(key.clone()).or_default();
            if self.execution.dry_run || matched.is_empty() {
                continue;
            }

            let outcomes = executor
                .execute(action.as_ref(), &matched, &policy.resource_type)
                .await;
            for outcome in &outcomes {
                self.audit.record(AuditEvent::from_outcome(
                    run_id,
                    &policy.name,
                    &policy.resource_type_key,
                    outcome,
                ));
            }
            slot.extend(outcomes);
        }

        tracker.advance(RunState::Reported);
        let report = RunReport {
            run_id,
            policy: policy.name.clone(),
            resource_type: policy.resource_type_key.clone(),
            state: tracker.state,
            dry_run: self.execution.dry_run,
            enumerated,
            matched_resource_ids,
            per_action_outcomes,
            diagnostics: diagnostics.into_vec(),
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            run_id = %run_id,
            policy = %report.policy,
            failures = report.failure_count(),
            "Policy run complete"
        );
        Ok(report)
    }

    /// Drop resources without an identity, recording each as a diagnostic.
    fn with_identity(
        &self,
        resources: Vec<Resource>,
        resource_type: &ResourceTypeInfo,
        diagnostics: &Diagnostics,
    ) -> Vec<Resource> {
        resources
            .into_iter()
            .filter(|resource| {
                if resource.id(resource_type.id_field).is_some() {
                    return true;
                }
                let err = DataError::MissingIdentity {
                    field: resource_type.id_field.to_string(),
                };
                tracing::debug!(error = %err, "Dropping enumerated resource");
                diagnostics.push(Diagnostic::new(RunState::Enumerating, "enumerate", err.to_string()));
                false
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionContext;
    use crate::audit::MemoryAuditSink;
    use crate::client::replay::{RecordedResponse, ReplayClient};
    use crate::client::{ClientError, ClientResponse};
    use crate::registry::ActionFactory;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use warden_core::EnumSpec;
    use warden_schema::TypeSchema;

    const TYPE_INFO: ResourceTypeInfo = ResourceTypeInfo {
        service: "ims",
        enum_spec: EnumSpec {
            operation: "list_images",
            result_key: "images",
            client: "ims",
        },
        id_field: "id",
        tag_resource_type: None,
    };

    #[derive(Debug)]
    struct Delete;

    #[async_trait]
    impl Action for Delete {
        fn kind(&self) -> &str {
            "delete"
        }

        fn operation(&self) -> &str {
            "delete_image"
        }

        async fn perform(
            &self,
            _resource: &Resource,
            resource_id: &str,
            ctx: &ActionContext<'_>,
        ) -> Result<ClientResponse, ClientError> {
            ctx.invoke(self.operation(), json!({ "image_id": resource_id })).await
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_resource_type("test.image", TYPE_INFO).unwrap();
        registry
            .register_action(
                "test.image",
                "delete",
                ActionFactory::new(TypeSchema::new("delete"), |_| Ok(Box::new(Delete))),
            )
            .unwrap();
        registry
    }

    fn client() -> ReplayClient {
        ReplayClient::new()
            .with_resources(
                "list_images",
                vec![
                    json!({"id": "a", "name": "keep"}),
                    json!({"name": "no identity"}),
                    json!({"id": "b", "name": "drop"}),
                    json!({"id": "c", "name": "drop"}),
                ],
            )
            .with_response(RecordedResponse::new("delete_image", 204, Value::Null))
    }

    #[test]
    fn test_load_rejects_before_any_call() {
        let registry = registry();
        let client = Arc::new(client());
        let runner = PolicyRunner::new(&registry, client.clone());

        let unknown_type = PolicyDefinition::new("p", "test.bucket");
        assert!(matches!(
            runner.load(&unknown_type).unwrap_err(),
            ConfigurationError::UnknownResourceType(_)
        ));

        let unknown_action = PolicyDefinition::new("p", "test.image").with_action(json!("copy"));
        assert!(matches!(
            runner.load(&unknown_action).unwrap_err(),
            ConfigurationError::UnknownAction { .. }
        ));

        let unnamed = PolicyDefinition::new(" ", "test.image");
        assert!(matches!(
            runner.load(&unnamed).unwrap_err(),
            ConfigurationError::InvalidPolicy { .. }
        ));

        assert_eq!(client.enumerations(), 0);
        assert!(client.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_run_filters_and_acts() {
        let registry = registry();
        let client = Arc::new(client());
        let audit = Arc::new(MemoryAuditSink::new());
        let runner = PolicyRunner::new(&registry, client.clone()).with_audit_sink(audit.clone());

        let policy = PolicyDefinition::new("cleanup", "test.image")
            .with_filter(json!({"name": "drop"}))
            .with_action(json!("delete"));
        let report = runner.run(&policy).await.unwrap();

        assert_eq!(report.state, RunState::Reported);
        assert_eq!(report.enumerated, 4);
        assert_eq!(report.matched_resource_ids, vec!["b", "c"]);
        assert_eq!(report.outcomes("delete").len(), 2);
        assert_eq!(report.failure_count(), 0);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].stage, RunState::Enumerating);

        assert_eq!(client.enumerations(), 1);
        assert_eq!(client.invocations_of("delete_image").len(), 2);
        assert_eq!(audit.events().len(), 2);
        assert!(audit.events().iter().all(|e| e.run_id == report.run_id));
    }

    #[tokio::test]
    async fn test_empty_filter_list_matches_everything() {
        let registry = registry();
        let runner = PolicyRunner::new(&registry, Arc::new(client()));

        let report = runner
            .run(&PolicyDefinition::new("all", "test.image"))
            .await
            .unwrap();
        assert_eq!(report.matched_resource_ids, vec!["a", "b", "c"]);
        assert!(report.per_action_outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_reports_empty_outcomes() {
        let registry = registry();
        let client = Arc::new(client());
        let runner = PolicyRunner::new(&registry, client.clone()).with_execution(ExecutionConfig {
            dry_run: true,
            ..ExecutionConfig::default()
        });

        let policy = PolicyDefinition::new("cleanup", "test.image").with_action(json!("delete"));
        let report = runner.run(&policy).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.matched_resource_ids.len(), 3);
        assert!(report.outcomes("delete").is_empty());
        assert!(report.per_action_outcomes.contains_key("delete"));
        assert!(client.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_enumeration_failure_aborts() {
        #[derive(Debug)]
        struct Unreachable;

        #[async_trait]
        impl CloudClient for Unreachable {
            async fn enumerate(&self, _spec: &EnumSpec) -> Result<Vec<Resource>, ClientError> {
                Err(ClientError::Transport("connection refused".to_string()))
            }

            async fn invoke(&self, operation: &str, _body: Value) -> Result<ClientResponse, ClientError> {
                Err(ClientError::Transport(format!("unexpected call to {operation}")))
            }
        }

        let registry = registry();
        let runner = PolicyRunner::new(&registry, Arc::new(Unreachable));
        let err = runner
            .run(&PolicyDefinition::new("p", "test.image"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Remote(_)));
        assert!(err.to_string().contains("list_images"));
    }

    #[tokio::test]
    async fn test_fixed_clock_is_used_by_age_filters() {
        use crate::filters::AgeFilter;
        use crate::registry::FilterFactory;

        let mut registry = registry();
        registry
            .register_filter(
                "test.image",
                "age",
                FilterFactory::new(AgeFilter::schema("age"), |options, _| {
                    Ok(Box::new(AgeFilter::from_config("age", "created_at", options)?))
                }),
            )
            .unwrap();

        let client = ReplayClient::new().with_resources(
            "list_images",
            vec![
                json!({"id": "old", "created_at": "2020-01-01T00:00:00Z"}),
                json!({"id": "new", "created_at": "2020-03-01T00:00:00Z"}),
            ],
        );
        let now = "2020-03-02T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let runner = PolicyRunner::new(&registry, Arc::new(client)).with_clock(now);

        let policy = PolicyDefinition::new("old", "test.image")
            .with_filter(json!({"type": "age", "days": 30}));
        let report = runner.run(&policy).await.unwrap();
        assert_eq!(report.matched_resource_ids, vec!["old"]);
    }

    #[tokio::test]
    async fn test_repeated_action_kinds_are_reported_apart() {
        let registry = registry();
        let client = Arc::new(client());
        let runner = PolicyRunner::new(&registry, client.clone());

        let policy = PolicyDefinition::new("twice", "test.image")
            .with_filter(json!({"id": "a"}))
            .with_action(json!("delete"))
            .with_action(json!("delete"));
        let loaded = runner.load(&policy).unwrap();
        assert_eq!(loaded.outcome_keys(), ["delete", "delete#2"]);

        let report = runner.execute(&loaded).await.unwrap();
        assert_eq!(report.per_action_outcomes.len(), 2);
        assert_eq!(report.outcomes("delete").len(), 1);
        assert_eq!(report.outcomes("delete#2").len(), 1);
        assert_eq!(client.invocations_of("delete_image").len(), 2);
    }
}
