//! Cross-account exposure filters.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use warden_core::Resource;
use warden_schema::TypeSchema;

use super::{Filter, FilterContext};
use crate::client::{ClientError, invoke_with_timeout};
use crate::error::{ConfigurationError, EngineError, RemoteCallError};
use crate::report::{Diagnostic, RunState};

/// How to fetch the accounts a resource is shared with.
pub trait MembershipLookup: Send + Sync + fmt::Debug {
    /// Remote operation to invoke.
    fn operation(&self) -> &str;

    /// Request body for one resource.
    fn request(&self, resource_id: &str) -> Value;

    /// Extract member account ids from a successful response payload.
    fn members(&self, payload: &Value) -> Result<Vec<String>, ClientError>;
}

/// Which resources can be shared at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exposure {
    /// Field holding the sharing category.
    pub field: &'static str,
    /// Categories worth a membership lookup.
    pub candidates: &'static [&'static str],
}

impl Exposure {
    fn is_candidate(&self, resource: &Resource) -> bool {
        resource
            .get(self.field)
            .and_then(Value::as_str)
            .is_some_and(|category| self.candidates.contains(&category))
    }
}

/// Matches resources shared with at least one account outside `list`.
///
/// An absent or empty allow-list matches nothing. Resources outside the
/// candidate categories are skipped without a remote call. A failed lookup
/// excludes that resource and is recorded as a diagnostic.
#[derive(Debug, Clone)]
pub struct CrossAccountFilter {
    kind: String,
    allowed: BTreeSet<String>,
    exposure: Exposure,
    lookup: Arc<dyn MembershipLookup>,
}

impl CrossAccountFilter {
    pub fn schema(type_name: &str) -> TypeSchema {
        TypeSchema::new(type_name).property("list", json!({"type": "array", "items": {"type": "string"}}))
    }

    pub fn from_config(
        kind: &str,
        exposure: Exposure,
        lookup: Arc<dyn MembershipLookup>,
        config: &Map<String, Value>,
    ) -> Result<Self, ConfigurationError> {
        let allowed = match config.get("list") {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        ConfigurationError::InvalidFilterConfiguration {
                            filter: kind.to_string(),
                            reason: format!("'list' entries must be strings, found {item}"),
                        }
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(ConfigurationError::InvalidFilterConfiguration {
                    filter: kind.to_string(),
                    reason: format!("'list' must be an array, found {other}"),
                });
            }
        };

        Ok(Self {
            kind: kind.to_string(),
            allowed,
            exposure,
            lookup,
        })
    }

    pub fn allowed(&self) -> &BTreeSet<String> {
        &self.allowed
    }

    /// Whether any member falls outside the allow-list.
    fn exposed(&self, members: &[String]) -> bool {
        members.iter().any(|member| !self.allowed.contains(member))
    }

    async fn lookup_members(
        &self,
        resource_id: &str,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<String>, RemoteCallError> {
        let operation = self.lookup.operation();
        let fail = |e: ClientError| RemoteCallError::new(resource_id, operation, e);

        let response = invoke_with_timeout(
            ctx.client,
            operation,
            self.lookup.request(resource_id),
            ctx.execution.invoke_timeout(),
        )
        .await
        .map_err(fail)?
        .error_for_status(operation)
        .map_err(fail)?;

        self.lookup.members(&response.payload).map_err(fail)
    }

    async fn check(
        &self,
        resource: Resource,
        semaphore: &Semaphore,
        ctx: &FilterContext<'_>,
    ) -> Option<Resource> {
        let resource_id = resource.id(ctx.resource_type.id_field)?;

        let members = {
            let _permit = semaphore.acquire().await.ok()?;
            self.lookup_members(&resource_id, ctx).await
        };

        match members {
            Ok(members) => {
                let exposed = !members.is_empty() && self.exposed(&members);
                exposed.then_some(resource)
            }
            Err(e) => {
                tracing::warn!(
                    filter = %self.kind,
                    resource_id = %resource_id,
                    operation = %e.operation,
                    error = %e,
                    "Membership lookup failed, excluding resource"
                );
                ctx.diagnostics.push(
                    Diagnostic::new(RunState::Filtering, self.kind.clone(), e.to_string())
                        .with_resource(resource_id),
                );
                None
            }
        }
    }
}

#[async_trait]
impl Filter for CrossAccountFilter {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn process(
        &self,
        resources: Vec<Resource>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<Resource>, EngineError> {
        if self.allowed.is_empty() {
            tracing::debug!(filter = %self.kind, "Empty allow-list, nothing to compare");
            return Ok(Vec::new());
        }

        let candidates: Vec<Resource> = resources
            .into_iter()
            .filter(|r| self.exposure.is_candidate(r))
            .collect();

        let semaphore = Semaphore::new(ctx.execution.concurrency());
        let checks = candidates
            .into_iter()
            .map(|resource| self.check(resource, &semaphore, ctx));

        Ok(join_all(checks).await.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::replay::{RecordedResponse, ReplayClient};
    use crate::report::Diagnostics;
    use chrono::Utc;
    use std::time::Duration;
    use warden_core::{EnumSpec, ExecutionConfig, ResourceTypeInfo};

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

    const EXPOSURE: Exposure = Exposure {
        field: "__imagetype",
        candidates: &["private", "shared"],
    };

    #[derive(Debug)]
    struct Members;

    impl MembershipLookup for Members {
        fn operation(&self) -> &str {
            "list_members"
        }

        fn request(&self, resource_id: &str) -> Value {
            json!({ "image_id": resource_id })
        }

        fn members(&self, payload: &Value) -> Result<Vec<String>, ClientError> {
            Ok(payload["members"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|m| m.as_str().map(str::to_string))
                .collect())
        }
    }

    fn filter(list: Value) -> CrossAccountFilter {
        let config = json!({ "list": list });
        CrossAccountFilter::from_config("cross-account", EXPOSURE, Arc::new(Members), config.as_object().unwrap())
            .unwrap()
    }

    fn images() -> Vec<Resource> {
        vec![
            Resource::from_value(json!({"id": "img-1", "__imagetype": "private"})).unwrap(),
            Resource::from_value(json!({"id": "img-2", "__imagetype": "gold"})).unwrap(),
            Resource::from_value(json!({"id": "img-3", "__imagetype": "shared"})).unwrap(),
        ]
    }

    async fn run(filter: &CrossAccountFilter, client: &ReplayClient) -> (Vec<String>, Diagnostics) {
        run_with(filter, client, ExecutionConfig::default()).await
    }

    async fn run_with(
        filter: &CrossAccountFilter,
        client: &ReplayClient,
        execution: ExecutionConfig,
    ) -> (Vec<String>, Diagnostics) {
        let diagnostics = Diagnostics::new();
        let ctx = FilterContext {
            client,
            resource_type: &TYPE_INFO,
            execution: &execution,
            now: Utc::now(),
            diagnostics: &diagnostics,
        };
        let matched = filter.process(images(), &ctx).await.unwrap();
        let ids = matched.iter().filter_map(|r| r.id("id")).collect();
        (ids, diagnostics)
    }

    #[tokio::test]
    async fn test_empty_allow_list_matches_nothing() {
        let client = ReplayClient::new()
            .with_response(RecordedResponse::new("list_members", 200, json!({"members": ["x"]})));

        let (ids, _) = run(&filter(json!([])), &client).await;
        assert!(ids.is_empty());
        assert!(client.invocations().is_empty());

        let absent = CrossAccountFilter::from_config("cross-account", EXPOSURE, Arc::new(Members), &Map::new())
            .unwrap();
        let (ids, _) = run(&absent, &client).await;
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_matches_outside_members_and_skips_non_candidates() {
        let client = ReplayClient::new()
            .with_response(
                RecordedResponse::new("list_members", 200, json!({"members": ["trusted", "stranger"]}))
                    .for_resource("img-1"),
            )
            .with_response(
                RecordedResponse::new("list_members", 200, json!({"members": ["trusted"]}))
                    .for_resource("img-3"),
            );

        let (ids, diagnostics) = run(&filter(json!(["trusted"])), &client).await;
        assert_eq!(ids, vec!["img-1".to_string()]);
        assert!(diagnostics.is_empty());

        // the "gold" image never triggers a lookup
        assert_eq!(client.invocations_of("list_members").len(), 2);
    }

    #[tokio::test]
    async fn test_empty_member_list_is_not_exposed() {
        let client = ReplayClient::new()
            .with_response(RecordedResponse::new("list_members", 200, json!({"members": []})));

        let (ids, _) = run(&filter(json!(["trusted"])), &client).await;
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_isolated() {
        let client = ReplayClient::new()
            .with_response(
                RecordedResponse::new("list_members", 500, Value::Null)
                    .for_resource("img-1")
                    .failing("internal error"),
            )
            .with_response(
                RecordedResponse::new("list_members", 200, json!({"members": ["stranger"]}))
                    .for_resource("img-3"),
            );

        let (ids, diagnostics) = run(&filter(json!(["trusted"])), &client).await;
        assert_eq!(ids, vec!["img-3".to_string()]);

        let diagnostics = diagnostics.into_vec();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].resource_id.as_deref(), Some("img-1"));
        assert_eq!(diagnostics[0].stage, RunState::Filtering);
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_failure() {
        let client = ReplayClient::new()
            .with_response(RecordedResponse::new("list_members", 403, json!({"error": "denied"})));

        let (ids, diagnostics) = run(&filter(json!(["trusted"])), &client).await;
        assert!(ids.is_empty());
        assert_eq!(diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out_alone() {
        let client = ReplayClient::new()
            .with_response(
                RecordedResponse::new("list_members", 200, json!({"members": ["stranger"]}))
                    .for_resource("img-1")
                    .delayed(Duration::from_secs(5)),
            )
            .with_response(
                RecordedResponse::new("list_members", 200, json!({"members": ["stranger"]}))
                    .for_resource("img-3"),
            );
        let execution = ExecutionConfig {
            invoke_timeout_secs: 1,
            ..ExecutionConfig::default()
        };

        let (ids, diagnostics) = run_with(&filter(json!(["trusted"])), &client, execution).await;
        assert_eq!(ids, vec!["img-3".to_string()]);

        let diagnostics = diagnostics.into_vec();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].resource_id.as_deref(), Some("img-1"));
        assert_eq!(diagnostics[0].stage, RunState::Filtering);
        assert!(diagnostics[0].message.contains("timed out"));
    }
}
