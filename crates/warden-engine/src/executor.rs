//! Applies one action to every matched resource.

use futures::future::join_all;
use tokio::sync::Semaphore;
use warden_core::{ExecutionConfig, Resource, ResourceTypeInfo};

use crate::actions::{Action, ActionContext};
use crate::client::CloudClient;
use crate::error::{DataError, RemoteCallError};
use crate::report::Outcome;

/// Runs per-resource invocations in parallel, bounded by
/// `execution.max_concurrency`. Outcomes come back in resource order.
pub struct ActionExecutor<'a> {
    client: &'a dyn CloudClient,
    execution: &'a ExecutionConfig,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(client: &'a dyn CloudClient, execution: &'a ExecutionConfig) -> Self {
        Self { client, execution }
    }

    /// Apply `action` to each resource. A failed call becomes a failed
    /// [`Outcome`] and never stops the remaining resources.
    pub async fn execute(
        &self,
        action: &dyn Action,
        resources: &[Resource],
        resource_type: &ResourceTypeInfo,
    ) -> Vec<Outcome> {
        let ctx = ActionContext {
            client: self.client,
            resource_type,
            timeout: self.execution.invoke_timeout(),
        };
        let semaphore = Semaphore::new(self.execution.concurrency());

        let invocations = resources
            .iter()
            .map(|resource| self.perform_one(action, resource, &ctx, &semaphore));

        join_all(invocations).await
    }

    async fn perform_one(
        &self,
        action: &dyn Action,
        resource: &Resource,
        ctx: &ActionContext<'_>,
        semaphore: &Semaphore,
    ) -> Outcome {
        let kind = action.kind();
        let Some(resource_id) = resource.id(ctx.resource_type.id_field) else {
            let err = DataError::MissingIdentity {
                field: ctx.resource_type.id_field.to_string(),
            };
            tracing::warn!(action = %kind, error = %err, "Skipping resource");
            return Outcome::failed("", kind, None, err.to_string());
        };

        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => return Outcome::failed(resource_id, kind, None, e.to_string()),
        };

        match action.perform(resource, &resource_id, ctx).await {
            Ok(response) => {
                if response.is_success() {
                    tracing::info!(
                        action = %kind,
                        resource_id = %resource_id,
                        status_code = response.status_code,
                        "Action succeeded"
                    );
                } else {
                    tracing::warn!(
                        action = %kind,
                        resource_id = %resource_id,
                        status_code = response.status_code,
                        "Action rejected by provider"
                    );
                }
                Outcome::from_response(resource_id, kind, response)
            }
            Err(e) => {
                let status_code = e.status_code();
                let err = RemoteCallError::new(&resource_id, action.operation(), e);
                tracing::warn!(
                    action = %kind,
                    resource_id = %resource_id,
                    operation = %err.operation,
                    error = %err,
                    "Action failed"
                );
                Outcome::failed(resource_id, kind, status_code, err.to_string())
            }
        }
    }
}
