//! Policy execution against a replay fixture.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use warden_core::{PolicyDefinition, PolicyFile, WardenConfig};
use warden_engine::{
    CloudClient, PolicyRunner, Registry, ReplayClient, RunReport, TracingAuditSink,
};

/// Options for `warden run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub policy_file: PathBuf,
    pub replay: PathBuf,
    pub dry_run: bool,
    pub policy: Option<String>,
    pub output: Option<PathBuf>,
}

fn select<'a>(file: &'a PolicyFile, name: Option<&str>) -> Result<Vec<&'a PolicyDefinition>> {
    match name {
        Some(name) => {
            let policy = file
                .get(name)
                .with_context(|| format!("No policy named '{}'", name))?;
            Ok(vec![policy])
        }
        None => Ok(file.policies.iter().collect()),
    }
}

/// Load, validate and run the selected policies. Every policy is validated
/// before the first one runs.
pub async fn execute(
    registry: &Registry,
    config: &WardenConfig,
    client: Arc<dyn CloudClient>,
    options: &RunOptions,
) -> Result<Vec<RunReport>> {
    let file = PolicyFile::from_file(&options.policy_file).with_context(|| {
        format!("Failed to read policies from {}", options.policy_file.display())
    })?;
    let selected = select(&file, options.policy.as_deref())?;

    let mut execution = config.execution.clone();
    execution.dry_run |= options.dry_run;

    let runner = PolicyRunner::new(registry, client)
        .with_execution(execution)
        .with_audit_sink(Arc::new(TracingAuditSink));

    let loaded = selected
        .iter()
        .map(|policy| {
            runner
                .load(policy)
                .with_context(|| format!("Policy '{}' is invalid", policy.name))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut reports = Vec::with_capacity(loaded.len());
    for policy in &loaded {
        let report = runner
            .execute(policy)
            .await
            .with_context(|| format!("Policy '{}' failed", policy.name()))?;
        reports.push(report);
    }
    Ok(reports)
}

/// `warden run FILE --replay FIXTURE`
pub async fn run(registry: &Registry, config: &WardenConfig, options: RunOptions) -> Result<()> {
    let client = ReplayClient::from_file(&options.replay).with_context(|| {
        format!("Failed to load replay fixture {}", options.replay.display())
    })?;

    let reports = execute(registry, config, Arc::new(client), &options).await?;
    let failures: usize = reports.iter().map(RunReport::failure_count).sum();

    let rendered = serde_json::to_string_pretty(&reports)?;
    match &options.output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write reports to {}", path.display()))?;
            tracing::info!(path = %path.display(), reports = reports.len(), "Reports written");
        }
        None => println!("{}", rendered),
    }

    if failures > 0 {
        tracing::warn!(failures, "Some actions failed; see per-action outcomes");
    }
    Ok(())
}
