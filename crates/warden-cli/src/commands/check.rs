//! Policy file validation.
//!
//! Loads every policy through the registry exactly as `run` would, without a
//! cloud client ever being called, and reports what would stop it from
//! running.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use warden_core::PolicyFile;
use warden_engine::{PolicyRunner, Registry, ReplayClient};

// ============================================================================
// Check Result Types
// ============================================================================

/// Severity of a check finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single finding from the check.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    pub policy: Option<String>,
    pub message: String,
}

impl CheckFinding {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            policy: None,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            policy: None,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            policy: None,
            message: message.into(),
        }
    }

    pub fn for_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }
}

/// Collected findings for one policy file.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub file: PathBuf,
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            findings: Vec::new(),
        }
    }

    pub fn add(&mut self, finding: CheckFinding) {
        self.findings.push(finding);
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    pub fn print_summary(&self) {
        println!("Checking {}", self.file.display());
        println!();

        for finding in &self.findings {
            print_finding(finding);
        }

        if !self.findings.is_empty() {
            println!();
        }

        if self.has_errors() {
            println!(
                "✗ {} error(s), {} warning(s)",
                self.error_count(),
                self.warning_count()
            );
        } else if self.warning_count() > 0 {
            println!("✓ Valid with {} warning(s)", self.warning_count());
        } else {
            println!("✓ All policies are valid");
        }
    }
}

fn print_finding(finding: &CheckFinding) {
    let icon = match finding.severity {
        Severity::Error => "✗",
        Severity::Warning => "⚠",
        Severity::Info => "ℹ",
    };
    let policy = finding
        .policy
        .as_deref()
        .map(|p| format!(" {}", p))
        .unwrap_or_default();
    println!("  {} [{}]{}: {}", icon, finding.severity, policy, finding.message);
}

// ============================================================================
// Check Command
// ============================================================================

/// Validate every policy in `path` against `registry`.
pub fn check_file(registry: &Registry, path: &Path) -> Result<CheckResults> {
    let file = PolicyFile::from_file(path)
        .with_context(|| format!("Failed to read policies from {}", path.display()))?;

    let mut results = CheckResults::new(path);
    if file.policies.is_empty() {
        results.add(CheckFinding::warning("file declares no policies"));
        return Ok(results);
    }

    let runner = PolicyRunner::new(registry, Arc::new(ReplayClient::new()));
    for policy in &file.policies {
        match runner.load(policy) {
            Ok(loaded) => {
                if loaded.action_kinds().is_empty() {
                    results.add(
                        CheckFinding::info("no actions; matches are only reported")
                            .for_policy(&policy.name),
                    );
                }
                tracing::debug!(
                    policy = %policy.name,
                    filters = ?loaded.filter_kinds(),
                    actions = ?loaded.action_kinds(),
                    "Policy loaded"
                );
            }
            Err(e) => results.add(CheckFinding::error(e.to_string()).for_policy(&policy.name)),
        }
    }

    Ok(results)
}

/// `warden check FILE`
pub fn run(registry: &Registry, path: &Path) -> Result<()> {
    let results = check_file(registry, path)?;
    results.print_summary();
    if results.has_errors() {
        anyhow::bail!("{} policy error(s) in {}", results.error_count(), path.display());
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        warden_ims::register(&mut registry).unwrap();
        registry
    }

    fn policy_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_policies_have_no_errors() {
        let file = policy_file(
            r#"
policies:
  - name: old-images
    resource: huaweicloud.ims
    filters:
      - type: image-age
        days: 90
    actions:
      - deregister
  - name: report-only
    resource: huaweicloud.ims
"#,
        );

        let results = check_file(&registry(), file.path()).unwrap();
        assert!(!results.has_errors());
        assert_eq!(results.findings.len(), 1);
        assert_eq!(results.findings[0].severity, Severity::Info);
        assert_eq!(results.findings[0].policy.as_deref(), Some("report-only"));
    }

    #[test]
    fn test_each_broken_policy_is_reported() {
        let file = policy_file(
            r#"
policies:
  - name: bad-resource
    resource: huaweicloud.nope
  - name: bad-option
    resource: huaweicloud.ims
    filters:
      - type: image-age
        days: -1
  - name: no-mode
    resource: huaweicloud.ims
    actions:
      - type: set-permissions
"#,
        );

        let results = check_file(&registry(), file.path()).unwrap();
        assert_eq!(results.error_count(), 3);
        let policies: Vec<_> = results
            .findings
            .iter()
            .filter_map(|f| f.policy.as_deref())
            .collect();
        assert_eq!(policies, vec!["bad-resource", "bad-option", "no-mode"]);
    }

    #[test]
    fn test_empty_file_warns() {
        let file = policy_file("policies: []\n");
        let results = check_file(&registry(), file.path()).unwrap();
        assert!(!results.has_errors());
        assert_eq!(results.warning_count(), 1);
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let err = check_file(&registry(), Path::new("/nonexistent/policies.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read policies"));
    }
}
