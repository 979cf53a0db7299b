//! Execution limits for policy runs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Filtering and Acting phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum number of remote calls in flight for one action or one
    /// lookup-bearing filter.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Timeout applied to every remote call, in seconds.
    #[serde(default = "default_invoke_timeout_secs")]
    pub invoke_timeout_secs: u64,

    /// Stop after filtering; no action is invoked.
    #[serde(default)]
    pub dry_run: bool,
}

impl ExecutionConfig {
    /// Effective concurrency bound (never zero).
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    /// Remote call timeout (never below one second).
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs.max(1))
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            invoke_timeout_secs: default_invoke_timeout_secs(),
            dry_run: false,
        }
    }
}

fn default_max_concurrency() -> usize {
    8
}

fn default_invoke_timeout_secs() -> u64 {
    30
}
