//! Ordered filter evaluation.

use warden_core::Resource;

use crate::filters::{Filter, FilterContext};
use crate::report::{Diagnostic, RunState};

/// An ordered list of configured filters.
///
/// Each filter sees only the survivors of the previous one. A filter that
/// fails contributes zero matches; the failure is logged and recorded as a
/// diagnostic.
#[derive(Debug, Default)]
pub struct FilterPipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterPipeline {
    pub fn new(filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Kinds of the configured filters, in order.
    pub fn kinds(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.kind()).collect()
    }

    /// Narrow `resources` through every filter.
    pub async fn apply(&self, resources: Vec<Resource>, ctx: &FilterContext<'_>) -> Vec<Resource> {
        let mut survivors = resources;

        for filter in &self.filters {
            if survivors.is_empty() {
                break;
            }
            let before = survivors.len();

            survivors = match filter.process(survivors, ctx).await {
                Ok(matched) => matched,
                Err(e) => {
                    tracing::warn!(filter = %filter.kind(), error = %e, "Filter failed, no resources match");
                    ctx.diagnostics
                        .push(Diagnostic::new(RunState::Filtering, filter.kind(), e.to_string()));
                    Vec::new()
                }
            };

            tracing::debug!(filter = %filter.kind(), before, after = survivors.len(), "Applied filter");
        }

        survivors
    }
}
