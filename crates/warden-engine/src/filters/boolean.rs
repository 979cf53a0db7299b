//! Boolean composition: `and`, `or`, `not`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use warden_core::Resource;
use warden_schema::TypeSchema;

use super::{Filter, FilterContext};
use crate::error::{ConfigurationError, EngineError};
use crate::registry::FilterLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

impl BooleanOp {
    pub const ALL: [BooleanOp; 3] = [BooleanOp::And, BooleanOp::Or, BooleanOp::Not];

    /// Recognize a block key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "and" => Some(BooleanOp::And),
            "or" => Some(BooleanOp::Or),
            "not" => Some(BooleanOp::Not),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BooleanOp::And => "and",
            BooleanOp::Or => "or",
            BooleanOp::Not => "not",
        }
    }
}

/// A block of nested filters.
#[derive(Debug)]
pub struct BooleanFilter {
    op: BooleanOp,
    children: Vec<Box<dyn Filter>>,
}

impl BooleanFilter {
    pub fn schema(op: BooleanOp) -> TypeSchema {
        TypeSchema::new(op.as_str())
            .property("filters", json!({"type": "array", "items": {"type": "object"}}))
            .required(&["filters"])
    }

    /// Build the block, loading every child through `loader`.
    pub fn from_config(
        op: BooleanOp,
        config: &Map<String, Value>,
        loader: &FilterLoader<'_>,
    ) -> Result<Self, ConfigurationError> {
        let entries = config
            .get("filters")
            .and_then(Value::as_array)
            .ok_or_else(|| ConfigurationError::InvalidFilterConfiguration {
                filter: op.as_str().to_string(),
                reason: "'filters' must be a list".to_string(),
            })?;

        let children = entries
            .iter()
            .map(|entry| loader.load(entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { op, children })
    }

    pub fn op(&self) -> BooleanOp {
        self.op
    }

    async fn and_chain(
        &self,
        mut resources: Vec<Resource>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<Resource>, EngineError> {
        for child in &self.children {
            if resources.is_empty() {
                break;
            }
            resources = child.process(resources, ctx).await?;
        }
        Ok(resources)
    }
}

fn identities(resources: &[Resource], id_field: &str) -> HashSet<String> {
    resources.iter().filter_map(|r| r.id(id_field)).collect()
}

#[async_trait]
impl Filter for BooleanFilter {
    fn kind(&self) -> &str {
        self.op.as_str()
    }

    async fn process(
        &self,
        resources: Vec<Resource>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<Resource>, EngineError> {
        let id_field = ctx.resource_type.id_field;

        match self.op {
            BooleanOp::And => self.and_chain(resources, ctx).await,
            BooleanOp::Or => {
                let mut matched = HashSet::new();
                for child in &self.children {
                    let survivors = child.process(resources.clone(), ctx).await?;
                    matched.extend(identities(&survivors, id_field));
                }
                Ok(resources
                    .into_iter()
                    .filter(|r| r.id(id_field).is_some_and(|id| matched.contains(&id)))
                    .collect())
            }
            BooleanOp::Not => {
                let survivors = self.and_chain(resources.clone(), ctx).await?;
                let excluded = identities(&survivors, id_field);
                Ok(resources
                    .into_iter()
                    .filter(|r| r.id(id_field).is_some_and(|id| !excluded.contains(&id)))
                    .collect())
            }
        }
    }
}
