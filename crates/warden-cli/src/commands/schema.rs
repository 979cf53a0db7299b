//! Registry introspection.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use warden_engine::Registry;
use warden_schema::{TypeSchema, definitions};

/// One registered resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceTypeEntry {
    pub key: String,
    pub service: String,
}

/// What `warden schema` prints, before rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaView {
    ResourceTypes(Vec<ResourceTypeEntry>),
    Keys { filters: Vec<String>, actions: Vec<String> },
    Schema(Value),
}

fn expanded(schema: &TypeSchema) -> Result<Value> {
    definitions::expand_refs(schema.type_name(), &schema.to_json())
        .with_context(|| format!("Failed to expand schema of '{}'", schema.type_name()))
}

/// Resolve the requested view from the registry.
pub fn view(
    registry: &Registry,
    resource: Option<&str>,
    filter: Option<&str>,
    action: Option<&str>,
) -> Result<SchemaView> {
    let Some(resource) = resource else {
        return Ok(SchemaView::ResourceTypes(
            registry
                .resource_types()
                .map(|(key, info)| ResourceTypeEntry {
                    key: key.to_string(),
                    service: info.service.to_string(),
                })
                .collect(),
        ));
    };

    if let Some(key) = filter {
        let factory = registry.filter(resource, key)?;
        return Ok(SchemaView::Schema(expanded(factory.schema())?));
    }
    if let Some(key) = action {
        let factory = registry.action(resource, key)?;
        return Ok(SchemaView::Schema(expanded(factory.schema())?));
    }

    Ok(SchemaView::Keys {
        filters: registry
            .filter_keys(resource)?
            .into_iter()
            .map(String::from)
            .collect(),
        actions: registry
            .action_keys(resource)?
            .into_iter()
            .map(String::from)
            .collect(),
    })
}

/// Render `view` for the terminal, or as one JSON document.
pub fn render(view: &SchemaView, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(view)?);
    }
    let mut out = String::new();
    match view {
        SchemaView::ResourceTypes(types) => {
            out.push_str("Resource types:\n");
            for entry in types {
                out.push_str(&format!("  {:<24} {}\n", entry.key, entry.service));
            }
        }
        SchemaView::Keys { filters, actions } => {
            out.push_str("Filters:\n");
            for key in filters {
                out.push_str(&format!("  {}\n", key));
            }
            out.push_str("Actions:\n");
            for key in actions {
                out.push_str(&format!("  {}\n", key));
            }
        }
        SchemaView::Schema(schema) => {
            out.push_str(&serde_json::to_string_pretty(schema)?);
            out.push('\n');
        }
    }
    Ok(out)
}

/// `warden schema [RESOURCE] [--filter KEY | --action KEY] [--json]`
pub fn run(
    registry: &Registry,
    resource: Option<&str>,
    filter: Option<&str>,
    action: Option<&str>,
    json: bool,
) -> Result<()> {
    let view = view(registry, resource, filter, action)?;
    print!("{}", render(&view, json)?);
    Ok(())
}
