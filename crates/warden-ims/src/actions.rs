//! Image actions.
//!
//! Options are deserialized into typed structs once, when the policy is
//! loaded. Multi-mode actions pick their mode there too, so a policy that
//! selects no mode fails before any image is touched.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use warden_core::Resource;
use warden_engine::{Action, ActionContext, ActionFactory, ClientError, ClientResponse, ConfigurationError, Registry};
use warden_schema::TypeSchema;

use crate::resource::RESOURCE_TYPE;

// ============================================================================
// Registration
// ============================================================================

fn string() -> Value {
    json!({"type": "string"})
}

fn string_list() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), ConfigurationError> {
    registry.register_action(
        RESOURCE_TYPE,
        Deregister::TYPE,
        ActionFactory::new(Deregister::schema(), |_| Ok(Box::new(Deregister))),
    )?;
    registry.register_action(
        RESOURCE_TYPE,
        SetPermissions::TYPE,
        ActionFactory::new(SetPermissions::schema(), |options| {
            Ok(Box::new(SetPermissions::from_config(options)?))
        }),
    )?;
    registry.register_action(
        RESOURCE_TYPE,
        CancelLaunchPermission::TYPE,
        ActionFactory::new(CancelLaunchPermission::schema(), |options| {
            Ok(Box::new(CancelLaunchPermission::from_config(options)?))
        }),
    )?;
    registry.register_action(
        RESOURCE_TYPE,
        CopyImage::TYPE,
        ActionFactory::new(CopyImage::schema(), |options| {
            Ok(Box::new(CopyImage::from_config(options)?))
        }),
    )?;
    Ok(())
}

fn parse_options<T: DeserializeOwned>(action: &str, options: &Map<String, Value>) -> Result<T, ConfigurationError> {
    serde_json::from_value(Value::Object(options.clone())).map_err(|e| {
        ConfigurationError::InvalidActionConfiguration {
            action: action.to_string(),
            reason: e.to_string(),
        }
    })
}

fn insert_some(body: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        body.insert(key.to_string(), json!(value));
    }
}

// ============================================================================
// deregister
// ============================================================================

/// Deletes the image.
///
/// ```yaml
/// actions:
///   - deregister
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Deregister;

impl Deregister {
    pub const TYPE: &'static str = "deregister";
    const OPERATION: &'static str = "glance_delete_image";

    pub fn schema() -> TypeSchema {
        TypeSchema::new(Self::TYPE)
    }
}

#[async_trait]
impl Action for Deregister {
    fn kind(&self) -> &str {
        Self::TYPE
    }

    fn operation(&self) -> &str {
        Self::OPERATION
    }

    async fn perform(
        &self,
        _resource: &Resource,
        resource_id: &str,
        ctx: &ActionContext<'_>,
    ) -> Result<ClientResponse, ClientError> {
        ctx.invoke(Self::OPERATION, json!({ "image_id": resource_id, "body": {} }))
            .await
    }
}

// ============================================================================
// set-permissions
// ============================================================================

/// Whether `set-permissions` shares or unshares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberMode {
    Add,
    Remove,
}

#[derive(Debug, Default, Deserialize)]
struct SetPermissionsOptions {
    #[serde(default)]
    add_projects: Option<Vec<String>>,
    #[serde(default)]
    remove_projects: Option<Vec<String>>,
}

/// Shares an image with projects, or stops sharing it.
///
/// Exactly one of `add_projects` / `remove_projects` takes effect; when both
/// are populated `add_projects` wins.
///
/// ```yaml
/// actions:
///   - type: set-permissions
///     remove_projects: ["05e35909a28026fc2fd0c00c65df4426"]
/// ```
#[derive(Debug, Clone)]
pub struct SetPermissions {
    mode: MemberMode,
    projects: Vec<String>,
}

impl SetPermissions {
    pub const TYPE: &'static str = "set-permissions";

    pub fn schema() -> TypeSchema {
        TypeSchema::new(Self::TYPE)
            .property("add_projects", string_list())
            .property("remove_projects", string_list())
    }

    pub fn from_config(options: &Map<String, Value>) -> Result<Self, ConfigurationError> {
        let parsed: SetPermissionsOptions = parse_options(Self::TYPE, options)?;
        let populated = |list: Option<Vec<String>>| list.filter(|l| !l.is_empty());

        let (mode, projects) = match (populated(parsed.add_projects), populated(parsed.remove_projects)) {
            (Some(projects), _) => (MemberMode::Add, projects),
            (None, Some(projects)) => (MemberMode::Remove, projects),
            (None, None) => {
                return Err(ConfigurationError::InvalidActionConfiguration {
                    action: Self::TYPE.to_string(),
                    reason: "one of 'add_projects' or 'remove_projects' must be a non-empty list".to_string(),
                });
            }
        };
        Ok(Self { mode, projects })
    }

    pub fn mode(&self) -> MemberMode {
        self.mode
    }
}

#[async_trait]
impl Action for SetPermissions {
    fn kind(&self) -> &str {
        Self::TYPE
    }

    fn operation(&self) -> &str {
        match self.mode {
            MemberMode::Add => "batch_add_members",
            MemberMode::Remove => "batch_delete_members",
        }
    }

    async fn perform(
        &self,
        _resource: &Resource,
        resource_id: &str,
        ctx: &ActionContext<'_>,
    ) -> Result<ClientResponse, ClientError> {
        let body = json!({
            "body": {
                "images": [resource_id],
                "projects": self.projects,
            }
        });
        ctx.invoke(self.operation(), body).await
    }
}

// ============================================================================
// cancel-launch-permission
// ============================================================================

/// Answer to a sharing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchStatus {
    Accepted,
    Rejected,
}

impl LaunchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LaunchStatus::Accepted => "accepted",
            LaunchStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Deserialize)]
struct CancelLaunchOptions {
    status: LaunchStatus,
    project_id: String,
    #[serde(default)]
    vault_id: Option<String>,
}

/// Accepts or rejects an image shared with `project_id`.
///
/// ```yaml
/// actions:
///   - type: cancel-launch-permission
///     status: rejected
///     project_id: 05e35909a28026fc2fd0c00c65df4426
/// ```
#[derive(Debug, Clone)]
pub struct CancelLaunchPermission {
    status: LaunchStatus,
    project_id: String,
    vault_id: Option<String>,
}

impl CancelLaunchPermission {
    pub const TYPE: &'static str = "cancel-launch-permission";
    const OPERATION: &'static str = "batch_update_members";

    pub fn schema() -> TypeSchema {
        TypeSchema::new(Self::TYPE)
            .property("status", json!({"type": "string", "enum": ["accepted", "rejected"]}))
            .property("project_id", string())
            .property("vault_id", string())
            .required(&["status", "project_id"])
    }

    pub fn from_config(options: &Map<String, Value>) -> Result<Self, ConfigurationError> {
        let parsed: CancelLaunchOptions = parse_options(Self::TYPE, options)?;
        Ok(Self {
            status: parsed.status,
            project_id: parsed.project_id,
            vault_id: parsed.vault_id,
        })
    }
}

#[async_trait]
impl Action for CancelLaunchPermission {
    fn kind(&self) -> &str {
        Self::TYPE
    }

    fn operation(&self) -> &str {
        Self::OPERATION
    }

    async fn perform(
        &self,
        _resource: &Resource,
        resource_id: &str,
        ctx: &ActionContext<'_>,
    ) -> Result<ClientResponse, ClientError> {
        let mut body = Map::new();
        body.insert("images".to_string(), json!([resource_id]));
        body.insert("project_id".to_string(), json!(self.project_id));
        body.insert("status".to_string(), json!(self.status.as_str()));
        insert_some(&mut body, "vault_id", &self.vault_id);

        ctx.invoke(Self::OPERATION, json!({ "body": body })).await
    }
}

// ============================================================================
// copy
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct CopyOptions {
    name: Option<String>,
    description: Option<String>,
    enterprise_project_id: Option<String>,
    cmk_id: Option<String>,
    target_region: Option<String>,
    project_name: Option<String>,
    agency_name: Option<String>,
}

/// Where `copy` puts the new image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyMode {
    InRegion,
    CrossRegion {
        region: String,
        project_name: String,
        agency_name: Option<String>,
    },
}

/// Copies an image, in the same region or into `target_region`.
///
/// ```yaml
/// actions:
///   - type: copy
///     name: nightly-copy
///     description: nightly backup
/// ```
#[derive(Debug, Clone)]
pub struct CopyImage {
    mode: CopyMode,
    name: Option<String>,
    description: Option<String>,
    enterprise_project_id: Option<String>,
    cmk_id: Option<String>,
}

impl CopyImage {
    pub const TYPE: &'static str = "copy";

    pub fn schema() -> TypeSchema {
        TypeSchema::new(Self::TYPE)
            .property("name", string())
            .property("description", string())
            .property("enterprise_project_id", string())
            .property("cmk_id", string())
            .property("target_region", string())
            .property("project_name", string())
            .property("agency_name", string())
    }

    pub fn from_config(options: &Map<String, Value>) -> Result<Self, ConfigurationError> {
        let parsed: CopyOptions = parse_options(Self::TYPE, options)?;

        let mode = match parsed.target_region {
            None => CopyMode::InRegion,
            Some(region) => {
                let project_name =
                    parsed
                        .project_name
                        .ok_or_else(|| ConfigurationError::InvalidActionConfiguration {
                            action: Self::TYPE.to_string(),
                            reason: "'target_region' requires 'project_name'".to_string(),
                        })?;
                if parsed.enterprise_project_id.is_some() {
                    return Err(ConfigurationError::InvalidActionConfiguration {
                        action: Self::TYPE.to_string(),
                        reason: "'enterprise_project_id' only applies to in-region copies".to_string(),
                    });
                }
                CopyMode::CrossRegion {
                    region,
                    project_name,
                    agency_name: parsed.agency_name,
                }
            }
        };

        Ok(Self {
            mode,
            name: parsed.name,
            description: parsed.description,
            enterprise_project_id: parsed.enterprise_project_id,
            cmk_id: parsed.cmk_id,
        })
    }

    pub fn mode(&self) -> &CopyMode {
        &self.mode
    }

    fn request_body(&self) -> Map<String, Value> {
        let mut body = Map::new();
        match &self.mode {
            CopyMode::InRegion => {
                insert_some(&mut body, "name", &self.name);
                insert_some(&mut body, "description", &self.description);
                insert_some(&mut body, "enterprise_project_id", &self.enterprise_project_id);
                insert_some(&mut body, "cmk_id", &self.cmk_id);
            }
            CopyMode::CrossRegion {
                region,
                project_name,
                agency_name,
            } => {
                body.insert("region".to_string(), json!(region));
                body.insert("project_name".to_string(), json!(project_name));
                insert_some(&mut body, "agency_name", agency_name);
                insert_some(&mut body, "name", &self.name);
                insert_some(&mut body, "description", &self.description);
                insert_some(&mut body, "cmk_id", &self.cmk_id);
            }
        }
        body
    }
}

#[async_trait]
impl Action for CopyImage {
    fn kind(&self) -> &str {
        Self::TYPE
    }

    fn operation(&self) -> &str {
        match self.mode {
            CopyMode::InRegion => "copy_image_in_region",
            CopyMode::CrossRegion { .. } => "copy_image_cross_region",
        }
    }

    async fn perform(
        &self,
        _resource: &Resource,
        resource_id: &str,
        ctx: &ActionContext<'_>,
    ) -> Result<ClientResponse, ClientError> {
        let body = json!({ "image_id": resource_id, "body": self.request_body() });
        ctx.invoke(self.operation(), body).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn options(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_set_permissions_mode_selection() {
        let add = SetPermissions::from_config(&options(json!({"add_projects": ["p1"]}))).unwrap();
        assert_eq!(add.mode(), MemberMode::Add);
        assert_eq!(add.operation(), "batch_add_members");

        let remove = SetPermissions::from_config(&options(json!({"remove_projects": ["p1"]}))).unwrap();
        assert_eq!(remove.mode(), MemberMode::Remove);
        assert_eq!(remove.operation(), "batch_delete_members");

        let both = SetPermissions::from_config(&options(
            json!({"add_projects": ["p1"], "remove_projects": ["p2"]}),
        ))
        .unwrap();
        assert_eq!(both.mode(), MemberMode::Add);

        let empty_add = SetPermissions::from_config(&options(
            json!({"add_projects": [], "remove_projects": ["p2"]}),
        ))
        .unwrap();
        assert_eq!(empty_add.mode(), MemberMode::Remove);
    }

    #[test]
    fn test_set_permissions_requires_a_mode() {
        for config in [json!({}), json!({"add_projects": [], "remove_projects": []})] {
            let err = SetPermissions::from_config(&options(config)).unwrap_err();
            assert!(matches!(
                err,
                ConfigurationError::InvalidActionConfiguration { .. }
            ));
        }
    }

    #[test]
    fn test_cancel_launch_permission_schema() {
        let validator = CancelLaunchPermission::schema().compile().unwrap();
        assert!(
            validator
                .validate(&json!({"type": "cancel-launch-permission", "status": "rejected", "project_id": "p"}))
                .is_ok()
        );
        assert!(
            validator
                .validate(&json!({"type": "cancel-launch-permission", "status": "ignored", "project_id": "p"}))
                .is_err()
        );
        assert!(
            validator
                .validate(&json!({"type": "cancel-launch-permission", "status": "accepted"}))
                .is_err()
        );
    }

    #[test]
    fn test_copy_modes() {
        let in_region = CopyImage::from_config(&options(json!({"name": "copy", "description": "123"}))).unwrap();
        assert_eq!(in_region.mode(), &CopyMode::InRegion);
        assert_eq!(
            Value::Object(in_region.request_body()),
            json!({"name": "copy", "description": "123"})
        );

        let cross = CopyImage::from_config(&options(json!({
            "name": "copy",
            "target_region": "cn-north-4",
            "project_name": "cn-north-4",
            "agency_name": "ims_admin_agency"
        })))
        .unwrap();
        assert_eq!(cross.operation(), "copy_image_cross_region");
        assert_eq!(
            Value::Object(cross.request_body()),
            json!({
                "region": "cn-north-4",
                "project_name": "cn-north-4",
                "agency_name": "ims_admin_agency",
                "name": "copy"
            })
        );
    }

    #[test]
    fn test_cross_region_copy_requires_project() {
        let err = CopyImage::from_config(&options(json!({"target_region": "cn-north-4"}))).unwrap_err();
        assert!(err.to_string().contains("project_name"));
    }

    #[test]
    fn test_cross_region_copy_rejects_enterprise_project() {
        let err = CopyImage::from_config(&options(json!({
            "target_region": "cn-north-4",
            "project_name": "cn-north-4",
            "enterprise_project_id": "0"
        })))
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidActionConfiguration { .. }));
        assert!(err.to_string().contains("enterprise_project_id"));

        let in_region = CopyImage::from_config(&options(json!({"enterprise_project_id": "0"}))).unwrap();
        assert_eq!(
            Value::Object(in_region.request_body()),
            json!({"enterprise_project_id": "0"})
        );
    }
}
