//! Image filters.
//!
//! ```yaml
//! filters:
//!   - type: image-age
//!     days: 30
//!   - type: image-attribute
//!     attribute: status
//!     key: Value
//!     value: active
//!   - type: cross-account
//!     list: ["05e35909a28026fc2fd0c00c65df4426"]
//! ```

use serde_json::{Value, json};
use std::sync::Arc;
use warden_engine::filters::{AgeFilter, AttributeFilter, CrossAccountFilter, Exposure, MembershipLookup};
use warden_engine::{ClientError, ConfigurationError, FilterFactory, Registry};

use crate::resource::RESOURCE_TYPE;

pub const IMAGE_AGE: &str = "image-age";
pub const IMAGE_ATTRIBUTE: &str = "image-attribute";
pub const CROSS_ACCOUNT: &str = "cross-account";

/// Field holding the creation timestamp.
const DATE_ATTRIBUTE: &str = "created_at";

/// Attributes `image-attribute` may project.
pub const VALID_ATTRIBUTES: &[&str] = &["virtual_env_type", "status", "disk_format", "__os_type"];

const ATTRIBUTE_PREFIX: &str = "image:attribute-";

/// Only private and shared images can have members.
pub const IMAGE_EXPOSURE: Exposure = Exposure {
    field: "__imagetype",
    candidates: &["private", "shared"],
};

/// Member lookup via `glance_list_image_members`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageMembers;

impl MembershipLookup for ImageMembers {
    fn operation(&self) -> &str {
        "glance_list_image_members"
    }

    fn request(&self, resource_id: &str) -> Value {
        json!({ "image_id": resource_id })
    }

    fn members(&self, payload: &Value) -> Result<Vec<String>, ClientError> {
        let members = match payload.get("members") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(members)) => members,
            Some(other) => {
                return Err(ClientError::MalformedResponse {
                    operation: self.operation().to_string(),
                    message: format!("'members' must be a list, found {other}"),
                });
            }
        };

        members
            .iter()
            .map(|member| {
                member
                    .get("member_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ClientError::MalformedResponse {
                        operation: self.operation().to_string(),
                        message: format!("member without 'member_id': {member}"),
                    })
            })
            .collect()
    }
}

pub(crate) fn register(registry: &mut Registry) -> Result<(), ConfigurationError> {
    registry.register_filter(
        RESOURCE_TYPE,
        IMAGE_AGE,
        FilterFactory::new(AgeFilter::days_schema(IMAGE_AGE), |options, _| {
            Ok(Box::new(AgeFilter::from_config(IMAGE_AGE, DATE_ATTRIBUTE, options)?))
        }),
    )?;
    registry.register_filter(
        RESOURCE_TYPE,
        IMAGE_ATTRIBUTE,
        FilterFactory::new(
            AttributeFilter::schema(IMAGE_ATTRIBUTE, VALID_ATTRIBUTES),
            |options, _| {
                Ok(Box::new(AttributeFilter::from_config(
                    IMAGE_ATTRIBUTE,
                    ATTRIBUTE_PREFIX,
                    options,
                )?))
            },
        ),
    )?;
    registry.register_filter(
        RESOURCE_TYPE,
        CROSS_ACCOUNT,
        FilterFactory::new(CrossAccountFilter::schema(CROSS_ACCOUNT), |options, _| {
            Ok(Box::new(CrossAccountFilter::from_config(
                CROSS_ACCOUNT,
                IMAGE_EXPOSURE,
                Arc::new(ImageMembers),
                options,
            )?))
        }),
    )?;
    Ok(())
}
