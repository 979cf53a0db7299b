//! # warden-ims
//!
//! The `huaweicloud.ims` resource type: private and shared machine images.
//!
//! | Kind | Key | Remote operation |
//! |------|-----|------------------|
//! | action | `deregister` | `glance_delete_image` |
//! | action | `set-permissions` | `batch_add_members` / `batch_delete_members` |
//! | action | `cancel-launch-permission` | `batch_update_members` |
//! | action | `copy` | `copy_image_in_region` / `copy_image_cross_region` |
//! | filter | `image-age` | none |
//! | filter | `image-attribute` | none |
//! | filter | `cross-account` | `glance_list_image_members` per candidate |
//!
//! ```yaml
//! policies:
//!   - name: ims-windows-cleanup
//!     resource: huaweicloud.ims
//!     filters:
//!       - type: image-attribute
//!         attribute: __os_type
//!         key: Value
//!         value: Windows
//!       - type: image-age
//!         days: 90
//!     actions:
//!       - deregister
//! ```

pub mod actions;
pub mod filters;
pub mod resource;

use warden_engine::{ConfigurationError, Registry};

pub use actions::{
    CancelLaunchPermission, CopyImage, CopyMode, Deregister, LaunchStatus, MemberMode, SetPermissions,
};
pub use filters::ImageMembers;
pub use resource::{RESOURCE_TYPE, TYPE_INFO};

/// Register the image resource type with its actions and filters.
pub fn register(registry: &mut Registry) -> Result<(), ConfigurationError> {
    registry.register_resource_type(RESOURCE_TYPE, TYPE_INFO)?;
    actions::register(registry)?;
    filters::register(registry)?;
    tracing::debug!(resource_type = RESOURCE_TYPE, "Registered image module");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_once() {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();

        assert_eq!(
            registry.action_keys(RESOURCE_TYPE).unwrap(),
            vec!["cancel-launch-permission", "copy", "deregister", "set-permissions"]
        );
        let filters = registry.filter_keys(RESOURCE_TYPE).unwrap();
        for key in ["cross-account", "image-age", "image-attribute", "value", "or"] {
            assert!(filters.contains(&key), "missing filter {key}");
        }
    }

    #[test]
    fn test_register_twice_is_a_duplicate() {
        let mut registry = Registry::new();
        register(&mut registry).unwrap();
        assert!(matches!(
            register(&mut registry).unwrap_err(),
            ConfigurationError::DuplicateKey { .. }
        ));
    }
}
