//! Image resource type descriptor.

use warden_core::{EnumSpec, ResourceTypeInfo};

/// Registry key of the image resource type.
pub const RESOURCE_TYPE: &str = "huaweicloud.ims";

pub const TYPE_INFO: ResourceTypeInfo = ResourceTypeInfo {
    service: "ims",
    enum_spec: EnumSpec {
        operation: "list_images",
        result_key: "images",
        client: "ims",
    },
    id_field: "id",
    tag_resource_type: Some("private_image"),
};
