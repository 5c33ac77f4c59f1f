use enrolia_domain::PermissionDefinition;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Incoming payload for catalog permission registration.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/create-permission-request.ts"
)]
pub struct CreatePermissionRequest {
    pub resource: String,
    pub action: String,
    pub category: String,
    pub description: Option<String>,
    /// System entries are delete-protected; creation is already gated by
    /// `permissions:manage`.
    #[serde(default)]
    pub is_system: bool,
}

/// Incoming payload for catalog metadata updates; the key is immutable.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/update-permission-request.ts"
)]
pub struct UpdatePermissionRequest {
    pub category: String,
    pub description: Option<String>,
}

/// API representation of a catalog permission.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/permission-response.ts"
)]
pub struct PermissionResponse {
    pub permission_id: String,
    pub key: String,
    pub resource: String,
    pub action: String,
    pub category: String,
    pub description: Option<String>,
    pub is_system: bool,
}

impl From<PermissionDefinition> for PermissionResponse {
    fn from(value: PermissionDefinition) -> Self {
        Self {
            permission_id: value.id.to_string(),
            key: value.key.to_string(),
            resource: value.key.resource().to_owned(),
            action: value.key.action().to_owned(),
            category: value.category,
            description: value.description,
            is_system: value.is_system,
        }
    }
}
