use std::str::FromStr;

use enrolia_application::{BindingInput, CreateRoleInput, RoleDeletion, UpdateRoleInput};
use enrolia_core::{AppError, AppResult, BranchId};
use enrolia_domain::{
    AccessCondition, AccessLevel, PermissionId, Role, RoleBinding, RoleHierarchyNode, RoleId,
    RoleScope,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::common::parse_uuid;

/// One permission grant inside a role payload.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/binding-payload.ts"
)]
pub struct BindingPayload {
    pub permission_id: String,
    pub access_level: String,
    #[ts(type = "Array<unknown> | null")]
    pub conditions: Option<serde_json::Value>,
}

impl BindingPayload {
    fn into_input(self) -> AppResult<BindingInput> {
        let permission_id =
            PermissionId::from_uuid(parse_uuid(self.permission_id.as_str(), "permission_id")?);
        let access_level = AccessLevel::from_str(self.access_level.as_str())?;
        let conditions: Vec<AccessCondition> = self
            .conditions
            .map(serde_json::from_value)
            .transpose()
            .map_err(|error| AppError::Validation(format!("invalid binding conditions: {error}")))?
            .unwrap_or_default();

        Ok(BindingInput {
            permission_id,
            access_level,
            conditions,
        })
    }
}

/// Incoming payload for role creation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/create-role-request.ts"
)]
pub struct CreateRoleRequest {
    pub name: String,
    pub slug: String,
    pub level: i32,
    pub scope: String,
    pub branch_id: Option<String>,
    pub parent_id: Option<String>,
    pub bindings: Vec<BindingPayload>,
}

impl CreateRoleRequest {
    pub fn into_input(self) -> AppResult<CreateRoleInput> {
        Ok(CreateRoleInput {
            name: self.name,
            slug: self.slug,
            level: self.level,
            scope: RoleScope::from_str(self.scope.as_str())?,
            branch_id: parse_optional_branch(self.branch_id)?,
            parent_id: parse_optional_role(self.parent_id)?,
            bindings: parse_bindings(self.bindings)?,
        })
    }
}

/// Incoming payload for role updates; the slug is immutable.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/update-role-request.ts"
)]
pub struct UpdateRoleRequest {
    pub name: String,
    pub level: i32,
    pub scope: String,
    pub branch_id: Option<String>,
    pub parent_id: Option<String>,
    pub is_active: bool,
    pub bindings: Vec<BindingPayload>,
}

impl UpdateRoleRequest {
    pub fn into_input(self) -> AppResult<UpdateRoleInput> {
        Ok(UpdateRoleInput {
            name: self.name,
            level: self.level,
            scope: RoleScope::from_str(self.scope.as_str())?,
            branch_id: parse_optional_branch(self.branch_id)?,
            parent_id: parse_optional_role(self.parent_id)?,
            is_active: self.is_active,
            bindings: parse_bindings(self.bindings)?,
        })
    }
}

/// API representation of a role.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/role-response.ts"
)]
pub struct RoleResponse {
    pub role_id: String,
    pub agency_id: String,
    pub name: String,
    pub slug: String,
    pub level: i32,
    pub scope: String,
    pub branch_id: Option<String>,
    pub parent_id: Option<String>,
    pub is_active: bool,
}

impl From<Role> for RoleResponse {
    fn from(value: Role) -> Self {
        Self {
            role_id: value.id.to_string(),
            agency_id: value.agency_id.to_string(),
            name: value.name,
            slug: value.slug,
            level: value.level,
            scope: value.scope.as_str().to_owned(),
            branch_id: value.branch_id.map(|branch_id| branch_id.to_string()),
            parent_id: value.parent_id.map(|parent_id| parent_id.to_string()),
            is_active: value.is_active,
        }
    }
}

/// API representation of one permission grant on a role.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/binding-response.ts"
)]
pub struct BindingResponse {
    pub permission_id: String,
    pub permission: String,
    pub access_level: String,
    #[ts(type = "Array<unknown>")]
    pub conditions: serde_json::Value,
}

impl BindingResponse {
    pub fn from_binding(value: RoleBinding) -> AppResult<Self> {
        let conditions = serde_json::to_value(&value.conditions).map_err(|error| {
            AppError::Internal(format!("failed to serialize binding conditions: {error}"))
        })?;

        Ok(Self {
            permission_id: value.permission_id.to_string(),
            permission: value.key.to_string(),
            access_level: value.access_level.as_str().to_owned(),
            conditions,
        })
    }
}

/// One node of the agency role forest.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/role-hierarchy-node-response.ts"
)]
pub struct RoleHierarchyNodeResponse {
    pub role: RoleResponse,
    pub bindings: Vec<BindingResponse>,
    pub children: Vec<RoleHierarchyNodeResponse>,
}

impl RoleHierarchyNodeResponse {
    pub fn from_node(value: RoleHierarchyNode) -> AppResult<Self> {
        let bindings = value
            .bindings
            .into_iter()
            .map(BindingResponse::from_binding)
            .collect::<AppResult<Vec<_>>>()?;
        let children = value
            .children
            .into_iter()
            .map(Self::from_node)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self {
            role: RoleResponse::from(value.role),
            bindings,
            children,
        })
    }
}

/// Outcome of a role deletion request.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/role-deletion-response.ts"
)]
pub struct RoleDeletionResponse {
    pub outcome: String,
}

impl From<RoleDeletion> for RoleDeletionResponse {
    fn from(value: RoleDeletion) -> Self {
        let outcome = match value {
            RoleDeletion::Deleted => "deleted",
            RoleDeletion::Deactivated => "deactivated",
        };

        Self {
            outcome: outcome.to_owned(),
        }
    }
}

fn parse_optional_branch(value: Option<String>) -> AppResult<Option<BranchId>> {
    value
        .map(|raw| parse_uuid(raw.as_str(), "branch_id").map(BranchId::from_uuid))
        .transpose()
}

fn parse_optional_role(value: Option<String>) -> AppResult<Option<RoleId>> {
    value
        .map(|raw| parse_uuid(raw.as_str(), "parent_id").map(RoleId::from_uuid))
        .transpose()
}

fn parse_bindings(payloads: Vec<BindingPayload>) -> AppResult<Vec<BindingInput>> {
    payloads
        .into_iter()
        .map(BindingPayload::into_input)
        .collect()
}
