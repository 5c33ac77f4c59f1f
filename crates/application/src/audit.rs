use async_trait::async_trait;
use enrolia_core::{AgencyId, AppResult, UserId};
use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by application use-cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a catalog permission is created.
    PermissionCreated,
    /// Emitted when a catalog permission is deleted.
    PermissionDeleted,
    /// Emitted when a role is created.
    RoleCreated,
    /// Emitted when a role is updated.
    RoleUpdated,
    /// Emitted when a role is deleted or deactivated.
    RoleRemoved,
    /// Emitted when a role is assigned to a user.
    RoleAssigned,
    /// Emitted when a role assignment is revoked.
    RoleRevoked,
    /// Emitted when a branch is created.
    BranchCreated,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionCreated => "security.permission.created",
            Self::PermissionDeleted => "security.permission.deleted",
            Self::RoleCreated => "security.role.created",
            Self::RoleUpdated => "security.role.updated",
            Self::RoleRemoved => "security.role.removed",
            Self::RoleAssigned => "security.role.assigned",
            Self::RoleRevoked => "security.role.revoked",
            Self::BranchCreated => "security.branch.created",
        }
    }
}

/// Audit trail entry describing one administrative action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Agency the action happened in.
    pub agency_id: AgencyId,
    /// User who performed the action.
    pub actor_id: UserId,
    /// Stable action identifier.
    pub action: AuditAction,
    /// Kind of resource the action touched.
    pub resource_type: String,
    /// Identifier of the touched resource.
    pub resource_id: String,
    /// Optional human-readable detail.
    pub detail: Option<String>,
}

/// Append-only port for the audit trail.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends one audit event.
    async fn append_event(&self, event: AuditEvent) -> AppResult<()>;
}
