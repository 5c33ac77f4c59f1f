use enrolia_application::{ActiveRole, RoleAssignmentOutcome};
use enrolia_domain::{AssignmentState, RoleAssignment};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::roles::RoleResponse;

/// Incoming payload for granting a role to an agency member.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/assign-role-request.ts"
)]
pub struct AssignRoleRequest {
    pub user_id: String,
    pub role_id: String,
}

/// Incoming payload for revoking an assignment.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/revoke-role-request.ts"
)]
pub struct RevokeRoleRequest {
    pub assignment_id: String,
}

/// API representation of one ledger entry.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/assignment-response.ts"
)]
pub struct AssignmentResponse {
    pub assignment_id: String,
    pub agency_id: String,
    pub user_id: String,
    pub role_id: String,
    pub assigned_by: String,
    pub assigned_at: String,
    pub status: String,
    pub revoked_at: Option<String>,
    pub revoked_by: Option<String>,
}

impl From<RoleAssignment> for AssignmentResponse {
    fn from(value: RoleAssignment) -> Self {
        let (status, revoked_at, revoked_by) = match value.state {
            AssignmentState::Active => ("active", None, None),
            AssignmentState::Revoked { at, by } => {
                ("revoked", Some(at.to_rfc3339()), Some(by.to_string()))
            }
        };

        Self {
            assignment_id: value.id.to_string(),
            agency_id: value.agency_id.to_string(),
            user_id: value.user_id.to_string(),
            role_id: value.role_id.to_string(),
            assigned_by: value.assigned_by.to_string(),
            assigned_at: value.assigned_at.to_rfc3339(),
            status: status.to_owned(),
            revoked_at,
            revoked_by,
        }
    }
}

/// Result of an assignment mutation, flagging a missed audit write.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/assignment-outcome-response.ts"
)]
pub struct AssignmentOutcomeResponse {
    pub assignment: AssignmentResponse,
    pub audit_recorded: bool,
}

impl From<RoleAssignmentOutcome> for AssignmentOutcomeResponse {
    fn from(value: RoleAssignmentOutcome) -> Self {
        Self {
            assignment: AssignmentResponse::from(value.assignment),
            audit_recorded: value.audit_recorded,
        }
    }
}

/// Active assignment joined with its role.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/active-role-response.ts"
)]
pub struct ActiveRoleResponse {
    pub assignment: AssignmentResponse,
    pub role: RoleResponse,
}

impl From<ActiveRole> for ActiveRoleResponse {
    fn from(value: ActiveRole) -> Self {
        Self {
            assignment: AssignmentResponse::from(value.assignment),
            role: RoleResponse::from(value.role),
        }
    }
}
