use chrono::{DateTime, Utc};
use enrolia_core::{AgencyId, UserId};
use serde::{Deserialize, Serialize};

use crate::{AssignmentId, RoleId};

/// Lifecycle state of a role assignment.
///
/// Assignments are never deleted; revocation records who revoked and when
/// so the ledger stays auditable. The presence of the revoked state, not
/// its timestamp, is what excludes an assignment from resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AssignmentState {
    /// Assignment currently grants the role.
    Active,
    /// Assignment was revoked and is kept for audit history.
    Revoked {
        /// Revocation timestamp.
        at: DateTime<Utc>,
        /// User who revoked the assignment.
        by: UserId,
    },
}

/// Ledger entry granting one role to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Stable ledger identifier.
    pub id: AssignmentId,
    /// Owning agency.
    pub agency_id: AgencyId,
    /// User holding the role.
    pub user_id: UserId,
    /// Granted role.
    pub role_id: RoleId,
    /// User who created the assignment.
    pub assigned_by: UserId,
    /// Creation timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub state: AssignmentState,
}

impl RoleAssignment {
    /// Creates a new active assignment.
    #[must_use]
    pub fn new(agency_id: AgencyId, user_id: UserId, role_id: RoleId, assigned_by: UserId) -> Self {
        Self {
            id: AssignmentId::new(),
            agency_id,
            user_id,
            role_id,
            assigned_by,
            assigned_at: Utc::now(),
            state: AssignmentState::Active,
        }
    }

    /// Returns whether this assignment currently grants its role.
    ///
    /// The single place the active/revoked distinction is made; callers
    /// must not inspect `state` timestamps for this.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, AssignmentState::Active)
    }

    /// Marks the assignment revoked; revoking twice keeps the first record.
    pub fn revoke(&mut self, revoked_by: UserId, at: DateTime<Utc>) {
        if self.is_active() {
            self.state = AssignmentState::Revoked { at, by: revoked_by };
        }
    }
}
