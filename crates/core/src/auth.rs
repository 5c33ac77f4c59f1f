use serde::{Deserialize, Serialize};

use crate::{AgencyId, BranchId, UserId};

/// Actor information attached to every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    user_id: UserId,
    display_name: String,
    email: Option<String>,
    agency_id: AgencyId,
    branch_id: Option<BranchId>,
}

impl UserIdentity {
    /// Creates a user identity from authentication and tenancy data.
    #[must_use]
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        email: Option<String>,
        agency_id: AgencyId,
        branch_id: Option<BranchId>,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            email,
            agency_id,
            branch_id,
        }
    }

    /// Returns the stable user identifier.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the display name for the current user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the email, if the identity provider returned one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the agency linked to the identity.
    #[must_use]
    pub fn agency_id(&self) -> AgencyId {
        self.agency_id
    }

    /// Returns the home branch of the user, if one is recorded.
    #[must_use]
    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }
}
