use async_trait::async_trait;
use enrolia_core::{AgencyId, AppResult, BranchId, UserId};

/// Agency membership projection used for tenancy and branch checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgencyMember {
    /// Member user.
    pub user_id: UserId,
    /// Agency the user belongs to.
    pub agency_id: AgencyId,
    /// Home branch of the member, if any.
    pub branch_id: Option<BranchId>,
}

/// Port for agency membership lookups.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Finds a member of an agency; `None` covers both unknown users and
    /// users belonging to a different agency.
    async fn find_member(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<Option<AgencyMember>>;
}
