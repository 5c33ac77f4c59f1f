use std::collections::BTreeSet;

use enrolia_core::{AgencyId, BranchId, UserId};
use serde::{Deserialize, Serialize};

/// Sub-organizational unit (office location) of an agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Stable branch identifier.
    pub id: BranchId,
    /// Owning agency.
    pub agency_id: AgencyId,
    /// Display name.
    pub name: String,
    /// Unique code within the agency.
    pub code: String,
    /// Manager of the branch; a user manages at most one branch.
    pub manager_id: Option<UserId>,
}

/// Set of branches a user may act within.
///
/// Agency-wide and global roles grant every branch; the sentinel avoids
/// materializing the full branch list for large agencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum BranchAccess {
    /// Every branch in the agency.
    AllBranches,
    /// An explicit, possibly empty, branch set.
    Branches {
        /// Accessible branch identifiers.
        branch_ids: BTreeSet<BranchId>,
    },
}

impl BranchAccess {
    /// Creates access to an explicit branch set.
    #[must_use]
    pub fn branches(branch_ids: BTreeSet<BranchId>) -> Self {
        Self::Branches { branch_ids }
    }

    /// Returns whether a branch is inside this access set.
    #[must_use]
    pub fn contains(&self, branch_id: BranchId) -> bool {
        match self {
            Self::AllBranches => true,
            Self::Branches { branch_ids } => branch_ids.contains(&branch_id),
        }
    }

    /// Returns whether this access set grants no branch at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::AllBranches => false,
            Self::Branches { branch_ids } => branch_ids.is_empty(),
        }
    }
}
