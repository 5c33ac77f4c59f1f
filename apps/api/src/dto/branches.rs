use enrolia_domain::Branch;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Incoming payload for branch creation.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/create-branch-request.ts"
)]
pub struct CreateBranchRequest {
    pub name: String,
    pub code: String,
    pub manager_id: Option<String>,
}

/// Incoming payload for branch updates.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/update-branch-request.ts"
)]
pub struct UpdateBranchRequest {
    pub name: String,
    pub code: String,
    pub manager_id: Option<String>,
}

/// API representation of a branch.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/branch-response.ts"
)]
pub struct BranchResponse {
    pub branch_id: String,
    pub agency_id: String,
    pub name: String,
    pub code: String,
    pub manager_id: Option<String>,
}

impl From<Branch> for BranchResponse {
    fn from(value: Branch) -> Self {
        Self {
            branch_id: value.id.to_string(),
            agency_id: value.agency_id.to_string(),
            name: value.name,
            code: value.code,
            manager_id: value.manager_id.map(|manager_id| manager_id.to_string()),
        }
    }
}
