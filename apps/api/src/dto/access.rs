use std::collections::BTreeMap;
use std::time::Duration;

use enrolia_application::{AccessCheck, AccessDecision, DecidingPolicy};
use enrolia_core::{AppError, AppResult, UserId};
use enrolia_domain::{BranchAccess, PermissionKey};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::common::parse_uuid;

/// Incoming payload for one permission check.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/access-check-request.ts"
)]
pub struct AccessCheckRequest {
    pub resource: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub owner_id: Option<String>,
    #[ts(type = "Record<string, unknown> | null")]
    pub attributes: Option<serde_json::Value>,
    pub timeout_ms: Option<u64>,
}

impl AccessCheckRequest {
    pub fn into_check(self) -> AppResult<AccessCheck> {
        let key = PermissionKey::new(self.resource, self.action)?;
        let owner_id = self
            .owner_id
            .map(|raw| parse_uuid(raw.as_str(), "owner_id").map(UserId::from_uuid))
            .transpose()?;
        let attributes = parse_attributes(self.attributes)?;

        Ok(AccessCheck {
            key,
            resource_id: self.resource_id,
            owner_id,
            attributes,
            timeout: self.timeout_ms.map(Duration::from_millis),
        })
    }
}

/// Role and binding that decided an allowed check.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/deciding-policy-response.ts"
)]
pub struct DecidingPolicyResponse {
    pub role_id: String,
    pub role_name: String,
    pub permission: String,
    pub access_level: String,
}

impl From<DecidingPolicy> for DecidingPolicyResponse {
    fn from(value: DecidingPolicy) -> Self {
        Self {
            role_id: value.role_id.to_string(),
            role_name: value.role_name,
            permission: value.permission,
            access_level: value.access_level.as_str().to_owned(),
        }
    }
}

/// Outcome of one permission check.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/access-decision-response.ts"
)]
pub struct AccessDecisionResponse {
    pub allowed: bool,
    pub reason: String,
    pub access_level: String,
    pub deciding_policy: Option<DecidingPolicyResponse>,
}

impl From<AccessDecision> for AccessDecisionResponse {
    fn from(value: AccessDecision) -> Self {
        Self {
            allowed: value.allowed,
            reason: value.reason.as_str().to_owned(),
            access_level: value.access_level.as_str().to_owned(),
            deciding_policy: value.deciding_policy.map(DecidingPolicyResponse::from),
        }
    }
}

/// Branch set a user may act within.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/accessible-branches-response.ts"
)]
pub struct AccessibleBranchesResponse {
    pub all_branches: bool,
    pub branch_ids: Vec<String>,
}

impl From<BranchAccess> for AccessibleBranchesResponse {
    fn from(value: BranchAccess) -> Self {
        match value {
            BranchAccess::AllBranches => Self {
                all_branches: true,
                branch_ids: Vec::new(),
            },
            BranchAccess::Branches { branch_ids } => Self {
                all_branches: false,
                branch_ids: branch_ids
                    .into_iter()
                    .map(|branch_id| branch_id.to_string())
                    .collect(),
            },
        }
    }
}

fn parse_attributes(
    value: Option<serde_json::Value>,
) -> AppResult<BTreeMap<String, serde_json::Value>> {
    match value {
        None => Ok(BTreeMap::new()),
        Some(serde_json::Value::Object(entries)) => Ok(entries.into_iter().collect()),
        Some(other) => Err(AppError::Validation(format!(
            "attributes must be a JSON object, got {other}"
        ))),
    }
}
