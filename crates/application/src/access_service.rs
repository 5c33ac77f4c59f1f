use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use enrolia_core::{AgencyId, AppError, AppResult, BranchId, UserId, UserIdentity};
use enrolia_domain::{
    AccessCondition, AccessLevel, BranchAccess, ConditionContext, PermissionKey, RoleBinding,
    RoleGraph, RoleId,
};
use serde::Serialize;
use serde_json::Value;

use crate::{AssignmentRepository, MembershipRepository, RoleRepository};

/// Port resolving the branch affiliation of a concrete resource.
///
/// Backed by whatever table owns the resource kind (students, applications,
/// invoices); the resolver only needs the branch column.
#[async_trait]
pub trait ResourceBranchResolver: Send + Sync {
    /// Returns the branch a resource belongs to, if it has one.
    async fn branch_of_resource(
        &self,
        agency_id: AgencyId,
        resource: &str,
        resource_id: &str,
    ) -> AppResult<Option<BranchId>>;
}

/// One permission check request.
#[derive(Debug, Clone)]
pub struct AccessCheck {
    /// Resource-action pair being checked.
    pub key: PermissionKey,
    /// Concrete resource targeted by the operation, when known.
    pub resource_id: Option<String>,
    /// Owner of the targeted resource, when the caller resolved one.
    pub owner_id: Option<UserId>,
    /// Request attributes referenced by custom-binding predicates.
    pub attributes: BTreeMap<String, Value>,
    /// Deadline for the whole check; exceeding it denies, never errors.
    pub timeout: Option<Duration>,
}

impl AccessCheck {
    /// Creates a bare check for a resource-action pair.
    #[must_use]
    pub fn new(key: PermissionKey) -> Self {
        Self {
            key,
            resource_id: None,
            owner_id: None,
            attributes: BTreeMap::new(),
            timeout: None,
        }
    }
}

/// Why a permission check resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionReason {
    /// A binding granted the requested access.
    Granted,
    /// The user holds no active role assignment.
    NoRolesAssigned,
    /// No reachable binding grants the resource-action pair.
    NotGranted,
    /// The targeted resource sits outside the user's branch set.
    OutOfScope,
    /// Hierarchy traversal exceeded the depth bound; denied for safety.
    HierarchyTooDeep,
    /// The check exceeded its deadline; denied, never allowed, on timeout.
    Timeout,
}

impl DecisionReason {
    /// Returns the stable diagnostic label for this reason.
    ///
    /// Safe to show to administrators; carries no role or binding ids.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "Granted",
            Self::NoRolesAssigned => "NoRolesAssigned",
            Self::NotGranted => "NotGranted",
            Self::OutOfScope => "OutOfScope",
            Self::HierarchyTooDeep => "HierarchyTooDeep",
            Self::Timeout => "Timeout",
        }
    }
}

/// Role and binding that decided an allowed check, for audit and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecidingPolicy {
    /// Role carrying the winning binding.
    pub role_id: RoleId,
    /// Name of that role.
    pub role_name: String,
    /// Slug of the granted permission.
    pub permission: String,
    /// Access level of the winning binding.
    pub access_level: AccessLevel,
}

/// Outcome of one permission check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessDecision {
    /// Whether the operation may proceed.
    pub allowed: bool,
    /// Diagnostic reason for the outcome.
    pub reason: DecisionReason,
    /// Winning access level; `None` level when denied.
    pub access_level: AccessLevel,
    /// Policy that decided an allowed check.
    pub deciding_policy: Option<DecidingPolicy>,
}

impl AccessDecision {
    fn denied(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
            access_level: AccessLevel::None,
            deciding_policy: None,
        }
    }
}

/// Application service resolving effective permissions and branch scope.
///
/// A pure read over the shared store: repeated calls with unchanged data
/// return identical decisions, and a legitimate deny is a return value,
/// never an error.
#[derive(Clone)]
pub struct AccessService {
    assignments: Arc<dyn AssignmentRepository>,
    roles: Arc<dyn RoleRepository>,
    membership: Arc<dyn MembershipRepository>,
    resource_branches: Arc<dyn ResourceBranchResolver>,
}

impl AccessService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        roles: Arc<dyn RoleRepository>,
        membership: Arc<dyn MembershipRepository>,
        resource_branches: Arc<dyn ResourceBranchResolver>,
    ) -> Self {
        Self {
            assignments,
            roles,
            membership,
            resource_branches,
        }
    }

    /// Resolves whether a user may perform a resource-action pair.
    ///
    /// Walks the user's active assignments, expands inherited bindings up
    /// the role hierarchy, merges most-permissive-wins, evaluates custom
    /// predicates, and confirms branch containment for targeted resources.
    /// A configured deadline fails closed with a `Timeout` deny.
    pub async fn check_permission(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
        check: AccessCheck,
    ) -> AppResult<AccessDecision> {
        match check.timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.resolve(agency_id, user_id, &check)).await {
                    Ok(decision) => decision,
                    Err(_) => {
                        tracing::warn!(
                            %agency_id,
                            %user_id,
                            permission = %check.key,
                            timeout_ms = limit.as_millis() as u64,
                            "permission check exceeded its deadline; denying"
                        );
                        Ok(AccessDecision::denied(DecisionReason::Timeout))
                    }
                }
            }
            None => self.resolve(agency_id, user_id, &check).await,
        }
    }

    /// Ensures a user has a permission, mapping a deny to `Forbidden`.
    pub async fn require_permission(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
        key: &PermissionKey,
    ) -> AppResult<()> {
        let decision = self
            .check_permission(agency_id, user_id, AccessCheck::new(key.clone()))
            .await?;

        if decision.allowed {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{user_id}' is missing permission '{key}' in agency '{agency_id}' ({})",
            decision.reason.as_str()
        )))
    }

    /// Returns the set of branches a user may act within.
    ///
    /// Any active agency-wide or global role yields the all-branches
    /// sentinel; scope is read from the directly assigned roles, since an
    /// assignment grants the assigned role's breadth, not its ancestors'.
    /// An empty set is a valid no-access result, not an error.
    pub async fn accessible_branches(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<BranchAccess> {
        let assignments = self
            .assignments
            .list_active_for_user(agency_id, user_id)
            .await?;

        let mut branch_ids = BTreeSet::new();

        if !assignments.is_empty() {
            let graph = RoleGraph::new(self.roles.list_roles_with_bindings(agency_id).await?);

            for assignment in &assignments {
                let Some(role) = graph.role(assignment.role_id) else {
                    continue;
                };
                if !role.is_active {
                    continue;
                }
                if role.scope.covers_all_branches() {
                    return Ok(BranchAccess::AllBranches);
                }
                if let Some(branch_id) = role.branch_id {
                    branch_ids.insert(branch_id);
                }
            }
        }

        if let Some(member) = self.membership.find_member(agency_id, user_id).await?
            && let Some(home_branch) = member.branch_id
        {
            branch_ids.insert(home_branch);
        }

        Ok(BranchAccess::branches(branch_ids))
    }

    /// Returns the branch set of an agency member, for admin views.
    ///
    /// Enumerating another member's scope carries the same read grant as
    /// role listings; `accessible_branches` stays unguarded for the
    /// resolver's own use.
    pub async fn member_branch_access(
        &self,
        actor: &UserIdentity,
        user_id: UserId,
    ) -> AppResult<BranchAccess> {
        let agency_id = actor.agency_id();
        self.require_permission(agency_id, actor.user_id(), &read_roles_key()?)
            .await?;

        self.accessible_branches(agency_id, user_id).await
    }

    /// Returns the highest level among the user's active roles, used for
    /// role-management authority checks.
    pub async fn highest_role_level(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<Option<i32>> {
        let assignments = self
            .assignments
            .list_active_for_user(agency_id, user_id)
            .await?;

        if assignments.is_empty() {
            return Ok(None);
        }

        let graph = RoleGraph::new(self.roles.list_roles_with_bindings(agency_id).await?);

        Ok(assignments
            .iter()
            .filter_map(|assignment| graph.role(assignment.role_id))
            .filter(|role| role.is_active)
            .map(|role| role.level)
            .max())
    }

    async fn resolve(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
        check: &AccessCheck,
    ) -> AppResult<AccessDecision> {
        let assignments = self
            .assignments
            .list_active_for_user(agency_id, user_id)
            .await?;

        if assignments.is_empty() {
            return Ok(AccessDecision::denied(DecisionReason::NoRolesAssigned));
        }

        let graph = RoleGraph::new(self.roles.list_roles_with_bindings(agency_id).await?);
        let mut candidates: Vec<(String, RoleBinding)> = Vec::new();

        for assignment in &assignments {
            match graph.effective_bindings(assignment.role_id, &check.key) {
                Ok(bindings) => {
                    for binding in bindings {
                        let role_name = graph
                            .role(binding.role_id)
                            .map(|role| role.name.clone())
                            .unwrap_or_default();
                        candidates.push((role_name, binding.clone()));
                    }
                }
                Err(fault) => {
                    tracing::warn!(
                        %agency_id,
                        %user_id,
                        role_id = %fault.role_id,
                        "role hierarchy exceeded the depth bound; denying"
                    );
                    return Ok(AccessDecision::denied(DecisionReason::HierarchyTooDeep));
                }
            }
        }

        if candidates.is_empty() {
            return Ok(AccessDecision::denied(DecisionReason::NotGranted));
        }

        candidates.sort_by(|left, right| {
            right
                .1
                .access_level
                .rank()
                .cmp(&left.1.access_level.rank())
        });

        let context = ConditionContext {
            user_id,
            owner_id: check.owner_id,
            now: Utc::now(),
            attributes: check.attributes.clone(),
        };

        let mut winner = None;
        for (role_name, binding) in candidates {
            match binding.access_level {
                AccessLevel::Custom => {
                    // A failed custom predicate is not a match; fall back to
                    // the next-lower binding.
                    if AccessCondition::evaluate_all(&binding.conditions, &context) {
                        winner = Some((role_name, binding));
                        break;
                    }
                }
                AccessLevel::None => break,
                _ => {
                    winner = Some((role_name, binding));
                    break;
                }
            }
        }

        let Some((role_name, binding)) = winner else {
            return Ok(AccessDecision::denied(DecisionReason::NotGranted));
        };

        if let Some(resource_id) = &check.resource_id
            && let Some(branch_id) = self
                .resource_branches
                .branch_of_resource(agency_id, check.key.resource(), resource_id.as_str())
                .await?
        {
            let access = self.accessible_branches(agency_id, user_id).await?;
            if !access.contains(branch_id) {
                return Ok(AccessDecision::denied(DecisionReason::OutOfScope));
            }
        }

        Ok(AccessDecision {
            allowed: true,
            reason: DecisionReason::Granted,
            access_level: binding.access_level,
            deciding_policy: Some(DecidingPolicy {
                role_id: binding.role_id,
                role_name,
                permission: check.key.slug(),
                access_level: binding.access_level,
            }),
        })
    }
}

fn read_roles_key() -> AppResult<PermissionKey> {
    PermissionKey::new("roles", "read")
}
