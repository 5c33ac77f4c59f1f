use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use enrolia_core::{AgencyId, AppError, AppResult, BranchId, UserIdentity};
use enrolia_domain::{
    AccessCondition, AccessLevel, PermissionId, PermissionKey, Role, RoleBinding, RoleGraph,
    RoleHierarchyNode, RoleId, RoleScope,
};

use crate::{
    AccessService, AssignmentRepository, AuditAction, AuditEvent, AuditRepository,
    BranchRepository, CatalogRepository,
};

/// Port for role and binding persistence.
///
/// `create_role` and `update_role` persist the role row and its bindings
/// atomically; a partially written role is never observable.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Finds a role by id within an agency.
    async fn find_role(&self, agency_id: AgencyId, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Finds a role by slug within an agency.
    async fn find_role_by_slug(&self, agency_id: AgencyId, slug: &str)
    -> AppResult<Option<Role>>;

    /// Loads all agency roles with their direct bindings.
    async fn list_roles_with_bindings(
        &self,
        agency_id: AgencyId,
    ) -> AppResult<Vec<(Role, Vec<RoleBinding>)>>;

    /// Persists a new role and its bindings in one transaction.
    async fn create_role(&self, role: Role, bindings: Vec<RoleBinding>) -> AppResult<()>;

    /// Replaces a role and its bindings in one transaction.
    async fn update_role(&self, role: Role, bindings: Vec<RoleBinding>) -> AppResult<()>;

    /// Toggles the active flag of a role.
    async fn set_role_active(
        &self,
        agency_id: AgencyId,
        role_id: RoleId,
        is_active: bool,
    ) -> AppResult<()>;

    /// Hard-deletes a role and its bindings.
    async fn delete_role(&self, agency_id: AgencyId, role_id: RoleId) -> AppResult<()>;
}

/// One requested permission grant on a role.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingInput {
    /// Catalog entry to grant.
    pub permission_id: PermissionId,
    /// Granted access level.
    pub access_level: AccessLevel,
    /// Predicates for custom-level grants.
    pub conditions: Vec<AccessCondition>,
}

/// Input payload for creating a role.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRoleInput {
    /// Display name.
    pub name: String,
    /// Unique slug within the agency.
    pub slug: String,
    /// Authority level; must be below the creator's own.
    pub level: i32,
    /// Organizational breadth of the grants.
    pub scope: RoleScope,
    /// Branch the role is pinned to for branch-level scopes.
    pub branch_id: Option<BranchId>,
    /// Parent role to inherit bindings from.
    pub parent_id: Option<RoleId>,
    /// Permission grants to attach.
    pub bindings: Vec<BindingInput>,
}

/// Input payload for updating a role; the slug is immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRoleInput {
    /// Display name.
    pub name: String,
    /// Authority level; must be below the updater's own.
    pub level: i32,
    /// Organizational breadth of the grants.
    pub scope: RoleScope,
    /// Branch the role is pinned to for branch-level scopes.
    pub branch_id: Option<BranchId>,
    /// Parent role to inherit bindings from.
    pub parent_id: Option<RoleId>,
    /// Whether the role grants anything at all.
    pub is_active: bool,
    /// Full replacement set of permission grants.
    pub bindings: Vec<BindingInput>,
}

/// Outcome of a role deletion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleDeletion {
    /// The role had no active assignments and was removed.
    Deleted,
    /// The role still had active assignments and was deactivated instead.
    Deactivated,
}

/// Application service for role administration.
#[derive(Clone)]
pub struct RoleService {
    access_service: AccessService,
    roles: Arc<dyn RoleRepository>,
    branches: Arc<dyn BranchRepository>,
    catalog: Arc<dyn CatalogRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl RoleService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        access_service: AccessService,
        roles: Arc<dyn RoleRepository>,
        branches: Arc<dyn BranchRepository>,
        catalog: Arc<dyn CatalogRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            access_service,
            roles,
            branches,
            catalog,
            assignments,
            audit_repository,
        }
    }

    /// Creates a role with its bindings.
    pub async fn create_role(&self, actor: &UserIdentity, input: CreateRoleInput) -> AppResult<Role> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &manage_roles_key()?)
            .await?;
        self.require_manage_authority(actor, input.level).await?;

        let slug = normalized_slug(input.slug.as_str())?;
        if self.roles.find_role_by_slug(agency_id, slug.as_str()).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "role slug '{slug}' already exists in agency '{agency_id}'"
            )));
        }

        self.validate_branch(agency_id, input.scope, input.branch_id).await?;

        if let Some(parent_id) = input.parent_id {
            self.validate_parent_chain(agency_id, parent_id).await?;
        }

        let role = Role {
            id: RoleId::new(),
            agency_id,
            name: input.name,
            slug,
            level: input.level,
            scope: input.scope,
            branch_id: input.branch_id,
            parent_id: input.parent_id,
            is_active: true,
        };
        let bindings = self.resolve_bindings(role.id, input.bindings).await?;

        self.roles.create_role(role.clone(), bindings).await?;

        self.audit_repository
            .append_event(AuditEvent {
                agency_id,
                actor_id: actor.user_id(),
                action: AuditAction::RoleCreated,
                resource_type: "role".to_owned(),
                resource_id: role.id.to_string(),
                detail: Some(format!("created role '{}'", role.slug)),
            })
            .await?;

        Ok(role)
    }

    /// Updates a role, revalidating the parent chain before committing.
    pub async fn update_role(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
        input: UpdateRoleInput,
    ) -> AppResult<Role> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &manage_roles_key()?)
            .await?;

        let existing = self
            .roles
            .find_role(agency_id, role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;

        self.require_manage_authority(actor, existing.level.max(input.level))
            .await?;
        self.validate_branch(agency_id, input.scope, input.branch_id).await?;

        if let Some(parent_id) = input.parent_id {
            self.validate_parent_chain(agency_id, parent_id).await?;

            let graph = RoleGraph::new(self.roles.list_roles_with_bindings(agency_id).await?);
            let cycles = graph.would_create_cycle(role_id, parent_id).map_err(|fault| {
                AppError::Conflict(format!(
                    "role hierarchy above '{}' exceeds the supported depth",
                    fault.role_id
                ))
            })?;
            if cycles {
                return Err(AppError::Conflict(format!(
                    "reparenting role '{}' under '{parent_id}' would create a cycle",
                    existing.slug
                )));
            }
        }

        let updated = Role {
            id: existing.id,
            agency_id,
            name: input.name,
            slug: existing.slug,
            level: input.level,
            scope: input.scope,
            branch_id: input.branch_id,
            parent_id: input.parent_id,
            is_active: input.is_active,
        };
        let bindings = self.resolve_bindings(updated.id, input.bindings).await?;

        self.roles.update_role(updated.clone(), bindings).await?;

        self.audit_repository
            .append_event(AuditEvent {
                agency_id,
                actor_id: actor.user_id(),
                action: AuditAction::RoleUpdated,
                resource_type: "role".to_owned(),
                resource_id: updated.id.to_string(),
                detail: Some(format!("updated role '{}'", updated.slug)),
            })
            .await?;

        Ok(updated)
    }

    /// Deletes a role, falling back to deactivation while active
    /// assignments still reference it.
    pub async fn delete_role(
        &self,
        actor: &UserIdentity,
        role_id: RoleId,
    ) -> AppResult<RoleDeletion> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &manage_roles_key()?)
            .await?;

        let role = self
            .roles
            .find_role(agency_id, role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;
        self.require_manage_authority(actor, role.level).await?;

        let active_assignments = self
            .assignments
            .count_active_for_role(agency_id, role_id)
            .await?;

        let deletion = if active_assignments > 0 {
            self.roles.set_role_active(agency_id, role_id, false).await?;
            RoleDeletion::Deactivated
        } else {
            self.roles.delete_role(agency_id, role_id).await?;
            RoleDeletion::Deleted
        };

        self.audit_repository
            .append_event(AuditEvent {
                agency_id,
                actor_id: actor.user_id(),
                action: AuditAction::RoleRemoved,
                resource_type: "role".to_owned(),
                resource_id: role_id.to_string(),
                detail: Some(match deletion {
                    RoleDeletion::Deleted => format!("deleted role '{}'", role.slug),
                    RoleDeletion::Deactivated => {
                        format!(
                            "deactivated role '{}' ({active_assignments} active assignments)",
                            role.slug
                        )
                    }
                }),
            })
            .await?;

        Ok(deletion)
    }

    /// Returns the agency role forest for admin views.
    pub async fn role_hierarchy(
        &self,
        actor: &UserIdentity,
        branch_filter: Option<BTreeSet<BranchId>>,
    ) -> AppResult<Vec<RoleHierarchyNode>> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &read_roles_key()?)
            .await?;

        let graph = RoleGraph::new(self.roles.list_roles_with_bindings(agency_id).await?);
        Ok(graph.hierarchy(branch_filter.as_ref()))
    }

    async fn require_manage_authority(&self, actor: &UserIdentity, level: i32) -> AppResult<()> {
        let own_level = self
            .access_service
            .highest_role_level(actor.agency_id(), actor.user_id())
            .await?
            .unwrap_or(i32::MIN);

        if level >= own_level {
            return Err(AppError::Forbidden(format!(
                "cannot manage a role at level {level} from level {own_level}"
            )));
        }

        Ok(())
    }

    async fn validate_branch(
        &self,
        agency_id: AgencyId,
        scope: RoleScope,
        branch_id: Option<BranchId>,
    ) -> AppResult<()> {
        if scope == RoleScope::Branch && branch_id.is_none() {
            return Err(AppError::Validation(
                "branch-scoped roles require a branch".to_owned(),
            ));
        }

        if let Some(branch_id) = branch_id
            && self.branches.find_branch(agency_id, branch_id).await?.is_none()
        {
            return Err(AppError::NotFound(format!(
                "branch '{branch_id}' does not belong to agency '{agency_id}'"
            )));
        }

        Ok(())
    }

    async fn validate_parent_chain(&self, agency_id: AgencyId, parent_id: RoleId) -> AppResult<()> {
        if self.roles.find_role(agency_id, parent_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "parent role '{parent_id}' does not belong to agency '{agency_id}'"
            )));
        }

        let graph = RoleGraph::new(self.roles.list_roles_with_bindings(agency_id).await?);
        graph.ancestor_chain(parent_id).map_err(|fault| {
            AppError::Conflict(format!(
                "role hierarchy above '{}' exceeds the supported depth",
                fault.role_id
            ))
        })?;

        Ok(())
    }

    async fn resolve_bindings(
        &self,
        role_id: RoleId,
        inputs: Vec<BindingInput>,
    ) -> AppResult<Vec<RoleBinding>> {
        let mut bindings = Vec::with_capacity(inputs.len());

        for input in inputs {
            let definition = self
                .catalog
                .find_permission(input.permission_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!(
                        "permission '{}' was not found",
                        input.permission_id
                    ))
                })?;

            if input.access_level == AccessLevel::Custom && input.conditions.is_empty() {
                return Err(AppError::Validation(format!(
                    "custom binding for '{}' requires at least one condition",
                    definition.key
                )));
            }

            bindings.push(RoleBinding {
                role_id,
                permission_id: definition.id,
                key: definition.key,
                access_level: input.access_level,
                conditions: input.conditions,
            });
        }

        Ok(bindings)
    }
}

fn manage_roles_key() -> AppResult<PermissionKey> {
    PermissionKey::new("roles", "manage")
}

fn read_roles_key() -> AppResult<PermissionKey> {
    PermissionKey::new("roles", "read")
}

fn normalized_slug(value: &str) -> AppResult<String> {
    let slug = value.trim().to_ascii_lowercase();
    if slug.is_empty() {
        return Err(AppError::Validation("role slug must not be empty".to_owned()));
    }

    if !slug
        .chars()
        .all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '-')
    {
        return Err(AppError::Validation(format!(
            "role slug '{slug}' contains invalid characters"
        )));
    }

    Ok(slug)
}
