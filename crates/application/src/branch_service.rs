use std::sync::Arc;

use async_trait::async_trait;
use enrolia_core::{AgencyId, AppError, AppResult, BranchId, UserId, UserIdentity};
use enrolia_domain::{Branch, PermissionKey};

use crate::{
    AccessService, AuditAction, AuditEvent, AuditRepository, MembershipRepository,
};

/// Port for branch persistence.
#[async_trait]
pub trait BranchRepository: Send + Sync {
    /// Finds a branch by id within an agency.
    async fn find_branch(
        &self,
        agency_id: AgencyId,
        branch_id: BranchId,
    ) -> AppResult<Option<Branch>>;

    /// Finds a branch by its short code within an agency.
    async fn find_branch_by_code(
        &self,
        agency_id: AgencyId,
        code: &str,
    ) -> AppResult<Option<Branch>>;

    /// Finds the branch a user manages, if any.
    async fn find_branch_by_manager(
        &self,
        agency_id: AgencyId,
        manager_id: UserId,
    ) -> AppResult<Option<Branch>>;

    /// Lists all branches of an agency, ordered by code.
    async fn list_branches(&self, agency_id: AgencyId) -> AppResult<Vec<Branch>>;

    /// Persists a new branch.
    async fn insert_branch(&self, branch: Branch) -> AppResult<()>;

    /// Persists edits to an existing branch.
    async fn update_branch(&self, branch: Branch) -> AppResult<()>;
}

/// Input payload for creating a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBranchInput {
    /// Display name.
    pub name: String,
    /// Short code, unique within the agency.
    pub code: String,
    /// Optional branch manager; a user manages at most one branch.
    pub manager_id: Option<UserId>,
}

/// Input payload for updating a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateBranchInput {
    /// Display name.
    pub name: String,
    /// Short code, unique within the agency.
    pub code: String,
    /// Optional branch manager; a user manages at most one branch.
    pub manager_id: Option<UserId>,
}

/// Application service for branch administration.
#[derive(Clone)]
pub struct BranchService {
    access_service: AccessService,
    branches: Arc<dyn BranchRepository>,
    membership: Arc<dyn MembershipRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl BranchService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        access_service: AccessService,
        branches: Arc<dyn BranchRepository>,
        membership: Arc<dyn MembershipRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            access_service,
            branches,
            membership,
            audit_repository,
        }
    }

    /// Creates a branch.
    pub async fn create_branch(
        &self,
        actor: &UserIdentity,
        input: CreateBranchInput,
    ) -> AppResult<Branch> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &manage_branches_key()?)
            .await?;

        let code = normalized_code(input.code.as_str())?;
        if self
            .branches
            .find_branch_by_code(agency_id, code.as_str())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "branch code '{code}' already exists in agency '{agency_id}'"
            )));
        }

        if let Some(manager_id) = input.manager_id {
            self.validate_manager(agency_id, manager_id, None).await?;
        }

        let branch = Branch {
            id: BranchId::new(),
            agency_id,
            name: input.name,
            code,
            manager_id: input.manager_id,
        };
        self.branches.insert_branch(branch.clone()).await?;

        self.audit_repository
            .append_event(AuditEvent {
                agency_id,
                actor_id: actor.user_id(),
                action: AuditAction::BranchCreated,
                resource_type: "branch".to_owned(),
                resource_id: branch.id.to_string(),
                detail: Some(format!("created branch '{}'", branch.code)),
            })
            .await?;

        Ok(branch)
    }

    /// Updates a branch.
    pub async fn update_branch(
        &self,
        actor: &UserIdentity,
        branch_id: BranchId,
        input: UpdateBranchInput,
    ) -> AppResult<Branch> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &manage_branches_key()?)
            .await?;

        let existing = self
            .branches
            .find_branch(agency_id, branch_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("branch '{branch_id}' was not found")))?;

        let code = normalized_code(input.code.as_str())?;
        if let Some(other) = self.branches.find_branch_by_code(agency_id, code.as_str()).await?
            && other.id != existing.id
        {
            return Err(AppError::Conflict(format!(
                "branch code '{code}' already exists in agency '{agency_id}'"
            )));
        }

        if let Some(manager_id) = input.manager_id {
            self.validate_manager(agency_id, manager_id, Some(existing.id)).await?;
        }

        let updated = Branch {
            id: existing.id,
            agency_id,
            name: input.name,
            code,
            manager_id: input.manager_id,
        };
        self.branches.update_branch(updated.clone()).await?;

        Ok(updated)
    }

    /// Lists the agency's branches.
    pub async fn list_branches(&self, actor: &UserIdentity) -> AppResult<Vec<Branch>> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &read_branches_key()?)
            .await?;

        self.branches.list_branches(agency_id).await
    }

    async fn validate_manager(
        &self,
        agency_id: AgencyId,
        manager_id: UserId,
        own_branch: Option<BranchId>,
    ) -> AppResult<()> {
        if self.membership.find_member(agency_id, manager_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "user '{manager_id}' is not a member of agency '{agency_id}'"
            )));
        }

        if let Some(managed) = self.branches.find_branch_by_manager(agency_id, manager_id).await?
            && Some(managed.id) != own_branch
        {
            return Err(AppError::Conflict(format!(
                "user '{manager_id}' already manages branch '{}'",
                managed.code
            )));
        }

        Ok(())
    }
}

fn manage_branches_key() -> AppResult<PermissionKey> {
    PermissionKey::new("branches", "manage")
}

fn read_branches_key() -> AppResult<PermissionKey> {
    PermissionKey::new("branches", "read")
}

fn normalized_code(value: &str) -> AppResult<String> {
    let code = value.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(AppError::Validation("branch code must not be empty".to_owned()));
    }

    Ok(code)
}
