use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use enrolia_application::{
    AgencyMember, AssignmentRepository, BranchRepository, CatalogRepository, MembershipRepository,
    ResourceBranchResolver, RoleRepository,
};
use enrolia_core::{AgencyId, AppResult, BranchId, UserId};
use enrolia_domain::{
    AssignmentId, Branch, PermissionDefinition, PermissionId, PermissionKey, Role, RoleAssignment,
    RoleBinding, RoleId,
};

/// In-memory implementation of every RBAC port.
///
/// Backs the service test suites and local development without a database.
/// One instance covers all agencies; the port methods filter by agency the
/// same way the PostgreSQL adapters scope their queries.
#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    permissions: RwLock<HashMap<PermissionId, PermissionDefinition>>,
    roles: RwLock<HashMap<RoleId, (Role, Vec<RoleBinding>)>>,
    assignments: RwLock<HashMap<AssignmentId, RoleAssignment>>,
    branches: RwLock<HashMap<BranchId, Branch>>,
    members: RwLock<HashMap<(AgencyId, UserId), AgencyMember>>,
    resource_branches: RwLock<HashMap<(AgencyId, String, String), BranchId>>,
}

impl InMemoryRbacRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an agency member for membership lookups.
    pub async fn register_member(&self, member: AgencyMember) {
        self.members
            .write()
            .await
            .insert((member.agency_id, member.user_id), member);
    }

    /// Pins a resource row to a branch for scoping checks.
    pub async fn set_resource_branch(
        &self,
        agency_id: AgencyId,
        resource: &str,
        resource_id: &str,
        branch_id: BranchId,
    ) {
        self.resource_branches.write().await.insert(
            (agency_id, resource.to_owned(), resource_id.to_owned()),
            branch_id,
        );
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRbacRepository {
    async fn find_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<PermissionDefinition>> {
        Ok(self.permissions.read().await.get(&permission_id).cloned())
    }

    async fn find_permission_by_key(
        &self,
        key: &PermissionKey,
    ) -> AppResult<Option<PermissionDefinition>> {
        Ok(self
            .permissions
            .read()
            .await
            .values()
            .find(|definition| &definition.key == key)
            .cloned())
    }

    async fn list_permissions(&self) -> AppResult<Vec<PermissionDefinition>> {
        let mut definitions: Vec<PermissionDefinition> =
            self.permissions.read().await.values().cloned().collect();
        definitions.sort_by(|left, right| {
            left.category
                .cmp(&right.category)
                .then_with(|| left.key.cmp(&right.key))
        });

        Ok(definitions)
    }

    async fn insert_permission(&self, definition: PermissionDefinition) -> AppResult<()> {
        self.permissions
            .write()
            .await
            .insert(definition.id, definition);
        Ok(())
    }

    async fn update_permission(&self, definition: PermissionDefinition) -> AppResult<()> {
        self.permissions
            .write()
            .await
            .insert(definition.id, definition);
        Ok(())
    }

    async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<()> {
        self.permissions.write().await.remove(&permission_id);
        Ok(())
    }

    async fn count_bindings_for_permission(&self, permission_id: PermissionId) -> AppResult<u64> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .flat_map(|(_, bindings)| bindings)
            .filter(|binding| binding.permission_id == permission_id)
            .count() as u64)
    }
}

#[async_trait]
impl RoleRepository for InMemoryRbacRepository {
    async fn find_role(&self, agency_id: AgencyId, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .get(&role_id)
            .map(|(role, _)| role)
            .filter(|role| role.agency_id == agency_id)
            .cloned())
    }

    async fn find_role_by_slug(
        &self,
        agency_id: AgencyId,
        slug: &str,
    ) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .map(|(role, _)| role)
            .find(|role| role.agency_id == agency_id && role.slug == slug)
            .cloned())
    }

    async fn list_roles_with_bindings(
        &self,
        agency_id: AgencyId,
    ) -> AppResult<Vec<(Role, Vec<RoleBinding>)>> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .filter(|(role, _)| role.agency_id == agency_id)
            .cloned()
            .collect())
    }

    async fn create_role(&self, role: Role, bindings: Vec<RoleBinding>) -> AppResult<()> {
        self.roles.write().await.insert(role.id, (role, bindings));
        Ok(())
    }

    async fn update_role(&self, role: Role, bindings: Vec<RoleBinding>) -> AppResult<()> {
        self.roles.write().await.insert(role.id, (role, bindings));
        Ok(())
    }

    async fn set_role_active(
        &self,
        agency_id: AgencyId,
        role_id: RoleId,
        is_active: bool,
    ) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        if let Some((role, _)) = roles.get_mut(&role_id)
            && role.agency_id == agency_id
        {
            role.is_active = is_active;
        }

        Ok(())
    }

    async fn delete_role(&self, agency_id: AgencyId, role_id: RoleId) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        let belongs_here = roles
            .get(&role_id)
            .is_some_and(|(role, _)| role.agency_id == agency_id);
        if belongs_here {
            roles.remove(&role_id);
        }

        Ok(())
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryRbacRepository {
    async fn insert(&self, assignment: RoleAssignment) -> AppResult<()> {
        self.assignments
            .write()
            .await
            .insert(assignment.id, assignment);
        Ok(())
    }

    async fn update(&self, assignment: RoleAssignment) -> AppResult<()> {
        self.assignments
            .write()
            .await
            .insert(assignment.id, assignment);
        Ok(())
    }

    async fn find_assignment(
        &self,
        agency_id: AgencyId,
        assignment_id: AssignmentId,
    ) -> AppResult<Option<RoleAssignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .get(&assignment_id)
            .filter(|assignment| assignment.agency_id == agency_id)
            .cloned())
    }

    async fn find_active(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<Option<RoleAssignment>> {
        Ok(self
            .assignments
            .read()
            .await
            .values()
            .find(|assignment| {
                assignment.agency_id == agency_id
                    && assignment.user_id == user_id
                    && assignment.role_id == role_id
                    && assignment.is_active()
            })
            .cloned())
    }

    async fn list_active_for_user(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let mut active: Vec<RoleAssignment> = self
            .assignments
            .read()
            .await
            .values()
            .filter(|assignment| {
                assignment.agency_id == agency_id
                    && assignment.user_id == user_id
                    && assignment.is_active()
            })
            .cloned()
            .collect();
        active.sort_by_key(|assignment| assignment.assigned_at);

        Ok(active)
    }

    async fn count_active_for_role(
        &self,
        agency_id: AgencyId,
        role_id: RoleId,
    ) -> AppResult<u64> {
        Ok(self
            .assignments
            .read()
            .await
            .values()
            .filter(|assignment| {
                assignment.agency_id == agency_id
                    && assignment.role_id == role_id
                    && assignment.is_active()
            })
            .count() as u64)
    }
}

#[async_trait]
impl BranchRepository for InMemoryRbacRepository {
    async fn find_branch(
        &self,
        agency_id: AgencyId,
        branch_id: BranchId,
    ) -> AppResult<Option<Branch>> {
        Ok(self
            .branches
            .read()
            .await
            .get(&branch_id)
            .filter(|branch| branch.agency_id == agency_id)
            .cloned())
    }

    async fn find_branch_by_code(
        &self,
        agency_id: AgencyId,
        code: &str,
    ) -> AppResult<Option<Branch>> {
        Ok(self
            .branches
            .read()
            .await
            .values()
            .find(|branch| branch.agency_id == agency_id && branch.code == code)
            .cloned())
    }

    async fn find_branch_by_manager(
        &self,
        agency_id: AgencyId,
        manager_id: UserId,
    ) -> AppResult<Option<Branch>> {
        Ok(self
            .branches
            .read()
            .await
            .values()
            .find(|branch| {
                branch.agency_id == agency_id && branch.manager_id == Some(manager_id)
            })
            .cloned())
    }

    async fn list_branches(&self, agency_id: AgencyId) -> AppResult<Vec<Branch>> {
        let mut branches: Vec<Branch> = self
            .branches
            .read()
            .await
            .values()
            .filter(|branch| branch.agency_id == agency_id)
            .cloned()
            .collect();
        branches.sort_by(|left, right| left.code.cmp(&right.code));

        Ok(branches)
    }

    async fn insert_branch(&self, branch: Branch) -> AppResult<()> {
        self.branches.write().await.insert(branch.id, branch);
        Ok(())
    }

    async fn update_branch(&self, branch: Branch) -> AppResult<()> {
        self.branches.write().await.insert(branch.id, branch);
        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for InMemoryRbacRepository {
    async fn find_member(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<Option<AgencyMember>> {
        Ok(self
            .members
            .read()
            .await
            .get(&(agency_id, user_id))
            .copied())
    }
}

#[async_trait]
impl ResourceBranchResolver for InMemoryRbacRepository {
    async fn branch_of_resource(
        &self,
        agency_id: AgencyId,
        resource: &str,
        resource_id: &str,
    ) -> AppResult<Option<BranchId>> {
        Ok(self
            .resource_branches
            .read()
            .await
            .get(&(agency_id, resource.to_owned(), resource_id.to_owned()))
            .copied())
    }
}
