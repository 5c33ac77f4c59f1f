use std::sync::Arc;

use async_trait::async_trait;
use enrolia_core::{AppError, AppResult, UserIdentity};
use enrolia_domain::{PermissionDefinition, PermissionId, PermissionKey};

use crate::{AccessService, AuditAction, AuditEvent, AuditRepository};

/// Port for the global permission catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Finds a catalog entry by id.
    async fn find_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<PermissionDefinition>>;

    /// Finds a catalog entry by its resource/action key.
    async fn find_permission_by_key(
        &self,
        key: &PermissionKey,
    ) -> AppResult<Option<PermissionDefinition>>;

    /// Lists the full catalog, ordered by category then slug.
    async fn list_permissions(&self) -> AppResult<Vec<PermissionDefinition>>;

    /// Persists a new catalog entry.
    async fn insert_permission(&self, definition: PermissionDefinition) -> AppResult<()>;

    /// Persists metadata edits to an existing entry.
    async fn update_permission(&self, definition: PermissionDefinition) -> AppResult<()>;

    /// Removes a catalog entry.
    async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<()>;

    /// Counts role bindings that reference an entry, across all agencies.
    async fn count_bindings_for_permission(&self, permission_id: PermissionId) -> AppResult<u64>;
}

/// Input payload for registering a catalog permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePermissionInput {
    /// Resource segment, e.g. `students`.
    pub resource: String,
    /// Action segment, e.g. `read`.
    pub action: String,
    /// Grouping label for admin UIs.
    pub category: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// System entries are delete-protected once created.
    pub is_system: bool,
}

/// Application service for the permission catalog.
#[derive(Clone)]
pub struct CatalogService {
    access_service: AccessService,
    catalog: Arc<dyn CatalogRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl CatalogService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        access_service: AccessService,
        catalog: Arc<dyn CatalogRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            access_service,
            catalog,
            audit_repository,
        }
    }

    /// Registers a new permission in the catalog.
    pub async fn create_permission(
        &self,
        actor: &UserIdentity,
        input: CreatePermissionInput,
    ) -> AppResult<PermissionDefinition> {
        self.access_service
            .require_permission(actor.agency_id(), actor.user_id(), &manage_permissions_key()?)
            .await?;

        let key = PermissionKey::new(input.resource, input.action)?;
        if self.catalog.find_permission_by_key(&key).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "permission '{key}' already exists in the catalog"
            )));
        }

        let definition = PermissionDefinition {
            id: PermissionId::new(),
            key,
            category: input.category,
            description: input.description,
            is_system: input.is_system,
        };
        self.catalog.insert_permission(definition.clone()).await?;

        self.audit_repository
            .append_event(AuditEvent {
                agency_id: actor.agency_id(),
                actor_id: actor.user_id(),
                action: AuditAction::PermissionCreated,
                resource_type: "permission".to_owned(),
                resource_id: definition.id.to_string(),
                detail: Some(format!("registered permission '{}'", definition.key)),
            })
            .await?;

        Ok(definition)
    }

    /// Edits the category and description of an entry.
    ///
    /// The resource/action identity of an entry is immutable; renaming a
    /// permission means creating a new one and migrating bindings.
    pub async fn update_permission_metadata(
        &self,
        actor: &UserIdentity,
        permission_id: PermissionId,
        category: String,
        description: Option<String>,
    ) -> AppResult<PermissionDefinition> {
        self.access_service
            .require_permission(actor.agency_id(), actor.user_id(), &manage_permissions_key()?)
            .await?;

        let mut definition = self
            .catalog
            .find_permission(permission_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("permission '{permission_id}' was not found"))
            })?;

        definition.category = category;
        definition.description = description;
        self.catalog.update_permission(definition.clone()).await?;

        Ok(definition)
    }

    /// Deletes a catalog entry that no role still references.
    pub async fn delete_permission(
        &self,
        actor: &UserIdentity,
        permission_id: PermissionId,
    ) -> AppResult<()> {
        self.access_service
            .require_permission(actor.agency_id(), actor.user_id(), &manage_permissions_key()?)
            .await?;

        let definition = self
            .catalog
            .find_permission(permission_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("permission '{permission_id}' was not found"))
            })?;

        if definition.is_system {
            return Err(AppError::Conflict(format!(
                "permission '{}' is system-managed and cannot be deleted",
                definition.key
            )));
        }

        let bindings = self.catalog.count_bindings_for_permission(permission_id).await?;
        if bindings > 0 {
            return Err(AppError::Conflict(format!(
                "permission '{}' is still referenced by {bindings} role bindings",
                definition.key
            )));
        }

        self.catalog.delete_permission(permission_id).await?;

        self.audit_repository
            .append_event(AuditEvent {
                agency_id: actor.agency_id(),
                actor_id: actor.user_id(),
                action: AuditAction::PermissionDeleted,
                resource_type: "permission".to_owned(),
                resource_id: permission_id.to_string(),
                detail: Some(format!("deleted permission '{}'", definition.key)),
            })
            .await?;

        Ok(())
    }

    /// Lists the catalog for role-editor UIs.
    pub async fn list_permissions(
        &self,
        actor: &UserIdentity,
    ) -> AppResult<Vec<PermissionDefinition>> {
        self.access_service
            .require_permission(actor.agency_id(), actor.user_id(), &read_permissions_key()?)
            .await?;

        self.catalog.list_permissions().await
    }
}

fn manage_permissions_key() -> AppResult<PermissionKey> {
    PermissionKey::new("permissions", "manage")
}

fn read_permissions_key() -> AppResult<PermissionKey> {
    PermissionKey::new("permissions", "read")
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use async_trait::async_trait;
    use enrolia_core::{AgencyId, AppError, AppResult, BranchId, UserId, UserIdentity};
    use enrolia_domain::{
        AccessLevel, PermissionDefinition, PermissionId, PermissionKey, Role, RoleAssignment,
        RoleBinding, RoleId, RoleScope,
    };
    use tokio::sync::Mutex;

    use crate::access_service::{AccessService, ResourceBranchResolver};
    use crate::assignment_service::AssignmentRepository;
    use crate::audit::{AuditEvent, AuditRepository};
    use crate::membership::{AgencyMember, MembershipRepository};
    use crate::role_service::RoleRepository;

    use super::{CatalogRepository, CatalogService, CreatePermissionInput};

    #[derive(Default)]
    struct InMemoryCatalog {
        rows: Mutex<Vec<PermissionDefinition>>,
        bound: Mutex<Vec<PermissionId>>,
    }

    #[async_trait]
    impl CatalogRepository for InMemoryCatalog {
        async fn find_permission(
            &self,
            permission_id: PermissionId,
        ) -> AppResult<Option<PermissionDefinition>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .find(|row| row.id == permission_id)
                .cloned())
        }

        async fn find_permission_by_key(
            &self,
            key: &PermissionKey,
        ) -> AppResult<Option<PermissionDefinition>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .find(|row| &row.key == key)
                .cloned())
        }

        async fn list_permissions(&self) -> AppResult<Vec<PermissionDefinition>> {
            Ok(self.rows.lock().await.clone())
        }

        async fn insert_permission(&self, definition: PermissionDefinition) -> AppResult<()> {
            self.rows.lock().await.push(definition);
            Ok(())
        }

        async fn update_permission(&self, definition: PermissionDefinition) -> AppResult<()> {
            let mut rows = self.rows.lock().await;
            if let Some(stored) = rows.iter_mut().find(|stored| stored.id == definition.id) {
                *stored = definition;
            }
            Ok(())
        }

        async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<()> {
            self.rows.lock().await.retain(|row| row.id != permission_id);
            Ok(())
        }

        async fn count_bindings_for_permission(
            &self,
            permission_id: PermissionId,
        ) -> AppResult<u64> {
            Ok(self
                .bound
                .lock()
                .await
                .iter()
                .filter(|bound| **bound == permission_id)
                .count() as u64)
        }
    }

    struct FakeRoles {
        entries: Vec<(Role, Vec<RoleBinding>)>,
    }

    #[async_trait]
    impl RoleRepository for FakeRoles {
        async fn find_role(
            &self,
            agency_id: AgencyId,
            role_id: RoleId,
        ) -> AppResult<Option<Role>> {
            Ok(self
                .entries
                .iter()
                .map(|(role, _)| role)
                .find(|role| role.agency_id == agency_id && role.id == role_id)
                .cloned())
        }

        async fn find_role_by_slug(
            &self,
            agency_id: AgencyId,
            slug: &str,
        ) -> AppResult<Option<Role>> {
            Ok(self
                .entries
                .iter()
                .map(|(role, _)| role)
                .find(|role| role.agency_id == agency_id && role.slug == slug)
                .cloned())
        }

        async fn list_roles_with_bindings(
            &self,
            agency_id: AgencyId,
        ) -> AppResult<Vec<(Role, Vec<RoleBinding>)>> {
            Ok(self
                .entries
                .iter()
                .filter(|(role, _)| role.agency_id == agency_id)
                .cloned()
                .collect())
        }

        async fn create_role(&self, _role: Role, _bindings: Vec<RoleBinding>) -> AppResult<()> {
            Ok(())
        }

        async fn update_role(&self, _role: Role, _bindings: Vec<RoleBinding>) -> AppResult<()> {
            Ok(())
        }

        async fn set_role_active(
            &self,
            _agency_id: AgencyId,
            _role_id: RoleId,
            _is_active: bool,
        ) -> AppResult<()> {
            Ok(())
        }

        async fn delete_role(&self, _agency_id: AgencyId, _role_id: RoleId) -> AppResult<()> {
            Ok(())
        }
    }

    struct FakeAssignments {
        rows: Vec<RoleAssignment>,
    }

    #[async_trait]
    impl AssignmentRepository for FakeAssignments {
        async fn insert(&self, _assignment: RoleAssignment) -> AppResult<()> {
            Ok(())
        }

        async fn update(&self, _assignment: RoleAssignment) -> AppResult<()> {
            Ok(())
        }

        async fn find_assignment(
            &self,
            _agency_id: AgencyId,
            _assignment_id: enrolia_domain::AssignmentId,
        ) -> AppResult<Option<RoleAssignment>> {
            Ok(None)
        }

        async fn find_active(
            &self,
            _agency_id: AgencyId,
            _user_id: UserId,
            _role_id: RoleId,
        ) -> AppResult<Option<RoleAssignment>> {
            Ok(None)
        }

        async fn list_active_for_user(
            &self,
            agency_id: AgencyId,
            user_id: UserId,
        ) -> AppResult<Vec<RoleAssignment>> {
            Ok(self
                .rows
                .iter()
                .filter(|row| {
                    row.agency_id == agency_id && row.user_id == user_id && row.is_active()
                })
                .cloned()
                .collect())
        }

        async fn count_active_for_role(
            &self,
            _agency_id: AgencyId,
            _role_id: RoleId,
        ) -> AppResult<u64> {
            Ok(0)
        }
    }

    struct FakeMembers {
        members: Vec<AgencyMember>,
    }

    #[async_trait]
    impl MembershipRepository for FakeMembers {
        async fn find_member(
            &self,
            agency_id: AgencyId,
            user_id: UserId,
        ) -> AppResult<Option<AgencyMember>> {
            Ok(self
                .members
                .iter()
                .find(|member| member.agency_id == agency_id && member.user_id == user_id)
                .copied())
        }
    }

    struct NoResourceBranches;

    #[async_trait]
    impl ResourceBranchResolver for NoResourceBranches {
        async fn branch_of_resource(
            &self,
            _agency_id: AgencyId,
            _resource: &str,
            _resource_id: &str,
        ) -> AppResult<Option<BranchId>> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        events: Mutex<Vec<AuditEvent>>,
    }

    #[async_trait]
    impl AuditRepository for RecordingAudit {
        async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    fn key(value: &str) -> PermissionKey {
        match PermissionKey::from_str(value) {
            Ok(key) => key,
            Err(error) => panic!("invalid test key: {error}"),
        }
    }

    struct Harness {
        service: CatalogService,
        catalog: Arc<InMemoryCatalog>,
        audit: Arc<RecordingAudit>,
        actor: UserIdentity,
    }

    fn harness() -> Harness {
        let agency_id = AgencyId::new();
        let actor_id = UserId::new();

        let admin = Role {
            id: RoleId::new(),
            agency_id,
            name: "agency_admin".to_owned(),
            slug: "agency_admin".to_owned(),
            level: 10,
            scope: RoleScope::Agency,
            branch_id: None,
            parent_id: None,
            is_active: true,
        };
        let bindings = vec![
            RoleBinding {
                role_id: admin.id,
                permission_id: PermissionId::new(),
                key: key("permissions:manage"),
                access_level: AccessLevel::Full,
                conditions: Vec::new(),
            },
            RoleBinding {
                role_id: admin.id,
                permission_id: PermissionId::new(),
                key: key("permissions:read"),
                access_level: AccessLevel::Full,
                conditions: Vec::new(),
            },
        ];
        let assignment = RoleAssignment::new(agency_id, actor_id, admin.id, actor_id);

        let catalog = Arc::new(InMemoryCatalog::default());
        let audit = Arc::new(RecordingAudit::default());
        let access_service = AccessService::new(
            Arc::new(FakeAssignments {
                rows: vec![assignment],
            }),
            Arc::new(FakeRoles {
                entries: vec![(admin, bindings)],
            }),
            Arc::new(FakeMembers {
                members: vec![AgencyMember {
                    user_id: actor_id,
                    agency_id,
                    branch_id: None,
                }],
            }),
            Arc::new(NoResourceBranches),
        );
        let service = CatalogService::new(access_service, catalog.clone(), audit.clone());

        Harness {
            service,
            catalog,
            audit,
            actor: UserIdentity::new(actor_id, "admin", None, agency_id, None),
        }
    }

    fn input(resource: &str, action: &str) -> CreatePermissionInput {
        CreatePermissionInput {
            resource: resource.to_owned(),
            action: action.to_owned(),
            category: "test".to_owned(),
            description: None,
            is_system: false,
        }
    }

    #[tokio::test]
    async fn create_permission_stores_entry_and_audits() {
        let harness = harness();

        let created = harness
            .service
            .create_permission(&harness.actor, input("students", "read"))
            .await;

        let created = match created {
            Ok(definition) => definition,
            Err(error) => panic!("create failed: {error}"),
        };
        assert_eq!(created.key.slug(), "students:read");
        assert!(!created.is_system);
        assert_eq!(harness.catalog.rows.lock().await.len(), 1);
        assert_eq!(harness.audit.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_key_is_a_conflict() {
        let harness = harness();

        let first = harness
            .service
            .create_permission(&harness.actor, input("students", "read"))
            .await;
        assert!(first.is_ok());

        let second = harness
            .service
            .create_permission(&harness.actor, input("Students", " READ "))
            .await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn invalid_segment_is_a_validation_error() {
        let harness = harness();

        let result = harness
            .service
            .create_permission(&harness.actor, input("students", "re ad"))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn metadata_update_keeps_key_identity() {
        let harness = harness();

        let created = harness
            .service
            .create_permission(&harness.actor, input("students", "read"))
            .await;
        let created = match created {
            Ok(definition) => definition,
            Err(error) => panic!("create failed: {error}"),
        };

        let updated = harness
            .service
            .update_permission_metadata(
                &harness.actor,
                created.id,
                "enrollment".to_owned(),
                Some("read student records".to_owned()),
            )
            .await;

        let updated = match updated {
            Ok(definition) => definition,
            Err(error) => panic!("update failed: {error}"),
        };
        assert_eq!(updated.key, created.key);
        assert_eq!(updated.category, "enrollment");
    }

    #[tokio::test]
    async fn system_permission_cannot_be_deleted() {
        let harness = harness();
        let definition = PermissionDefinition {
            id: PermissionId::new(),
            key: key("roles:manage"),
            category: "security".to_owned(),
            description: None,
            is_system: true,
        };
        harness.catalog.rows.lock().await.push(definition.clone());

        let result = harness
            .service
            .delete_permission(&harness.actor, definition.id)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(harness.catalog.rows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn system_flag_on_create_is_persisted_and_delete_protected() {
        let harness = harness();

        let mut system_input = input("roles", "manage");
        system_input.category = "administration".to_owned();
        system_input.is_system = true;

        let created = harness
            .service
            .create_permission(&harness.actor, system_input)
            .await;
        let created = match created {
            Ok(definition) => definition,
            Err(error) => panic!("create failed: {error}"),
        };
        assert!(created.is_system);

        let result = harness
            .service
            .delete_permission(&harness.actor, created.id)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn referenced_permission_cannot_be_deleted() {
        let harness = harness();

        let created = harness
            .service
            .create_permission(&harness.actor, input("students", "read"))
            .await;
        let created = match created {
            Ok(definition) => definition,
            Err(error) => panic!("create failed: {error}"),
        };
        harness.catalog.bound.lock().await.push(created.id);

        let result = harness
            .service
            .delete_permission(&harness.actor, created.id)
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn unbound_permission_is_deleted() {
        let harness = harness();

        let created = harness
            .service
            .create_permission(&harness.actor, input("students", "read"))
            .await;
        let created = match created {
            Ok(definition) => definition,
            Err(error) => panic!("create failed: {error}"),
        };

        let result = harness
            .service
            .delete_permission(&harness.actor, created.id)
            .await;

        assert!(result.is_ok());
        assert!(harness.catalog.rows.lock().await.is_empty());
    }

    #[tokio::test]
    async fn actor_without_catalog_permission_is_forbidden() {
        let harness = harness();
        let outsider = UserIdentity::new(UserId::new(), "outsider", None, harness.actor.agency_id(), None);

        let result = harness
            .service
            .create_permission(&outsider, input("students", "read"))
            .await;

        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
