use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use enrolia_core::{AgencyId, AppError, AppResult, UserId, UserIdentity};
use enrolia_domain::{AssignmentId, PermissionKey, Role, RoleAssignment, RoleId};

use crate::{
    AccessService, AuditAction, AuditEvent, AuditRepository, MembershipRepository, RoleRepository,
};

/// Port for the role assignment ledger.
///
/// Entries are never deleted; revocation is a state update so the ledger
/// stays a complete history.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Appends a new assignment.
    async fn insert(&self, assignment: RoleAssignment) -> AppResult<()>;

    /// Persists an updated assignment state.
    async fn update(&self, assignment: RoleAssignment) -> AppResult<()>;

    /// Finds an assignment by ledger id within an agency.
    async fn find_assignment(
        &self,
        agency_id: AgencyId,
        assignment_id: AssignmentId,
    ) -> AppResult<Option<RoleAssignment>>;

    /// Finds the active assignment of a role to a user, if one exists.
    async fn find_active(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<Option<RoleAssignment>>;

    /// Lists all active assignments of a user; the resolver calls this on
    /// every permission check.
    async fn list_active_for_user(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<Vec<RoleAssignment>>;

    /// Counts active assignments of one role.
    async fn count_active_for_role(&self, agency_id: AgencyId, role_id: RoleId)
    -> AppResult<u64>;
}

/// Active assignment joined with its role.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRole {
    /// Ledger entry.
    pub assignment: RoleAssignment,
    /// Granted role.
    pub role: Role,
}

/// Result of an assignment mutation.
///
/// The audit write is best-effort: a failed append is logged and surfaced
/// here instead of rolling back the assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleAssignmentOutcome {
    /// The created or revoked assignment.
    pub assignment: RoleAssignment,
    /// Whether the audit trail recorded the mutation.
    pub audit_recorded: bool,
}

/// Application service for the role assignment ledger.
#[derive(Clone)]
pub struct AssignmentService {
    access_service: AccessService,
    assignments: Arc<dyn AssignmentRepository>,
    roles: Arc<dyn RoleRepository>,
    membership: Arc<dyn MembershipRepository>,
    audit_repository: Arc<dyn AuditRepository>,
}

impl AssignmentService {
    /// Creates a new service from required dependencies.
    #[must_use]
    pub fn new(
        access_service: AccessService,
        assignments: Arc<dyn AssignmentRepository>,
        roles: Arc<dyn RoleRepository>,
        membership: Arc<dyn MembershipRepository>,
        audit_repository: Arc<dyn AuditRepository>,
    ) -> Self {
        Self {
            access_service,
            assignments,
            roles,
            membership,
            audit_repository,
        }
    }

    /// Assigns a role to an agency member.
    pub async fn assign_role(
        &self,
        actor: &UserIdentity,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<RoleAssignmentOutcome> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &manage_roles_key()?)
            .await?;

        let member = self
            .membership
            .find_member(agency_id, user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "user '{user_id}' does not belong to agency '{agency_id}'"
                ))
            })?;

        let role = self
            .roles
            .find_role(agency_id, role_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "role '{role_id}' does not belong to agency '{agency_id}'"
                ))
            })?;

        if !role.is_active {
            return Err(AppError::Validation(format!(
                "role '{}' is deactivated and cannot be assigned",
                role.slug
            )));
        }

        if self
            .assignments
            .find_active(agency_id, member.user_id, role.id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "user '{user_id}' already holds role '{}'",
                role.slug
            )));
        }

        let assignment = RoleAssignment::new(agency_id, member.user_id, role.id, actor.user_id());
        self.assignments.insert(assignment.clone()).await?;

        let audit_recorded = self
            .append_audit_best_effort(
                actor,
                AuditAction::RoleAssigned,
                assignment.id,
                format!("assigned role '{}' to user '{user_id}'", role.slug),
            )
            .await;

        Ok(RoleAssignmentOutcome {
            assignment,
            audit_recorded,
        })
    }

    /// Revokes an assignment; revoking an already-revoked entry is a no-op
    /// success that keeps the original revocation record.
    pub async fn revoke_role(
        &self,
        actor: &UserIdentity,
        assignment_id: AssignmentId,
    ) -> AppResult<RoleAssignmentOutcome> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &manage_roles_key()?)
            .await?;

        let mut assignment = self
            .assignments
            .find_assignment(agency_id, assignment_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("assignment '{assignment_id}' was not found"))
            })?;

        if !assignment.is_active() {
            return Ok(RoleAssignmentOutcome {
                assignment,
                audit_recorded: true,
            });
        }

        assignment.revoke(actor.user_id(), Utc::now());
        self.assignments.update(assignment.clone()).await?;

        let audit_recorded = self
            .append_audit_best_effort(
                actor,
                AuditAction::RoleRevoked,
                assignment.id,
                format!(
                    "revoked role '{}' from user '{}'",
                    assignment.role_id, assignment.user_id
                ),
            )
            .await;

        Ok(RoleAssignmentOutcome {
            assignment,
            audit_recorded,
        })
    }

    /// Lists a user's active assignments joined with role details.
    pub async fn list_active_roles(
        &self,
        actor: &UserIdentity,
        user_id: UserId,
    ) -> AppResult<Vec<ActiveRole>> {
        let agency_id = actor.agency_id();
        self.access_service
            .require_permission(agency_id, actor.user_id(), &read_roles_key()?)
            .await?;

        let assignments = self
            .assignments
            .list_active_for_user(agency_id, user_id)
            .await?;

        let mut active_roles = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            if let Some(role) = self.roles.find_role(agency_id, assignment.role_id).await? {
                active_roles.push(ActiveRole { assignment, role });
            }
        }

        Ok(active_roles)
    }

    async fn append_audit_best_effort(
        &self,
        actor: &UserIdentity,
        action: AuditAction,
        assignment_id: AssignmentId,
        detail: String,
    ) -> bool {
        let event = AuditEvent {
            agency_id: actor.agency_id(),
            actor_id: actor.user_id(),
            action,
            resource_type: "role_assignment".to_owned(),
            resource_id: assignment_id.to_string(),
            detail: Some(detail),
        };

        match self.audit_repository.append_event(event).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    %error,
                    assignment_id = %assignment_id,
                    "audit append failed for assignment mutation; continuing"
                );
                false
            }
        }
    }
}

fn manage_roles_key() -> AppResult<PermissionKey> {
    PermissionKey::new("roles", "manage")
}

fn read_roles_key() -> AppResult<PermissionKey> {
    PermissionKey::new("roles", "read")
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use async_trait::async_trait;
    use enrolia_core::{AgencyId, AppError, AppResult, BranchId, UserId, UserIdentity};
    use enrolia_domain::{
        AccessLevel, AssignmentId, PermissionId, PermissionKey, Role, RoleAssignment, RoleBinding,
        RoleId, RoleScope,
    };
    use tokio::sync::Mutex;

    use crate::{
        AccessService, AgencyMember, AuditEvent, AuditRepository, MembershipRepository,
        ResourceBranchResolver, RoleRepository,
    };

    use super::{AssignmentRepository, AssignmentService};

    #[derive(Default)]
    struct InMemoryAssignments {
        rows: Mutex<Vec<RoleAssignment>>,
    }

    #[async_trait]
    impl AssignmentRepository for InMemoryAssignments {
        async fn insert(&self, assignment: RoleAssignment) -> AppResult<()> {
            self.rows.lock().await.push(assignment);
            Ok(())
        }

        async fn update(&self, assignment: RoleAssignment) -> AppResult<()> {
            let mut rows = self.rows.lock().await;
            if let Some(stored) = rows.iter_mut().find(|stored| stored.id == assignment.id) {
                *stored = assignment;
            }
            Ok(())
        }

        async fn find_assignment(
            &self,
            agency_id: AgencyId,
            assignment_id: AssignmentId,
        ) -> AppResult<Option<RoleAssignment>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .find(|row| row.agency_id == agency_id && row.id == assignment_id)
                .cloned())
        }

        async fn find_active(
            &self,
            agency_id: AgencyId,
            user_id: UserId,
            role_id: RoleId,
        ) -> AppResult<Option<RoleAssignment>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .find(|row| {
                    row.agency_id == agency_id
                        && row.user_id == user_id
                        && row.role_id == role_id
                        && row.is_active()
                })
                .cloned())
        }

        async fn list_active_for_user(
            &self,
            agency_id: AgencyId,
            user_id: UserId,
        ) -> AppResult<Vec<RoleAssignment>> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|row| {
                    row.agency_id == agency_id && row.user_id == user_id && row.is_active()
                })
                .cloned()
                .collect())
        }

        async fn count_active_for_role(
            &self,
            agency_id: AgencyId,
            role_id: RoleId,
        ) -> AppResult<u64> {
            Ok(self
                .rows
                .lock()
                .await
                .iter()
                .filter(|row| {
                    row.agency_id == agency_id && row.role_id == role_id && row.is_active()
                })
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
        fail: bool,
    }

    #[async_trait]
    impl AuditRepository for RecordingAudit {
        async fn append_event(&self, event: AuditEvent) -> AppResult<()> {
            if self.fail {
                return Err(AppError::Internal("audit sink unavailable".to_owned()));
            }
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

    fn admin_role(agency_id: AgencyId) -> (Role, Vec<RoleBinding>) {
        let role = Role {
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
                role_id: role.id,
                permission_id: PermissionId::new(),
                key: key("roles:manage"),
                access_level: AccessLevel::Full,
                conditions: Vec::new(),
            },
            RoleBinding {
                role_id: role.id,
                permission_id: PermissionId::new(),
                key: key("roles:read"),
                access_level: AccessLevel::Full,
                conditions: Vec::new(),
            },
        ];
        (role, bindings)
    }

    struct Harness {
        service: AssignmentService,
        assignments: Arc<InMemoryAssignments>,
        audit: Arc<RecordingAudit>,
        actor: UserIdentity,
        agency_id: AgencyId,
        consultant: Role,
        member_id: UserId,
    }

    async fn harness(audit_fails: bool) -> Harness {
        let agency_id = AgencyId::new();
        let actor_id = UserId::new();
        let member_id = UserId::new();
        let (admin, admin_bindings) = admin_role(agency_id);
        let consultant = Role {
            id: RoleId::new(),
            agency_id,
            name: "consultant".to_owned(),
            slug: "consultant".to_owned(),
            level: 1,
            scope: RoleScope::Agency,
            branch_id: None,
            parent_id: None,
            is_active: true,
        };

        let assignments = Arc::new(InMemoryAssignments::default());
        let actor_assignment = RoleAssignment::new(agency_id, actor_id, admin.id, actor_id);
        assignments.rows.lock().await.push(actor_assignment);

        let roles = Arc::new(FakeRoles {
            entries: vec![(admin, admin_bindings), (consultant.clone(), Vec::new())],
        });
        let membership = Arc::new(FakeMembers {
            members: vec![
                AgencyMember {
                    user_id: actor_id,
                    agency_id,
                    branch_id: None,
                },
                AgencyMember {
                    user_id: member_id,
                    agency_id,
                    branch_id: None,
                },
            ],
        });
        let audit = Arc::new(RecordingAudit {
            events: Mutex::new(Vec::new()),
            fail: audit_fails,
        });

        let access_service = AccessService::new(
            assignments.clone(),
            roles.clone(),
            membership.clone(),
            Arc::new(NoResourceBranches),
        );
        let service = AssignmentService::new(
            access_service,
            assignments.clone(),
            roles,
            membership,
            audit.clone(),
        );

        Harness {
            service,
            assignments,
            audit,
            actor: UserIdentity::new(actor_id, "admin", None, agency_id, None),
            agency_id,
            consultant,
            member_id,
        }
    }

    #[tokio::test]
    async fn assign_role_records_ledger_entry_and_audit() {
        let harness = harness(false).await;

        let outcome = harness
            .service
            .assign_role(&harness.actor, harness.member_id, harness.consultant.id)
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => panic!("assign failed: {error}"),
        };
        assert!(outcome.assignment.is_active());
        assert!(outcome.audit_recorded);
        assert_eq!(harness.audit.events.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_active_assignment_is_a_conflict() {
        let harness = harness(false).await;

        let first = harness
            .service
            .assign_role(&harness.actor, harness.member_id, harness.consultant.id)
            .await;
        assert!(first.is_ok());

        let second = harness
            .service
            .assign_role(&harness.actor, harness.member_id, harness.consultant.id)
            .await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn assigning_to_outside_user_is_not_found() {
        let harness = harness(false).await;

        let result = harness
            .service
            .assign_role(&harness.actor, UserId::new(), harness.consultant.id)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn audit_failure_does_not_roll_back_assignment() {
        let harness = harness(true).await;

        let outcome = harness
            .service
            .assign_role(&harness.actor, harness.member_id, harness.consultant.id)
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(error) => panic!("assign failed: {error}"),
        };
        assert!(!outcome.audit_recorded);

        let stored = harness
            .assignments
            .find_active(harness.agency_id, harness.member_id, harness.consultant.id)
            .await;
        assert!(matches!(stored, Ok(Some(_))));
    }

    #[tokio::test]
    async fn revoke_is_idempotent_and_keeps_first_timestamp() {
        let harness = harness(false).await;

        let outcome = harness
            .service
            .assign_role(&harness.actor, harness.member_id, harness.consultant.id)
            .await;
        let assignment_id = match outcome {
            Ok(outcome) => outcome.assignment.id,
            Err(error) => panic!("assign failed: {error}"),
        };

        let first = harness.service.revoke_role(&harness.actor, assignment_id).await;
        let first_state = match first {
            Ok(outcome) => outcome.assignment.state,
            Err(error) => panic!("revoke failed: {error}"),
        };

        let second = harness.service.revoke_role(&harness.actor, assignment_id).await;
        let second_state = match second {
            Ok(outcome) => outcome.assignment.state,
            Err(error) => panic!("second revoke failed: {error}"),
        };

        assert_eq!(first_state, second_state);
    }

    #[tokio::test]
    async fn revoking_unknown_assignment_is_not_found() {
        let harness = harness(false).await;

        let result = harness
            .service
            .revoke_role(&harness.actor, AssignmentId::new())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn actor_without_manage_permission_is_forbidden() {
        let harness = harness(false).await;
        let outsider = UserIdentity::new(UserId::new(), "outsider", None, harness.agency_id, None);

        let result = harness
            .service
            .assign_role(&outsider, harness.member_id, harness.consultant.id)
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn revoke_then_check_denies_immediately() {
        let harness = harness(false).await;

        let outcome = harness
            .service
            .assign_role(&harness.actor, harness.member_id, harness.consultant.id)
            .await;
        let assignment_id = match outcome {
            Ok(outcome) => outcome.assignment.id,
            Err(error) => panic!("assign failed: {error}"),
        };

        let active = harness
            .service
            .list_active_roles(&harness.actor, harness.member_id)
            .await;
        assert_eq!(active.ok().map(|roles| roles.len()), Some(1));

        let revoked = harness.service.revoke_role(&harness.actor, assignment_id).await;
        assert!(revoked.is_ok());

        let active = harness
            .service
            .list_active_roles(&harness.actor, harness.member_id)
            .await;
        assert_eq!(active.ok().map(|roles| roles.len()), Some(0));
    }
}
