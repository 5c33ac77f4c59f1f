use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use enrolia_application::AssignmentRepository;
use enrolia_core::{AgencyId, AppError, AppResult, UserId};
use enrolia_domain::{AssignmentId, AssignmentState, RoleAssignment, RoleId};

/// PostgreSQL-backed role assignment ledger.
///
/// Revocation is an update of the `revoked_*` columns, never a delete; a
/// partial unique index keeps at most one active row per user and role.
#[derive(Clone)]
pub struct PostgresAssignmentRepository {
    pool: PgPool,
}

impl PostgresAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: uuid::Uuid,
    agency_id: uuid::Uuid,
    user_id: uuid::Uuid,
    role_id: uuid::Uuid,
    assigned_by: uuid::Uuid,
    assigned_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<uuid::Uuid>,
}

impl AssignmentRow {
    fn into_assignment(self) -> AppResult<RoleAssignment> {
        let state = match (self.revoked_at, self.revoked_by) {
            (None, None) => AssignmentState::Active,
            (Some(at), Some(by)) => AssignmentState::Revoked {
                at,
                by: UserId::from_uuid(by),
            },
            _ => {
                return Err(AppError::Internal(format!(
                    "assignment '{}' has inconsistent revocation columns",
                    self.id
                )));
            }
        };

        Ok(RoleAssignment {
            id: AssignmentId::from_uuid(self.id),
            agency_id: AgencyId::from_uuid(self.agency_id),
            user_id: UserId::from_uuid(self.user_id),
            role_id: RoleId::from_uuid(self.role_id),
            assigned_by: UserId::from_uuid(self.assigned_by),
            assigned_at: self.assigned_at,
            state,
        })
    }
}

fn revocation_columns(assignment: &RoleAssignment) -> (Option<DateTime<Utc>>, Option<uuid::Uuid>) {
    match assignment.state {
        AssignmentState::Active => (None, None),
        AssignmentState::Revoked { at, by } => (Some(at), Some(by.as_uuid())),
    }
}

const SELECT_ASSIGNMENT: &str = r#"
    SELECT id, agency_id, user_id, role_id, assigned_by, assigned_at, revoked_at, revoked_by
    FROM role_assignments
"#;

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn insert(&self, assignment: RoleAssignment) -> AppResult<()> {
        let (revoked_at, revoked_by) = revocation_columns(&assignment);

        sqlx::query(
            r#"
            INSERT INTO role_assignments
                (id, agency_id, user_id, role_id, assigned_by, assigned_at, revoked_at, revoked_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(assignment.id.as_uuid())
        .bind(assignment.agency_id.as_uuid())
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.assigned_by.as_uuid())
        .bind(assignment.assigned_at)
        .bind(revoked_at)
        .bind(revoked_by)
        .execute(&self.pool)
        .await
        .map_err(|error| map_duplicate_active(error, &assignment))?;

        Ok(())
    }

    async fn update(&self, assignment: RoleAssignment) -> AppResult<()> {
        let (revoked_at, revoked_by) = revocation_columns(&assignment);

        sqlx::query(
            r#"
            UPDATE role_assignments
            SET revoked_at = $2, revoked_by = $3
            WHERE id = $1
            "#,
        )
        .bind(assignment.id.as_uuid())
        .bind(revoked_at)
        .bind(revoked_by)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update assignment: {error}")))?;

        Ok(())
    }

    async fn find_assignment(
        &self,
        agency_id: AgencyId,
        assignment_id: AssignmentId,
    ) -> AppResult<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "{SELECT_ASSIGNMENT} WHERE agency_id = $1 AND id = $2"
        ))
        .bind(agency_id.as_uuid())
        .bind(assignment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load assignment: {error}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn find_active(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<Option<RoleAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "{SELECT_ASSIGNMENT} WHERE agency_id = $1 AND user_id = $2 AND role_id = $3 AND revoked_at IS NULL"
        ))
        .bind(agency_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load assignment: {error}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn list_active_for_user(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<Vec<RoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "{SELECT_ASSIGNMENT} WHERE agency_id = $1 AND user_id = $2 AND revoked_at IS NULL ORDER BY assigned_at"
        ))
        .bind(agency_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list assignments: {error}")))?;

        rows.into_iter()
            .map(AssignmentRow::into_assignment)
            .collect()
    }

    async fn count_active_for_role(
        &self,
        agency_id: AgencyId,
        role_id: RoleId,
    ) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM role_assignments
            WHERE agency_id = $1 AND role_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count assignments: {error}")))?;

        Ok(count.max(0) as u64)
    }
}

fn map_duplicate_active(error: sqlx::Error, assignment: &RoleAssignment) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "user '{}' already holds role '{}'",
            assignment.user_id, assignment.role_id
        ));
    }

    AppError::Internal(format!("failed to insert assignment: {error}"))
}
