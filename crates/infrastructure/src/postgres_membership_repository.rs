use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use enrolia_application::{AgencyMember, MembershipRepository};
use enrolia_core::{AgencyId, AppError, AppResult, BranchId, UserId};

/// PostgreSQL-backed agency membership lookups.
#[derive(Clone)]
pub struct PostgresMembershipRepository {
    pool: PgPool,
}

impl PostgresMembershipRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct MemberRow {
    user_id: uuid::Uuid,
    agency_id: uuid::Uuid,
    branch_id: Option<uuid::Uuid>,
}

#[async_trait]
impl MembershipRepository for PostgresMembershipRepository {
    async fn find_member(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> AppResult<Option<AgencyMember>> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT user_id, agency_id, branch_id
            FROM agency_members
            WHERE agency_id = $1 AND user_id = $2
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load membership: {error}")))?;

        Ok(row.map(|row| AgencyMember {
            user_id: UserId::from_uuid(row.user_id),
            agency_id: AgencyId::from_uuid(row.agency_id),
            branch_id: row.branch_id.map(BranchId::from_uuid),
        }))
    }
}
