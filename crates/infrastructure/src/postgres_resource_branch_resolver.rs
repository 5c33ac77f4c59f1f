use async_trait::async_trait;
use sqlx::PgPool;

use enrolia_application::ResourceBranchResolver;
use enrolia_core::{AgencyId, AppError, AppResult, BranchId};

/// PostgreSQL-backed resolver for the branch a resource row belongs to.
///
/// CRM modules pin their rows in `resource_branches`; rows without a pin
/// resolve to `None` and are treated as agency-wide by the access check.
#[derive(Clone)]
pub struct PostgresResourceBranchResolver {
    pool: PgPool,
}

impl PostgresResourceBranchResolver {
    /// Creates a resolver with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceBranchResolver for PostgresResourceBranchResolver {
    async fn branch_of_resource(
        &self,
        agency_id: AgencyId,
        resource: &str,
        resource_id: &str,
    ) -> AppResult<Option<BranchId>> {
        let branch = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT branch_id
            FROM resource_branches
            WHERE agency_id = $1 AND resource_type = $2 AND resource_id = $3
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(resource)
        .bind(resource_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to resolve resource branch: {error}"))
        })?;

        Ok(branch.map(BranchId::from_uuid))
    }
}
