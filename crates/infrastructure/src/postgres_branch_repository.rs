use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use enrolia_application::BranchRepository;
use enrolia_core::{AgencyId, AppError, AppResult, BranchId, UserId};
use enrolia_domain::Branch;

/// PostgreSQL-backed branch store.
#[derive(Clone)]
pub struct PostgresBranchRepository {
    pool: PgPool,
}

impl PostgresBranchRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct BranchRow {
    id: uuid::Uuid,
    agency_id: uuid::Uuid,
    name: String,
    code: String,
    manager_id: Option<uuid::Uuid>,
}

impl BranchRow {
    fn into_branch(self) -> Branch {
        Branch {
            id: BranchId::from_uuid(self.id),
            agency_id: AgencyId::from_uuid(self.agency_id),
            name: self.name,
            code: self.code,
            manager_id: self.manager_id.map(UserId::from_uuid),
        }
    }
}

const SELECT_BRANCH: &str = r#"
    SELECT id, agency_id, name, code, manager_id
    FROM branches
"#;

#[async_trait]
impl BranchRepository for PostgresBranchRepository {
    async fn find_branch(
        &self,
        agency_id: AgencyId,
        branch_id: BranchId,
    ) -> AppResult<Option<Branch>> {
        let row = sqlx::query_as::<_, BranchRow>(&format!(
            "{SELECT_BRANCH} WHERE agency_id = $1 AND id = $2"
        ))
        .bind(agency_id.as_uuid())
        .bind(branch_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load branch: {error}")))?;

        Ok(row.map(BranchRow::into_branch))
    }

    async fn find_branch_by_code(
        &self,
        agency_id: AgencyId,
        code: &str,
    ) -> AppResult<Option<Branch>> {
        let row = sqlx::query_as::<_, BranchRow>(&format!(
            "{SELECT_BRANCH} WHERE agency_id = $1 AND code = $2"
        ))
        .bind(agency_id.as_uuid())
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load branch: {error}")))?;

        Ok(row.map(BranchRow::into_branch))
    }

    async fn find_branch_by_manager(
        &self,
        agency_id: AgencyId,
        manager_id: UserId,
    ) -> AppResult<Option<Branch>> {
        let row = sqlx::query_as::<_, BranchRow>(&format!(
            "{SELECT_BRANCH} WHERE agency_id = $1 AND manager_id = $2"
        ))
        .bind(agency_id.as_uuid())
        .bind(manager_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load branch: {error}")))?;

        Ok(row.map(BranchRow::into_branch))
    }

    async fn list_branches(&self, agency_id: AgencyId) -> AppResult<Vec<Branch>> {
        let rows = sqlx::query_as::<_, BranchRow>(&format!(
            "{SELECT_BRANCH} WHERE agency_id = $1 ORDER BY code"
        ))
        .bind(agency_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list branches: {error}")))?;

        Ok(rows.into_iter().map(BranchRow::into_branch).collect())
    }

    async fn insert_branch(&self, branch: Branch) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO branches (id, agency_id, name, code, manager_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(branch.id.as_uuid())
        .bind(branch.agency_id.as_uuid())
        .bind(branch.name.as_str())
        .bind(branch.code.as_str())
        .bind(branch.manager_id.map(|manager_id| manager_id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|error| map_branch_conflict(error, branch.code.as_str()))?;

        Ok(())
    }

    async fn update_branch(&self, branch: Branch) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE branches
            SET name = $3, code = $4, manager_id = $5
            WHERE agency_id = $1 AND id = $2
            "#,
        )
        .bind(branch.agency_id.as_uuid())
        .bind(branch.id.as_uuid())
        .bind(branch.name.as_str())
        .bind(branch.code.as_str())
        .bind(branch.manager_id.map(|manager_id| manager_id.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|error| map_branch_conflict(error, branch.code.as_str()))?;

        Ok(())
    }
}

fn map_branch_conflict(error: sqlx::Error, code: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "branch code '{code}' or its manager is already taken"
        ));
    }

    AppError::Internal(format!("failed to persist branch: {error}"))
}
