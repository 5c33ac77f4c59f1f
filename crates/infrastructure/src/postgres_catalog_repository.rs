use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use enrolia_application::CatalogRepository;
use enrolia_core::{AppError, AppResult};
use enrolia_domain::{PermissionDefinition, PermissionId, PermissionKey};

/// PostgreSQL-backed permission catalog.
#[derive(Clone)]
pub struct PostgresCatalogRepository {
    pool: PgPool,
}

impl PostgresCatalogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: uuid::Uuid,
    resource: String,
    action: String,
    category: String,
    description: Option<String>,
    is_system: bool,
}

impl PermissionRow {
    fn into_definition(self) -> AppResult<PermissionDefinition> {
        let key = PermissionKey::new(self.resource.as_str(), self.action.as_str()).map_err(
            |error| {
                AppError::Internal(format!(
                    "invalid stored permission '{}:{}': {error}",
                    self.resource, self.action
                ))
            },
        )?;

        Ok(PermissionDefinition {
            id: PermissionId::from_uuid(self.id),
            key,
            category: self.category,
            description: self.description,
            is_system: self.is_system,
        })
    }
}

#[async_trait]
impl CatalogRepository for PostgresCatalogRepository {
    async fn find_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<PermissionDefinition>> {
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, resource, action, category, description, is_system
            FROM permissions
            WHERE id = $1
            "#,
        )
        .bind(permission_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load permission: {error}")))?;

        row.map(PermissionRow::into_definition).transpose()
    }

    async fn find_permission_by_key(
        &self,
        key: &PermissionKey,
    ) -> AppResult<Option<PermissionDefinition>> {
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, resource, action, category, description, is_system
            FROM permissions
            WHERE resource = $1 AND action = $2
            "#,
        )
        .bind(key.resource())
        .bind(key.action())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load permission: {error}")))?;

        row.map(PermissionRow::into_definition).transpose()
    }

    async fn list_permissions(&self) -> AppResult<Vec<PermissionDefinition>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, resource, action, category, description, is_system
            FROM permissions
            ORDER BY category, resource, action
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list permissions: {error}")))?;

        rows.into_iter()
            .map(PermissionRow::into_definition)
            .collect()
    }

    async fn insert_permission(&self, definition: PermissionDefinition) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, resource, action, category, description, is_system)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(definition.id.as_uuid())
        .bind(definition.key.resource())
        .bind(definition.key.action())
        .bind(definition.category.as_str())
        .bind(definition.description.as_deref())
        .bind(definition.is_system)
        .execute(&self.pool)
        .await
        .map_err(|error| map_permission_conflict(error, &definition.key))?;

        Ok(())
    }

    async fn update_permission(&self, definition: PermissionDefinition) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE permissions
            SET category = $2, description = $3
            WHERE id = $1
            "#,
        )
        .bind(definition.id.as_uuid())
        .bind(definition.category.as_str())
        .bind(definition.description.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update permission: {error}")))?;

        Ok(())
    }

    async fn delete_permission(&self, permission_id: PermissionId) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM permissions
            WHERE id = $1
            "#,
        )
        .bind(permission_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete permission: {error}")))?;

        Ok(())
    }

    async fn count_bindings_for_permission(&self, permission_id: PermissionId) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM role_bindings
            WHERE permission_id = $1
            "#,
        )
        .bind(permission_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count permission bindings: {error}"))
        })?;

        Ok(count.max(0) as u64)
    }
}

fn map_permission_conflict(error: sqlx::Error, key: &PermissionKey) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("permission '{key}' already exists in the catalog"));
    }

    AppError::Internal(format!("failed to create permission: {error}"))
}
