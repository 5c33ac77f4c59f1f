use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use enrolia_application::RoleRepository;
use enrolia_core::{AgencyId, AppError, AppResult, BranchId};
use enrolia_domain::{
    AccessCondition, AccessLevel, PermissionId, PermissionKey, Role, RoleBinding, RoleId,
    RoleScope,
};

#[cfg(test)]
mod tests;

/// PostgreSQL-backed role store.
///
/// Role rows and their bindings are written in one transaction so a
/// partially persisted role is never observable.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    agency_id: uuid::Uuid,
    name: String,
    slug: String,
    level: i32,
    scope: String,
    branch_id: Option<uuid::Uuid>,
    parent_id: Option<uuid::Uuid>,
    is_active: bool,
}

#[derive(Debug, FromRow)]
struct RoleWithBindingRow {
    id: uuid::Uuid,
    agency_id: uuid::Uuid,
    name: String,
    slug: String,
    level: i32,
    scope: String,
    branch_id: Option<uuid::Uuid>,
    parent_id: Option<uuid::Uuid>,
    is_active: bool,
    permission_id: Option<uuid::Uuid>,
    resource: Option<String>,
    action: Option<String>,
    access_level: Option<String>,
    conditions: Option<serde_json::Value>,
}

impl RoleRow {
    fn into_role(self) -> AppResult<Role> {
        let scope = RoleScope::from_str(self.scope.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "invalid stored scope '{}' on role '{}': {error}",
                self.scope, self.id
            ))
        })?;

        Ok(Role {
            id: RoleId::from_uuid(self.id),
            agency_id: AgencyId::from_uuid(self.agency_id),
            name: self.name,
            slug: self.slug,
            level: self.level,
            scope,
            branch_id: self.branch_id.map(BranchId::from_uuid),
            parent_id: self.parent_id.map(RoleId::from_uuid),
            is_active: self.is_active,
        })
    }
}

const SELECT_ROLE: &str = r#"
    SELECT id, agency_id, name, slug, level, scope, branch_id, parent_id, is_active
    FROM roles
"#;

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn find_role(&self, agency_id: AgencyId, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "{SELECT_ROLE} WHERE agency_id = $1 AND id = $2"
        ))
        .bind(agency_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        row.map(RoleRow::into_role).transpose()
    }

    async fn find_role_by_slug(
        &self,
        agency_id: AgencyId,
        slug: &str,
    ) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(&format!(
            "{SELECT_ROLE} WHERE agency_id = $1 AND slug = $2"
        ))
        .bind(agency_id.as_uuid())
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        row.map(RoleRow::into_role).transpose()
    }

    async fn list_roles_with_bindings(
        &self,
        agency_id: AgencyId,
    ) -> AppResult<Vec<(Role, Vec<RoleBinding>)>> {
        let rows = sqlx::query_as::<_, RoleWithBindingRow>(
            r#"
            SELECT
                roles.id,
                roles.agency_id,
                roles.name,
                roles.slug,
                roles.level,
                roles.scope,
                roles.branch_id,
                roles.parent_id,
                roles.is_active,
                bindings.permission_id,
                permissions.resource,
                permissions.action,
                bindings.access_level,
                bindings.conditions
            FROM roles
            LEFT JOIN role_bindings AS bindings
                ON bindings.role_id = roles.id
            LEFT JOIN permissions
                ON permissions.id = bindings.permission_id
            WHERE roles.agency_id = $1
            ORDER BY roles.slug
            "#,
        )
        .bind(agency_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        aggregate_roles(rows)
    }

    async fn create_role(&self, role: Role, bindings: Vec<RoleBinding>) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, agency_id, name, slug, level, scope, branch_id, parent_id, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.agency_id.as_uuid())
        .bind(role.name.as_str())
        .bind(role.slug.as_str())
        .bind(role.level)
        .bind(role.scope.as_str())
        .bind(role.branch_id.map(|branch_id| branch_id.as_uuid()))
        .bind(role.parent_id.map(|parent_id| parent_id.as_uuid()))
        .bind(role.is_active)
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_slug_conflict(error, role.slug.as_str()))?;

        persist_bindings(&mut transaction, role.id, &bindings).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    async fn update_role(&self, role: Role, bindings: Vec<RoleBinding>) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            UPDATE roles
            SET name = $3,
                level = $4,
                scope = $5,
                branch_id = $6,
                parent_id = $7,
                is_active = $8
            WHERE agency_id = $1 AND id = $2
            "#,
        )
        .bind(role.agency_id.as_uuid())
        .bind(role.id.as_uuid())
        .bind(role.name.as_str())
        .bind(role.level)
        .bind(role.scope.as_str())
        .bind(role.branch_id.map(|branch_id| branch_id.as_uuid()))
        .bind(role.parent_id.map(|parent_id| parent_id.as_uuid()))
        .bind(role.is_active)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update role: {error}")))?;

        sqlx::query(
            r#"
            DELETE FROM role_bindings
            WHERE role_id = $1
            "#,
        )
        .bind(role.id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to clear role bindings: {error}")))?;

        persist_bindings(&mut transaction, role.id, &bindings).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    async fn set_role_active(
        &self,
        agency_id: AgencyId,
        role_id: RoleId,
        is_active: bool,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE roles
            SET is_active = $3
            WHERE agency_id = $1 AND id = $2
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(role_id.as_uuid())
        .bind(is_active)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to toggle role: {error}")))?;

        Ok(())
    }

    async fn delete_role(&self, agency_id: AgencyId, role_id: RoleId) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM roles
            WHERE agency_id = $1 AND id = $2
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(role_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;

        Ok(())
    }
}

async fn persist_bindings(
    transaction: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    role_id: RoleId,
    bindings: &[RoleBinding],
) -> AppResult<()> {
    for binding in bindings {
        let conditions = serde_json::to_value(&binding.conditions).map_err(|error| {
            AppError::Internal(format!("failed to serialize binding conditions: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO role_bindings (role_id, permission_id, access_level, conditions)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (role_id, permission_id) DO UPDATE
            SET access_level = EXCLUDED.access_level,
                conditions = EXCLUDED.conditions
            "#,
        )
        .bind(role_id.as_uuid())
        .bind(binding.permission_id.as_uuid())
        .bind(binding.access_level.as_str())
        .bind(conditions)
        .execute(&mut **transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to persist role bindings: {error}"))
        })?;
    }

    Ok(())
}

fn aggregate_roles(rows: Vec<RoleWithBindingRow>) -> AppResult<Vec<(Role, Vec<RoleBinding>)>> {
    let mut by_id: HashMap<uuid::Uuid, (Role, Vec<RoleBinding>)> = HashMap::new();
    let mut order: Vec<uuid::Uuid> = Vec::new();

    for row in rows {
        let role_uuid = row.id;
        if !by_id.contains_key(&role_uuid) {
            let role = RoleRow {
                id: row.id,
                agency_id: row.agency_id,
                name: row.name.clone(),
                slug: row.slug.clone(),
                level: row.level,
                scope: row.scope.clone(),
                branch_id: row.branch_id,
                parent_id: row.parent_id,
                is_active: row.is_active,
            }
            .into_role()?;
            by_id.insert(role_uuid, (role, Vec::new()));
            order.push(role_uuid);
        }

        if let (Some(permission_id), Some(resource), Some(action), Some(access_level)) = (
            row.permission_id,
            row.resource,
            row.action,
            row.access_level,
        ) {
            let key =
                PermissionKey::new(resource.as_str(), action.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid stored permission '{resource}:{action}': {error}"
                    ))
                })?;
            let access_level =
                AccessLevel::from_str(access_level.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid stored access level '{access_level}': {error}"
                    ))
                })?;
            let conditions: Vec<AccessCondition> = row
                .conditions
                .map(serde_json::from_value)
                .transpose()
                .map_err(|error| {
                    AppError::Internal(format!(
                        "invalid stored binding conditions on role '{role_uuid}': {error}"
                    ))
                })?
                .unwrap_or_default();

            if let Some((_, bindings)) = by_id.get_mut(&role_uuid) {
                bindings.push(RoleBinding {
                    role_id: RoleId::from_uuid(role_uuid),
                    permission_id: PermissionId::from_uuid(permission_id),
                    key,
                    access_level,
                    conditions,
                });
            }
        }
    }

    Ok(order.into_iter().filter_map(|id| by_id.remove(&id)).collect())
}

fn map_slug_conflict(error: sqlx::Error, slug: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!("role slug '{slug}' already exists"));
    }

    AppError::Internal(format!("failed to create role: {error}"))
}
