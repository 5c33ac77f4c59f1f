//! Local development seed: baseline permission catalog, an agency with
//! one admin member, and an agency-admin role holding full access.
//!
//! Runs only when `DEV_SEED=true`; every step is idempotent so repeated
//! startups converge on the same state.

use enrolia_application::{AssignmentRepository, CatalogRepository, RoleRepository};
use enrolia_core::{AgencyId, AppError, AppResult, UserId};
use enrolia_domain::{
    AccessLevel, PermissionDefinition, PermissionId, PermissionKey, Role, RoleAssignment,
    RoleBinding, RoleId, RoleScope,
};
use enrolia_infrastructure::{
    PostgresAssignmentRepository, PostgresCatalogRepository, PostgresRoleRepository,
};
use sqlx::PgPool;
use tracing::info;

const DEV_SEED_AGENCY_ID: &str = "11111111-1111-1111-1111-111111111111";
const DEV_SEED_AGENCY_NAME: &str = "Meridian Study Abroad";
const DEV_SEED_ADMIN_USER_ID: &str = "5f1c7a4e-0d5b-4a73-9b68-2f6f4f2b9a11";
const DEV_SEED_ADMIN_DISPLAY_NAME: &str = "Agency Admin";
const DEV_SEED_ADMIN_EMAIL: &str = "admin@enrolia.local";
const DEV_SEED_ADMIN_ROLE_SLUG: &str = "agency_admin";
const DEV_SEED_ADMIN_ROLE_LEVEL: i32 = 100;

const BASELINE_PERMISSIONS: &[(&str, &str, &str)] = &[
    ("roles", "manage", "administration"),
    ("roles", "read", "administration"),
    ("permissions", "manage", "administration"),
    ("permissions", "read", "administration"),
    ("branches", "manage", "administration"),
    ("branches", "read", "administration"),
    ("students", "read", "crm"),
    ("students", "manage", "crm"),
    ("applications", "read", "crm"),
    ("applications", "manage", "crm"),
    ("invoices", "read", "finance"),
    ("invoices", "manage", "finance"),
    ("reports", "read", "reporting"),
];

pub async fn run(pool: PgPool) -> AppResult<()> {
    let agency_id = AgencyId::from_uuid(parse_uuid_const(
        DEV_SEED_AGENCY_ID,
        "DEV_SEED_AGENCY_ID",
    )?);
    let admin_user_id = UserId::from_uuid(parse_uuid_const(
        DEV_SEED_ADMIN_USER_ID,
        "DEV_SEED_ADMIN_USER_ID",
    )?);

    ensure_agency(&pool, agency_id).await?;
    ensure_admin_member(&pool, agency_id, admin_user_id).await?;

    let catalog = PostgresCatalogRepository::new(pool.clone());
    let roles = PostgresRoleRepository::new(pool.clone());
    let assignments = PostgresAssignmentRepository::new(pool);

    let mut definitions = Vec::with_capacity(BASELINE_PERMISSIONS.len());
    for (resource, action, category) in BASELINE_PERMISSIONS {
        definitions.push(ensure_permission(&catalog, resource, action, category).await?);
    }

    let admin_role = ensure_admin_role(&roles, agency_id, &definitions).await?;
    ensure_admin_assignment(&assignments, agency_id, admin_user_id, admin_role.id).await?;

    info!(%agency_id, %admin_user_id, "dev seed applied");
    Ok(())
}

async fn ensure_agency(pool: &PgPool, agency_id: AgencyId) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO agencies (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(agency_id.as_uuid())
    .bind(DEV_SEED_AGENCY_NAME)
    .execute(pool)
    .await
    .map_err(|error| AppError::Internal(format!("failed to seed agency: {error}")))?;

    Ok(())
}

async fn ensure_admin_member(
    pool: &PgPool,
    agency_id: AgencyId,
    user_id: UserId,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO agency_members (agency_id, user_id, display_name, email)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (agency_id, user_id) DO NOTHING
        "#,
    )
    .bind(agency_id.as_uuid())
    .bind(user_id.as_uuid())
    .bind(DEV_SEED_ADMIN_DISPLAY_NAME)
    .bind(DEV_SEED_ADMIN_EMAIL)
    .execute(pool)
    .await
    .map_err(|error| AppError::Internal(format!("failed to seed admin member: {error}")))?;

    Ok(())
}

async fn ensure_permission(
    catalog: &PostgresCatalogRepository,
    resource: &str,
    action: &str,
    category: &str,
) -> AppResult<PermissionDefinition> {
    let key = PermissionKey::new(resource, action)?;
    if let Some(existing) = catalog.find_permission_by_key(&key).await? {
        return Ok(existing);
    }

    let definition = PermissionDefinition {
        id: PermissionId::new(),
        key,
        category: category.to_owned(),
        description: None,
        is_system: true,
    };
    catalog.insert_permission(definition.clone()).await?;

    Ok(definition)
}

async fn ensure_admin_role(
    roles: &PostgresRoleRepository,
    agency_id: AgencyId,
    definitions: &[PermissionDefinition],
) -> AppResult<Role> {
    if let Some(existing) = roles
        .find_role_by_slug(agency_id, DEV_SEED_ADMIN_ROLE_SLUG)
        .await?
    {
        return Ok(existing);
    }

    let role = Role {
        id: RoleId::new(),
        agency_id,
        name: "Agency Admin".to_owned(),
        slug: DEV_SEED_ADMIN_ROLE_SLUG.to_owned(),
        level: DEV_SEED_ADMIN_ROLE_LEVEL,
        scope: RoleScope::Agency,
        branch_id: None,
        parent_id: None,
        is_active: true,
    };

    let bindings = definitions
        .iter()
        .map(|definition| RoleBinding {
            role_id: role.id,
            permission_id: definition.id,
            key: definition.key.clone(),
            access_level: AccessLevel::Full,
            conditions: Vec::new(),
        })
        .collect();

    roles.create_role(role.clone(), bindings).await?;

    Ok(role)
}

async fn ensure_admin_assignment(
    assignments: &PostgresAssignmentRepository,
    agency_id: AgencyId,
    user_id: UserId,
    role_id: RoleId,
) -> AppResult<()> {
    if assignments
        .find_active(agency_id, user_id, role_id)
        .await?
        .is_some()
    {
        return Ok(());
    }

    assignments
        .insert(RoleAssignment::new(agency_id, user_id, role_id, user_id))
        .await?;

    Ok(())
}

fn parse_uuid_const(value: &str, name: &str) -> AppResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value)
        .map_err(|error| AppError::Internal(format!("invalid {name}: {error}")))
}
