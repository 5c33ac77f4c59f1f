use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use enrolia_application::{
    AssignmentRepository, CatalogRepository, RoleRepository,
};
use enrolia_core::{AgencyId, AppError, UserId};
use enrolia_domain::{
    AccessCondition, AccessLevel, PermissionDefinition, PermissionId, PermissionKey, Role,
    RoleAssignment, RoleBinding, RoleId, RoleScope,
};

use super::PostgresRoleRepository;
use crate::{PostgresAssignmentRepository, PostgresCatalogRepository};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres role tests: {error}");
    }

    Some(pool)
}

async fn ensure_agency(pool: &PgPool, agency_id: AgencyId, name: &str) {
    let insert = sqlx::query(
        r#"
        INSERT INTO agencies (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(agency_id.as_uuid())
    .bind(name)
    .execute(pool)
    .await;

    assert!(insert.is_ok());
}

fn permission(resource: &str, action: &str) -> PermissionDefinition {
    let key = match PermissionKey::new(resource, action) {
        Ok(key) => key,
        Err(error) => panic!("invalid test permission key: {error}"),
    };

    PermissionDefinition {
        id: PermissionId::new(),
        key,
        category: "test".to_owned(),
        description: None,
        is_system: false,
    }
}

fn role(agency_id: AgencyId, slug: &str) -> Role {
    Role {
        id: RoleId::new(),
        agency_id,
        name: slug.to_owned(),
        slug: slug.to_owned(),
        level: 1,
        scope: RoleScope::Agency,
        branch_id: None,
        parent_id: None,
        is_active: true,
    }
}

#[tokio::test]
async fn role_and_bindings_round_trip_with_conditions() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let roles = PostgresRoleRepository::new(pool.clone());
    let catalog = PostgresCatalogRepository::new(pool.clone());
    let agency_id = AgencyId::new();
    ensure_agency(&pool, agency_id, "Round Trip Agency").await;

    let definition = permission("students", "read");
    let inserted = catalog.insert_permission(definition.clone()).await;
    assert!(inserted.is_ok());

    let stored = role(agency_id, "conditional_counselor");
    let binding = RoleBinding {
        role_id: stored.id,
        permission_id: definition.id,
        key: definition.key.clone(),
        access_level: AccessLevel::Custom,
        conditions: vec![AccessCondition::OwnerMatch],
    };

    let created = roles.create_role(stored.clone(), vec![binding]).await;
    assert!(created.is_ok());

    let listed = roles.list_roles_with_bindings(agency_id).await;
    assert!(listed.is_ok());
    let listed = listed.unwrap_or_default();
    assert_eq!(listed.len(), 1);

    let (loaded_role, loaded_bindings) = &listed[0];
    assert_eq!(loaded_role.slug, "conditional_counselor");
    assert_eq!(loaded_bindings.len(), 1);
    assert_eq!(loaded_bindings[0].access_level, AccessLevel::Custom);
    assert_eq!(loaded_bindings[0].conditions, vec![AccessCondition::OwnerMatch]);
    assert_eq!(loaded_bindings[0].key, definition.key);
}

#[tokio::test]
async fn duplicate_slug_within_agency_is_a_conflict() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let roles = PostgresRoleRepository::new(pool.clone());
    let agency_id = AgencyId::new();
    ensure_agency(&pool, agency_id, "Slug Agency").await;

    let first = roles.create_role(role(agency_id, "consultant"), Vec::new()).await;
    assert!(first.is_ok());

    let second = roles.create_role(role(agency_id, "consultant"), Vec::new()).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn one_active_assignment_per_user_and_role_is_enforced() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let roles = PostgresRoleRepository::new(pool.clone());
    let assignments = PostgresAssignmentRepository::new(pool.clone());
    let agency_id = AgencyId::new();
    ensure_agency(&pool, agency_id, "Ledger Agency").await;

    let stored = role(agency_id, "ledger_consultant");
    let created = roles.create_role(stored.clone(), Vec::new()).await;
    assert!(created.is_ok());

    let user_id = UserId::new();
    let actor_id = UserId::new();

    let mut first = RoleAssignment::new(agency_id, user_id, stored.id, actor_id);
    let first_insert = assignments.insert(first.clone()).await;
    assert!(first_insert.is_ok());

    let duplicate = RoleAssignment::new(agency_id, user_id, stored.id, actor_id);
    let duplicate_insert = assignments.insert(duplicate).await;
    assert!(matches!(duplicate_insert, Err(AppError::Conflict(_))));

    first.revoke(actor_id, chrono::Utc::now());
    let revoked = assignments.update(first).await;
    assert!(revoked.is_ok());

    let reassigned = RoleAssignment::new(agency_id, user_id, stored.id, actor_id);
    let reassigned_insert = assignments.insert(reassigned).await;
    assert!(reassigned_insert.is_ok());

    let active = assignments.list_active_for_user(agency_id, user_id).await;
    assert_eq!(active.map(|rows| rows.len()).unwrap_or_default(), 1);
}
