//! Enrolia API composition root.

#![forbid(unsafe_code)]

mod dev_seed;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn;
use axum::routing::{get, post, put};
use enrolia_application::{
    AccessService, AssignmentRepository, AssignmentService, AuditRepository, BranchRepository,
    BranchService, CatalogRepository, CatalogService, MembershipRepository,
    ResourceBranchResolver, RoleRepository, RoleService,
};
use enrolia_core::AppError;
use enrolia_infrastructure::{
    PostgresAssignmentRepository, PostgresAuditRepository, PostgresBranchRepository,
    PostgresCatalogRepository, PostgresMembershipRepository, PostgresResourceBranchResolver,
    PostgresRoleRepository,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

    let database_url = required_env("DATABASE_URL")?;
    let allowed_origin =
        env::var("CORS_ALLOWED_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_owned());

    let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let api_port = env::var("API_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);

    let dev_seed = env::var("DEV_SEED")
        .unwrap_or_else(|_| "false".to_owned())
        .eq_ignore_ascii_case("true");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    if dev_seed {
        dev_seed::run(pool.clone()).await?;
    }

    let catalog_repository: Arc<dyn CatalogRepository> =
        Arc::new(PostgresCatalogRepository::new(pool.clone()));
    let role_repository: Arc<dyn RoleRepository> =
        Arc::new(PostgresRoleRepository::new(pool.clone()));
    let assignment_repository: Arc<dyn AssignmentRepository> =
        Arc::new(PostgresAssignmentRepository::new(pool.clone()));
    let branch_repository: Arc<dyn BranchRepository> =
        Arc::new(PostgresBranchRepository::new(pool.clone()));
    let membership_repository: Arc<dyn MembershipRepository> =
        Arc::new(PostgresMembershipRepository::new(pool.clone()));
    let resource_branch_resolver: Arc<dyn ResourceBranchResolver> =
        Arc::new(PostgresResourceBranchResolver::new(pool.clone()));
    let audit_repository: Arc<dyn AuditRepository> =
        Arc::new(PostgresAuditRepository::new(pool));

    let access_service = AccessService::new(
        assignment_repository.clone(),
        role_repository.clone(),
        membership_repository.clone(),
        resource_branch_resolver,
    );
    let assignment_service = AssignmentService::new(
        access_service.clone(),
        assignment_repository.clone(),
        role_repository.clone(),
        membership_repository.clone(),
        audit_repository.clone(),
    );
    let role_service = RoleService::new(
        access_service.clone(),
        role_repository.clone(),
        branch_repository.clone(),
        catalog_repository.clone(),
        assignment_repository,
        audit_repository.clone(),
    );
    let catalog_service = CatalogService::new(
        access_service.clone(),
        catalog_repository,
        audit_repository.clone(),
    );
    let branch_service = BranchService::new(
        access_service.clone(),
        branch_repository,
        membership_repository,
        audit_repository,
    );

    let app_state = AppState {
        access_service,
        assignment_service,
        role_service,
        catalog_service,
        branch_service,
    };

    let protected_routes = Router::new()
        .route(
            "/api/permissions",
            get(handlers::list_permissions_handler).post(handlers::create_permission_handler),
        )
        .route(
            "/api/permissions/{permission_id}",
            put(handlers::update_permission_handler).delete(handlers::delete_permission_handler),
        )
        .route(
            "/api/roles",
            get(handlers::list_role_hierarchy_handler).post(handlers::create_role_handler),
        )
        .route(
            "/api/roles/{role_id}",
            put(handlers::update_role_handler).delete(handlers::delete_role_handler),
        )
        .route(
            "/api/role-assignments",
            post(handlers::assign_role_handler),
        )
        .route(
            "/api/role-revocations",
            post(handlers::revoke_role_handler),
        )
        .route(
            "/api/users/{user_id}/roles",
            get(handlers::list_user_roles_handler),
        )
        .route(
            "/api/users/{user_id}/accessible-branches",
            get(handlers::accessible_branches_handler),
        )
        .route("/api/access-checks", post(handlers::check_access_handler))
        .route(
            "/api/branches",
            get(handlers::list_branches_handler).post(handlers::create_branch_handler),
        )
        .route(
            "/api/branches/{branch_id}",
            put(handlers::update_branch_handler),
        )
        .route_layer(from_fn(middleware::require_identity));

    let cors_layer = CorsLayer::new()
        .allow_origin(HeaderValue::from_str(&allowed_origin).map_err(|error| {
            AppError::Internal(format!("invalid CORS_ALLOWED_ORIGIN: {error}"))
        })?)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static(middleware::HEADER_USER_ID),
            HeaderName::from_static(middleware::HEADER_AGENCY_ID),
            HeaderName::from_static(middleware::HEADER_USER_NAME),
            HeaderName::from_static(middleware::HEADER_USER_EMAIL),
            HeaderName::from_static(middleware::HEADER_BRANCH_ID),
        ]);

    let app = Router::new()
        .route("/health", get(handlers::health_handler))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(app_state);

    let host = IpAddr::from_str(&api_host)
        .map_err(|error| AppError::Internal(format!("invalid API_HOST '{api_host}': {error}")))?;
    let address = SocketAddr::from((host, api_port));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "enrolia-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}
