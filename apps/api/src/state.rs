use enrolia_application::{
    AccessService, AssignmentService, BranchService, CatalogService, RoleService,
};

/// Shared application services cloned into every request handler.
#[derive(Clone)]
pub struct AppState {
    pub access_service: AccessService,
    pub assignment_service: AssignmentService,
    pub role_service: RoleService,
    pub catalog_service: CatalogService,
    pub branch_service: BranchService,
}
