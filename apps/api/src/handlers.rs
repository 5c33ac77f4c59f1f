use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;

use enrolia_core::UserIdentity;

use crate::dto::{
    AccessCheckRequest, AccessDecisionResponse, AccessibleBranchesResponse, ActiveRoleResponse,
    AssignRoleRequest, AssignmentOutcomeResponse, BranchResponse, CreateBranchRequest,
    CreatePermissionRequest, CreateRoleRequest, HealthResponse, PermissionResponse,
    RevokeRoleRequest, RoleDeletionResponse, RoleHierarchyNodeResponse, RoleResponse,
    UpdateBranchRequest, UpdatePermissionRequest, UpdateRoleRequest, parse_uuid,
};
use crate::error::ApiResult;
use crate::state::AppState;

mod access;
mod assignments;
mod branches;
mod health;
mod permissions;
mod roles;

pub use access::{accessible_branches_handler, check_access_handler};
pub use assignments::{assign_role_handler, list_user_roles_handler, revoke_role_handler};
pub use branches::{create_branch_handler, list_branches_handler, update_branch_handler};
pub use health::health_handler;
pub use permissions::{
    create_permission_handler, delete_permission_handler, list_permissions_handler,
    update_permission_handler,
};
pub use roles::{
    create_role_handler, delete_role_handler, list_role_hierarchy_handler, update_role_handler,
};
