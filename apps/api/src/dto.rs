mod access;
mod assignments;
mod branches;
mod common;
mod permissions;
mod roles;

pub use access::{
    AccessCheckRequest, AccessDecisionResponse, AccessibleBranchesResponse,
    DecidingPolicyResponse,
};
pub use assignments::{
    ActiveRoleResponse, AssignRoleRequest, AssignmentOutcomeResponse, AssignmentResponse,
    RevokeRoleRequest,
};
pub use branches::{BranchResponse, CreateBranchRequest, UpdateBranchRequest};
pub use common::{HealthResponse, parse_uuid};
pub use permissions::{CreatePermissionRequest, PermissionResponse, UpdatePermissionRequest};
pub use roles::{
    BindingPayload, BindingResponse, CreateRoleRequest, RoleDeletionResponse,
    RoleHierarchyNodeResponse, RoleResponse, UpdateRoleRequest,
};
