//! Application services and ports for the Enrolia RBAC core.

#![forbid(unsafe_code)]

mod access_service;
mod assignment_service;
mod audit;
mod branch_service;
mod catalog_service;
mod membership;
mod role_service;

pub use access_service::{
    AccessCheck, AccessDecision, AccessService, DecidingPolicy, DecisionReason,
    ResourceBranchResolver,
};
pub use assignment_service::{
    ActiveRole, AssignmentRepository, AssignmentService, RoleAssignmentOutcome,
};
pub use audit::{AuditAction, AuditEvent, AuditRepository};
pub use branch_service::{BranchRepository, BranchService, CreateBranchInput, UpdateBranchInput};
pub use catalog_service::{CatalogRepository, CatalogService, CreatePermissionInput};
pub use membership::{AgencyMember, MembershipRepository};
pub use role_service::{
    BindingInput, CreateRoleInput, RoleDeletion, RoleRepository, RoleService, UpdateRoleInput,
};
