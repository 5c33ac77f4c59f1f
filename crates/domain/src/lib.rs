//! Domain entities and invariants for the Enrolia RBAC core.

#![forbid(unsafe_code)]

mod access;
mod assignment;
mod branch;
mod ids;
mod permission;
mod role;

pub use access::{AccessCondition, AccessLevel, ConditionContext};
pub use assignment::{AssignmentState, RoleAssignment};
pub use branch::{Branch, BranchAccess};
pub use ids::{AssignmentId, PermissionId, RoleId};
pub use permission::{PermissionDefinition, PermissionKey};
pub use role::{
    HierarchyTooDeep, MAX_HIERARCHY_DEPTH, Role, RoleBinding, RoleGraph, RoleHierarchyNode,
    RoleScope,
};
