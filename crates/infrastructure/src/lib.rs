//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_repository;
mod in_memory_rbac_repository;
mod postgres_assignment_repository;
mod postgres_audit_repository;
mod postgres_branch_repository;
mod postgres_catalog_repository;
mod postgres_membership_repository;
mod postgres_resource_branch_resolver;
mod postgres_role_repository;

pub use in_memory_audit_repository::InMemoryAuditRepository;
pub use in_memory_rbac_repository::InMemoryRbacRepository;
pub use postgres_assignment_repository::PostgresAssignmentRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_branch_repository::PostgresBranchRepository;
pub use postgres_catalog_repository::PostgresCatalogRepository;
pub use postgres_membership_repository::PostgresMembershipRepository;
pub use postgres_resource_branch_resolver::PostgresResourceBranchResolver;
pub use postgres_role_repository::PostgresRoleRepository;
