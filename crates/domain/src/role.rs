use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use enrolia_core::{AgencyId, AppError, BranchId};
use serde::{Deserialize, Serialize};

use crate::{AccessCondition, AccessLevel, PermissionId, PermissionKey, RoleId};

/// Upper bound on parent-chain length accepted during traversal.
///
/// Creation-time validation rejects cycles, but stored data is still walked
/// with this bound so a cycle that slipped past validation resolves as a
/// fault instead of an infinite loop.
pub const MAX_HIERARCHY_DEPTH: usize = 32;

/// Organizational breadth at which a role's grants apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleScope {
    /// Applies across every agency; reserved for platform operators.
    Global,
    /// Applies to the whole agency.
    Agency,
    /// Applies to a single branch; `branch_id` must be set.
    Branch,
    /// Applies to a department inside a branch.
    Department,
    /// Applies to a team inside a department.
    Team,
    /// Applies to a single user.
    Individual,
}

impl RoleScope {
    /// Returns whether this scope grants visibility over every branch.
    #[must_use]
    pub fn covers_all_branches(&self) -> bool {
        matches!(self, Self::Global | Self::Agency)
    }

    /// Returns a stable storage value for this scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Agency => "agency",
            Self::Branch => "branch",
            Self::Department => "department",
            Self::Team => "team",
            Self::Individual => "individual",
        }
    }
}

impl FromStr for RoleScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "global" => Ok(Self::Global),
            "agency" => Ok(Self::Agency),
            "branch" => Ok(Self::Branch),
            "department" => Ok(Self::Department),
            "team" => Ok(Self::Team),
            "individual" => Ok(Self::Individual),
            _ => Err(AppError::Validation(format!("unknown role scope '{value}'"))),
        }
    }
}

/// A named bundle of permission grants owned by one agency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Stable role identifier.
    pub id: RoleId,
    /// Owning agency.
    pub agency_id: AgencyId,
    /// Display name.
    pub name: String,
    /// Unique slug within the agency.
    pub slug: String,
    /// Authority level; only compared for role-management checks.
    pub level: i32,
    /// Organizational breadth of the grants.
    pub scope: RoleScope,
    /// Branch the role is pinned to when `scope` is branch-level.
    pub branch_id: Option<BranchId>,
    /// Parent role this role inherits bindings from.
    pub parent_id: Option<RoleId>,
    /// Deactivated roles keep history but grant nothing.
    pub is_active: bool,
}

/// Grant of one permission at one access level, attached to a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBinding {
    /// Role the binding belongs to.
    pub role_id: RoleId,
    /// Catalog entry being granted.
    pub permission_id: PermissionId,
    /// Resource/action key of the granted permission.
    pub key: PermissionKey,
    /// Granted access level.
    pub access_level: AccessLevel,
    /// Predicates evaluated when `access_level` is custom.
    pub conditions: Vec<AccessCondition>,
}

/// Signal raised when a parent chain exceeds [`MAX_HIERARCHY_DEPTH`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyTooDeep {
    /// Role whose ancestry could not be resolved.
    pub role_id: RoleId,
}

/// One node of the role forest returned to admin UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleHierarchyNode {
    /// Role at this node.
    pub role: Role,
    /// Direct bindings of the role.
    pub bindings: Vec<RoleBinding>,
    /// Child roles inheriting from this node.
    pub children: Vec<RoleHierarchyNode>,
}

/// Arena of one agency's roles keyed by id.
///
/// All traversal is iterative with an explicit visited set and the depth
/// bound, never unbounded recursion.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    roles: HashMap<RoleId, Role>,
    bindings: HashMap<RoleId, Vec<RoleBinding>>,
}

impl RoleGraph {
    /// Builds a graph from roles and their direct bindings.
    #[must_use]
    pub fn new(entries: Vec<(Role, Vec<RoleBinding>)>) -> Self {
        let mut roles = HashMap::with_capacity(entries.len());
        let mut bindings = HashMap::with_capacity(entries.len());

        for (role, role_bindings) in entries {
            bindings.insert(role.id, role_bindings);
            roles.insert(role.id, role);
        }

        Self { roles, bindings }
    }

    /// Returns the role stored under an id.
    #[must_use]
    pub fn role(&self, role_id: RoleId) -> Option<&Role> {
        self.roles.get(&role_id)
    }

    /// Returns the ancestor chain of a role, starting with the role itself.
    ///
    /// A parent pointing outside the graph ends the chain; a revisited node
    /// or a chain longer than the depth bound is a fault.
    pub fn ancestor_chain(&self, role_id: RoleId) -> Result<Vec<RoleId>, HierarchyTooDeep> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(role_id);

        while let Some(current) = cursor {
            if chain.len() >= MAX_HIERARCHY_DEPTH || !visited.insert(current) {
                return Err(HierarchyTooDeep { role_id });
            }

            let Some(role) = self.roles.get(&current) else {
                break;
            };

            chain.push(current);
            cursor = role.parent_id;
        }

        Ok(chain)
    }

    /// Returns whether reparenting `role_id` under `new_parent_id` would
    /// make the role its own ancestor.
    pub fn would_create_cycle(
        &self,
        role_id: RoleId,
        new_parent_id: RoleId,
    ) -> Result<bool, HierarchyTooDeep> {
        if role_id == new_parent_id {
            return Ok(true);
        }

        let parent_chain = self.ancestor_chain(new_parent_id)?;
        Ok(parent_chain.contains(&role_id))
    }

    /// Collects every binding for a resource-action key reachable from a
    /// role: its own bindings plus all inherited ancestor bindings.
    ///
    /// Deactivated roles contribute nothing, but traversal continues past
    /// them so active ancestors still apply.
    pub fn effective_bindings(
        &self,
        role_id: RoleId,
        key: &PermissionKey,
    ) -> Result<Vec<&RoleBinding>, HierarchyTooDeep> {
        let chain = self.ancestor_chain(role_id)?;
        let mut matches = Vec::new();

        for ancestor_id in chain {
            let is_active = self
                .roles
                .get(&ancestor_id)
                .is_some_and(|role| role.is_active);
            if !is_active {
                continue;
            }

            if let Some(bindings) = self.bindings.get(&ancestor_id) {
                matches.extend(bindings.iter().filter(|binding| &binding.key == key));
            }
        }

        Ok(matches)
    }

    /// Builds the role forest, optionally restricted to a branch set.
    ///
    /// Roles pinned to a filtered-out branch are dropped; a retained role
    /// whose parent was dropped (or is missing) becomes a root.
    #[must_use]
    pub fn hierarchy(&self, branch_filter: Option<&BTreeSet<BranchId>>) -> Vec<RoleHierarchyNode> {
        let included: HashSet<RoleId> = self
            .roles
            .values()
            .filter(|role| match (branch_filter, role.branch_id) {
                (Some(filter), Some(branch_id)) => filter.contains(&branch_id),
                _ => true,
            })
            .map(|role| role.id)
            .collect();

        let mut children_of: HashMap<RoleId, Vec<RoleId>> = HashMap::new();
        let mut roots = Vec::new();

        for role_id in &included {
            let parent = self
                .roles
                .get(role_id)
                .and_then(|role| role.parent_id)
                .filter(|parent_id| included.contains(parent_id));

            match parent {
                Some(parent_id) => children_of.entry(parent_id).or_default().push(*role_id),
                None => roots.push(*role_id),
            }
        }

        let mut forest: Vec<RoleHierarchyNode> = roots
            .into_iter()
            .filter_map(|role_id| self.build_node(role_id, &children_of, 0))
            .collect();
        forest.sort_by(|left, right| left.role.name.cmp(&right.role.name));
        forest
    }

    fn build_node(
        &self,
        role_id: RoleId,
        children_of: &HashMap<RoleId, Vec<RoleId>>,
        depth: usize,
    ) -> Option<RoleHierarchyNode> {
        if depth >= MAX_HIERARCHY_DEPTH {
            return None;
        }

        let role = self.roles.get(&role_id)?.clone();
        let bindings = self.bindings.get(&role_id).cloned().unwrap_or_default();

        let mut children: Vec<RoleHierarchyNode> = children_of
            .get(&role_id)
            .into_iter()
            .flatten()
            .filter_map(|child_id| self.build_node(*child_id, children_of, depth + 1))
            .collect();
        children.sort_by(|left, right| left.role.name.cmp(&right.role.name));

        Some(RoleHierarchyNode {
            role,
            bindings,
            children,
        })
    }
}
