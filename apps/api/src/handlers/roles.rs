use super::*;

use std::collections::BTreeSet;

use enrolia_core::BranchId;
use enrolia_domain::RoleId;
use serde::Deserialize;

/// Optional comma-separated branch filter for the hierarchy view.
#[derive(Debug, Deserialize)]
pub struct HierarchyQuery {
    branch_ids: Option<String>,
}

impl HierarchyQuery {
    fn into_filter(self) -> ApiResult<Option<BTreeSet<BranchId>>> {
        let Some(raw) = self.branch_ids else {
            return Ok(None);
        };

        let mut branch_ids = BTreeSet::new();
        for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            branch_ids.insert(BranchId::from_uuid(parse_uuid(part, "branch_ids")?));
        }

        Ok(Some(branch_ids))
    }
}

pub async fn list_role_hierarchy_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Query(query): Query<HierarchyQuery>,
) -> ApiResult<Json<Vec<RoleHierarchyNodeResponse>>> {
    let filter = query.into_filter()?;
    let forest = state.role_service.role_hierarchy(&user, filter).await?;

    let nodes = forest
        .into_iter()
        .map(RoleHierarchyNodeResponse::from_node)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(nodes))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    let input = payload.into_input()?;
    let role = state.role_service.create_role(&user, input).await?;

    Ok((StatusCode::CREATED, Json(RoleResponse::from(role))))
}

pub async fn update_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(role_id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let role_id = RoleId::from_uuid(parse_uuid(role_id.as_str(), "role_id")?);
    let input = payload.into_input()?;
    let role = state.role_service.update_role(&user, role_id, input).await?;

    Ok(Json(RoleResponse::from(role)))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(role_id): Path<String>,
) -> ApiResult<Json<RoleDeletionResponse>> {
    let role_id = RoleId::from_uuid(parse_uuid(role_id.as_str(), "role_id")?);
    let deletion = state.role_service.delete_role(&user, role_id).await?;

    Ok(Json(RoleDeletionResponse::from(deletion)))
}
