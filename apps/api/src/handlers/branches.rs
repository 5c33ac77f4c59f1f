use super::*;

use enrolia_application::{CreateBranchInput, UpdateBranchInput};
use enrolia_core::{BranchId, UserId};

pub async fn list_branches_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<Vec<BranchResponse>>> {
    let branches = state
        .branch_service
        .list_branches(&user)
        .await?
        .into_iter()
        .map(BranchResponse::from)
        .collect();

    Ok(Json(branches))
}

pub async fn create_branch_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreateBranchRequest>,
) -> ApiResult<(StatusCode, Json<BranchResponse>)> {
    let manager_id = parse_manager(payload.manager_id)?;

    let branch = state
        .branch_service
        .create_branch(
            &user,
            CreateBranchInput {
                name: payload.name,
                code: payload.code,
                manager_id,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(BranchResponse::from(branch))))
}

pub async fn update_branch_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(branch_id): Path<String>,
    Json(payload): Json<UpdateBranchRequest>,
) -> ApiResult<Json<BranchResponse>> {
    let branch_id = BranchId::from_uuid(parse_uuid(branch_id.as_str(), "branch_id")?);
    let manager_id = parse_manager(payload.manager_id)?;

    let branch = state
        .branch_service
        .update_branch(
            &user,
            branch_id,
            UpdateBranchInput {
                name: payload.name,
                code: payload.code,
                manager_id,
            },
        )
        .await?;

    Ok(Json(BranchResponse::from(branch)))
}

fn parse_manager(value: Option<String>) -> Result<Option<UserId>, crate::error::ApiError> {
    Ok(value
        .map(|raw| parse_uuid(raw.as_str(), "manager_id").map(UserId::from_uuid))
        .transpose()?)
}
