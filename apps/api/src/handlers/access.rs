use super::*;

use enrolia_core::UserId;

pub async fn check_access_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<AccessCheckRequest>,
) -> ApiResult<Json<AccessDecisionResponse>> {
    let check = payload.into_check()?;

    let decision = state
        .access_service
        .check_permission(user.agency_id(), user.user_id(), check)
        .await?;

    Ok(Json(AccessDecisionResponse::from(decision)))
}

pub async fn accessible_branches_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<AccessibleBranchesResponse>> {
    let user_id = UserId::from_uuid(parse_uuid(user_id.as_str(), "user_id")?);

    let access = state
        .access_service
        .member_branch_access(&user, user_id)
        .await?;

    Ok(Json(AccessibleBranchesResponse::from(access)))
}
