use super::*;

use enrolia_core::UserId;
use enrolia_domain::{AssignmentId, RoleId};

pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<(StatusCode, Json<AssignmentOutcomeResponse>)> {
    let user_id = UserId::from_uuid(parse_uuid(payload.user_id.as_str(), "user_id")?);
    let role_id = RoleId::from_uuid(parse_uuid(payload.role_id.as_str(), "role_id")?);

    let outcome = state
        .assignment_service
        .assign_role(&user, user_id, role_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AssignmentOutcomeResponse::from(outcome)),
    ))
}

pub async fn revoke_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<RevokeRoleRequest>,
) -> ApiResult<Json<AssignmentOutcomeResponse>> {
    let assignment_id =
        AssignmentId::from_uuid(parse_uuid(payload.assignment_id.as_str(), "assignment_id")?);

    let outcome = state
        .assignment_service
        .revoke_role(&user, assignment_id)
        .await?;

    Ok(Json(AssignmentOutcomeResponse::from(outcome)))
}

pub async fn list_user_roles_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<ActiveRoleResponse>>> {
    let user_id = UserId::from_uuid(parse_uuid(user_id.as_str(), "user_id")?);

    let active_roles = state
        .assignment_service
        .list_active_roles(&user, user_id)
        .await?
        .into_iter()
        .map(ActiveRoleResponse::from)
        .collect();

    Ok(Json(active_roles))
}
