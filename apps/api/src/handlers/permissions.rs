use super::*;

use enrolia_application::CreatePermissionInput;
use enrolia_domain::PermissionId;

pub async fn list_permissions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<Vec<PermissionResponse>>> {
    let permissions = state
        .catalog_service
        .list_permissions(&user)
        .await?
        .into_iter()
        .map(PermissionResponse::from)
        .collect();

    Ok(Json(permissions))
}

pub async fn create_permission_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreatePermissionRequest>,
) -> ApiResult<(StatusCode, Json<PermissionResponse>)> {
    let definition = state
        .catalog_service
        .create_permission(
            &user,
            CreatePermissionInput {
                resource: payload.resource,
                action: payload.action,
                category: payload.category,
                description: payload.description,
                is_system: payload.is_system,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(PermissionResponse::from(definition))))
}

pub async fn update_permission_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(permission_id): Path<String>,
    Json(payload): Json<UpdatePermissionRequest>,
) -> ApiResult<Json<PermissionResponse>> {
    let permission_id =
        PermissionId::from_uuid(parse_uuid(permission_id.as_str(), "permission_id")?);

    let definition = state
        .catalog_service
        .update_permission_metadata(&user, permission_id, payload.category, payload.description)
        .await?;

    Ok(Json(PermissionResponse::from(definition)))
}

pub async fn delete_permission_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(permission_id): Path<String>,
) -> ApiResult<StatusCode> {
    let permission_id =
        PermissionId::from_uuid(parse_uuid(permission_id.as_str(), "permission_id")?);

    state
        .catalog_service
        .delete_permission(&user, permission_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
