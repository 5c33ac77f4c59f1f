use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use enrolia_core::{AgencyId, AppError, BranchId, UserId, UserIdentity};

use crate::error::ApiResult;

/// Gateway headers carrying the authenticated caller.
///
/// Authentication happens at the platform gateway; this binary trusts the
/// headers the gateway injects and rejects requests that lack them.
pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_AGENCY_ID: &str = "x-agency-id";
pub const HEADER_USER_NAME: &str = "x-user-name";
pub const HEADER_USER_EMAIL: &str = "x-user-email";
pub const HEADER_BRANCH_ID: &str = "x-branch-id";

pub async fn require_identity(mut request: Request, next: Next) -> ApiResult<Response> {
    let identity = identity_from_headers(request.headers())?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn identity_from_headers(headers: &HeaderMap) -> Result<UserIdentity, AppError> {
    let user_id = UserId::from_uuid(required_uuid_header(headers, HEADER_USER_ID)?);
    let agency_id = AgencyId::from_uuid(required_uuid_header(headers, HEADER_AGENCY_ID)?);

    let display_name = required_header(headers, HEADER_USER_NAME)?;
    let email = optional_header(headers, HEADER_USER_EMAIL);
    let branch_id = optional_header(headers, HEADER_BRANCH_ID)
        .map(|value| {
            uuid::Uuid::parse_str(value.as_str())
                .map(BranchId::from_uuid)
                .map_err(|_| {
                    AppError::Unauthorized(format!("invalid {HEADER_BRANCH_ID} header"))
                })
        })
        .transpose()?;

    Ok(UserIdentity::new(
        user_id,
        display_name,
        email,
        agency_id,
        branch_id,
    ))
}

fn required_header(headers: &HeaderMap, name: &str) -> Result<String, AppError> {
    optional_header(headers, name)
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
}

fn optional_header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn required_uuid_header(headers: &HeaderMap, name: &str) -> Result<uuid::Uuid, AppError> {
    let value = required_header(headers, name)?;
    uuid::Uuid::parse_str(value.as_str())
        .map_err(|_| AppError::Unauthorized(format!("invalid {name} header")))
}
