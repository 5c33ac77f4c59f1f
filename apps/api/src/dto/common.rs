use enrolia_core::{AppError, AppResult};
use serde::Serialize;
use ts_rs::TS;

/// Liveness payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Parses a transport UUID, naming the offending field on failure.
pub fn parse_uuid(value: &str, field: &str) -> AppResult<uuid::Uuid> {
    uuid::Uuid::parse_str(value.trim())
        .map_err(|_| AppError::Validation(format!("{field} must be a UUID, got '{value}'")))
}
