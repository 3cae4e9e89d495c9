//! API error type with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deploy::DeployError;

/// API-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request from the client.
    BadRequest(String),
    /// Orchestration error; mapped by category.
    Deploy(DeployError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, category, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "input", msg),
            ApiError::Deploy(err) => deploy_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message, "category": category });
        (status, axum::Json(body)).into_response()
    }
}

/// The wire message is the concise user-facing one; the raw error goes to the
/// logs only.
fn deploy_error_to_response(err: DeployError) -> (StatusCode, &'static str, String) {
    let status = match &err {
        DeployError::Permission { .. } | DeployError::NotSessionOwner { .. } => {
            StatusCode::FORBIDDEN
        }
        DeployError::ResourceConflict { .. }
        | DeployError::SessionAlreadyActive { .. }
        | DeployError::InvalidState { .. } => StatusCode::CONFLICT,
        DeployError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        DeployError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DeployError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DeployError::UnknownPanelKind(_)
        | DeployError::UnknownRole { .. }
        | DeployError::TargetMissing { .. }
        | DeployError::NoGoals
        | DeployError::Blueprint(_) => StatusCode::BAD_REQUEST,
        DeployError::Persistence(_)
        | DeployError::Platform(_)
        | DeployError::CorruptSession { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "internal server error");
    }
    (status, err.category(), err.user_message())
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        ApiError::Deploy(err)
    }
}
