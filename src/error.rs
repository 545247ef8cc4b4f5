use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Cooldown active: {0}s remaining")]
    CooldownActive(i64),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Clan owner must transfer ownership before leaving")]
    OwnerCannotLeave,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, reason, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::CooldownActive(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "cooldown_active", self.to_string())
            }
            AppError::CapacityExceeded(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "capacity_exceeded", msg.clone())
            }
            AppError::InvalidTransition(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition", msg.clone())
            }
            AppError::OwnerCannotLeave => {
                (StatusCode::UNPROCESSABLE_ENTITY, "owner_cannot_leave", self.to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({ "success": false, "reason": reason, "error": message });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
