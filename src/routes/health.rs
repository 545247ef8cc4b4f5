use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::AppState;

pub async fn healthcheck(State(state): State<AppState>) -> AppResult<&'static str> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(|e| AppError::Internal(format!("database unreachable: {e}")))?;
    Ok("WORKING")
}

pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "app": {
            "errorRate": state.failures.rate(),
        },
        "dispatch": {
            "pendingJobs": state.dispatcher.queue_depth(),
            "droppedJobs": state.dispatcher.dropped(),
        },
        "timestamp": chrono::Utc::now(),
    }))
}
