use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CreateHookRequest, Hook};
use crate::AppState;

pub async fn list_hooks(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> AppResult<Json<Value>> {
    let hooks: Vec<Hook> = sqlx::query_as(
        r#"SELECT id, public_id, game_id, event_type, url, created_at
        FROM hooks WHERE game_id = $1 ORDER BY created_at"#,
    )
    .bind(&game_id)
    .fetch_all(&state.db)
    .await?;

    let hooks: Vec<Value> = hooks
        .iter()
        .map(|h| json!({ "publicID": h.public_id, "type": h.event_type, "hookURL": h.url }))
        .collect();
    Ok(Json(json!({ "success": true, "hooks": hooks })))
}

pub async fn create_hook(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(body): Json<CreateHookRequest>,
) -> AppResult<Json<Value>> {
    if body.url.is_empty() {
        return Err(AppError::Validation("hookURL required".into()));
    }
    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM games WHERE id = $1")
        .bind(&game_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(format!("Game was not found with id: {game_id}")));
    }

    let public_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"INSERT INTO hooks (id, public_id, game_id, event_type, url, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)"#,
    )
    .bind(Uuid::new_v4())
    .bind(&public_id)
    .bind(&game_id)
    .bind(body.event_type)
    .bind(&body.url)
    .bind(chrono::Utc::now())
    .execute(&state.db)
    .await?;

    state.hooks.refresh(&state.db).await?;
    Ok(Json(json!({ "success": true, "publicID": public_id })))
}

pub async fn remove_hook(
    State(state): State<AppState>,
    Path((game_id, public_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let result = sqlx::query("DELETE FROM hooks WHERE game_id = $1 AND public_id = $2")
        .bind(&game_id)
        .bind(&public_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Hook was not found with id: {public_id}")));
    }

    state.hooks.refresh(&state.db).await?;
    Ok(Json(json!({ "success": true })))
}
