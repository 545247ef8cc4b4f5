use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{CreateGameRequest, UpdateGameRequest};
use crate::AppState;

pub async fn create_game(
    State(state): State<AppState>,
    Json(body): Json<CreateGameRequest>,
) -> AppResult<Json<Value>> {
    if body.public_id.is_empty() || body.name.is_empty() {
        return Err(AppError::Validation("publicID and name required".into()));
    }
    if body.membership_levels.is_empty() {
        return Err(AppError::Validation(
            "membershipLevels must be a non-empty ordered list".into(),
        ));
    }

    let defaults = &state.config.game_defaults;
    let now = chrono::Utc::now();
    let result = sqlx::query(
        r#"INSERT INTO games (id, name, membership_levels, max_members, max_pending_invites,
            cooldown_before_invite, cooldown_before_apply, player_update_metadata_whitelist,
            created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)"#,
    )
    .bind(&body.public_id)
    .bind(&body.name)
    .bind(sqlx::types::Json(&body.membership_levels))
    .bind(body.max_members.unwrap_or(defaults.max_members))
    .bind(body.max_pending_invites.unwrap_or(defaults.max_pending_invites))
    .bind(body.cooldown_before_invite.unwrap_or(defaults.cooldown_before_invite))
    .bind(body.cooldown_before_apply.unwrap_or(defaults.cooldown_before_apply))
    .bind(body.player_update_metadata_whitelist.clone().unwrap_or_default())
    .bind(now)
    .execute(&state.db)
    .await;

    match result {
        Ok(_) => Ok(Json(json!({ "success": true, "publicID": body.public_id }))),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::Conflict("Game already exists with this publicID".into()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn update_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(body): Json<UpdateGameRequest>,
) -> AppResult<Json<Value>> {
    if body.membership_levels.is_empty() {
        return Err(AppError::Validation(
            "membershipLevels must be a non-empty ordered list".into(),
        ));
    }

    let defaults = &state.config.game_defaults;
    let now = chrono::Utc::now();
    // Upsert: updating an unknown game creates it.
    sqlx::query(
        r#"INSERT INTO games (id, name, membership_levels, max_members, max_pending_invites,
            cooldown_before_invite, cooldown_before_apply, player_update_metadata_whitelist,
            created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            membership_levels = EXCLUDED.membership_levels,
            max_members = EXCLUDED.max_members,
            max_pending_invites = EXCLUDED.max_pending_invites,
            cooldown_before_invite = EXCLUDED.cooldown_before_invite,
            cooldown_before_apply = EXCLUDED.cooldown_before_apply,
            player_update_metadata_whitelist = EXCLUDED.player_update_metadata_whitelist,
            updated_at = EXCLUDED.updated_at"#,
    )
    .bind(&game_id)
    .bind(&body.name)
    .bind(sqlx::types::Json(&body.membership_levels))
    .bind(body.max_members.unwrap_or(defaults.max_members))
    .bind(body.max_pending_invites.unwrap_or(defaults.max_pending_invites))
    .bind(body.cooldown_before_invite.unwrap_or(defaults.cooldown_before_invite))
    .bind(body.cooldown_before_apply.unwrap_or(defaults.cooldown_before_apply))
    .bind(body.player_update_metadata_whitelist.clone().unwrap_or_default())
    .bind(now)
    .execute(&state.db)
    .await?;

    Ok(Json(json!({ "success": true })))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c == "23505")
        .unwrap_or(false)
}
