use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{CreatePlayerRequest, MembershipState, Player, UpdatePlayerRequest};
use crate::AppState;

pub async fn create_player(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(body): Json<CreatePlayerRequest>,
) -> AppResult<Json<Value>> {
    if body.public_id.is_empty() || body.name.is_empty() {
        return Err(AppError::Validation("publicID and name required".into()));
    }
    let player = state.manager.create_player(&game_id, body).await?;
    Ok(Json(json!({ "success": true, "publicID": player.public_id })))
}

pub async fn update_player(
    State(state): State<AppState>,
    Path((game_id, player_public_id)): Path<(String, String)>,
    Json(body): Json<UpdatePlayerRequest>,
) -> AppResult<Json<Value>> {
    if body.name.is_empty() {
        return Err(AppError::Validation("name required".into()));
    }
    let player = state
        .manager
        .update_player(&game_id, &player_public_id, body)
        .await?;
    Ok(Json(json!({ "success": true, "publicID": player.public_id })))
}

pub async fn get_player(
    State(state): State<AppState>,
    Path((game_id, player_public_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let player: Player = sqlx::query_as(
        r#"SELECT id, game_id, public_id, name, metadata, created_at, updated_at
        FROM players WHERE game_id = $1 AND public_id = $2"#,
    )
    .bind(&game_id)
    .bind(&player_public_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| {
        AppError::NotFound(format!("Player was not found with id: {player_public_id}"))
    })?;

    let memberships: Vec<(String, String, String, MembershipState)> = sqlx::query_as(
        r#"SELECT c.public_id, c.name, m.level, m.state
        FROM memberships m
        JOIN clans c ON c.id = m.clan_id
        WHERE m.player_id = $1 AND m.state IN ('pending_application', 'pending_invitation', 'approved', 'banned')
        ORDER BY m.created_at"#,
    )
    .bind(player.id)
    .fetch_all(&state.db)
    .await?;

    let clans: Vec<Value> = memberships
        .into_iter()
        .map(|(clan_public_id, clan_name, level, state)| {
            json!({
                "clanPublicID": clan_public_id,
                "clanName": clan_name,
                "level": level,
                "state": state,
            })
        })
        .collect();

    Ok(Json(json!({
        "success": true,
        "publicID": player.public_id,
        "name": player.name,
        "metadata": player.metadata,
        "createdAt": player.created_at,
        "updatedAt": player.updated_at,
        "memberships": clans,
    })))
}
