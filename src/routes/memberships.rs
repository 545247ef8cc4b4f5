use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{
    ApplyRequest, DeleteMembershipRequest, InviteRequest, LeaveClanRequest, LevelChange,
    PromoteDemoteRequest, ResolveAction, ResolveRequest,
};
use crate::AppState;

pub async fn apply(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<ApplyRequest>,
) -> AppResult<Json<Value>> {
    let membership = state
        .manager
        .apply_for_membership(&game_id, &clan_public_id, body)
        .await?;
    Ok(Json(json!({ "success": true, "approved": false, "level": membership.level })))
}

pub async fn invite(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<InviteRequest>,
) -> AppResult<Json<Value>> {
    let membership = state
        .manager
        .invite_for_membership(&game_id, &clan_public_id, body)
        .await?;
    Ok(Json(json!({ "success": true, "approved": false, "level": membership.level })))
}

pub async fn resolve_application(
    State(state): State<AppState>,
    Path((game_id, clan_public_id, action)): Path<(String, String, String)>,
    Json(body): Json<ResolveRequest>,
) -> AppResult<Json<Value>> {
    let action = parse_action(&action)?;
    state
        .manager
        .resolve_application(&game_id, &clan_public_id, action, body)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn resolve_invitation(
    State(state): State<AppState>,
    Path((game_id, clan_public_id, action)): Path<(String, String, String)>,
    Json(body): Json<ResolveRequest>,
) -> AppResult<Json<Value>> {
    let action = parse_action(&action)?;
    state
        .manager
        .resolve_invitation(&game_id, &clan_public_id, action, body)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<DeleteMembershipRequest>,
) -> AppResult<Json<Value>> {
    state
        .manager
        .delete_membership(&game_id, &clan_public_id, body)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn promote(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<PromoteDemoteRequest>,
) -> AppResult<Json<Value>> {
    let membership = state
        .manager
        .change_level(&game_id, &clan_public_id, LevelChange::Promote, body)
        .await?;
    Ok(Json(json!({ "success": true, "level": membership.level })))
}

pub async fn demote(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<PromoteDemoteRequest>,
) -> AppResult<Json<Value>> {
    let membership = state
        .manager
        .change_level(&game_id, &clan_public_id, LevelChange::Demote, body)
        .await?;
    Ok(Json(json!({ "success": true, "level": membership.level })))
}

pub async fn leave(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<LeaveClanRequest>,
) -> AppResult<Json<Value>> {
    state
        .manager
        .leave_clan(&game_id, &clan_public_id, body)
        .await?;
    Ok(Json(json!({ "success": true })))
}

fn parse_action(action: &str) -> AppResult<ResolveAction> {
    ResolveAction::parse(action)
        .ok_or_else(|| AppError::Validation(format!("Unknown action: {action}")))
}
