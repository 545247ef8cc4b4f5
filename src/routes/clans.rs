use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::{
    Clan, CreateClanRequest, MembershipState, TransferOwnershipRequest, UpdateClanRequest,
};
use crate::AppState;

pub async fn create_clan(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
    Json(body): Json<CreateClanRequest>,
) -> AppResult<Json<Value>> {
    if body.public_id.is_empty() || body.name.is_empty() {
        return Err(AppError::Validation("publicID and name required".into()));
    }
    let clan = state.manager.create_clan(&game_id, body).await?;
    Ok(Json(json!({ "success": true, "publicID": clan.public_id })))
}

pub async fn update_clan(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<UpdateClanRequest>,
) -> AppResult<Json<Value>> {
    if body.name.is_empty() {
        return Err(AppError::Validation("name required".into()));
    }
    let clan = state
        .manager
        .update_clan(&game_id, &clan_public_id, body)
        .await?;
    Ok(Json(json!({ "success": true, "publicID": clan.public_id })))
}

pub async fn transfer_ownership(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
    Json(body): Json<TransferOwnershipRequest>,
) -> AppResult<Json<Value>> {
    state
        .manager
        .transfer_ownership(&game_id, &clan_public_id, body)
        .await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_clans(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> AppResult<Json<Value>> {
    let clans: Vec<Clan> = sqlx::query_as(
        r#"SELECT id, game_id, public_id, name, metadata, owner_id, membership_count, created_at, updated_at
        FROM clans WHERE game_id = $1 ORDER BY name"#,
    )
    .bind(&game_id)
    .fetch_all(&state.db)
    .await?;

    let clans: Vec<Value> = clans
        .iter()
        .map(|c| {
            json!({
                "publicID": c.public_id,
                "name": c.name,
                "metadata": c.metadata,
                "membershipCount": c.membership_count,
            })
        })
        .collect();
    Ok(Json(json!({ "success": true, "clans": clans })))
}

pub async fn get_clan(
    State(state): State<AppState>,
    Path((game_id, clan_public_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let clan: Clan = sqlx::query_as(
        r#"SELECT id, game_id, public_id, name, metadata, owner_id, membership_count, created_at, updated_at
        FROM clans WHERE game_id = $1 AND public_id = $2"#,
    )
    .bind(&game_id)
    .bind(&clan_public_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Clan was not found with id: {clan_public_id}")))?;

    let rows: Vec<(String, String, String, MembershipState)> = sqlx::query_as(
        r#"SELECT p.public_id, p.name, m.level, m.state
        FROM memberships m
        JOIN players p ON p.id = m.player_id
        WHERE m.clan_id = $1 AND m.state IN ('pending_application', 'pending_invitation', 'approved', 'banned')
        ORDER BY m.created_at"#,
    )
    .bind(clan.id)
    .fetch_all(&state.db)
    .await?;

    let entry = |public_id: &str, name: &str, level: &str| {
        json!({ "playerPublicID": public_id, "playerName": name, "level": level })
    };
    let mut roster = Vec::new();
    let mut pending_applications = Vec::new();
    let mut pending_invitations = Vec::new();
    let mut banned = Vec::new();
    for (public_id, name, level, state) in &rows {
        let value = entry(public_id, name, level);
        match state {
            MembershipState::Approved => roster.push(value),
            MembershipState::PendingApplication => pending_applications.push(value),
            MembershipState::PendingInvitation => pending_invitations.push(value),
            MembershipState::Banned => banned.push(value),
            _ => {}
        }
    }

    let owner: Option<(String, String)> =
        sqlx::query_as("SELECT public_id, name FROM players WHERE id = $1")
            .bind(clan.owner_id)
            .fetch_optional(&state.db)
            .await?;

    Ok(Json(json!({
        "success": true,
        "publicID": clan.public_id,
        "name": clan.name,
        "metadata": clan.metadata,
        "membershipCount": clan.membership_count,
        "owner": owner.map(|(public_id, name)| json!({ "publicID": public_id, "name": name })),
        "roster": roster,
        "memberships": {
            "pendingApplications": pending_applications,
            "pendingInvitations": pending_invitations,
            "banned": banned,
        },
    })))
}
