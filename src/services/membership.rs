//! The membership manager: sole mutator of clans and memberships.
//!
//! Every operation runs inside one transaction holding a `FOR UPDATE`
//! lock on the target clan row, so operations on the same clan never
//! interleave while different clans proceed in parallel. Invariant
//! checks run against state loaded inside the transaction, after the
//! lock is held. Dispatch jobs are enqueued only after commit; a failed
//! enqueue never affects the committed outcome.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::events::{
    ClanEventPayload, HookEvent, MembershipEventPayload, OwnershipEventPayload, PlayerEventPayload,
};
use crate::models::{
    should_notify_player_update, ApplyRequest, Clan, CreateClanRequest, CreatePlayerRequest,
    DeleteMembershipRequest, Game, InviteRequest, LeaveClanRequest, LevelChange, Membership,
    MembershipState, PromoteDemoteRequest, ResolveAction, ResolveRequest,
    TransferOwnershipRequest, UpdateClanRequest, UpdatePlayerRequest,
};
use crate::services::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct MembershipManager {
    db: PgPool,
    dispatcher: Dispatcher,
}

impl MembershipManager {
    pub fn new(db: PgPool, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub async fn create_clan(&self, game_id: &str, req: CreateClanRequest) -> AppResult<Clan> {
        let metadata = validate_metadata(req.metadata)?;
        let mut tx = self.db.begin().await?;
        let game = load_game(&mut tx, game_id).await?;
        let owner = find_player(&mut tx, game_id, &req.owner_public_id).await?;

        let now = Utc::now();
        let clan = Clan {
            id: Uuid::new_v4(),
            game_id: game_id.to_string(),
            public_id: req.public_id,
            name: req.name,
            metadata,
            owner_id: owner.id,
            membership_count: 1,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"INSERT INTO clans (id, game_id, public_id, name, metadata, owner_id, membership_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(clan.id)
        .bind(&clan.game_id)
        .bind(&clan.public_id)
        .bind(&clan.name)
        .bind(&clan.metadata)
        .bind(clan.owner_id)
        .bind(clan.membership_count)
        .bind(clan.created_at)
        .bind(clan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "Clan already exists with this publicID"))?;

        let membership = owner_membership(&game, &clan, owner.id, now);
        insert_membership(&mut tx, &membership).await?;
        tx.commit().await?;

        self.dispatcher
            .dispatch(HookEvent::ClanCreated(clan_payload(&clan)))
            .await;
        Ok(clan)
    }

    pub async fn update_clan(
        &self,
        game_id: &str,
        clan_public_id: &str,
        req: UpdateClanRequest,
    ) -> AppResult<Clan> {
        let metadata = validate_metadata(req.metadata)?;
        let mut tx = self.db.begin().await?;
        load_game(&mut tx, game_id).await?;
        let clan = lock_clan(&mut tx, game_id, clan_public_id).await?;
        let requestor = find_player(&mut tx, game_id, &req.requestor_public_id).await?;

        // An owner mismatch reads the same as a missing clan so the
        // requestor cannot probe for clan existence.
        if clan.owner_id != requestor.id {
            return Err(clan_not_found(clan_public_id));
        }

        let now = Utc::now();
        sqlx::query("UPDATE clans SET name = $1, metadata = $2, updated_at = $3 WHERE id = $4")
            .bind(&req.name)
            .bind(&metadata)
            .bind(now)
            .bind(clan.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let clan = Clan {
            name: req.name,
            metadata,
            updated_at: now,
            ..clan
        };
        self.dispatcher
            .dispatch(HookEvent::ClanUpdated(clan_payload(&clan)))
            .await;
        Ok(clan)
    }

    pub async fn apply_for_membership(
        &self,
        game_id: &str,
        clan_public_id: &str,
        req: ApplyRequest,
    ) -> AppResult<Membership> {
        let mut tx = self.db.begin().await?;
        let game = load_game(&mut tx, game_id).await?;
        let clan = lock_clan(&mut tx, game_id, clan_public_id).await?;
        let player = find_player(&mut tx, game_id, &req.player_public_id).await?;
        let memberships = load_memberships(&mut tx, clan.id).await?;

        let now = Utc::now();
        let outcome = check_apply(&game, &memberships, player.id, &req.level, now)?;
        if let Some(id) = outcome.supersedes {
            mark_removed(&mut tx, id, player.id, MembershipState::Deleted, now).await?;
        }

        let membership = new_membership(
            &clan,
            player.id,
            player.id,
            &req.level,
            MembershipState::PendingApplication,
            req.message.clone().unwrap_or_default(),
            now,
        );
        insert_membership(&mut tx, &membership).await?;
        tx.commit().await?;

        self.dispatcher
            .dispatch(HookEvent::MembershipApplied(membership_payload(
                &clan,
                &player.public_id,
                &player.public_id,
                &membership.level,
                req.message,
            )))
            .await;
        Ok(membership)
    }

    pub async fn invite_for_membership(
        &self,
        game_id: &str,
        clan_public_id: &str,
        req: InviteRequest,
    ) -> AppResult<Membership> {
        let mut tx = self.db.begin().await?;
        let game = load_game(&mut tx, game_id).await?;
        let clan = lock_clan(&mut tx, game_id, clan_public_id).await?;
        let requestor = find_player(&mut tx, game_id, &req.requestor_public_id).await?;
        let target = find_player(&mut tx, game_id, &req.player_public_id).await?;
        let memberships = load_memberships(&mut tx, clan.id).await?;

        let now = Utc::now();
        let outcome = check_invite(
            &game,
            &clan,
            &memberships,
            requestor.id,
            target.id,
            &req.level,
            now,
        )?;
        if let Some(id) = outcome.supersedes {
            mark_removed(&mut tx, id, requestor.id, MembershipState::Deleted, now).await?;
        }

        let membership = new_membership(
            &clan,
            target.id,
            requestor.id,
            &req.level,
            MembershipState::PendingInvitation,
            req.message.clone().unwrap_or_default(),
            now,
        );
        insert_membership(&mut tx, &membership).await?;
        tx.commit().await?;

        self.dispatcher
            .dispatch(HookEvent::MembershipApplied(membership_payload(
                &clan,
                &target.public_id,
                &requestor.public_id,
                &membership.level,
                req.message,
            )))
            .await;
        Ok(membership)
    }

    pub async fn resolve_application(
        &self,
        game_id: &str,
        clan_public_id: &str,
        action: ResolveAction,
        req: ResolveRequest,
    ) -> AppResult<Membership> {
        let requestor_public_id = req
            .requestor_public_id
            .ok_or_else(|| AppError::Validation("requestorPublicID required".into()))?;
        self.resolve_pending(
            game_id,
            clan_public_id,
            &req.player_public_id,
            &requestor_public_id,
            MembershipState::PendingApplication,
            action,
        )
        .await
    }

    pub async fn resolve_invitation(
        &self,
        game_id: &str,
        clan_public_id: &str,
        action: ResolveAction,
        req: ResolveRequest,
    ) -> AppResult<Membership> {
        // The invited player acts on their own invitation.
        self.resolve_pending(
            game_id,
            clan_public_id,
            &req.player_public_id,
            &req.player_public_id,
            MembershipState::PendingInvitation,
            action,
        )
        .await
    }

    async fn resolve_pending(
        &self,
        game_id: &str,
        clan_public_id: &str,
        player_public_id: &str,
        actor_public_id: &str,
        expected: MembershipState,
        action: ResolveAction,
    ) -> AppResult<Membership> {
        let mut tx = self.db.begin().await?;
        let game = load_game(&mut tx, game_id).await?;
        let clan = lock_clan(&mut tx, game_id, clan_public_id).await?;
        let player = find_player(&mut tx, game_id, player_public_id).await?;
        let actor = find_player(&mut tx, game_id, actor_public_id).await?;
        let memberships = load_memberships(&mut tx, clan.id).await?;

        let membership = active_membership(&memberships, player.id)
            .ok_or_else(|| membership_not_found(player_public_id))?;
        check_resolution(&game, &clan, membership, actor.id, expected, action)?;

        let now = Utc::now();
        let mut membership = membership.clone();
        match action {
            ResolveAction::Approve => {
                membership.state = MembershipState::Approved;
                membership.approver_id = Some(actor.id);
                membership.approved_at = Some(now);
                membership.updated_at = now;
                sqlx::query(
                    r#"UPDATE memberships SET state = $1, approver_id = $2, approved_at = $3, updated_at = $3
                    WHERE id = $4"#,
                )
                .bind(membership.state)
                .bind(actor.id)
                .bind(now)
                .bind(membership.id)
                .execute(&mut *tx)
                .await?;
                sqlx::query(
                    "UPDATE clans SET membership_count = membership_count + 1, updated_at = $1 WHERE id = $2",
                )
                .bind(now)
                .bind(clan.id)
                .execute(&mut *tx)
                .await?;
            }
            ResolveAction::Deny => {
                membership.state = MembershipState::Denied;
                membership.denier_id = Some(actor.id);
                membership.denied_at = Some(now);
                membership.updated_at = now;
                sqlx::query(
                    r#"UPDATE memberships SET state = $1, denier_id = $2, denied_at = $3, updated_at = $3
                    WHERE id = $4"#,
                )
                .bind(membership.state)
                .bind(actor.id)
                .bind(now)
                .bind(membership.id)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        let payload = membership_payload(
            &clan,
            &player.public_id,
            &actor.public_id,
            &membership.level,
            None,
        );
        let event = match action {
            ResolveAction::Approve => HookEvent::MembershipApproved(payload),
            ResolveAction::Deny => HookEvent::MembershipDenied(payload),
        };
        self.dispatcher.dispatch(event).await;
        Ok(membership)
    }

    pub async fn delete_membership(
        &self,
        game_id: &str,
        clan_public_id: &str,
        req: DeleteMembershipRequest,
    ) -> AppResult<()> {
        self.remove_membership(
            game_id,
            clan_public_id,
            &req.player_public_id,
            &req.requestor_public_id,
        )
        .await
    }

    pub async fn leave_clan(
        &self,
        game_id: &str,
        clan_public_id: &str,
        req: LeaveClanRequest,
    ) -> AppResult<()> {
        self.remove_membership(
            game_id,
            clan_public_id,
            &req.player_public_id,
            &req.player_public_id,
        )
        .await
    }

    async fn remove_membership(
        &self,
        game_id: &str,
        clan_public_id: &str,
        player_public_id: &str,
        requestor_public_id: &str,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        load_game(&mut tx, game_id).await?;
        let clan = lock_clan(&mut tx, game_id, clan_public_id).await?;
        let player = find_player(&mut tx, game_id, player_public_id).await?;
        let requestor = find_player(&mut tx, game_id, requestor_public_id).await?;
        let memberships = load_memberships(&mut tx, clan.id).await?;

        let membership = active_membership(&memberships, player.id)
            .ok_or_else(|| membership_not_found(player_public_id))?;
        check_removal(&clan, membership, requestor.id)?;

        let now = Utc::now();
        let removed_state = removal_state(membership, requestor.id);
        mark_removed(&mut tx, membership.id, requestor.id, removed_state, now).await?;
        if membership.state == MembershipState::Approved {
            sqlx::query(
                "UPDATE clans SET membership_count = membership_count - 1, updated_at = $1 WHERE id = $2",
            )
            .bind(now)
            .bind(clan.id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.dispatcher
            .dispatch(HookEvent::MembershipLeft(membership_payload(
                &clan,
                &player.public_id,
                &requestor.public_id,
                &membership.level,
                None,
            )))
            .await;
        Ok(())
    }

    pub async fn change_level(
        &self,
        game_id: &str,
        clan_public_id: &str,
        change: LevelChange,
        req: PromoteDemoteRequest,
    ) -> AppResult<Membership> {
        let mut tx = self.db.begin().await?;
        let game = load_game(&mut tx, game_id).await?;
        let clan = lock_clan(&mut tx, game_id, clan_public_id).await?;
        let player = find_player(&mut tx, game_id, &req.player_public_id).await?;
        let actor = find_player(&mut tx, game_id, &req.requestor_public_id).await?;
        let memberships = load_memberships(&mut tx, clan.id).await?;

        let membership = active_membership(&memberships, player.id)
            .ok_or_else(|| membership_not_found(&req.player_public_id))?;
        let new_level = check_level_change(&game, &clan, membership, actor.id, change)?;

        let now = Utc::now();
        sqlx::query("UPDATE memberships SET level = $1, updated_at = $2 WHERE id = $3")
            .bind(&new_level)
            .bind(now)
            .bind(membership.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let membership = Membership {
            level: new_level.clone(),
            updated_at: now,
            ..membership.clone()
        };
        let payload =
            membership_payload(&clan, &player.public_id, &actor.public_id, &new_level, None);
        let event = match change {
            LevelChange::Promote => HookEvent::MembershipPromoted(payload),
            LevelChange::Demote => HookEvent::MembershipDemoted(payload),
        };
        self.dispatcher.dispatch(event).await;
        Ok(membership)
    }

    pub async fn transfer_ownership(
        &self,
        game_id: &str,
        clan_public_id: &str,
        req: TransferOwnershipRequest,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let game = load_game(&mut tx, game_id).await?;
        let clan = lock_clan(&mut tx, game_id, clan_public_id).await?;
        let current = find_player(&mut tx, game_id, &req.owner_public_id).await?;
        let target = find_player(&mut tx, game_id, &req.player_public_id).await?;

        if clan.owner_id != current.id {
            return Err(clan_not_found(clan_public_id));
        }

        let memberships = load_memberships(&mut tx, clan.id).await?;
        let target_membership = check_transfer(active_membership(&memberships, target.id))?;

        let now = Utc::now();
        sqlx::query("UPDATE clans SET owner_id = $1, updated_at = $2 WHERE id = $3")
            .bind(target.id)
            .bind(now)
            .bind(clan.id)
            .execute(&mut *tx)
            .await?;
        let updates = plan_transfer(
            &game,
            active_membership(&memberships, current.id),
            target_membership,
        );
        for (membership_id, level) in updates {
            sqlx::query("UPDATE memberships SET level = $1, updated_at = $2 WHERE id = $3")
                .bind(&level)
                .bind(now)
                .bind(membership_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.dispatcher
            .dispatch(HookEvent::OwnershipTransferred(OwnershipEventPayload {
                game_id: game_id.to_string(),
                clan_public_id: clan.public_id.clone(),
                previous_owner_public_id: current.public_id,
                new_owner_public_id: target.public_id,
            }))
            .await;
        Ok(())
    }

    pub async fn create_player(
        &self,
        game_id: &str,
        req: CreatePlayerRequest,
    ) -> AppResult<crate::models::Player> {
        let metadata = validate_metadata(req.metadata)?;
        let mut tx = self.db.begin().await?;
        load_game(&mut tx, game_id).await?;

        let now = Utc::now();
        let player = crate::models::Player {
            id: Uuid::new_v4(),
            game_id: game_id.to_string(),
            public_id: req.public_id,
            name: req.name,
            metadata,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            r#"INSERT INTO players (id, game_id, public_id, name, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(player.id)
        .bind(&player.game_id)
        .bind(&player.public_id)
        .bind(&player.name)
        .bind(&player.metadata)
        .bind(player.created_at)
        .bind(player.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "Player already exists with this publicID"))?;
        tx.commit().await?;
        Ok(player)
    }

    /// Upserts a player. `PlayerUpdated` fires only when the player is
    /// new, the name changed, or a whitelisted metadata field changed;
    /// see `should_notify_player_update`.
    pub async fn update_player(
        &self,
        game_id: &str,
        player_public_id: &str,
        req: UpdatePlayerRequest,
    ) -> AppResult<crate::models::Player> {
        let metadata = validate_metadata(req.metadata)?;
        let mut tx = self.db.begin().await?;
        let game = load_game(&mut tx, game_id).await?;

        let existing: Option<crate::models::Player> = sqlx::query_as(
            r#"SELECT id, game_id, public_id, name, metadata, created_at, updated_at
            FROM players WHERE game_id = $1 AND public_id = $2 FOR UPDATE"#,
        )
        .bind(game_id)
        .bind(player_public_id)
        .fetch_optional(&mut *tx)
        .await?;

        let whitelist = game.whitelist_fields();
        let notify =
            should_notify_player_update(&whitelist, existing.as_ref(), &req.name, &metadata);

        let now = Utc::now();
        let player = match existing {
            Some(previous) => {
                sqlx::query(
                    "UPDATE players SET name = $1, metadata = $2, updated_at = $3 WHERE id = $4",
                )
                .bind(&req.name)
                .bind(&metadata)
                .bind(now)
                .bind(previous.id)
                .execute(&mut *tx)
                .await?;
                crate::models::Player {
                    name: req.name,
                    metadata,
                    updated_at: now,
                    ..previous
                }
            }
            None => {
                let player = crate::models::Player {
                    id: Uuid::new_v4(),
                    game_id: game_id.to_string(),
                    public_id: player_public_id.to_string(),
                    name: req.name,
                    metadata,
                    created_at: now,
                    updated_at: now,
                };
                sqlx::query(
                    r#"INSERT INTO players (id, game_id, public_id, name, metadata, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
                )
                .bind(player.id)
                .bind(&player.game_id)
                .bind(&player.public_id)
                .bind(&player.name)
                .bind(&player.metadata)
                .bind(player.created_at)
                .bind(player.updated_at)
                .execute(&mut *tx)
                .await?;
                player
            }
        };
        tx.commit().await?;

        if notify {
            self.dispatcher
                .dispatch(HookEvent::PlayerUpdated(PlayerEventPayload {
                    game_id: game_id.to_string(),
                    public_id: player.public_id.clone(),
                    name: player.name.clone(),
                    metadata: player.metadata.clone(),
                }))
                .await;
        }
        Ok(player)
    }
}

// ---------------------------------------------------------------------------
// Store access
// ---------------------------------------------------------------------------

async fn load_game(tx: &mut Transaction<'_, Postgres>, game_id: &str) -> AppResult<Game> {
    sqlx::query_as::<_, Game>(
        r#"SELECT id, name, membership_levels, max_members, max_pending_invites,
            cooldown_before_invite, cooldown_before_apply, player_update_metadata_whitelist,
            created_at, updated_at
        FROM games WHERE id = $1"#,
    )
    .bind(game_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Game was not found with id: {game_id}")))
}

/// Acquires the per-clan exclusivity lock for the rest of the
/// transaction.
async fn lock_clan(
    tx: &mut Transaction<'_, Postgres>,
    game_id: &str,
    public_id: &str,
) -> AppResult<Clan> {
    sqlx::query_as::<_, Clan>(
        r#"SELECT id, game_id, public_id, name, metadata, owner_id, membership_count, created_at, updated_at
        FROM clans WHERE game_id = $1 AND public_id = $2 FOR UPDATE"#,
    )
    .bind(game_id)
    .bind(public_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| clan_not_found(public_id))
}

async fn find_player(
    tx: &mut Transaction<'_, Postgres>,
    game_id: &str,
    public_id: &str,
) -> AppResult<crate::models::Player> {
    sqlx::query_as::<_, crate::models::Player>(
        r#"SELECT id, game_id, public_id, name, metadata, created_at, updated_at
        FROM players WHERE game_id = $1 AND public_id = $2"#,
    )
    .bind(game_id)
    .bind(public_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Player was not found with id: {public_id}")))
}

/// All membership rows for the clan, deleted ones included; the
/// decision functions need the history for cooldown checks.
async fn load_memberships(
    tx: &mut Transaction<'_, Postgres>,
    clan_id: Uuid,
) -> AppResult<Vec<Membership>> {
    Ok(sqlx::query_as::<_, Membership>(
        r#"SELECT id, game_id, clan_id, player_id, level, state, message, requestor_id,
            approver_id, denier_id, deleted_by, created_at, updated_at, approved_at,
            denied_at, deleted_at
        FROM memberships WHERE clan_id = $1 ORDER BY created_at"#,
    )
    .bind(clan_id)
    .fetch_all(&mut **tx)
    .await?)
}

async fn insert_membership(
    tx: &mut Transaction<'_, Postgres>,
    membership: &Membership,
) -> AppResult<()> {
    sqlx::query(
        r#"INSERT INTO memberships (id, game_id, clan_id, player_id, level, state, message,
            requestor_id, approver_id, denier_id, deleted_by, created_at, updated_at,
            approved_at, denied_at, deleted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"#,
    )
    .bind(membership.id)
    .bind(&membership.game_id)
    .bind(membership.clan_id)
    .bind(membership.player_id)
    .bind(&membership.level)
    .bind(membership.state)
    .bind(&membership.message)
    .bind(membership.requestor_id)
    .bind(membership.approver_id)
    .bind(membership.denier_id)
    .bind(membership.deleted_by)
    .bind(membership.created_at)
    .bind(membership.updated_at)
    .bind(membership.approved_at)
    .bind(membership.denied_at)
    .bind(membership.deleted_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn mark_removed(
    tx: &mut Transaction<'_, Postgres>,
    membership_id: Uuid,
    removed_by: Uuid,
    state: MembershipState,
    now: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        r#"UPDATE memberships SET state = $1, deleted_by = $2, deleted_at = $3, updated_at = $3
        WHERE id = $4"#,
    )
    .bind(state)
    .bind(removed_by)
    .bind(now)
    .bind(membership_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Decision functions. Pure over state loaded under the clan lock, so
// every check is re-validated at commit time.
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PendingOutcome {
    supersedes: Option<Uuid>,
}

fn active_membership(memberships: &[Membership], player_id: Uuid) -> Option<&Membership> {
    memberships
        .iter()
        .find(|m| m.player_id == player_id && m.state.is_active())
}

fn check_apply(
    game: &Game,
    memberships: &[Membership],
    player_id: Uuid,
    level: &str,
    now: DateTime<Utc>,
) -> AppResult<PendingOutcome> {
    if game.level_index(level).is_none() {
        return Err(AppError::Validation(format!("Unknown level: {level}")));
    }

    let mut supersedes = None;
    if let Some(existing) = active_membership(memberships, player_id) {
        match existing.state {
            MembershipState::Banned => {
                return Err(AppError::Forbidden("Player is banned from this clan".into()))
            }
            MembershipState::Approved => {
                return Err(AppError::Conflict("Player is already a clan member".into()))
            }
            MembershipState::PendingApplication => {
                return Err(AppError::Conflict("Application already pending".into()))
            }
            // A fresh application supersedes a pending invitation.
            MembershipState::PendingInvitation => supersedes = Some(existing.id),
            _ => {}
        }
    }

    if let Some(window) = game.cooldown_before_apply() {
        if let Some(remaining) = cooldown_remaining(
            memberships
                .iter()
                .filter(|m| m.player_id == player_id && m.requestor_id == player_id),
            window,
            now,
        ) {
            return Err(AppError::CooldownActive(remaining));
        }
    }

    if game.max_pending_invites >= 0 {
        let pending = memberships
            .iter()
            .filter(|m| m.state == MembershipState::PendingApplication)
            .count();
        if pending as i32 >= game.max_pending_invites {
            return Err(AppError::CapacityExceeded(format!(
                "Clan has reached the maximum of {} pending applications",
                game.max_pending_invites
            )));
        }
    }

    Ok(PendingOutcome { supersedes })
}

fn check_invite(
    game: &Game,
    clan: &Clan,
    memberships: &[Membership],
    requestor_id: Uuid,
    target_id: Uuid,
    level: &str,
    now: DateTime<Utc>,
) -> AppResult<PendingOutcome> {
    let level_idx = game
        .level_index(level)
        .ok_or_else(|| AppError::Validation(format!("Unknown level: {level}")))?;

    if requestor_id != clan.owner_id {
        let requestor_membership = memberships
            .iter()
            .find(|m| m.player_id == requestor_id && m.state == MembershipState::Approved)
            .ok_or_else(|| {
                AppError::Forbidden("Requestor is not an approved clan member".into())
            })?;
        let requestor_idx = game
            .level_index(&requestor_membership.level)
            .unwrap_or(0);
        if requestor_idx < level_idx {
            return Err(AppError::Forbidden(
                "Requestor cannot invite above their own level".into(),
            ));
        }
    }

    let mut supersedes = None;
    if let Some(existing) = active_membership(memberships, target_id) {
        match existing.state {
            MembershipState::Banned => {
                return Err(AppError::Forbidden("Player is banned from this clan".into()))
            }
            MembershipState::Approved => {
                return Err(AppError::Conflict("Player is already a clan member".into()))
            }
            MembershipState::PendingInvitation => {
                return Err(AppError::Conflict("Invitation already pending".into()))
            }
            // A fresh invitation supersedes a pending application.
            MembershipState::PendingApplication => supersedes = Some(existing.id),
            _ => {}
        }
    }

    if let Some(window) = game.cooldown_before_invite() {
        if let Some(remaining) = cooldown_remaining(
            memberships
                .iter()
                .filter(|m| m.player_id == target_id && m.requestor_id != target_id),
            window,
            now,
        ) {
            return Err(AppError::CooldownActive(remaining));
        }
    }

    if game.max_pending_invites >= 0 {
        let pending = memberships
            .iter()
            .filter(|m| m.state == MembershipState::PendingInvitation)
            .count();
        if pending as i32 >= game.max_pending_invites {
            return Err(AppError::CapacityExceeded(format!(
                "Clan has reached the maximum of {} pending invitations",
                game.max_pending_invites
            )));
        }
    }

    Ok(PendingOutcome { supersedes })
}

/// Most recent attempt or denial inside the window, if any, as the
/// seconds left before the window clears.
fn cooldown_remaining<'a>(
    history: impl Iterator<Item = &'a Membership>,
    window: chrono::Duration,
    now: DateTime<Utc>,
) -> Option<i64> {
    let mut remaining = None;
    for membership in history {
        for instant in [Some(membership.created_at), membership.denied_at]
            .into_iter()
            .flatten()
        {
            let clears_at = instant + window;
            if clears_at > now {
                let left = (clears_at - now).num_seconds().max(1);
                remaining = Some(remaining.map_or(left, |r: i64| r.max(left)));
            }
        }
    }
    remaining
}

fn check_resolution(
    game: &Game,
    clan: &Clan,
    membership: &Membership,
    actor_id: Uuid,
    expected: MembershipState,
    action: ResolveAction,
) -> AppResult<()> {
    if membership.state != expected {
        return Err(AppError::InvalidTransition(format!(
            "Membership is not in state {:?}",
            expected
        )));
    }

    let authorized = match expected {
        MembershipState::PendingApplication => actor_id == clan.owner_id,
        MembershipState::PendingInvitation => actor_id == membership.player_id,
        _ => false,
    };
    if !authorized {
        return Err(AppError::Forbidden(
            "Actor may not resolve this membership".into(),
        ));
    }

    if action == ResolveAction::Approve
        && game.max_members >= 0
        && clan.membership_count + 1 > game.max_members
    {
        return Err(AppError::CapacityExceeded(format!(
            "Clan has reached the maximum of {} members",
            game.max_members
        )));
    }
    Ok(())
}

/// Owner-initiated removal is a ban and keeps blocking the player;
/// leaving or withdrawing on one's own is a plain delete.
fn removal_state(membership: &Membership, requestor_id: Uuid) -> MembershipState {
    if requestor_id == membership.player_id {
        MembershipState::Deleted
    } else {
        MembershipState::Banned
    }
}

fn check_removal(clan: &Clan, membership: &Membership, requestor_id: Uuid) -> AppResult<()> {
    if membership.player_id == clan.owner_id {
        return Err(AppError::OwnerCannotLeave);
    }
    if requestor_id != clan.owner_id && requestor_id != membership.player_id {
        return Err(AppError::Forbidden(
            "Only the clan owner or the member may remove a membership".into(),
        ));
    }
    Ok(())
}

fn check_level_change(
    game: &Game,
    clan: &Clan,
    membership: &Membership,
    actor_id: Uuid,
    change: LevelChange,
) -> AppResult<String> {
    if actor_id != clan.owner_id {
        return Err(AppError::Forbidden(
            "Only the clan owner may promote or demote members".into(),
        ));
    }
    if membership.player_id == clan.owner_id {
        return Err(AppError::Forbidden(
            "The owner's level only changes through an ownership transfer".into(),
        ));
    }
    if membership.state != MembershipState::Approved {
        return Err(AppError::InvalidTransition(
            "Membership is not approved".into(),
        ));
    }

    let idx = game
        .level_index(&membership.level)
        .ok_or_else(|| AppError::InvalidTransition(format!("Unknown level: {}", membership.level)))?;
    let new_idx = match change {
        LevelChange::Promote => {
            if idx + 1 >= game.membership_levels.len() {
                return Err(AppError::InvalidTransition(
                    "Membership is already at the highest level".into(),
                ));
            }
            idx + 1
        }
        LevelChange::Demote => {
            if idx == 0 {
                return Err(AppError::InvalidTransition(
                    "Membership is already at the lowest level".into(),
                ));
            }
            idx - 1
        }
    };
    Ok(game.membership_levels[new_idx].clone())
}

/// Level reassignments for an ownership transfer: the outgoing owner
/// keeps an approved membership at the top level and the incoming
/// owner's membership moves there with the owner reference.
fn plan_transfer(
    game: &Game,
    old_owner: Option<&Membership>,
    target: &Membership,
) -> Vec<(Uuid, String)> {
    let top = game.top_level().to_string();
    let mut updates = Vec::new();
    if let Some(m) = old_owner {
        updates.push((m.id, top.clone()));
    }
    updates.push((target.id, top));
    updates
}

fn check_transfer(target_membership: Option<&Membership>) -> AppResult<&Membership> {
    match target_membership {
        None => Err(AppError::Forbidden(
            "Player has no membership in this clan".into(),
        )),
        Some(m) if m.state != MembershipState::Approved => Err(AppError::Forbidden(
            "Player is not an approved clan member".into(),
        )),
        Some(m) => Ok(m),
    }
}

// ---------------------------------------------------------------------------
// Construction and payload helpers
// ---------------------------------------------------------------------------

fn validate_metadata(metadata: Option<Value>) -> AppResult<Value> {
    match metadata {
        None => Ok(json!({})),
        Some(v) if v.is_object() => Ok(v),
        Some(_) => Err(AppError::Validation("Metadata must be a JSON object".into())),
    }
}

fn owner_membership(game: &Game, clan: &Clan, owner_id: Uuid, now: DateTime<Utc>) -> Membership {
    Membership {
        state: MembershipState::Approved,
        approver_id: Some(owner_id),
        approved_at: Some(now),
        ..new_membership(
            clan,
            owner_id,
            owner_id,
            game.top_level(),
            MembershipState::Approved,
            String::new(),
            now,
        )
    }
}

fn new_membership(
    clan: &Clan,
    player_id: Uuid,
    requestor_id: Uuid,
    level: &str,
    state: MembershipState,
    message: String,
    now: DateTime<Utc>,
) -> Membership {
    Membership {
        id: Uuid::new_v4(),
        game_id: clan.game_id.clone(),
        clan_id: clan.id,
        player_id,
        level: level.to_string(),
        state,
        message,
        requestor_id,
        approver_id: None,
        denier_id: None,
        deleted_by: None,
        created_at: now,
        updated_at: now,
        approved_at: None,
        denied_at: None,
        deleted_at: None,
    }
}

fn clan_payload(clan: &Clan) -> ClanEventPayload {
    ClanEventPayload {
        game_id: clan.game_id.clone(),
        public_id: clan.public_id.clone(),
        name: clan.name.clone(),
        metadata: clan.metadata.clone(),
        membership_count: clan.membership_count,
    }
}

fn membership_payload(
    clan: &Clan,
    player_public_id: &str,
    requestor_public_id: &str,
    level: &str,
    message: Option<String>,
) -> MembershipEventPayload {
    MembershipEventPayload {
        game_id: clan.game_id.clone(),
        clan_public_id: clan.public_id.clone(),
        player_public_id: player_public_id.to_string(),
        requestor_public_id: requestor_public_id.to_string(),
        level: level.to_string(),
        message,
    }
}

fn clan_not_found(public_id: &str) -> AppError {
    AppError::NotFound(format!("Clan was not found with id: {public_id}"))
}

fn membership_not_found(public_id: &str) -> AppError {
    AppError::NotFound(format!(
        "Membership was not found for player: {public_id}"
    ))
}

fn map_unique(e: sqlx::Error, message: &str) -> AppError {
    let is_unique = e
        .as_database_error()
        .and_then(|d| d.code())
        .map(|c| c == "23505")
        .unwrap_or(false);
    if is_unique {
        AppError::Conflict(message.to_string())
    } else {
        AppError::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::types::Json;

    fn game(levels: &[&str]) -> Game {
        Game {
            id: "g".into(),
            name: "game".into(),
            membership_levels: Json(levels.iter().map(|s| s.to_string()).collect()),
            max_members: -1,
            max_pending_invites: -1,
            cooldown_before_invite: -1,
            cooldown_before_apply: -1,
            player_update_metadata_whitelist: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn clan_for(game: &Game, owner_id: Uuid) -> Clan {
        Clan {
            id: Uuid::new_v4(),
            game_id: game.id.clone(),
            public_id: "clan".into(),
            name: "clan".into(),
            metadata: json!({}),
            owner_id,
            membership_count: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn membership_in(
        clan: &Clan,
        player_id: Uuid,
        requestor_id: Uuid,
        level: &str,
        state: MembershipState,
    ) -> Membership {
        new_membership(clan, player_id, requestor_id, level, state, String::new(), Utc::now())
    }

    struct Fixture {
        game: Game,
        clan: Clan,
        owner: Uuid,
        memberships: Vec<Membership>,
    }

    fn fixture(levels: &[&str]) -> Fixture {
        let game = game(levels);
        let owner = Uuid::new_v4();
        let clan = clan_for(&game, owner);
        let owner_row = owner_membership(&game, &clan, owner, Utc::now());
        Fixture {
            game,
            clan,
            owner,
            memberships: vec![owner_row],
        }
    }

    #[test]
    fn second_application_conflicts() {
        let mut f = fixture(&["member", "elder"]);
        let player = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::PendingApplication,
        ));

        let err = check_apply(&f.game, &f.memberships, player, "member", Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn approved_member_cannot_reapply() {
        let mut f = fixture(&["member"]);
        let player = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::Approved,
        ));

        let err = check_apply(&f.game, &f.memberships, player, "member", Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn banned_player_cannot_apply() {
        let mut f = fixture(&["member"]);
        let player = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::Banned,
        ));

        let err = check_apply(&f.game, &f.memberships, player, "member", Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn application_supersedes_pending_invitation() {
        let mut f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let invitation = membership_in(
            &f.clan,
            player,
            f.owner,
            "member",
            MembershipState::PendingInvitation,
        );
        let invitation_id = invitation.id;
        f.memberships.push(invitation);

        let outcome = check_apply(&f.game, &f.memberships, player, "member", Utc::now()).unwrap();
        assert_eq!(outcome.supersedes, Some(invitation_id));
    }

    #[test]
    fn apply_cooldown_blocks_until_window_elapses() {
        let mut f = fixture(&["member"]);
        f.game.cooldown_before_apply = 3600;
        let player = Uuid::new_v4();
        let now = Utc::now();

        let mut denied = membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::Denied,
        );
        denied.created_at = now - Duration::seconds(7200);
        denied.denied_at = Some(now - Duration::seconds(600));
        f.memberships.push(denied);

        let err = check_apply(&f.game, &f.memberships, player, "member", now).unwrap_err();
        match err {
            AppError::CooldownActive(remaining) => {
                assert!(remaining > 0 && remaining <= 3000);
            }
            other => panic!("expected CooldownActive, got {other:?}"),
        }

        let later = now + Duration::seconds(3001);
        assert!(check_apply(&f.game, &f.memberships, player, "member", later).is_ok());
    }

    #[test]
    fn invite_cooldown_ignores_application_history() {
        let mut f = fixture(&["member"]);
        f.game.cooldown_before_invite = 3600;
        let player = Uuid::new_v4();
        let now = Utc::now();

        // Self-requested row: an application, not an invitation.
        let mut old_application = membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::Deleted,
        );
        old_application.created_at = now - Duration::seconds(60);
        f.memberships.push(old_application);

        assert!(check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            f.owner,
            player,
            "member",
            now,
        )
        .is_ok());
    }

    #[test]
    fn reinvite_within_cooldown_blocks() {
        let mut f = fixture(&["member"]);
        f.game.cooldown_before_invite = 3600;
        let player = Uuid::new_v4();
        let now = Utc::now();

        let mut denied = membership_in(
            &f.clan,
            player,
            f.owner,
            "member",
            MembershipState::Denied,
        );
        denied.created_at = now - Duration::seconds(7200);
        denied.denied_at = Some(now - Duration::seconds(60));
        f.memberships.push(denied);

        let err = check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            f.owner,
            player,
            "member",
            now,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::CooldownActive(_)));
    }

    #[test]
    fn pending_invitations_capacity_is_enforced() {
        let mut f = fixture(&["member"]);
        f.game.max_pending_invites = 2;
        for _ in 0..2 {
            let invited = Uuid::new_v4();
            f.memberships.push(membership_in(
                &f.clan,
                invited,
                f.owner,
                "member",
                MembershipState::PendingInvitation,
            ));
        }

        let err = check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            f.owner,
            Uuid::new_v4(),
            "member",
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded(_)));

        // Applications are counted against their own limit, not the
        // invitation count.
        let applicant = Uuid::new_v4();
        assert!(check_apply(&f.game, &f.memberships, applicant, "member", Utc::now()).is_ok());
    }

    #[test]
    fn pending_applications_capacity_is_enforced() {
        let mut f = fixture(&["member"]);
        f.game.max_pending_invites = 1;
        let applicant = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            applicant,
            applicant,
            "member",
            MembershipState::PendingApplication,
        ));

        let err =
            check_apply(&f.game, &f.memberships, Uuid::new_v4(), "member", Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded(_)));
    }

    #[test]
    fn invite_requires_approved_requestor_with_sufficient_level() {
        let mut f = fixture(&["member", "elder"]);
        let stranger = Uuid::new_v4();
        let err = check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            stranger,
            Uuid::new_v4(),
            "member",
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let junior = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            junior,
            junior,
            "member",
            MembershipState::Approved,
        ));
        let err = check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            junior,
            Uuid::new_v4(),
            "elder",
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert!(check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            junior,
            Uuid::new_v4(),
            "member",
            Utc::now(),
        )
        .is_ok());
    }

    #[test]
    fn invitation_supersedes_pending_application() {
        let mut f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let application = membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::PendingApplication,
        );
        let application_id = application.id;
        f.memberships.push(application);

        let outcome = check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            f.owner,
            player,
            "member",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(outcome.supersedes, Some(application_id));
    }

    #[test]
    fn only_owner_resolves_applications() {
        let f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let application = membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::PendingApplication,
        );

        let err = check_resolution(
            &f.game,
            &f.clan,
            &application,
            player,
            MembershipState::PendingApplication,
            ResolveAction::Approve,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert!(check_resolution(
            &f.game,
            &f.clan,
            &application,
            f.owner,
            MembershipState::PendingApplication,
            ResolveAction::Approve,
        )
        .is_ok());
    }

    #[test]
    fn only_invited_player_resolves_invitations() {
        let f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let invitation = membership_in(
            &f.clan,
            player,
            f.owner,
            "member",
            MembershipState::PendingInvitation,
        );

        let err = check_resolution(
            &f.game,
            &f.clan,
            &invitation,
            f.owner,
            MembershipState::PendingInvitation,
            ResolveAction::Deny,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        assert!(check_resolution(
            &f.game,
            &f.clan,
            &invitation,
            player,
            MembershipState::PendingInvitation,
            ResolveAction::Deny,
        )
        .is_ok());
    }

    #[test]
    fn resolving_wrong_state_is_invalid_transition() {
        let f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let invitation = membership_in(
            &f.clan,
            player,
            f.owner,
            "member",
            MembershipState::PendingInvitation,
        );

        let err = check_resolution(
            &f.game,
            &f.clan,
            &invitation,
            f.owner,
            MembershipState::PendingApplication,
            ResolveAction::Approve,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn approval_respects_hard_member_cap() {
        let mut f = fixture(&["member"]);
        f.game.max_members = 2;
        f.clan.membership_count = 2;
        let player = Uuid::new_v4();
        let application = membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::PendingApplication,
        );

        let err = check_resolution(
            &f.game,
            &f.clan,
            &application,
            f.owner,
            MembershipState::PendingApplication,
            ResolveAction::Approve,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::CapacityExceeded(_)));

        // Denial is always possible.
        assert!(check_resolution(
            &f.game,
            &f.clan,
            &application,
            f.owner,
            MembershipState::PendingApplication,
            ResolveAction::Deny,
        )
        .is_ok());
    }

    #[test]
    fn promote_then_demote_restores_level() {
        let mut f = fixture(&["member", "elder", "coleader"]);
        let player = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::Approved,
        ));
        let membership = f.memberships.last().unwrap();

        let promoted =
            check_level_change(&f.game, &f.clan, membership, f.owner, LevelChange::Promote)
                .unwrap();
        assert_eq!(promoted, "elder");

        let mut promoted_row = membership.clone();
        promoted_row.level = promoted;
        let demoted =
            check_level_change(&f.game, &f.clan, &promoted_row, f.owner, LevelChange::Demote)
                .unwrap();
        assert_eq!(demoted, "member");
    }

    #[test]
    fn level_change_bounds_are_invalid_transitions() {
        let f = fixture(&["member", "elder"]);
        let player = Uuid::new_v4();

        let bottom = membership_in(&f.clan, player, player, "member", MembershipState::Approved);
        let err = check_level_change(&f.game, &f.clan, &bottom, f.owner, LevelChange::Demote)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let top = membership_in(&f.clan, player, player, "elder", MembershipState::Approved);
        let err = check_level_change(&f.game, &f.clan, &top, f.owner, LevelChange::Promote)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn only_owner_changes_levels_and_never_their_own() {
        let mut f = fixture(&["member", "elder"]);
        let player = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::Approved,
        ));

        let err = check_level_change(
            &f.game,
            &f.clan,
            f.memberships.last().unwrap(),
            player,
            LevelChange::Promote,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let owner_row = &f.memberships[0];
        let err = check_level_change(&f.game, &f.clan, owner_row, f.owner, LevelChange::Demote)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn pending_membership_cannot_be_promoted() {
        let f = fixture(&["member", "elder"]);
        let player = Uuid::new_v4();
        let pending = membership_in(
            &f.clan,
            player,
            player,
            "member",
            MembershipState::PendingApplication,
        );

        let err = check_level_change(&f.game, &f.clan, &pending, f.owner, LevelChange::Promote)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn owner_membership_cannot_be_removed() {
        let f = fixture(&["member"]);
        let owner_row = &f.memberships[0];
        let err = check_removal(&f.clan, owner_row, f.owner).unwrap_err();
        assert!(matches!(err, AppError::OwnerCannotLeave));
    }

    #[test]
    fn removal_is_owner_or_self_only() {
        let f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let membership = membership_in(&f.clan, player, player, "member", MembershipState::Approved);

        assert!(check_removal(&f.clan, &membership, f.owner).is_ok());
        assert!(check_removal(&f.clan, &membership, player).is_ok());

        let err = check_removal(&f.clan, &membership, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn owner_removal_bans_and_blocks_reapply() {
        let mut f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let mut membership =
            membership_in(&f.clan, player, player, "member", MembershipState::Approved);

        assert_eq!(removal_state(&membership, f.owner), MembershipState::Banned);

        membership.state = MembershipState::Banned;
        f.memberships.push(membership);
        let err = check_apply(&f.game, &f.memberships, player, "member", Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = check_invite(
            &f.game,
            &f.clan,
            &f.memberships,
            f.owner,
            player,
            "member",
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn self_leave_deletes_and_allows_reapply() {
        let mut f = fixture(&["member"]);
        let player = Uuid::new_v4();
        let mut membership =
            membership_in(&f.clan, player, player, "member", MembershipState::Approved);

        assert_eq!(removal_state(&membership, player), MembershipState::Deleted);

        membership.state = MembershipState::Deleted;
        f.memberships.push(membership);
        assert!(check_apply(&f.game, &f.memberships, player, "member", Utc::now()).is_ok());
    }

    #[test]
    fn transfer_round_trip_restores_owner_and_levels() {
        let mut f = fixture(&["member", "elder", "coleader"]);
        let b = Uuid::new_v4();
        f.memberships.push(membership_in(
            &f.clan,
            b,
            b,
            "coleader",
            MembershipState::Approved,
        ));

        let original: Vec<(Uuid, String)> = f
            .memberships
            .iter()
            .map(|m| (m.id, m.level.clone()))
            .collect();

        fn apply_updates(memberships: &mut [Membership], updates: Vec<(Uuid, String)>) {
            for (id, level) in updates {
                if let Some(m) = memberships.iter_mut().find(|m| m.id == id) {
                    m.level = level;
                }
            }
        }

        // A -> B
        let target = active_membership(&f.memberships, b).unwrap().clone();
        let old_owner = active_membership(&f.memberships, f.clan.owner_id).cloned();
        let updates = plan_transfer(&f.game, old_owner.as_ref(), &target);
        apply_updates(&mut f.memberships, updates);
        f.clan.owner_id = b;

        // B -> A
        let target = active_membership(&f.memberships, f.owner).unwrap().clone();
        let old_owner = active_membership(&f.memberships, f.clan.owner_id).cloned();
        let updates = plan_transfer(&f.game, old_owner.as_ref(), &target);
        apply_updates(&mut f.memberships, updates);
        f.clan.owner_id = f.owner;

        let after: Vec<(Uuid, String)> = f
            .memberships
            .iter()
            .map(|m| (m.id, m.level.clone()))
            .collect();
        assert_eq!(after, original);
        assert_eq!(f.clan.owner_id, f.owner);
    }

    #[test]
    fn transfer_requires_an_approved_target() {
        let f = fixture(&["member"]);
        let player = Uuid::new_v4();

        let err = check_transfer(None).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let pending = membership_in(
            &f.clan,
            player,
            f.owner,
            "member",
            MembershipState::PendingInvitation,
        );
        let err = check_transfer(Some(&pending)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let approved = membership_in(&f.clan, player, player, "member", MembershipState::Approved);
        assert!(check_transfer(Some(&approved)).is_ok());
    }

    #[test]
    fn metadata_must_be_an_object() {
        assert!(validate_metadata(None).is_ok());
        assert!(validate_metadata(Some(json!({"a": 1}))).is_ok());
        assert!(matches!(
            validate_metadata(Some(json!("nope"))),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_metadata(Some(json!([1, 2]))),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn owner_membership_is_approved_at_top_level() {
        let g = game(&["member", "elder", "coleader"]);
        let owner = Uuid::new_v4();
        let clan = clan_for(&g, owner);
        let m = owner_membership(&g, &clan, owner, Utc::now());
        assert_eq!(m.state, MembershipState::Approved);
        assert_eq!(m.level, "coleader");
        assert!(m.approved_at.is_some());
        assert_eq!(m.approver_id, Some(owner));
    }

    #[test]
    fn unknown_level_fails_validation() {
        let f = fixture(&["member"]);
        let err = check_apply(&f.game, &f.memberships, Uuid::new_v4(), "warlord", Utc::now())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
