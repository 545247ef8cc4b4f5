use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Per-game policy. Read-only input to the membership manager; created
/// and mutated by the game CRUD surface.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Game {
    pub id: String,
    pub name: String,
    pub membership_levels: Json<Vec<String>>,
    pub max_members: i32,
    pub max_pending_invites: i32,
    pub cooldown_before_invite: i32,
    pub cooldown_before_apply: i32,
    pub player_update_metadata_whitelist: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.membership_levels.iter().position(|l| l == level)
    }

    /// Highest level in the ordered list. Owner memberships sit here.
    pub fn top_level(&self) -> &str {
        self.membership_levels
            .last()
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn cooldown_before_apply(&self) -> Option<Duration> {
        cooldown(self.cooldown_before_apply)
    }

    pub fn cooldown_before_invite(&self) -> Option<Duration> {
        cooldown(self.cooldown_before_invite)
    }

    pub fn whitelist_fields(&self) -> Vec<&str> {
        if self.player_update_metadata_whitelist.is_empty() {
            return Vec::new();
        }
        self.player_update_metadata_whitelist
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    }
}

fn cooldown(seconds: i32) -> Option<Duration> {
    if seconds < 0 {
        None
    } else {
        Some(Duration::seconds(seconds as i64))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    #[serde(rename = "publicID")]
    pub public_id: String,
    pub name: String,
    #[serde(rename = "membershipLevels")]
    pub membership_levels: Vec<String>,
    #[serde(rename = "maxMembers")]
    pub max_members: Option<i32>,
    #[serde(rename = "maxPendingInvites")]
    pub max_pending_invites: Option<i32>,
    #[serde(rename = "cooldownBeforeInvite")]
    pub cooldown_before_invite: Option<i32>,
    #[serde(rename = "cooldownBeforeApply")]
    pub cooldown_before_apply: Option<i32>,
    #[serde(rename = "playerUpdateMetadataWhitelist")]
    pub player_update_metadata_whitelist: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGameRequest {
    pub name: String,
    #[serde(rename = "membershipLevels")]
    pub membership_levels: Vec<String>,
    #[serde(rename = "maxMembers")]
    pub max_members: Option<i32>,
    #[serde(rename = "maxPendingInvites")]
    pub max_pending_invites: Option<i32>,
    #[serde(rename = "cooldownBeforeInvite")]
    pub cooldown_before_invite: Option<i32>,
    #[serde(rename = "cooldownBeforeApply")]
    pub cooldown_before_apply: Option<i32>,
    #[serde(rename = "playerUpdateMetadataWhitelist")]
    pub player_update_metadata_whitelist: Option<String>,
}
