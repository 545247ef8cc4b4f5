use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub id: Uuid,
    pub game_id: String,
    pub public_id: String,
    pub name: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlayerRequest {
    #[serde(rename = "publicID")]
    pub public_id: String,
    pub name: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlayerRequest {
    pub name: String,
    pub metadata: Option<Value>,
}

/// Whether a player update should emit a `PlayerUpdated` notification.
///
/// Fires when the player did not exist before, when the name changed, or
/// when a whitelisted metadata field changed value or presence. An empty
/// whitelist suppresses all metadata-triggered notifications.
pub fn should_notify_player_update(
    whitelist: &[&str],
    previous: Option<&Player>,
    new_name: &str,
    new_metadata: &Value,
) -> bool {
    let previous = match previous {
        Some(p) => p,
        None => return true,
    };

    if previous.name != new_name {
        return true;
    }

    for field in whitelist {
        let old_val = previous.metadata.get(field);
        let new_val = new_metadata.get(field);
        if old_val.is_some() != new_val.is_some() {
            return true;
        }
        if old_val.is_some() && old_val != new_val {
            return true;
        }
    }

    false
}
