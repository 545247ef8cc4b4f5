use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed enumeration of notifiable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "hook_event_type", rename_all = "snake_case")]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    ClanCreated,
    ClanUpdated,
    PlayerUpdated,
    MembershipApplied,
    MembershipApproved,
    MembershipDenied,
    MembershipLeft,
    MembershipPromoted,
    MembershipDemoted,
    OwnershipTransferred,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hook {
    pub id: Uuid,
    pub public_id: String,
    pub game_id: String,
    pub event_type: EventType,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHookRequest {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(rename = "hookURL")]
    pub url: String,
}
