//! Typed payloads for outbound webhook notifications.
//!
//! Each event type carries only its own fields; the open map the wire
//! format used to be is reconstructed at the dispatch boundary by
//! `HookEvent::to_body`, which adds the `success` marker the receivers
//! expect.

use serde::Serialize;
use serde_json::Value;

use crate::models::EventType;

#[derive(Debug, Clone, Serialize)]
pub struct ClanEventPayload {
    #[serde(rename = "gameID")]
    pub game_id: String,
    #[serde(rename = "publicID")]
    pub public_id: String,
    pub name: String,
    pub metadata: Value,
    #[serde(rename = "membershipCount")]
    pub membership_count: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerEventPayload {
    #[serde(rename = "gameID")]
    pub game_id: String,
    #[serde(rename = "publicID")]
    pub public_id: String,
    pub name: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipEventPayload {
    #[serde(rename = "gameID")]
    pub game_id: String,
    #[serde(rename = "clanPublicID")]
    pub clan_public_id: String,
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
    #[serde(rename = "requestorPublicID")]
    pub requestor_public_id: String,
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnershipEventPayload {
    #[serde(rename = "gameID")]
    pub game_id: String,
    #[serde(rename = "clanPublicID")]
    pub clan_public_id: String,
    #[serde(rename = "previousOwnerPublicID")]
    pub previous_owner_public_id: String,
    #[serde(rename = "newOwnerPublicID")]
    pub new_owner_public_id: String,
}

#[derive(Debug, Clone)]
pub enum HookEvent {
    ClanCreated(ClanEventPayload),
    ClanUpdated(ClanEventPayload),
    PlayerUpdated(PlayerEventPayload),
    MembershipApplied(MembershipEventPayload),
    MembershipApproved(MembershipEventPayload),
    MembershipDenied(MembershipEventPayload),
    MembershipLeft(MembershipEventPayload),
    MembershipPromoted(MembershipEventPayload),
    MembershipDemoted(MembershipEventPayload),
    OwnershipTransferred(OwnershipEventPayload),
}

impl HookEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            HookEvent::ClanCreated(_) => EventType::ClanCreated,
            HookEvent::ClanUpdated(_) => EventType::ClanUpdated,
            HookEvent::PlayerUpdated(_) => EventType::PlayerUpdated,
            HookEvent::MembershipApplied(_) => EventType::MembershipApplied,
            HookEvent::MembershipApproved(_) => EventType::MembershipApproved,
            HookEvent::MembershipDenied(_) => EventType::MembershipDenied,
            HookEvent::MembershipLeft(_) => EventType::MembershipLeft,
            HookEvent::MembershipPromoted(_) => EventType::MembershipPromoted,
            HookEvent::MembershipDemoted(_) => EventType::MembershipDemoted,
            HookEvent::OwnershipTransferred(_) => EventType::OwnershipTransferred,
        }
    }

    pub fn game_id(&self) -> &str {
        match self {
            HookEvent::ClanCreated(p) | HookEvent::ClanUpdated(p) => &p.game_id,
            HookEvent::PlayerUpdated(p) => &p.game_id,
            HookEvent::MembershipApplied(p)
            | HookEvent::MembershipApproved(p)
            | HookEvent::MembershipDenied(p)
            | HookEvent::MembershipLeft(p)
            | HookEvent::MembershipPromoted(p)
            | HookEvent::MembershipDemoted(p) => &p.game_id,
            HookEvent::OwnershipTransferred(p) => &p.game_id,
        }
    }

    /// Wire body delivered to every registered URL.
    pub fn to_body(&self) -> Value {
        let mut body = match self {
            HookEvent::ClanCreated(p) | HookEvent::ClanUpdated(p) => serde_json::to_value(p),
            HookEvent::PlayerUpdated(p) => serde_json::to_value(p),
            HookEvent::MembershipApplied(p)
            | HookEvent::MembershipApproved(p)
            | HookEvent::MembershipDenied(p)
            | HookEvent::MembershipLeft(p)
            | HookEvent::MembershipPromoted(p)
            | HookEvent::MembershipDemoted(p) => serde_json::to_value(p),
            HookEvent::OwnershipTransferred(p) => serde_json::to_value(p),
        }
        .unwrap_or_else(|_| Value::Object(Default::default()));

        if let Value::Object(map) = &mut body {
            map.insert("success".to_string(), Value::Bool(true));
        }
        body
    }
}
