use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Clan {
    pub id: Uuid,
    pub game_id: String,
    pub public_id: String,
    pub name: String,
    pub metadata: Value,
    pub owner_id: Uuid,
    pub membership_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClanRequest {
    #[serde(rename = "publicID")]
    pub public_id: String,
    pub name: String,
    #[serde(rename = "ownerPublicID")]
    pub owner_public_id: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClanRequest {
    pub name: String,
    #[serde(rename = "requestorPublicID")]
    pub requestor_public_id: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct TransferOwnershipRequest {
    #[serde(rename = "ownerPublicID")]
    pub owner_public_id: String,
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
}
