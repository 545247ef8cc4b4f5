use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a membership. Exactly one state per row; the
/// terminal states (`Denied`, `Banned`, `Deleted`) are not reachable
/// from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_state", rename_all = "snake_case")]
#[serde(rename_all = "camelCase")]
pub enum MembershipState {
    PendingApplication,
    PendingInvitation,
    Approved,
    Denied,
    Banned,
    Deleted,
}

impl MembershipState {
    /// Active rows block a new membership for the same (clan, player).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            MembershipState::PendingApplication
                | MembershipState::PendingInvitation
                | MembershipState::Approved
                | MembershipState::Banned
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub id: Uuid,
    pub game_id: String,
    pub clan_id: Uuid,
    pub player_id: Uuid,
    pub level: String,
    pub state: MembershipState,
    pub message: String,
    pub requestor_id: Uuid,
    pub approver_id: Option<Uuid>,
    pub denier_id: Option<Uuid>,
    pub deleted_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub denied_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
    pub level: String,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
    #[serde(rename = "requestorPublicID")]
    pub requestor_public_id: String,
    pub level: String,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
    #[serde(rename = "requestorPublicID")]
    pub requestor_public_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMembershipRequest {
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
    #[serde(rename = "requestorPublicID")]
    pub requestor_public_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PromoteDemoteRequest {
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
    #[serde(rename = "requestorPublicID")]
    pub requestor_public_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaveClanRequest {
    #[serde(rename = "playerPublicID")]
    pub player_public_id: String,
}

/// Direction of a level change within an approved membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelChange {
    Promote,
    Demote,
}

/// Resolution of a pending application or invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    Approve,
    Deny,
}

impl ResolveAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(ResolveAction::Approve),
            "deny" => Some(ResolveAction::Deny),
            _ => None,
        }
    }
}
