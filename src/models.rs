use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Registered account. The bcrypt hash never leaves the storage layer;
/// handlers expose `PublicUser` instead.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    /// `None` means the account has no balance configured at all, which is
    /// distinct from a zero balance and blocks purchases.
    pub balance: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-safe projection of `User` (no password hash).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub balance: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            balance: user.balance,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Field position of a player card.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    #[serde(rename = "GK")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

/// Player card. Immutable with respect to the purchase path; created and
/// edited only by the seed script and storage-level admin operations.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub team: String,
    pub position: Position,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Free-form stats blob (goals, assists, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a player card (ids and timestamps are assigned by the
/// storage layer).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewPlayer {
    pub name: String,
    pub team: String,
    pub position: Position,
    pub price: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub stats: Option<serde_json::Value>,
}

/// One acquisition of a player card by a user.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    pub id: String,
    pub user_id: String,
    pub player_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// An ownership record joined with its player card, as returned by the
/// collection listing. The player is `None` when the card was deleted after
/// purchase.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OwnedCard {
    #[serde(flatten)]
    pub record: OwnershipRecord,
    pub player: Option<Player>,
}

/// JWT claims carried by the session token.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verified caller attributes attached to authenticated requests.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: String,
}
