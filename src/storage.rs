//! Sled-backed persistence for users, players, and ownership records.
//!
//! One tree per record family, values serialized as JSON documents:
//! - `users`: user id -> `User`
//! - `emails`: email -> user id (uniqueness index for registration)
//! - `players`: player id -> `Player`
//! - `owned`: `"{user_id}/{player_id}"` -> `Vec<OwnershipRecord>`
//!
//! Registration, profile email moves, account deletion, and the purchase all
//! run as serializable multi-tree transactions, so the check-then-act
//! sequences they contain cannot interleave. Sled retries the transaction
//! closure on conflict; aborts carry a `StoreError` back to the caller.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewPlayer, OwnedCard, OwnershipRecord, Player, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("email already registered")]
    EmailTaken,
    /// Purchase precondition: buyer or player does not exist. One variant for
    /// both so the API cannot be used to probe which id was valid.
    #[error("user or player not found")]
    MissingParty,
    #[error("user not found")]
    UserNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("user balance not set")]
    BalanceNotSet,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("player already owned")]
    AlreadyOwned,
}

#[derive(Clone)]
pub struct Storage {
    #[allow(dead_code)] // kept for flush/size_on_disk style maintenance ops
    db: Db,
    users: sled::Tree,
    emails: sled::Tree,
    players: sled::Tree,
    owned: sled::Tree,
}

impl Storage {
    /// Open or create the database at the given path.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let users = db.open_tree("users")?;
        let emails = db.open_tree("emails")?;
        let players = db.open_tree("players")?;
        let owned = db.open_tree("owned")?;
        Ok(Self {
            db,
            users,
            emails,
            players,
            owned,
        })
    }

    // --- Users ---

    /// Create a user, claiming the email atomically. Two concurrent
    /// registrations for one address cannot both commit.
    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        balance: Option<Decimal>,
    ) -> Result<User, StoreError> {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            balance,
            created_at: now,
            updated_at: now,
        };

        let result = (&self.users, &self.emails).transaction(|(users, emails)| {
            if emails.get(user.email.as_bytes())?.is_some() {
                return Err(abort(StoreError::EmailTaken));
            }
            emails.insert(user.email.as_bytes(), user.id.as_bytes())?;
            users.insert(user.id.as_bytes(), to_json(&user)?)?;
            Ok(())
        });
        commit(result)?;
        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        read(&self.users, user_id.as_bytes())
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        match self.emails.get(email.as_bytes())? {
            Some(id) => read(&self.users, &id),
            None => Ok(None),
        }
    }

    /// Update display name and/or email. An email change re-points the
    /// uniqueness index inside the same transaction as the conflict check.
    pub fn update_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, StoreError> {
        let result = (&self.users, &self.emails).transaction(|(users, emails)| {
            let raw = users
                .get(user_id.as_bytes())?
                .ok_or_else(|| abort(StoreError::UserNotFound))?;
            let mut user: User = from_json(&raw)?;

            if let Some(new_email) = email {
                if new_email != user.email {
                    if emails.get(new_email.as_bytes())?.is_some() {
                        return Err(abort(StoreError::EmailTaken));
                    }
                    emails.remove(user.email.as_bytes())?;
                    emails.insert(new_email.as_bytes(), user_id.as_bytes())?;
                    user.email = new_email.to_string();
                }
            }
            if let Some(new_name) = name {
                user.name = new_name.to_string();
            }
            user.updated_at = Utc::now();
            users.insert(user_id.as_bytes(), to_json(&user)?)?;
            Ok(user)
        });
        commit(result)
    }

    pub fn update_password(&self, user_id: &str, password_hash: &str) -> Result<User, StoreError> {
        self.modify_user(user_id, |user| {
            user.password_hash = password_hash.to_string();
        })
    }

    /// Administrative balance adjustment.
    pub fn set_balance(&self, user_id: &str, balance: Decimal) -> Result<User, StoreError> {
        self.modify_user(user_id, |user| {
            user.balance = Some(balance);
        })
    }

    /// Delete the account and cascade its ownership records. Outstanding
    /// session tokens for the user become invalid because `authenticate`
    /// re-checks that the subject still exists.
    pub fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        let result = (&self.users, &self.emails).transaction(|(users, emails)| {
            let raw = users
                .remove(user_id.as_bytes())?
                .ok_or_else(|| abort(StoreError::UserNotFound))?;
            let user: User = from_json(&raw)?;
            emails.remove(user.email.as_bytes())?;
            Ok(())
        });
        commit(result)?;

        let prefix = format!("{user_id}/");
        let mut stale = Vec::new();
        for entry in self.owned.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            stale.push(key);
        }
        for key in stale {
            self.owned.remove(key)?;
        }
        Ok(())
    }

    fn modify_user<F: FnOnce(&mut User)>(
        &self,
        user_id: &str,
        apply: F,
    ) -> Result<User, StoreError> {
        let mut user = self.get_user(user_id)?.ok_or(StoreError::UserNotFound)?;
        apply(&mut user);
        user.updated_at = Utc::now();
        self.users
            .insert(user_id.as_bytes(), serde_json::to_vec(&user)?)?;
        Ok(user)
    }

    // --- Players ---

    pub fn create_player(&self, draft: NewPlayer) -> Result<Player, StoreError> {
        let now = Utc::now();
        let player = Player {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            team: draft.team,
            position: draft.position,
            price: draft.price,
            description: draft.description,
            image_url: draft.image_url,
            stats: draft.stats,
            created_at: now,
            updated_at: now,
        };
        self.players
            .insert(player.id.as_bytes(), serde_json::to_vec(&player)?)?;
        Ok(player)
    }

    pub fn get_player(&self, player_id: &str) -> Result<Option<Player>, StoreError> {
        read(&self.players, player_id.as_bytes())
    }

    pub fn list_players(&self) -> Result<Vec<Player>, StoreError> {
        let mut players = Vec::new();
        for entry in self.players.iter() {
            let (_, raw) = entry?;
            players.push(serde_json::from_slice::<Player>(&raw)?);
        }
        players.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(players)
    }

    pub fn delete_player(&self, player_id: &str) -> Result<(), StoreError> {
        self.players
            .remove(player_id.as_bytes())?
            .ok_or(StoreError::PlayerNotFound)?;
        Ok(())
    }

    // --- Purchases ---

    /// Buy a player card: check the balance, debit it by exactly the card
    /// price, and append one ownership record, all against one snapshot.
    ///
    /// Precondition failures, in order: missing user or player
    /// (`MissingParty`), unset balance (`BalanceNotSet`), balance below price
    /// (`InsufficientBalance`), and, when duplicates are disallowed, a prior
    /// record for the same card (`AlreadyOwned`). Any failure leaves both
    /// trees untouched.
    pub fn buy_player(
        &self,
        user_id: &str,
        player_id: &str,
        allow_duplicates: bool,
    ) -> Result<OwnershipRecord, StoreError> {
        // Players are immutable with respect to the purchase path, so the
        // price can be read outside the user-balance transaction.
        let player = self
            .get_player(player_id)?
            .ok_or(StoreError::MissingParty)?;
        let key = owned_key(user_id, player_id);

        let result = (&self.users, &self.owned).transaction(|(users, owned)| {
            let raw = users
                .get(user_id.as_bytes())?
                .ok_or_else(|| abort(StoreError::MissingParty))?;
            let mut user: User = from_json(&raw)?;
            let balance = user
                .balance
                .ok_or_else(|| abort(StoreError::BalanceNotSet))?;
            if balance < player.price {
                return Err(abort(StoreError::InsufficientBalance));
            }

            let mut records: Vec<OwnershipRecord> = match owned.get(key.as_bytes())? {
                Some(raw) => from_json(&raw)?,
                None => Vec::new(),
            };
            if !allow_duplicates && !records.is_empty() {
                return Err(abort(StoreError::AlreadyOwned));
            }

            user.balance = Some(balance - player.price);
            user.updated_at = Utc::now();
            users.insert(user_id.as_bytes(), to_json(&user)?)?;

            let record = OwnershipRecord {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                player_id: player_id.to_string(),
                acquired_at: Utc::now(),
            };
            records.push(record.clone());
            owned.insert(key.as_bytes(), to_json(&records)?)?;
            Ok(record)
        });
        commit(result)
    }

    /// All cards owned by a user, oldest acquisition first.
    pub fn collection_for(&self, user_id: &str) -> Result<Vec<OwnedCard>, StoreError> {
        let prefix = format!("{user_id}/");
        let mut cards = Vec::new();
        for entry in self.owned.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = entry?;
            let records: Vec<OwnershipRecord> = serde_json::from_slice(&raw)?;
            for record in records {
                let player = self.get_player(&record.player_id)?;
                cards.push(OwnedCard { record, player });
            }
        }
        cards.sort_by_key(|card| card.record.acquired_at);
        Ok(cards)
    }

    pub fn owned_count(&self, user_id: &str) -> Result<usize, StoreError> {
        let prefix = format!("{user_id}/");
        let mut count = 0;
        for entry in self.owned.scan_prefix(prefix.as_bytes()) {
            let (_, raw) = entry?;
            let records: Vec<OwnershipRecord> = serde_json::from_slice(&raw)?;
            count += records.len();
        }
        Ok(count)
    }

    /// Whether the user owns at least one copy of the player.
    pub fn owns(&self, user_id: &str, player_id: &str) -> Result<bool, StoreError> {
        let key = owned_key(user_id, player_id);
        match self.owned.get(key.as_bytes())? {
            Some(raw) => {
                let records: Vec<OwnershipRecord> = serde_json::from_slice(&raw)?;
                Ok(!records.is_empty())
            }
            None => Ok(false),
        }
    }
}

fn owned_key(user_id: &str, player_id: &str) -> String {
    format!("{user_id}/{player_id}")
}

fn read<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, StoreError> {
    match tree.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

fn abort(err: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err)
}

// Serde helpers usable inside transaction closures: failures abort instead of
// retrying.
fn to_json<T: Serialize>(
    value: &T,
) -> Result<Vec<u8>, ConflictableTransactionError<StoreError>> {
    serde_json::to_vec(value).map_err(|e| abort(StoreError::Corrupt(e)))
}

fn from_json<T: DeserializeOwned>(
    raw: &[u8],
) -> Result<T, ConflictableTransactionError<StoreError>> {
    serde_json::from_slice(raw).map_err(|e| abort(StoreError::Corrupt(e)))
}

fn commit<T>(result: Result<T, TransactionError<StoreError>>) -> Result<T, StoreError> {
    result.map_err(|err| match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Backend(e),
    })
}
