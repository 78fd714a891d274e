use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coins are whole units; there is no fractional coin.
pub type Coins = i64;

/// Store-assigned user identifier. Ordering by id is the canonical lock order.
pub type UserId = i64;

/// Balance granted to every freshly created account.
pub const STARTING_BALANCE: Coins = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Vec<u8>,
    #[serde(skip_serializing)]
    pub salt: Vec<u8>,
    pub balance: Coins,
    pub created_at: DateTime<Utc>,
}

/// A user row that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: Vec<u8>,
    pub salt: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: Vec<u8>, salt: Vec<u8>) -> Self {
        Self {
            username: username.into(),
            password,
            salt,
            created_at: Utc::now(),
        }
    }
}

impl User {
    pub fn can_afford(&self, amount: Coins) -> bool {
        self.balance >= amount
    }
}
