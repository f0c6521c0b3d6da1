use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner scope for accounts, categories and rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bank account as seen by the engine. Only the balance and the sync
/// fields are ever written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankAccount {
    pub id: AccountId,
    pub user_id: UserId,
    pub name: String,
    pub current_balance: Money,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    /// Aggregator connection ("item") this account was linked through.
    pub provider_item_id: Option<String>,
    /// The aggregator's own id for this account.
    pub provider_account_id: Option<String>,
}

/// Side effect of a sync on the account row.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
    Succeeded { balance: Money, at: DateTime<Utc> },
    Failed { message: String },
}
