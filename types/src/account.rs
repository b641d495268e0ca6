use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Per-user ledger row. Created lazily on first interaction, never deleted.
///
/// `virtual_balance` is invariantly non-negative; `spent` and `earned` are
/// lifetime counters independent of the balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub virtual_balance: u64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub spent: u64,
    pub earned: u64,
    pub plays: u64,
    pub banned: bool,
}

impl Account {
    pub fn new(id: AccountId) -> Self {
        Self {
            id,
            virtual_balance: 0,
            cooldown_until: None,
            spent: 0,
            earned: 0,
            plays: 0,
            banned: false,
        }
    }

    /// Whether the zero-cost throw is currently available.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        match self.cooldown_until {
            Some(until) if until > now => Some(until - now),
            _ => None,
        }
    }
}
