use std::sync::Arc;

use chrono::{DateTime, Utc};
use starfall_types::{Account, AccountId};
use tracing::debug;

use crate::store::Store;
use crate::Error;

/// Per-account balance store plus lifetime counters and the free-throw
/// cooldown.
///
/// Credits use the clamped adjustment; debits fail closed (an over-debit is
/// an [`Error::InsufficientBalance`], not a silent truncation to zero).
pub struct Ledger<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Idempotent account creation with default balance 0.
    pub async fn ensure_account(&self, id: AccountId) -> Result<Account, Error> {
        Ok(self.store.ensure_account(id).await?)
    }

    pub async fn account(&self, id: AccountId) -> Result<Option<Account>, Error> {
        Ok(self.store.account(id).await?)
    }

    /// Atomic adjustment, clamped at zero from below. Returns the new balance.
    pub async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<u64, Error> {
        let balance = self.store.adjust_balance(id, delta).await?;
        debug!(account = id, delta, balance, "balance adjusted");
        Ok(balance)
    }

    /// Fail-closed debit. Returns the new balance.
    pub async fn try_debit(&self, id: AccountId, amount: u64) -> Result<u64, Error> {
        match self.store.debit_balance(id, amount).await? {
            Some(balance) => {
                debug!(account = id, amount, balance, "balance debited");
                Ok(balance)
            }
            None => {
                let have = self
                    .store
                    .account(id)
                    .await?
                    .map(|a| a.virtual_balance)
                    .unwrap_or(0);
                Err(Error::InsufficientBalance { have, need: amount })
            }
        }
    }

    pub async fn set_balance(&self, id: AccountId, value: u64) -> Result<(), Error> {
        Ok(self.store.set_balance(id, value).await?)
    }

    pub async fn record_spent(&self, id: AccountId, amount: u64) -> Result<(), Error> {
        Ok(self.store.record_spent(id, amount).await?)
    }

    pub async fn record_earned(&self, id: AccountId, amount: u64) -> Result<(), Error> {
        Ok(self.store.record_earned(id, amount).await?)
    }

    pub async fn record_play(&self, id: AccountId) -> Result<(), Error> {
        Ok(self.store.record_play(id).await?)
    }

    pub async fn cooldown(&self, id: AccountId) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.store.account(id).await?.and_then(|a| a.cooldown_until))
    }

    pub async fn set_cooldown(&self, id: AccountId, until: DateTime<Utc>) -> Result<(), Error> {
        Ok(self.store.set_cooldown(id, until).await?)
    }

    pub async fn set_banned(&self, id: AccountId, banned: bool) -> Result<(), Error> {
        Ok(self.store.set_banned(id, banned).await?)
    }

    pub async fn count_accounts(&self) -> Result<u64, Error> {
        Ok(self.store.count_accounts().await?)
    }

    pub async fn pool_credit(&self, delta: i64) -> Result<u64, Error> {
        Ok(self.store.pool_credit(delta).await?)
    }

    pub async fn pool_balance(&self) -> Result<u64, Error> {
        Ok(self.store.pool_balance().await?)
    }
}
