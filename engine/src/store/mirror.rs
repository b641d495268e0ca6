use chrono::{DateTime, Utc};
use starfall_types::{Account, AccountId, ReferralLink, RewardTask, Tier};
use tracing::warn;
use uuid::Uuid;

use super::{MemStore, Store, StoreError};

/// Degraded-mode wrapper: runs every operation against the durable primary
/// and falls back to an ephemeral in-memory mirror when the primary reports
/// `Unavailable`.
///
/// The fallback is explicitly best-effort: mirrored state starts empty, is
/// lost on restart, and is never reconciled back into the primary. Account
/// rows are recreated in the mirror on first fallback touch, so balances
/// observed while degraded start from zero.
pub struct Mirrored<P: Store> {
    primary: P,
    mirror: MemStore,
}

impl<P: Store> Mirrored<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            mirror: MemStore::new(),
        }
    }
}

/// Run `$op` on the primary; on `Unavailable`, log and rerun it on the mirror.
macro_rules! degrade {
    ($self:ident . $op:ident ( $($arg:expr),* )) => {
        match $self.primary.$op($($arg),*).await {
            Err(StoreError::Unavailable(err)) => {
                warn!(error = %err, op = stringify!($op), "primary store unavailable, using mirror");
                $self.mirror.$op($($arg),*).await
            }
            other => other,
        }
    };
}

/// Same, but make sure the mirror has the account row before the fallback
/// mutation so it does not fail with `MissingAccount`.
macro_rules! degrade_account {
    ($self:ident, $id:expr, $op:ident ( $($arg:expr),* )) => {
        match $self.primary.$op($($arg),*).await {
            Err(StoreError::Unavailable(err)) => {
                warn!(error = %err, op = stringify!($op), "primary store unavailable, using mirror");
                self_ensure(&$self.mirror, $id).await?;
                $self.mirror.$op($($arg),*).await
            }
            other => other,
        }
    };
}

async fn self_ensure(mirror: &MemStore, id: AccountId) -> Result<(), StoreError> {
    mirror.ensure_account(id).await.map(|_| ())
}

impl<P: Store> Store for Mirrored<P> {
    async fn ensure_account(&self, id: AccountId) -> Result<Account, StoreError> {
        degrade!(self.ensure_account(id))
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        degrade!(self.account(id))
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<u64, StoreError> {
        degrade_account!(self, id, adjust_balance(id, delta))
    }

    async fn debit_balance(&self, id: AccountId, amount: u64) -> Result<Option<u64>, StoreError> {
        degrade_account!(self, id, debit_balance(id, amount))
    }

    async fn set_balance(&self, id: AccountId, value: u64) -> Result<(), StoreError> {
        degrade_account!(self, id, set_balance(id, value))
    }

    async fn record_spent(&self, id: AccountId, amount: u64) -> Result<(), StoreError> {
        degrade_account!(self, id, record_spent(id, amount))
    }

    async fn record_earned(&self, id: AccountId, amount: u64) -> Result<(), StoreError> {
        degrade_account!(self, id, record_earned(id, amount))
    }

    async fn record_play(&self, id: AccountId) -> Result<(), StoreError> {
        degrade_account!(self, id, record_play(id))
    }

    async fn set_cooldown(&self, id: AccountId, until: DateTime<Utc>) -> Result<(), StoreError> {
        degrade_account!(self, id, set_cooldown(id, until))
    }

    async fn set_banned(&self, id: AccountId, banned: bool) -> Result<(), StoreError> {
        degrade_account!(self, id, set_banned(id, banned))
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        degrade!(self.count_accounts())
    }

    async fn referral(&self, referred: AccountId) -> Result<Option<ReferralLink>, StoreError> {
        degrade!(self.referral(referred))
    }

    async fn create_referral(
        &self,
        referred: AccountId,
        inviter: AccountId,
    ) -> Result<bool, StoreError> {
        degrade!(self.create_referral(referred, inviter))
    }

    async fn step_referral(
        &self,
        referred: AccountId,
        threshold: u32,
    ) -> Result<Option<u32>, StoreError> {
        degrade!(self.step_referral(referred, threshold))
    }

    async fn finish_referral(&self, referred: AccountId) -> Result<Option<AccountId>, StoreError> {
        degrade!(self.finish_referral(referred))
    }

    async fn enqueue_task(
        &self,
        beneficiary: AccountId,
        amount: u64,
        tier: Tier,
    ) -> Result<RewardTask, StoreError> {
        degrade!(self.enqueue_task(beneficiary, amount, tier))
    }

    async fn claim_tasks(&self, limit: usize) -> Result<Vec<RewardTask>, StoreError> {
        degrade!(self.claim_tasks(limit))
    }

    async fn mark_task_sent(&self, id: i64) -> Result<bool, StoreError> {
        degrade!(self.mark_task_sent(id))
    }

    async fn mark_task_failed(&self, id: i64, refund: u64) -> Result<bool, StoreError> {
        degrade!(self.mark_task_failed(id, refund))
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        degrade!(self.reclaim_stale(cutoff))
    }

    async fn pool_credit(&self, delta: i64) -> Result<u64, StoreError> {
        degrade!(self.pool_credit(delta))
    }

    async fn pool_balance(&self) -> Result<u64, StoreError> {
        degrade!(self.pool_balance())
    }

    async fn consume_nonce(&self, nonce: Uuid) -> Result<bool, StoreError> {
        degrade!(self.consume_nonce(nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfall_types::TaskStatus;

    /// Primary that is permanently unreachable.
    struct DownStore;

    macro_rules! down {
        () => {
            Err(StoreError::Unavailable(sqlx::Error::PoolClosed))
        };
    }

    impl Store for DownStore {
        async fn ensure_account(&self, _: AccountId) -> Result<Account, StoreError> {
            down!()
        }
        async fn account(&self, _: AccountId) -> Result<Option<Account>, StoreError> {
            down!()
        }
        async fn adjust_balance(&self, _: AccountId, _: i64) -> Result<u64, StoreError> {
            down!()
        }
        async fn debit_balance(&self, _: AccountId, _: u64) -> Result<Option<u64>, StoreError> {
            down!()
        }
        async fn set_balance(&self, _: AccountId, _: u64) -> Result<(), StoreError> {
            down!()
        }
        async fn record_spent(&self, _: AccountId, _: u64) -> Result<(), StoreError> {
            down!()
        }
        async fn record_earned(&self, _: AccountId, _: u64) -> Result<(), StoreError> {
            down!()
        }
        async fn record_play(&self, _: AccountId) -> Result<(), StoreError> {
            down!()
        }
        async fn set_cooldown(&self, _: AccountId, _: DateTime<Utc>) -> Result<(), StoreError> {
            down!()
        }
        async fn set_banned(&self, _: AccountId, _: bool) -> Result<(), StoreError> {
            down!()
        }
        async fn count_accounts(&self) -> Result<u64, StoreError> {
            down!()
        }
        async fn referral(&self, _: AccountId) -> Result<Option<ReferralLink>, StoreError> {
            down!()
        }
        async fn create_referral(&self, _: AccountId, _: AccountId) -> Result<bool, StoreError> {
            down!()
        }
        async fn step_referral(&self, _: AccountId, _: u32) -> Result<Option<u32>, StoreError> {
            down!()
        }
        async fn finish_referral(&self, _: AccountId) -> Result<Option<AccountId>, StoreError> {
            down!()
        }
        async fn enqueue_task(
            &self,
            _: AccountId,
            _: u64,
            _: Tier,
        ) -> Result<RewardTask, StoreError> {
            down!()
        }
        async fn claim_tasks(&self, _: usize) -> Result<Vec<RewardTask>, StoreError> {
            down!()
        }
        async fn mark_task_sent(&self, _: i64) -> Result<bool, StoreError> {
            down!()
        }
        async fn mark_task_failed(&self, _: i64, _: u64) -> Result<bool, StoreError> {
            down!()
        }
        async fn reclaim_stale(&self, _: DateTime<Utc>) -> Result<u64, StoreError> {
            down!()
        }
        async fn pool_credit(&self, _: i64) -> Result<u64, StoreError> {
            down!()
        }
        async fn pool_balance(&self) -> Result<u64, StoreError> {
            down!()
        }
        async fn consume_nonce(&self, _: Uuid) -> Result<bool, StoreError> {
            down!()
        }
    }

    #[tokio::test]
    async fn test_ledger_ops_fall_back_to_mirror() {
        let store = Mirrored::new(DownStore);
        store.ensure_account(1).await.unwrap();
        assert_eq!(store.adjust_balance(1, 10).await.unwrap(), 10);
        assert_eq!(store.debit_balance(1, 4).await.unwrap(), Some(6));
        assert_eq!(store.account(1).await.unwrap().unwrap().virtual_balance, 6);
    }

    #[tokio::test]
    async fn test_mutation_on_untouched_account_seeds_mirror_row() {
        let store = Mirrored::new(DownStore);
        // No prior ensure: the fallback must not fail with MissingAccount,
        // but the degraded balance starts from zero.
        assert_eq!(store.adjust_balance(9, -5).await.unwrap(), 0);
        assert_eq!(store.adjust_balance(9, 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_queue_round_trip_degraded() {
        let store = Mirrored::new(DownStore);
        store.enqueue_task(1, 15, Tier::Ordinary).await.unwrap();
        let claimed = store.claim_tasks(5).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, TaskStatus::Processing);
        assert!(store.mark_task_failed(claimed[0].id, 15).await.unwrap());
        assert_eq!(store.pool_balance().await.unwrap(), 15);
    }
}
