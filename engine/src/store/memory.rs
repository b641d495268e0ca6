use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use starfall_types::{Account, AccountId, ReferralLink, RewardTask, TaskStatus, Tier};
use uuid::Uuid;

use super::{Store, StoreError};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    referrals: HashMap<AccountId, ReferralLink>,
    tasks: BTreeMap<i64, RewardTask>,
    next_task_id: i64,
    pool: u64,
    consumed: HashSet<Uuid>,
}

/// Ephemeral process-local store.
///
/// Semantics mirror [`super::PgStore`] exactly; everything lives under one
/// lock, which also provides the row-level claim serialization the durable
/// backend gets from lock-and-skip.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        f(&mut inner)
    }
}

impl Store for MemStore {
    async fn ensure_account(&self, id: AccountId) -> Result<Account, StoreError> {
        Ok(self.locked(|inner| inner.accounts.entry(id).or_insert_with(|| Account::new(id)).clone()))
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.locked(|inner| inner.accounts.get(&id).cloned()))
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<u64, StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            let next = account.virtual_balance as i64 + delta;
            account.virtual_balance = next.max(0) as u64;
            Ok(account.virtual_balance)
        })
    }

    async fn debit_balance(&self, id: AccountId, amount: u64) -> Result<Option<u64>, StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            if account.virtual_balance < amount {
                return Ok(None);
            }
            account.virtual_balance -= amount;
            Ok(Some(account.virtual_balance))
        })
    }

    async fn set_balance(&self, id: AccountId, value: u64) -> Result<(), StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            account.virtual_balance = value;
            Ok(())
        })
    }

    async fn record_spent(&self, id: AccountId, amount: u64) -> Result<(), StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            account.spent = account.spent.saturating_add(amount);
            Ok(())
        })
    }

    async fn record_earned(&self, id: AccountId, amount: u64) -> Result<(), StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            account.earned = account.earned.saturating_add(amount);
            Ok(())
        })
    }

    async fn record_play(&self, id: AccountId) -> Result<(), StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            account.plays = account.plays.saturating_add(1);
            Ok(())
        })
    }

    async fn set_cooldown(&self, id: AccountId, until: DateTime<Utc>) -> Result<(), StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            account.cooldown_until = Some(until);
            Ok(())
        })
    }

    async fn set_banned(&self, id: AccountId, banned: bool) -> Result<(), StoreError> {
        self.locked(|inner| {
            let account = inner
                .accounts
                .get_mut(&id)
                .ok_or(StoreError::MissingAccount(id))?;
            account.banned = banned;
            Ok(())
        })
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        Ok(self.locked(|inner| inner.accounts.len() as u64))
    }

    async fn referral(&self, referred: AccountId) -> Result<Option<ReferralLink>, StoreError> {
        Ok(self.locked(|inner| inner.referrals.get(&referred).cloned()))
    }

    async fn create_referral(
        &self,
        referred: AccountId,
        inviter: AccountId,
    ) -> Result<bool, StoreError> {
        Ok(self.locked(|inner| {
            if inner.referrals.contains_key(&referred) {
                return false;
            }
            inner
                .referrals
                .insert(referred, ReferralLink::new(referred, inviter));
            true
        }))
    }

    async fn step_referral(
        &self,
        referred: AccountId,
        threshold: u32,
    ) -> Result<Option<u32>, StoreError> {
        Ok(self.locked(|inner| {
            let link = inner.referrals.get_mut(&referred)?;
            if link.rewarded {
                return None;
            }
            link.plays = (link.plays + 1).min(threshold);
            Some(link.plays)
        }))
    }

    async fn finish_referral(&self, referred: AccountId) -> Result<Option<AccountId>, StoreError> {
        Ok(self.locked(|inner| {
            let link = inner.referrals.get_mut(&referred)?;
            if link.rewarded {
                return None;
            }
            link.rewarded = true;
            Some(link.inviter_id)
        }))
    }

    async fn enqueue_task(
        &self,
        beneficiary: AccountId,
        amount: u64,
        tier: Tier,
    ) -> Result<RewardTask, StoreError> {
        Ok(self.locked(|inner| {
            inner.next_task_id += 1;
            let task = RewardTask {
                id: inner.next_task_id,
                beneficiary_id: beneficiary,
                amount,
                tier,
                status: TaskStatus::Pending,
                created_at: Utc::now(),
                claimed_at: None,
            };
            inner.tasks.insert(task.id, task.clone());
            task
        }))
    }

    async fn claim_tasks(&self, limit: usize) -> Result<Vec<RewardTask>, StoreError> {
        Ok(self.locked(|inner| {
            let now = Utc::now();
            let ids: Vec<i64> = inner
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Pending)
                .take(limit)
                .map(|t| t.id)
                .collect();
            ids.iter()
                .map(|id| {
                    let task = inner.tasks.get_mut(id).expect("claimed id present");
                    task.status = TaskStatus::Processing;
                    task.claimed_at = Some(now);
                    task.clone()
                })
                .collect()
        }))
    }

    async fn mark_task_sent(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.locked(|inner| match inner.tasks.get_mut(&id) {
            Some(task) if task.status == TaskStatus::Processing => {
                task.status = TaskStatus::Sent;
                true
            }
            _ => false,
        }))
    }

    async fn mark_task_failed(&self, id: i64, refund: u64) -> Result<bool, StoreError> {
        Ok(self.locked(|inner| {
            match inner.tasks.get_mut(&id) {
                Some(task) if task.status == TaskStatus::Processing => {
                    task.status = TaskStatus::Failed;
                }
                _ => return false,
            }
            inner.pool = inner.pool.saturating_add(refund);
            true
        }))
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.locked(|inner| {
            let mut reclaimed = 0;
            for task in inner.tasks.values_mut() {
                if task.status == TaskStatus::Processing
                    && task.claimed_at.is_some_and(|at| at < cutoff)
                {
                    task.status = TaskStatus::Pending;
                    task.claimed_at = None;
                    reclaimed += 1;
                }
            }
            reclaimed
        }))
    }

    async fn pool_credit(&self, delta: i64) -> Result<u64, StoreError> {
        Ok(self.locked(|inner| {
            let next = inner.pool as i64 + delta;
            inner.pool = next.max(0) as u64;
            inner.pool
        }))
    }

    async fn pool_balance(&self) -> Result<u64, StoreError> {
        Ok(self.locked(|inner| inner.pool))
    }

    async fn consume_nonce(&self, nonce: Uuid) -> Result<bool, StoreError> {
        Ok(self.locked(|inner| inner.consumed.insert(nonce)))
    }
}
