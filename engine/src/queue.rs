use std::sync::Arc;

use chrono::{Duration, Utc};
use starfall_types::{AccountId, RewardTask, Tier};
use tracing::{info, warn};

use crate::store::Store;
use crate::Error;

/// Operations on the durable reward-task table.
///
/// This queue is the only cross-process coordination point in the system:
/// the bot appends on a win, any number of worker processes drain it. Claims
/// hand each row to exactly one worker attempt at a time; completion is
/// at-least-once with compensation on failure.
pub struct Queue<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for Queue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Store> Queue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a pending reward for `beneficiary`.
    pub async fn enqueue(
        &self,
        beneficiary: AccountId,
        amount: u64,
        tier: Tier,
    ) -> Result<RewardTask, Error> {
        let task = self.store.enqueue_task(beneficiary, amount, tier).await?;
        info!(task = task.id, beneficiary, amount, "reward task enqueued");
        Ok(task)
    }

    /// Claim up to `limit` pending tasks for this worker.
    pub async fn claim(&self, limit: usize) -> Result<Vec<RewardTask>, Error> {
        Ok(self.store.claim_tasks(limit).await?)
    }

    /// Finalize a delivered task.
    pub async fn complete(&self, task: &RewardTask) -> Result<(), Error> {
        if !self.store.mark_task_sent(task.id).await? {
            warn!(task = task.id, "complete refused: task not in processing");
        }
        Ok(())
    }

    /// Fail a task and issue the compensating pool credit. The credit is
    /// bound to the status transition, so it happens exactly once per task.
    pub async fn fail(&self, task: &RewardTask, reason: &str) -> Result<(), Error> {
        if self.store.mark_task_failed(task.id, task.amount).await? {
            warn!(
                task = task.id,
                amount = task.amount,
                reason,
                "reward task failed, amount refunded to pool"
            );
        } else {
            warn!(task = task.id, reason, "fail refused: task not in processing");
        }
        Ok(())
    }

    /// Return tasks stuck in `processing` longer than `ttl` to `pending`.
    pub async fn reclaim(&self, ttl: std::time::Duration) -> Result<u64, Error> {
        let cutoff = Utc::now() - Duration::seconds(ttl.as_secs() as i64);
        let reclaimed = self.store.reclaim_stale(cutoff).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "stale processing tasks returned to pending");
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemStore, Store};
    use starfall_types::TaskStatus;

    fn queue() -> (Queue<MemStore>, Arc<MemStore>) {
        let store = Arc::new(MemStore::new());
        (Queue::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_claim_marks_processing_and_is_exclusive() {
        let (queue, _) = queue();
        queue.enqueue(1, 15, Tier::Ordinary).await.unwrap();
        queue.enqueue(2, 50, Tier::Premium).await.unwrap();

        let first = queue.claim(10).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|t| t.status == TaskStatus::Processing));

        // Claimed rows are invisible to a second claimer.
        assert!(queue.claim(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_is_oldest_first_and_bounded() {
        let (queue, _) = queue();
        for account in 1..=4 {
            queue.enqueue(account, 15, Tier::Ordinary).await.unwrap();
        }
        let claimed = queue.claim(2).await.unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].beneficiary_id, 1);
        assert_eq!(claimed[1].beneficiary_id, 2);
    }

    #[tokio::test]
    async fn test_fail_refunds_pool_exactly_once() {
        let (queue, store) = queue();
        queue.enqueue(1, 15, Tier::Ordinary).await.unwrap();
        let task = queue.claim(1).await.unwrap().remove(0);

        queue.fail(&task, "no catalog match").await.unwrap();
        assert_eq!(store.pool_balance().await.unwrap(), 15);

        // A second fail on a terminal row must not refund again.
        queue.fail(&task, "again").await.unwrap();
        assert_eq!(store.pool_balance().await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_terminal_states_never_reverse() {
        let (queue, store) = queue();
        queue.enqueue(1, 15, Tier::Ordinary).await.unwrap();
        let task = queue.claim(1).await.unwrap().remove(0);
        queue.complete(&task).await.unwrap();

        // Neither fail nor a reclaim sweep may touch a sent task.
        queue.fail(&task, "late failure").await.unwrap();
        assert_eq!(store.pool_balance().await.unwrap(), 0);
        queue.reclaim(std::time::Duration::ZERO).await.unwrap();

        let again = queue.claim(10).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_returns_stale_claims() {
        let (queue, _) = queue();
        queue.enqueue(1, 15, Tier::Ordinary).await.unwrap();
        let task = queue.claim(1).await.unwrap().remove(0);

        // A fresh claim is not stale yet.
        assert_eq!(queue.reclaim(std::time::Duration::from_secs(600)).await.unwrap(), 0);

        // With a zero TTL the claim is immediately reclaimable.
        assert_eq!(queue.reclaim(std::time::Duration::ZERO).await.unwrap(), 1);
        let reclaimed = queue.claim(1).await.unwrap().remove(0);
        assert_eq!(reclaimed.id, task.id);
        assert_eq!(reclaimed.status, TaskStatus::Processing);
    }
}
