//! Reward fulfillment worker.
//!
//! Runs as a separate process from the bot, sharing only the task table.
//! Each iteration claims a batch of pending rewards, resolves each against
//! the external gift catalog and either delivers or compensates. Any number
//! of worker instances can run concurrently; the claim discipline keeps them
//! off each other's rows.

mod catalog;

pub use catalog::{Catalog, CatalogError, Delivery, Gift, HttpGiftService};

use serde::Deserialize;
use starfall_engine::queue::Queue;
use starfall_engine::store::Store;
use starfall_engine::Error;
use starfall_types::{
    RewardTask, CLAIM_TTL, RECLAIM_EVERY, WORKER_BATCH_PAUSE, WORKER_BATCH_SIZE,
    WORKER_ERROR_BACKOFF, WORKER_POLL_INTERVAL,
};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Worker process configuration, loaded from a YAML file.
#[derive(Deserialize)]
pub struct Config {
    pub database_url: String,
    pub gift_service_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

pub struct Worker<S: Store, C: Catalog, D: Delivery> {
    queue: Queue<S>,
    catalog: C,
    delivery: D,
}

impl<S: Store, C: Catalog, D: Delivery> Worker<S, C, D> {
    pub fn new(queue: Queue<S>, catalog: C, delivery: D) -> Self {
        Self {
            queue,
            catalog,
            delivery,
        }
    }

    /// Poll the queue forever. Storage-level errors back off and retry; they
    /// never kill the loop.
    pub async fn run(&self) {
        let mut iterations: u32 = 0;
        loop {
            iterations = iterations.wrapping_add(1);
            if iterations % RECLAIM_EVERY == 0 {
                if let Err(err) = self.queue.reclaim(CLAIM_TTL).await {
                    warn!(error = %err, "reclaim sweep failed");
                }
            }
            match self.iterate().await {
                Ok(0) => sleep(WORKER_POLL_INTERVAL).await,
                Ok(_) => sleep(WORKER_BATCH_PAUSE).await,
                Err(err) => {
                    error!(error = %err, "worker iteration failed");
                    sleep(WORKER_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Claim and process one batch. Returns how many tasks were claimed.
    pub async fn iterate(&self) -> Result<usize, Error> {
        let tasks = self.queue.claim(WORKER_BATCH_SIZE).await?;
        let claimed = tasks.len();
        for task in tasks {
            self.process(task).await?;
        }
        Ok(claimed)
    }

    /// Fulfill one claimed task. Catalog and delivery failures are resolved
    /// through the failed→refund path and never surface to a user; only
    /// storage errors propagate.
    async fn process(&self, task: RewardTask) -> Result<(), Error> {
        match self.fulfill(&task).await {
            Ok(gift) => {
                self.queue.complete(&task).await?;
                info!(
                    task = task.id,
                    beneficiary = task.beneficiary_id,
                    gift = gift.id,
                    "reward delivered"
                );
            }
            Err(reason) => {
                self.queue.fail(&task, &reason).await?;
            }
        }
        Ok(())
    }

    async fn fulfill(&self, task: &RewardTask) -> Result<Gift, String> {
        let gift = match self.catalog.find_by_price(task.amount).await {
            Ok(Some(gift)) => gift,
            Ok(None) => return Err(format!("no gift priced at {}", task.amount)),
            Err(err) => return Err(format!("catalog lookup failed: {err}")),
        };
        match self.delivery.deliver(task.beneficiary_id, &gift).await {
            Ok(()) => Ok(gift),
            Err(err) => Err(format!("delivery failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfall_engine::store::MemStore;
    use starfall_types::{AccountId, Tier};
    use std::sync::{Arc, Mutex};

    struct FixedCatalog {
        gifts: Vec<Gift>,
    }

    impl Catalog for FixedCatalog {
        async fn find_by_price(&self, price: u64) -> Result<Option<Gift>, CatalogError> {
            Ok(self.gifts.iter().find(|g| g.price == price).cloned())
        }
    }

    #[derive(Default)]
    struct RecordingDelivery {
        fail: bool,
        delivered: Mutex<Vec<(AccountId, String)>>,
    }

    impl Delivery for RecordingDelivery {
        async fn deliver(&self, beneficiary: AccountId, gift: &Gift) -> Result<(), CatalogError> {
            if self.fail {
                return Err(CatalogError::Rejected("out of stock".to_string()));
            }
            self.delivered
                .lock()
                .unwrap()
                .push((beneficiary, gift.id.clone()));
            Ok(())
        }
    }

    fn gift(id: &str, price: u64) -> Gift {
        Gift {
            id: id.to_string(),
            price,
        }
    }

    fn worker(
        store: Arc<MemStore>,
        gifts: Vec<Gift>,
        fail_delivery: bool,
    ) -> Worker<MemStore, FixedCatalog, RecordingDelivery> {
        Worker::new(
            Queue::new(store),
            FixedCatalog { gifts },
            RecordingDelivery {
                fail: fail_delivery,
                delivered: Mutex::default(),
            },
        )
    }

    async fn enqueue(store: &MemStore, beneficiary: AccountId, tier: Tier) -> i64 {
        store
            .enqueue_task(beneficiary, tier.reward_stars(), tier)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_delivery_marks_sent() {
        let store = Arc::new(MemStore::new());
        enqueue(&store, 7, Tier::Ordinary).await;
        let worker = worker(
            store.clone(),
            vec![gift("bear", Tier::Ordinary.reward_stars())],
            false,
        );

        assert_eq!(worker.iterate().await.unwrap(), 1);
        assert_eq!(
            *worker.delivery.delivered.lock().unwrap(),
            vec![(7, "bear".to_string())]
        );
        // Delivered: no refund, nothing left to claim.
        assert_eq!(store.pool_balance().await.unwrap(), 0);
        assert!(store.claim_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_catalog_match_fails_and_refunds() {
        let store = Arc::new(MemStore::new());
        enqueue(&store, 7, Tier::Ordinary).await;
        let worker = worker(store.clone(), vec![gift("rocket", 50)], false);

        assert_eq!(worker.iterate().await.unwrap(), 1);
        // The economic total is conserved: the pool absorbed the amount.
        assert_eq!(
            store.pool_balance().await.unwrap(),
            Tier::Ordinary.reward_stars()
        );
    }

    #[tokio::test]
    async fn test_delivery_failure_fails_and_refunds() {
        let store = Arc::new(MemStore::new());
        enqueue(&store, 7, Tier::Premium).await;
        let worker = worker(
            store.clone(),
            vec![gift("rocket", Tier::Premium.reward_stars())],
            true,
        );

        assert_eq!(worker.iterate().await.unwrap(), 1);
        assert_eq!(
            store.pool_balance().await.unwrap(),
            Tier::Premium.reward_stars()
        );
    }

    #[tokio::test]
    async fn test_batch_is_bounded() {
        let store = Arc::new(MemStore::new());
        for account in 0..7 {
            enqueue(&store, account, Tier::Ordinary).await;
        }
        let worker = worker(
            store.clone(),
            vec![gift("bear", Tier::Ordinary.reward_stars())],
            false,
        );

        assert_eq!(worker.iterate().await.unwrap(), WORKER_BATCH_SIZE);
        assert_eq!(worker.iterate().await.unwrap(), 2);
        assert_eq!(worker.iterate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_workers_split_the_queue() {
        let store = Arc::new(MemStore::new());
        for account in 0..4 {
            enqueue(&store, account, Tier::Ordinary).await;
        }
        let catalog = vec![gift("bear", Tier::Ordinary.reward_stars())];
        let a = worker(store.clone(), catalog.clone(), false);
        let b = worker(store.clone(), catalog, false);

        let (ra, rb) = tokio::join!(a.iterate(), b.iterate());
        let total = ra.unwrap() + rb.unwrap();
        assert_eq!(total, 4);

        let delivered =
            a.delivery.delivered.lock().unwrap().len() + b.delivery.delivered.lock().unwrap().len();
        assert_eq!(delivered, 4);
        assert!(store.claim_tasks(10).await.unwrap().is_empty());
    }
}
