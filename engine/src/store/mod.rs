//! Storage interface and its implementations.
//!
//! [`PgStore`] is the durable backend shared between the bot and the worker
//! processes; [`MemStore`] is the ephemeral process-local one used for tests
//! and as the degraded-mode fallback behind [`Mirrored`].

mod memory;
mod mirror;
mod postgres;

pub use memory::MemStore;
pub use mirror::Mirrored;
pub use postgres::PgStore;

use std::future::Future;

use chrono::{DateTime, Utc};
use starfall_types::{Account, AccountId, ReferralLink, RewardTask, Tier};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or a statement failed.
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),

    /// A mutation targeted an account that was never created.
    #[error("account {0} does not exist")]
    MissingAccount(AccountId),

    /// A row held a value the model cannot represent.
    #[error("corrupt row: {0}")]
    Corrupt(&'static str),
}

/// Backend-agnostic storage operations the engine is written against.
///
/// Mutations are atomic at the single-operation level; no broader transaction
/// spans a session. Implementations must uphold the balance and queue
/// monotonicity invariants documented per method.
pub trait Store: Send + Sync {
    /// Idempotent account creation with zeroed defaults.
    fn ensure_account(
        &self,
        id: AccountId,
    ) -> impl Future<Output = Result<Account, StoreError>> + Send;

    fn account(
        &self,
        id: AccountId,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    /// Atomic balance adjustment, clamped at zero from below. Returns the new
    /// balance.
    fn adjust_balance(
        &self,
        id: AccountId,
        delta: i64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Fail-closed debit: subtracts `amount` only when the balance covers it.
    /// Returns the new balance, or `None` when the balance was insufficient.
    fn debit_balance(
        &self,
        id: AccountId,
        amount: u64,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    fn set_balance(
        &self,
        id: AccountId,
        value: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Monotonic lifetime-spent counter, independent of the balance.
    fn record_spent(
        &self,
        id: AccountId,
        amount: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Monotonic lifetime-earned counter, independent of the balance.
    fn record_earned(
        &self,
        id: AccountId,
        amount: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Bump the account play counter.
    fn record_play(&self, id: AccountId) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set_cooldown(
        &self,
        id: AccountId,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set_banned(
        &self,
        id: AccountId,
        banned: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn count_accounts(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn referral(
        &self,
        referred: AccountId,
    ) -> impl Future<Output = Result<Option<ReferralLink>, StoreError>> + Send;

    /// Create a referral link at zero plays. Returns `false` when a link for
    /// `referred` already exists (first link wins, later visits are no-ops).
    fn create_referral(
        &self,
        referred: AccountId,
        inviter: AccountId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Advance the play counter of an unrewarded link, clamped at the
    /// threshold. Returns the new counter, or `None` when no link exists or
    /// the link is already rewarded (terminal).
    fn step_referral(
        &self,
        referred: AccountId,
        threshold: u32,
    ) -> impl Future<Output = Result<Option<u32>, StoreError>> + Send;

    /// Take the rewarded transition edge. Returns the inviter exactly once;
    /// `None` on every later call and when no link exists.
    fn finish_referral(
        &self,
        referred: AccountId,
    ) -> impl Future<Output = Result<Option<AccountId>, StoreError>> + Send;

    /// Append a pending reward task.
    fn enqueue_task(
        &self,
        beneficiary: AccountId,
        amount: u64,
        tier: Tier,
    ) -> impl Future<Output = Result<RewardTask, StoreError>> + Send;

    /// Claim up to `limit` pending tasks, oldest first, marking them
    /// `processing`. Claims are serialized at the row level: no two callers
    /// ever receive the same row (lock-and-skip on the durable backend).
    fn claim_tasks(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<RewardTask>, StoreError>> + Send;

    /// `processing → sent`. Returns `false` when the row was not in
    /// `processing` (the transition is refused, never reversed).
    fn mark_task_sent(&self, id: i64) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// `processing → failed` plus the compensating pool credit of `refund`,
    /// applied together. Returns `false` when the row was not in
    /// `processing`; no credit is issued in that case.
    fn mark_task_failed(
        &self,
        id: i64,
        refund: u64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Return `processing` rows claimed before `cutoff` to `pending`.
    /// Returns how many rows were reclaimed.
    fn reclaim_stale(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Adjust the shared real-currency pool, clamped at zero from below.
    /// Returns the new pool value.
    fn pool_credit(&self, delta: i64) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn pool_balance(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Record a payment nonce as consumed. Returns `false` when the nonce was
    /// already present (a replayed confirmation).
    fn consume_nonce(&self, nonce: Uuid) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
