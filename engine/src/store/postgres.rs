use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use starfall_types::{Account, AccountId, ReferralLink, RewardTask, TaskStatus, Tier, POOL_KEY};
use uuid::Uuid;

use super::{Store, StoreError};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Durable store shared between the bot and worker processes.
///
/// Queue claims rely on `FOR UPDATE SKIP LOCKED`, so any number of worker
/// instances can drain the same table without double-claiming a row.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(StoreError::Unavailable)?;
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.into()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn unsigned(value: i64, what: &'static str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(what))
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    Ok(Account {
        id: row.try_get("id").map_err(StoreError::Unavailable)?,
        virtual_balance: unsigned(
            row.try_get("virtual_balance")
                .map_err(StoreError::Unavailable)?,
            "negative balance",
        )?,
        cooldown_until: row
            .try_get("cooldown_until")
            .map_err(StoreError::Unavailable)?,
        spent: unsigned(
            row.try_get("spent").map_err(StoreError::Unavailable)?,
            "negative spent",
        )?,
        earned: unsigned(
            row.try_get("earned").map_err(StoreError::Unavailable)?,
            "negative earned",
        )?,
        plays: unsigned(
            row.try_get("plays").map_err(StoreError::Unavailable)?,
            "negative plays",
        )?,
        banned: row.try_get("banned").map_err(StoreError::Unavailable)?,
    })
}

fn task_from_row(row: &PgRow) -> Result<RewardTask, StoreError> {
    let tier: String = row.try_get("tier").map_err(StoreError::Unavailable)?;
    let status: String = row.try_get("status").map_err(StoreError::Unavailable)?;
    Ok(RewardTask {
        id: row.try_get("id").map_err(StoreError::Unavailable)?,
        beneficiary_id: row
            .try_get("beneficiary_id")
            .map_err(StoreError::Unavailable)?,
        amount: unsigned(
            row.try_get("amount").map_err(StoreError::Unavailable)?,
            "negative amount",
        )?,
        tier: Tier::from_str(&tier).ok_or(StoreError::Corrupt("unknown tier"))?,
        status: TaskStatus::from_str(&status).ok_or(StoreError::Corrupt("unknown status"))?,
        created_at: row.try_get("created_at").map_err(StoreError::Unavailable)?,
        claimed_at: row.try_get("claimed_at").map_err(StoreError::Unavailable)?,
    })
}

const TASK_COLUMNS: &str = "id, beneficiary_id, amount, tier, status, created_at, claimed_at";

impl Store for PgStore {
    async fn ensure_account(&self, id: AccountId) -> Result<Account, StoreError> {
        sqlx::query("INSERT INTO accounts (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        let row = sqlx::query("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        account_from_row(&row)
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn adjust_balance(&self, id: AccountId, delta: i64) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "UPDATE accounts SET virtual_balance = GREATEST(virtual_balance + $2, 0)
             WHERE id = $1 RETURNING virtual_balance",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        let row = row.ok_or(StoreError::MissingAccount(id))?;
        unsigned(
            row.try_get("virtual_balance")
                .map_err(StoreError::Unavailable)?,
            "negative balance",
        )
    }

    async fn debit_balance(&self, id: AccountId, amount: u64) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query(
            "UPDATE accounts SET virtual_balance = virtual_balance - $2
             WHERE id = $1 AND virtual_balance >= $2 RETURNING virtual_balance",
        )
        .bind(id)
        .bind(amount as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        match row {
            Some(row) => Ok(Some(unsigned(
                row.try_get("virtual_balance")
                    .map_err(StoreError::Unavailable)?,
                "negative balance",
            )?)),
            // Distinguish "insufficient" from "no such account".
            None => match self.account(id).await? {
                Some(_) => Ok(None),
                None => Err(StoreError::MissingAccount(id)),
            },
        }
    }

    async fn set_balance(&self, id: AccountId, value: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET virtual_balance = $2 WHERE id = $1")
            .bind(id)
            .bind(value as i64)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingAccount(id));
        }
        Ok(())
    }

    async fn record_spent(&self, id: AccountId, amount: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET spent = spent + $2 WHERE id = $1")
            .bind(id)
            .bind(amount as i64)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingAccount(id));
        }
        Ok(())
    }

    async fn record_earned(&self, id: AccountId, amount: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET earned = earned + $2 WHERE id = $1")
            .bind(id)
            .bind(amount as i64)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingAccount(id));
        }
        Ok(())
    }

    async fn record_play(&self, id: AccountId) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET plays = plays + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingAccount(id));
        }
        Ok(())
    }

    async fn set_cooldown(&self, id: AccountId, until: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET cooldown_until = $2 WHERE id = $1")
            .bind(id)
            .bind(until)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingAccount(id));
        }
        Ok(())
    }

    async fn set_banned(&self, id: AccountId, banned: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET banned = $2 WHERE id = $1")
            .bind(id)
            .bind(banned)
            .execute(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingAccount(id));
        }
        Ok(())
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        unsigned(count, "negative count")
    }

    async fn referral(&self, referred: AccountId) -> Result<Option<ReferralLink>, StoreError> {
        let row = sqlx::query(
            "SELECT referred_id, inviter_id, plays, rewarded FROM referrals
             WHERE referred_id = $1",
        )
        .bind(referred)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        row.map(|row| {
            let plays: i32 = row.try_get("plays").map_err(StoreError::Unavailable)?;
            Ok(ReferralLink {
                referred_id: row.try_get("referred_id").map_err(StoreError::Unavailable)?,
                inviter_id: row.try_get("inviter_id").map_err(StoreError::Unavailable)?,
                plays: u32::try_from(plays).map_err(|_| StoreError::Corrupt("negative plays"))?,
                rewarded: row.try_get("rewarded").map_err(StoreError::Unavailable)?,
            })
        })
        .transpose()
    }

    async fn create_referral(
        &self,
        referred: AccountId,
        inviter: AccountId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO referrals (referred_id, inviter_id) VALUES ($1, $2)
             ON CONFLICT (referred_id) DO NOTHING",
        )
        .bind(referred)
        .bind(inviter)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        Ok(result.rows_affected() == 1)
    }

    async fn step_referral(
        &self,
        referred: AccountId,
        threshold: u32,
    ) -> Result<Option<u32>, StoreError> {
        let plays: Option<i32> = sqlx::query_scalar(
            "UPDATE referrals SET plays = LEAST(plays + 1, $2)
             WHERE referred_id = $1 AND rewarded = FALSE RETURNING plays",
        )
        .bind(referred)
        .bind(threshold as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        plays
            .map(|p| u32::try_from(p).map_err(|_| StoreError::Corrupt("negative plays")))
            .transpose()
    }

    async fn finish_referral(&self, referred: AccountId) -> Result<Option<AccountId>, StoreError> {
        // The `rewarded = FALSE` guard makes the transition edge single-shot
        // even under concurrent callers.
        sqlx::query_scalar(
            "UPDATE referrals SET rewarded = TRUE
             WHERE referred_id = $1 AND rewarded = FALSE RETURNING inviter_id",
        )
        .bind(referred)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Unavailable)
    }

    async fn enqueue_task(
        &self,
        beneficiary: AccountId,
        amount: u64,
        tier: Tier,
    ) -> Result<RewardTask, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO reward_tasks (beneficiary_id, amount, tier)
             VALUES ($1, $2, $3) RETURNING {TASK_COLUMNS}"
        ))
        .bind(beneficiary)
        .bind(amount as i64)
        .bind(tier.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        task_from_row(&row)
    }

    async fn claim_tasks(&self, limit: usize) -> Result<Vec<RewardTask>, StoreError> {
        // Lock-and-skip claim: concurrent workers each pick distinct rows.
        let rows = sqlx::query(
            "WITH picked AS (
                 SELECT id FROM reward_tasks
                 WHERE status = 'pending'
                 ORDER BY created_at
                 FOR UPDATE SKIP LOCKED
                 LIMIT $1
             )
             UPDATE reward_tasks t
             SET status = 'processing', claimed_at = now()
             FROM picked
             WHERE t.id = picked.id
             RETURNING t.id, t.beneficiary_id, t.amount, t.tier, t.status,
                       t.created_at, t.claimed_at",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn mark_task_sent(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE reward_tasks SET status = 'sent'
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_task_failed(&self, id: i64, refund: u64) -> Result<bool, StoreError> {
        // Status flip and compensating credit commit together, so a crash
        // between them cannot lose (or double) the refund.
        let mut tx = self.pool.begin().await.map_err(StoreError::Unavailable)?;
        let result = sqlx::query(
            "UPDATE reward_tasks SET status = 'failed'
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Unavailable)?;
        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(StoreError::Unavailable)?;
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO shared_pool (key, value) VALUES ($1, GREATEST($2, 0))
             ON CONFLICT (key) DO UPDATE SET value = GREATEST(shared_pool.value + $2, 0)",
        )
        .bind(POOL_KEY)
        .bind(refund as i64)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::Unavailable)?;
        tx.commit().await.map_err(StoreError::Unavailable)?;
        Ok(true)
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE reward_tasks SET status = 'pending', claimed_at = NULL
             WHERE status = 'processing' AND claimed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        Ok(result.rows_affected())
    }

    async fn pool_credit(&self, delta: i64) -> Result<u64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO shared_pool (key, value) VALUES ($1, GREATEST($2, 0))
             ON CONFLICT (key) DO UPDATE SET value = GREATEST(shared_pool.value + $2, 0)
             RETURNING value",
        )
        .bind(POOL_KEY)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        unsigned(value, "negative pool")
    }

    async fn pool_balance(&self) -> Result<u64, StoreError> {
        let value: Option<i64> = sqlx::query_scalar("SELECT value FROM shared_pool WHERE key = $1")
            .bind(POOL_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::Unavailable)?;
        unsigned(value.unwrap_or(0), "negative pool")
    }

    async fn consume_nonce(&self, nonce: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO consumed_tokens (nonce) VALUES ($1) ON CONFLICT (nonce) DO NOTHING",
        )
        .bind(nonce)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Unavailable)?;
        Ok(result.rows_affected() == 1)
    }
}
