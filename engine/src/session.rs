use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;
use starfall_types::{
    classify, AccountId, ConversationId, Outcome, RewardTask, ThrowRecord, Tier, ANIMATION_FLOOR,
    FREE_THROW_COOLDOWN, THROW_PACING,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{info, warn};

use crate::ledger::Ledger;
use crate::queue::Queue;
use crate::referral::{ReferralCredit, Referrals};
use crate::store::Store;
use crate::Error;

/// A single die emission failed. The session tolerates this: the die is
/// skipped and the remaining dice still go out.
#[derive(Debug, thiserror::Error)]
#[error("emission failed: {0}")]
pub struct EmitError(pub String);

/// Emits one randomized die into a conversation and reports the observed
/// value. The transport owns the randomness; the coordinator only classifies
/// what came back.
pub trait ThrowEmitter: Send + Sync {
    fn emit(
        &self,
        conversation: ConversationId,
    ) -> impl Future<Output = Result<u8, EmitError>> + Send;
}

/// How the session cost is covered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Funding {
    /// Debit the virtual balance (fail-closed).
    Balance,
    /// Zero-cost daily throw, gated by the account cooldown.
    Free,
    /// Already settled out-of-band through the payment correlator.
    Paid { amount: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionRequest {
    pub conversation: ConversationId,
    pub account: AccountId,
    pub throws: u8,
    pub tier: Tier,
    pub funding: Funding,
}

/// Everything the presentation layer needs to narrate a finished session.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub throws: Vec<ThrowRecord>,
    pub outcome: Outcome,
    /// Cost and resulting balance when the session was funded from the
    /// virtual balance.
    pub debited: Option<(u64, u64)>,
    pub reward: Option<RewardTask>,
    pub referral_credit: Option<ReferralCredit>,
}

struct Metrics {
    started: Counter,
    wins: Counter,
    losses: Counter,
    busy: Counter,
}

impl Metrics {
    fn new(registry: &mut Registry) -> Self {
        let started = Counter::default();
        let wins = Counter::default();
        let losses = Counter::default();
        let busy = Counter::default();
        registry.register("sessions_started", "Sessions entered Running", started.clone());
        registry.register("sessions_won", "Sessions resolved as a win", wins.clone());
        registry.register("sessions_lost", "Sessions resolved as a loss", losses.clone());
        registry.register("sessions_busy", "Session attempts rejected as Busy", busy.clone());
        Self {
            started,
            wins,
            losses,
            busy,
        }
    }
}

/// Drives one throw session per conversation: Idle → Running → Resolving →
/// Idle.
///
/// The per-conversation mutex map is the single concurrency guard in the
/// system. It is keyed by conversation, not account: two accounts sharing a
/// chat still serialize.
pub struct Coordinator<S: Store, E: ThrowEmitter> {
    ledger: Ledger<S>,
    referrals: Referrals<S>,
    queue: Queue<S>,
    emitter: E,
    locks: Mutex<HashMap<ConversationId, Arc<AsyncMutex<()>>>>,
    metrics: Metrics,
}

impl<S: Store, E: ThrowEmitter> Coordinator<S, E> {
    pub fn new(
        ledger: Ledger<S>,
        referrals: Referrals<S>,
        queue: Queue<S>,
        emitter: E,
        registry: &mut Registry,
    ) -> Self {
        Self {
            ledger,
            referrals,
            queue,
            emitter,
            locks: Mutex::new(HashMap::new()),
            metrics: Metrics::new(registry),
        }
    }

    /// Run a full session. Fails fast with [`Error::Busy`] when the
    /// conversation already has one running; every other per-die failure is
    /// tolerated.
    pub async fn run(&self, request: SessionRequest) -> Result<SessionReport, Error> {
        // Single-flight guard. Held until the session resolves.
        let _running = self.acquire(request.conversation)?;

        let account = self.ledger.ensure_account(request.account).await?;
        if account.banned {
            return Err(Error::Banned(request.account));
        }

        let mut debited = None;
        match request.funding {
            Funding::Balance => {
                let cost = request.tier.throw_cost() * request.throws as u64;
                let balance = self.ledger.try_debit(request.account, cost).await?;
                self.ledger.record_spent(request.account, cost).await?;
                debited = Some((cost, balance));
            }
            Funding::Free => {
                let now = Utc::now();
                if let Some(remaining) = account.cooldown_remaining(now) {
                    return Err(Error::CooldownActive {
                        remaining_secs: remaining.num_seconds().max(1),
                    });
                }
                // Cooldown resets on entry to Running, not on resolution.
                let until = now
                    + chrono::Duration::seconds(FREE_THROW_COOLDOWN.as_secs() as i64);
                self.ledger.set_cooldown(request.account, until).await?;
            }
            Funding::Paid { amount } => {
                info!(
                    account = request.account,
                    amount, "session resumed from confirmed payment"
                );
            }
        }

        self.metrics.started.inc();
        info!(
            conversation = request.conversation,
            account = request.account,
            throws = request.throws,
            tier = ?request.tier,
            "session running"
        );

        // Emission. Individual failures are skipped; the floor keeps the
        // perceived animation length stable even when some dice never land.
        let started_at = Instant::now();
        let mut throws = Vec::with_capacity(request.throws as usize);
        for index in 0..request.throws {
            if index > 0 {
                sleep(THROW_PACING).await;
            }
            match self.emitter.emit(request.conversation).await {
                Ok(value) => throws.push(ThrowRecord::landed(value)),
                Err(err) => {
                    warn!(
                        conversation = request.conversation,
                        die = index,
                        error = %err,
                        "die emission failed, skipping"
                    );
                    throws.push(ThrowRecord::skipped());
                }
            }
        }
        sleep_until(started_at + ANIMATION_FLOOR).await;

        let outcome = classify(&throws);

        // Resolving.
        let mut reward = None;
        if outcome.is_win() {
            self.metrics.wins.inc();
            let amount = request.tier.reward_stars();
            let task = self
                .queue
                .enqueue(request.account, amount, request.tier)
                .await?;
            self.ledger.record_earned(request.account, amount).await?;
            reward = Some(task);
        } else {
            self.metrics.losses.inc();
        }
        self.ledger.record_play(request.account).await?;
        let referral_credit = self.referrals.on_play(request.account).await?;

        info!(
            conversation = request.conversation,
            account = request.account,
            outcome = ?outcome,
            "session resolved"
        );
        Ok(SessionReport {
            throws,
            outcome,
            debited,
            reward,
            referral_credit,
        })
    }

    fn acquire(
        &self,
        conversation: ConversationId,
    ) -> Result<tokio::sync::OwnedMutexGuard<()>, Error> {
        let slot = {
            let mut locks = self.locks.lock().expect("session lock map poisoned");
            locks.entry(conversation).or_default().clone()
        };
        slot.try_lock_owned().map_err(|_| {
            self.metrics.busy.inc();
            Error::Busy
        })
    }
}
