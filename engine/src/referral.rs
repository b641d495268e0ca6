use std::sync::Arc;

use starfall_types::{AccountId, ReferralLink, REFERRAL_BONUS, REFERRAL_THRESHOLD};
use tracing::info;

use crate::ledger::Ledger;
use crate::store::Store;
use crate::Error;

/// Result of a referral deep-link visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitOutcome {
    /// A new link was created; the inviter should be notified.
    Registered,
    /// A link for this account already exists (first link wins).
    AlreadyLinked,
    /// Accounts cannot refer themselves.
    SelfReferral,
}

/// The inviter-side credit issued when a referral matures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferralCredit {
    pub inviter: AccountId,
    pub bonus: u64,
}

/// Referral state machine: Visited → Counting(0..threshold) → Rewarded.
///
/// The inviter credit happens on the transition edge only; the store guards
/// the edge so concurrent plays cannot take it twice.
pub struct Referrals<S: Store> {
    store: Arc<S>,
    ledger: Ledger<S>,
}

impl<S: Store> Clone for Referrals<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

impl<S: Store> Referrals<S> {
    pub fn new(store: Arc<S>, ledger: Ledger<S>) -> Self {
        Self { store, ledger }
    }

    /// Handle a first visit through a referral link.
    pub async fn register_visit(
        &self,
        referred: AccountId,
        inviter: AccountId,
    ) -> Result<VisitOutcome, Error> {
        if referred == inviter {
            return Ok(VisitOutcome::SelfReferral);
        }
        if self.store.create_referral(referred, inviter).await? {
            info!(referred, inviter, "referral link registered");
            Ok(VisitOutcome::Registered)
        } else {
            Ok(VisitOutcome::AlreadyLinked)
        }
    }

    /// Advance the referred account's play counter; on the play that reaches
    /// the threshold, reward the inviter exactly once.
    pub async fn on_play(&self, referred: AccountId) -> Result<Option<ReferralCredit>, Error> {
        let Some(plays) = self.store.step_referral(referred, REFERRAL_THRESHOLD).await? else {
            // No link, or the link is already terminal.
            return Ok(None);
        };
        if plays < REFERRAL_THRESHOLD {
            return Ok(None);
        }
        let Some(inviter) = self.store.finish_referral(referred).await? else {
            // Another play took the edge first.
            return Ok(None);
        };
        self.ledger.ensure_account(inviter).await?;
        self.ledger
            .adjust_balance(inviter, REFERRAL_BONUS as i64)
            .await?;
        self.ledger.record_earned(inviter, REFERRAL_BONUS).await?;
        info!(referred, inviter, bonus = REFERRAL_BONUS, "referral matured");
        Ok(Some(ReferralCredit {
            inviter,
            bonus: REFERRAL_BONUS,
        }))
    }

    pub async fn link(&self, referred: AccountId) -> Result<Option<ReferralLink>, Error> {
        Ok(self.store.referral(referred).await?)
    }
}
