use std::sync::Arc;

use starfall_types::{AccountId, PaymentToken, Tier};
use tracing::info;

use crate::ledger::Ledger;
use crate::store::Store;
use crate::Error;

/// Session parameters recovered from a confirmed payment, ready to be handed
/// back to the session coordinator with `Funding::Paid`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resumption {
    pub account: AccountId,
    pub throws: u8,
    pub tier: Tier,
    pub paid_amount: u64,
}

/// Correlates deferred sessions with out-of-band payments.
///
/// When a session cannot be funded from the virtual balance, [`issue`]
/// produces an opaque token that rides through the external payment
/// subsystem; [`redeem`] recovers the deferred session from the confirmation.
/// Tokens are single-use: the nonce is persisted on redemption and replays
/// are rejected.
///
/// [`issue`]: Correlator::issue
/// [`redeem`]: Correlator::redeem
pub struct Correlator<S: Store> {
    store: Arc<S>,
    ledger: Ledger<S>,
}

impl<S: Store> Clone for Correlator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

impl<S: Store> Correlator<S> {
    pub fn new(store: Arc<S>, ledger: Ledger<S>) -> Self {
        Self { store, ledger }
    }

    /// Encode a payment request for a session that could not be debited.
    /// Returns the opaque token and the amount to invoice.
    pub fn issue(&self, beneficiary: AccountId, throws: u8, tier: Tier) -> (String, u64) {
        let amount = tier.throw_cost() * throws as u64;
        let token = PaymentToken::new(beneficiary, throws, tier);
        info!(beneficiary, throws, amount, "payment request issued");
        (token.encode(), amount)
    }

    /// Decode a confirmation and settle the ledger side of the payment: the
    /// virtual balance is reset to zero (the cost was covered out-of-band)
    /// and the real amount paid is recorded against lifetime spend.
    pub async fn redeem(&self, token: &str, paid_amount: u64) -> Result<Resumption, Error> {
        let token = PaymentToken::decode(token)?;
        if !self.store.consume_nonce(token.nonce).await? {
            return Err(Error::DuplicateToken);
        }
        self.ledger.ensure_account(token.beneficiary).await?;
        self.ledger.set_balance(token.beneficiary, 0).await?;
        self.ledger
            .record_spent(token.beneficiary, paid_amount)
            .await?;
        info!(
            beneficiary = token.beneficiary,
            throws = token.throws,
            paid_amount,
            "payment confirmed, resuming session"
        );
        Ok(Resumption {
            account: token.beneficiary,
            throws: token.throws,
            tier: token.tier,
            paid_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn correlator() -> (Correlator<MemStore>, Ledger<MemStore>) {
        let store = Arc::new(MemStore::new());
        let ledger = Ledger::new(store.clone());
        (Correlator::new(store, ledger.clone()), ledger)
    }

    #[tokio::test]
    async fn test_issue_amount_covers_whole_session() {
        let (correlator, _) = correlator();
        let (_, amount) = correlator.issue(1, 5, Tier::Ordinary);
        assert_eq!(amount, 5 * Tier::Ordinary.throw_cost());
        let (_, amount) = correlator.issue(1, 3, Tier::Premium);
        assert_eq!(amount, 3 * Tier::Premium.throw_cost());
    }

    #[tokio::test]
    async fn test_redeem_resumes_deferred_session() {
        let (correlator, ledger) = correlator();
        ledger.ensure_account(7).await.unwrap();
        ledger.adjust_balance(7, 2).await.unwrap();

        let (token, amount) = correlator.issue(7, 5, Tier::Ordinary);
        let resumption = correlator.redeem(&token, amount).await.unwrap();
        assert_eq!(
            resumption,
            Resumption {
                account: 7,
                throws: 5,
                tier: Tier::Ordinary,
                paid_amount: amount,
            }
        );

        // The shortfall was paid out-of-band: balance resets, spend is real.
        let account = ledger.account(7).await.unwrap().unwrap();
        assert_eq!(account.virtual_balance, 0);
        assert_eq!(account.spent, amount);
    }

    #[tokio::test]
    async fn test_redeem_rejects_replay() {
        let (correlator, _) = correlator();
        let (token, amount) = correlator.issue(7, 5, Tier::Ordinary);
        correlator.redeem(&token, amount).await.unwrap();
        assert!(matches!(
            correlator.redeem(&token, amount).await,
            Err(Error::DuplicateToken)
        ));
    }

    #[tokio::test]
    async fn test_redeem_rejects_garbage_token() {
        let (correlator, _) = correlator();
        assert!(matches!(
            correlator.redeem("zz-not-a-token", 5).await,
            Err(Error::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_redeem_creates_missing_account() {
        let (correlator, ledger) = correlator();
        let (token, amount) = correlator.issue(404, 2, Tier::Premium);
        correlator.redeem(&token, amount).await.unwrap();
        assert!(ledger.account(404).await.unwrap().is_some());
    }
}
