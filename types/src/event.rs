use serde::{Deserialize, Serialize};

use crate::{AccountId, ConversationId, Outcome, ThrowRecord, Tier};

/// Outputs produced by the core for the presentation layer to render.
///
/// The core never formats user-facing copy; it reports what happened and the
/// transport turns events into messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A session ran to completion.
    SessionResolved {
        conversation: ConversationId,
        account: AccountId,
        tier: Tier,
        throws: Vec<ThrowRecord>,
        outcome: Outcome,
        /// Price of the queued gift when the outcome is a win.
        reward_amount: Option<u64>,
    },
    /// The cost was debited from the virtual balance before the session ran.
    DebitConfirmed {
        account: AccountId,
        amount: u64,
        balance: u64,
    },
    /// A reward task was appended to the fulfillment queue.
    RewardQueued {
        task_id: i64,
        beneficiary: AccountId,
        amount: u64,
        tier: Tier,
    },
    /// Balance was short; an invoice with this token was issued instead of a
    /// session.
    PaymentRequested {
        account: AccountId,
        token: String,
        amount: u64,
    },
    /// Pre-authorization acknowledged (collaborator contract: always accept).
    PreCheckoutAccepted { id: String },
    /// A referral link was created for `referred`.
    ReferralRegistered {
        referred: AccountId,
        inviter: AccountId,
    },
    /// A referral matured and the inviter was credited.
    ReferralCredited { inviter: AccountId, bonus: u64 },
    /// Ledger balance report.
    AccountBalance { account: AccountId, balance: u64 },
    /// Aggregate statistics for the admin surface.
    Stats { accounts: u64, pool: u64 },
    /// Acknowledgement for an admin mutation.
    AdminAck { detail: String },
    /// A command was rejected. `code` is one of the `ERROR_*` constants.
    Error {
        account: Option<AccountId>,
        code: u8,
        message: String,
    },
}
