use serde::{Deserialize, Serialize};

use crate::{AccountId, ConversationId, Tier};

/// Closed command vocabulary consumed by the core.
///
/// Chat traffic is parsed by the transport layer into exactly one of these
/// variants at the boundary; nothing downstream re-parses strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Start a paid session of `throws` dice on `tier`.
    Throw {
        conversation: ConversationId,
        account: AccountId,
        throws: u8,
        tier: Tier,
    },
    /// Start the zero-cost daily throw (one ordinary die, cooldown-gated).
    FreeThrow {
        conversation: ConversationId,
        account: AccountId,
    },
    /// First visit through a referral deep link.
    ReferralVisit {
        referred: AccountId,
        inviter: AccountId,
    },
    /// Show the caller's ledger balance.
    Balance { account: AccountId },
    /// Payment pre-authorization probe. Always acknowledged.
    PreCheckout { id: String },
    /// Payment confirmation carrying back an issued token.
    PaymentConfirmed {
        conversation: ConversationId,
        token: String,
        paid_amount: u64,
    },
    /// Privileged operations, authorized by the transport layer.
    Admin(AdminCommand),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdminCommand {
    ShowBalance { account: AccountId },
    SetBalance { account: AccountId, value: u64 },
    Stats,
    Ban { account: AccountId },
    Unban { account: AccountId },
    TopUpPool { amount: u64 },
}
