use starfall_types::{AccountId, TokenError};
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the engine to the dispatch boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Another session is already running in this conversation. Reported to
    /// the caller as a user-visible "wait" condition, not an internal fault.
    #[error("a session is already running in this conversation")]
    Busy,

    /// The zero-cost throw is still cooling down.
    #[error("free throw available again in {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },

    /// Fail-closed debit: the virtual balance cannot cover the session cost.
    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: u64, need: u64 },

    /// The account is barred from starting sessions.
    #[error("account {0} is banned")]
    Banned(AccountId),

    /// A payment confirmation carried a token that does not decode.
    #[error("invalid payment token: {0}")]
    InvalidToken(#[from] TokenError),

    /// A payment confirmation replayed an already-consumed token.
    #[error("payment token already consumed")]
    DuplicateToken,

    /// The backing store failed; when running behind the mirror wrapper this
    /// only escapes once the in-memory fallback fails too.
    #[error(transparent)]
    Storage(#[from] StoreError),
}
