use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Referred-account → inviter relationship.
///
/// At most one link exists per referred account. `rewarded` transitions
/// false→true exactly once, on the play that reaches the threshold; the link
/// is immutable afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralLink {
    pub referred_id: AccountId,
    pub inviter_id: AccountId,
    pub plays: u32,
    pub rewarded: bool,
}

impl ReferralLink {
    pub fn new(referred_id: AccountId, inviter_id: AccountId) -> Self {
        Self {
            referred_id,
            inviter_id,
            plays: 0,
            rewarded: false,
        }
    }
}
