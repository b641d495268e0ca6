use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, Tier};

/// Fulfillment state of a queued reward.
///
/// Transitions are monotonic: `Pending → Processing → {Sent | Failed}`. The
/// single exception is the stale-claim reclaim sweep, which returns a
/// `Processing` row to `Pending` after its claim expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl TaskStatus {
    /// Stable text form used in storage rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

/// Durable queue row created on a win and drained by the fulfillment worker.
///
/// A task reaching `Failed` triggers exactly one compensating pool credit of
/// `amount`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTask {
    pub id: i64,
    pub beneficiary_id: AccountId,
    pub amount: u64,
    pub tier: Tier,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Set when a worker claims the row; cleared by the reclaim sweep.
    pub claimed_at: Option<DateTime<Utc>>,
}
