use serde::{Deserialize, Serialize};

use crate::{
    HIT_THRESHOLD, ORDINARY_REWARD_STARS, ORDINARY_THROW_COST, PREMIUM_REWARD_STARS,
    PREMIUM_THROW_COST,
};

/// Session tier. Determines the per-die cost and the price of the gift
/// awarded on a win.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Tier {
    Ordinary = 0,
    Premium = 1,
}

impl Tier {
    /// Star cost charged per emitted die.
    pub fn throw_cost(&self) -> u64 {
        match self {
            Self::Ordinary => ORDINARY_THROW_COST,
            Self::Premium => PREMIUM_THROW_COST,
        }
    }

    /// Catalog price of the gift awarded for a win on this tier.
    pub fn reward_stars(&self) -> u64 {
        match self {
            Self::Ordinary => ORDINARY_REWARD_STARS,
            Self::Premium => PREMIUM_REWARD_STARS,
        }
    }

    /// Stable text form used in storage rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ordinary => "ordinary",
            Self::Premium => "premium",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "ordinary" => Some(Self::Ordinary),
            "premium" => Some(Self::Premium),
            _ => None,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ordinary),
            1 => Some(Self::Premium),
            _ => None,
        }
    }
}

/// One emitted die. `value` is `None` when the emission itself failed and the
/// die was skipped; a hit is a landed value at or above the threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowRecord {
    pub value: Option<u8>,
    pub hit: bool,
}

impl ThrowRecord {
    pub fn landed(value: u8) -> Self {
        Self {
            value: Some(value),
            hit: value >= HIT_THRESHOLD,
        }
    }

    pub fn skipped() -> Self {
        Self {
            value: None,
            hit: false,
        }
    }
}

/// Session outcome. `NothingSent` is a loss where no die could be emitted at
/// all, surfaced separately so the caller can tell the user explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    NothingSent,
}

impl Outcome {
    pub fn is_win(&self) -> bool {
        matches!(self, Self::Win)
    }
}

/// Classify a finished session: a win requires at least one landed die and
/// every landed die to be a hit. Dice whose emission failed were never
/// observed and do not count against the session.
pub fn classify(throws: &[ThrowRecord]) -> Outcome {
    let landed: Vec<_> = throws.iter().filter(|t| t.value.is_some()).collect();
    if landed.is_empty() {
        return Outcome::NothingSent;
    }
    if landed.iter().all(|t| t.hit) {
        Outcome::Win
    } else {
        Outcome::Loss
    }
}
