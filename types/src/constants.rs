use std::time::Duration;

/// Number of faces on an emitted die.
pub const DIE_FACES: u8 = 6;

/// Minimum die value counted as a hit.
pub const HIT_THRESHOLD: u8 = 4;

/// Delay between consecutive die emissions within a session.
pub const THROW_PACING: Duration = Duration::from_millis(500);

/// Minimum time between the first emission and session resolution. Keeps the
/// perceived animation length consistent even when some emissions fail.
pub const ANIMATION_FLOOR: Duration = Duration::from_secs(4);

/// Default number of dice per session.
pub const DEFAULT_THROWS: u8 = 5;

/// Maximum number of dice a single session may emit.
pub const MAX_THROWS: u8 = 10;

/// Star cost per die on the ordinary tier.
pub const ORDINARY_THROW_COST: u64 = 1;

/// Star cost per die on the premium tier.
pub const PREMIUM_THROW_COST: u64 = 5;

/// Catalog price of the gift awarded for an ordinary win.
pub const ORDINARY_REWARD_STARS: u64 = 15;

/// Catalog price of the gift awarded for a premium win.
pub const PREMIUM_REWARD_STARS: u64 = 50;

/// Reuse interval for the zero-cost daily throw.
pub const FREE_THROW_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Plays a referred account must complete before the inviter is credited.
pub const REFERRAL_THRESHOLD: u32 = 5;

/// Stars credited to the inviter when a referral matures.
pub const REFERRAL_BONUS: u64 = 3;

/// Shared-pool row holding the real-currency star balance.
pub const POOL_KEY: &str = "pool_stars";

/// Worker sleep when the queue is empty.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Maximum tasks a worker claims per iteration.
pub const WORKER_BATCH_SIZE: usize = 5;

/// Worker pause between non-empty batches.
pub const WORKER_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Worker backoff after an iteration-level error.
pub const WORKER_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// How long a claimed task may sit in `processing` before the reclaim sweep
/// returns it to `pending`.
pub const CLAIM_TTL: Duration = Duration::from_secs(10 * 60);

/// Worker iterations between reclaim sweeps.
pub const RECLAIM_EVERY: u32 = 20;

/// Error codes carried by [`Event::Error`](crate::Event::Error).
pub const ERROR_BUSY: u8 = 1;
pub const ERROR_COOLDOWN_ACTIVE: u8 = 2;
pub const ERROR_INSUFFICIENT_BALANCE: u8 = 3;
pub const ERROR_BANNED: u8 = 4;
pub const ERROR_INVALID_TOKEN: u8 = 5;
pub const ERROR_DUPLICATE_TOKEN: u8 = 6;
pub const ERROR_INVALID_REQUEST: u8 = 7;
pub const ERROR_STORAGE: u8 = 8;
