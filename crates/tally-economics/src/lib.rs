//! # Tally Economics - Season-Based Volume Rewards
//!
//! Traders earn a pro-rata share of a fixed per-season reward rate,
//! proportional to the leveraged volume they trade in that season.
//!
//! ## Key Features
//!
//! - **Append-only volume ledger**: per (season, trader) and per season totals
//! - **Lazy accrual**: no work at season boundaries; each trader is brought up
//!   to date on their next action or claim, O(1) regardless of history
//! - **Exactly-once finalization**: a closed season is credited to a trader once
//! - **Bit-exact fixed point**: 256-bit checked arithmetic, truncating division
//!
//! ## Lifecycle of a season's reward
//!
//! ```text
//!  season S current            season S closed           claim
//! ┌───────────────────┐      ┌───────────────────┐     ┌──────────┐
//! │ snapshot(S) is an │ ───► │ next touch folds  │ ──► │ pay out, │
//! │ estimate, updated │      │ snapshot(S) into  │     │ zero the │
//! │ on every trade    │      │ claimable (once)  │     │ balance  │
//! └───────────────────┘      └───────────────────┘     └──────────┘
//! ```

pub mod accrual;
pub mod rewards;
pub mod settlement;
pub mod volume;

// Re-exports
pub use accrual::{AccrualState, EngineConfig, RewardEngine, SeasonSummary, TouchPlan};
pub use rewards::RewardParams;
pub use volume::{SeasonVolumes, VolumeLedger, VolumeUpdate};

/// Reward constants fixed at genesis
pub mod constants {
    /// Reward rate numerator
    pub const REWARD_RATE: u64 = 387;

    /// Reward rate denominator
    pub const REWARD_RATE_DIVISOR: u64 = 1000;

    /// Fixed-point decimals (10^18, same as ETH)
    pub const SCALE_DECIMALS: u32 = 18;

    /// Season length: 30 days in seconds
    pub const SEASON_LENGTH_SECS: u64 = tally_core::DEFAULT_SEASON_LENGTH_SECS;
}

pub use constants::*;
