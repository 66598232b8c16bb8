//! # Reward Formula
//!
//! A trader's share of a season's pool is proportional to their leveraged
//! volume in that season:
//!
//! ```text
//! scaled    = trader_volume * RATE * SCALE
//! after     = floor(scaled / DIVISOR)
//! reward    = floor(after / market_volume)
//! ```
//!
//! Each division truncates on its own, in this order. Every multiplication
//! is checked; overflow aborts the enclosing action.

use serde::{Deserialize, Serialize};
use tally_core::{Amount, Result, TallyError};

use crate::constants::*;

/// Reward formula parameters, fixed when the engine is constructed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardParams {
    /// Rate numerator
    pub rate: u64,
    /// Rate denominator
    pub divisor: u64,
    /// Fixed-point scale
    pub scale: Amount,
}

impl Default for RewardParams {
    fn default() -> Self {
        Self {
            rate: REWARD_RATE,
            divisor: REWARD_RATE_DIVISOR,
            scale: Amount::exp10(SCALE_DECIMALS as usize),
        }
    }
}

impl RewardParams {
    /// Create parameters; the divisor must be non-zero
    pub fn new(rate: u64, divisor: u64, scale_decimals: u32) -> Result<Self> {
        if divisor == 0 {
            return Err(TallyError::InvalidConfig(
                "reward rate divisor must be greater than zero".to_string(),
            ));
        }
        if scale_decimals > 38 {
            return Err(TallyError::InvalidConfig(format!(
                "scale of 10^{} is too large",
                scale_decimals
            )));
        }
        Ok(Self {
            rate,
            divisor,
            scale: Amount::exp10(scale_decimals as usize),
        })
    }

    /// Reward for one (trader, season) pair.
    ///
    /// Returns `None` when either volume is zero; the caller must then leave
    /// any prior snapshot untouched.
    pub fn season_reward(&self, trader_volume: Amount, market_volume: Amount) -> Result<Option<Amount>> {
        if trader_volume.is_zero() || market_volume.is_zero() {
            return Ok(None);
        }

        let scaled = trader_volume
            .checked_mul(Amount::from(self.rate))
            .and_then(|v| v.checked_mul(self.scale))
            .ok_or(TallyError::ArithmeticOverflow)?;
        let after_rate = scaled / Amount::from(self.divisor);

        Ok(Some(after_rate / market_volume))
    }
}
