//! Open position record

use serde::{Deserialize, Serialize};
use tally_core::{Amount, Leverage, Result, Side, TallyError};

/// A trader's single open position. Leverage is fixed for its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Collateral locked in the position, always > 0
    pub amount: Amount,
    pub side: Side,
    pub leverage: Leverage,
}

impl Position {
    pub fn new(amount: Amount, side: Side, leverage: Leverage) -> Self {
        Self {
            amount,
            side,
            leverage,
        }
    }

    /// Leveraged notional of `delta` at this position's leverage
    pub fn leveraged(&self, delta: Amount) -> Result<Amount> {
        leveraged(delta, self.leverage)
    }

    /// Leveraged notional of the whole position
    pub fn notional(&self) -> Result<Amount> {
        self.leveraged(self.amount)
    }
}

/// `amount * leverage`, checked
pub fn leveraged(amount: Amount, leverage: Leverage) -> Result<Amount> {
    amount
        .checked_mul(Amount::from(leverage))
        .ok_or(TallyError::ArithmeticOverflow)
}
