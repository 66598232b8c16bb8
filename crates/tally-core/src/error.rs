//! Error types for Tally operations
//!
//! Every error aborts the action that raised it; no operation partially
//! applies, so callers may simply resubmit.

use crate::types::{Amount, Leverage};
use thiserror::Error;

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, TallyError>;

/// Errors that can occur in Tally operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    // === Input Validation ===
    /// Amount must be positive
    #[error("Amount must be greater than zero")]
    ZeroAmount,

    /// Leverage outside the accepted range
    #[error("Invalid leverage {leverage}x (allowed 1..={max})")]
    InvalidLeverage { leverage: Leverage, max: Leverage },

    /// Malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Balances & Positions ===
    /// Not enough free collateral
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    /// Trader already has an open position
    #[error("Position already open")]
    PositionAlreadyOpen,

    /// Trader has no open position
    #[error("No position open")]
    NoPositionOpen,

    /// Close amount larger than the open position
    #[error("Close amount {requested} exceeds open position {open}")]
    ExceedsPosition { requested: Amount, open: Amount },

    // === Rewards ===
    /// Nothing accrued for the trader
    #[error("No reward to claim")]
    NoRewardToClaim,

    // === Access Control ===
    /// Caller lacks the required capability
    #[error("Unauthorized caller")]
    Unauthorized,

    /// Ledger address already wired
    #[error("Ledger address already configured")]
    LedgerAlreadyConfigured,

    /// Nested call into a guarded operation
    #[error("Re-entrant call rejected")]
    Reentrancy,

    // === External ===
    /// Value transfer capability reported failure
    #[error("External transfer failed: {0}")]
    ExternalTransferFailed(String),

    // === Invariants ===
    /// Checked arithmetic overflowed
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    /// Construction parameters rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TallyError {
    /// Get the error code for API responses
    pub fn code(&self) -> u32 {
        match self {
            Self::ZeroAmount => 1001,
            Self::InvalidLeverage { .. } => 1002,
            Self::InvalidInput(_) => 1003,
            Self::InsufficientBalance { .. } => 2001,
            Self::PositionAlreadyOpen => 2002,
            Self::NoPositionOpen => 2003,
            Self::ExceedsPosition { .. } => 2004,
            Self::NoRewardToClaim => 3001,
            Self::Unauthorized => 4001,
            Self::LedgerAlreadyConfigured => 4002,
            Self::Reentrancy => 4003,
            Self::ExternalTransferFailed(_) => 5001,
            Self::ArithmeticOverflow => 9001,
            Self::InvalidConfig(_) => 9002,
        }
    }

    /// Check if the error stems from the caller's request rather than a
    /// broken invariant or a failing collaborator
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::ArithmeticOverflow | Self::InvalidConfig(_) | Self::ExternalTransferFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TallyError::ZeroAmount.code(), 1001);
        assert_eq!(TallyError::NoRewardToClaim.code(), 3001);
        assert_eq!(TallyError::ArithmeticOverflow.code(), 9001);
    }

    #[test]
    fn test_error_display() {
        let err = TallyError::InsufficientBalance {
            required: Amount::from(10u64),
            available: Amount::from(3u64),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("required 10"));
        assert!(msg.contains("available 3"));
    }

    #[test]
    fn test_user_errors() {
        assert!(TallyError::PositionAlreadyOpen.is_user_error());
        assert!(!TallyError::ArithmeticOverflow.is_user_error());
        assert!(!TallyError::ExternalTransferFailed("rejected".into()).is_user_error());
    }
}
