//! # Tally Ledger
//!
//! Collateral balances and leveraged positions. A trader deposits into a
//! free balance, locks part of it into a single Long or Short position at a
//! fixed leverage, and can grow, shrink or close that position. Every
//! position change is reported to the reward engine as leveraged volume.

pub mod ledger;
pub mod position;

pub use ledger::{LedgerConfig, PositionLedger, DEFAULT_MAX_LEVERAGE};
pub use position::{leveraged, Position};
