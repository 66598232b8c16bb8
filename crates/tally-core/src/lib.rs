//! # Tally Core
//!
//! Shared building blocks for the Tally leveraged-trading ledger and its
//! season-based reward engine:
//! - `Address`, `Amount`, `Season`, `Side` - the data model's vocabulary
//! - `SeasonClock` - maps observed time to a 1-based season index
//! - `ReentrancyGuard` - scoped protection for operations that call out
//! - `EventLog` - append-only notification log
//! - `ValueTransfer` / `VolumeSink` - the two capabilities components exchange
//!
//! ```text
//!   trader ──► PositionLedger ──(VolumeSink)──► RewardEngine
//!                   │                                │
//!                   └──────(ValueTransfer)───────────┘
//!                              custody
//! ```

pub mod clock;
pub mod custody;
pub mod error;
pub mod events;
pub mod guard;
pub mod sink;
pub mod types;

pub use clock::*;
pub use custody::*;
pub use error::*;
pub use events::*;
pub use guard::*;
pub use sink::*;
pub use types::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::clock::{ManualClock, SeasonClock, SystemTimeSource, TimeSource};
    pub use crate::custody::{InMemoryCustody, ValueTransfer};
    pub use crate::error::{Result, TallyError};
    pub use crate::events::{Event, EventLog};
    pub use crate::sink::VolumeSink;
    pub use crate::types::*;
}
