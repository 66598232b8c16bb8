//! Append-only notification log
//!
//! Components append an [`Event`] only after an action has fully committed.
//! Each entry is mirrored to `tracing` under the `tally::events` target.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{Address, Amount, Leverage, Season, Side};

/// Notification emitted by the ledger or the reward engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Deposit {
        trader: Address,
        amount: Amount,
    },
    Withdraw {
        trader: Address,
        amount: Amount,
    },
    PositionOpened {
        trader: Address,
        amount: Amount,
        side: Side,
        leverage: Leverage,
    },
    PositionIncreased {
        trader: Address,
        amount: Amount,
        new_amount: Amount,
    },
    PositionClosed {
        trader: Address,
        amount: Amount,
        remaining: Amount,
    },
    RewardSet {
        trader: Address,
        season: Season,
        reward: Amount,
    },
    RewardClaimed {
        trader: Address,
        amount: Amount,
    },
    LedgerAddressSet {
        ledger: Address,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "Deposit",
            Self::Withdraw { .. } => "Withdraw",
            Self::PositionOpened { .. } => "PositionOpened",
            Self::PositionIncreased { .. } => "PositionIncreased",
            Self::PositionClosed { .. } => "PositionClosed",
            Self::RewardSet { .. } => "RewardSet",
            Self::RewardClaimed { .. } => "RewardClaimed",
            Self::LedgerAddressSet { .. } => "LedgerAddressSet",
        }
    }
}

/// Sequence-numbered event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub event: Event,
}

/// Shared append-only log
#[derive(Debug, Default)]
pub struct EventLog {
    records: RwLock<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its sequence number
    pub fn emit(&self, event: Event) -> u64 {
        let mut records = self.records.write();
        let seq = records.len() as u64;
        tracing::info!(target: "tally::events", seq, event = event.name(), ?event);
        records.push(EventRecord { seq, event });
        seq
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Copy of every record so far
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.read().clone()
    }

    /// Records with `seq >= from`
    pub fn since(&self, from: u64) -> Vec<EventRecord> {
        self.records
            .read()
            .iter()
            .skip(from as usize)
            .cloned()
            .collect()
    }

    /// Number of events with the given name
    pub fn count(&self, name: &str) -> usize {
        self.records
            .read()
            .iter()
            .filter(|r| r.event.name() == name)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_sequence() {
        let log = EventLog::new();
        let trader = Address::from_label("alice");

        assert_eq!(log.emit(Event::Deposit { trader, amount: Amount::from(5u64) }), 0);
        assert_eq!(log.emit(Event::Withdraw { trader, amount: Amount::from(2u64) }), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.count("Deposit"), 1);
        assert_eq!(log.since(1).len(), 1);
        assert_eq!(log.since(1)[0].event.name(), "Withdraw");
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::LedgerAddressSet {
            ledger: Address::from_label("ledger"),
        };
        let json = serde_json::to_value(EventRecord { seq: 3, event }).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["kind"], "ledger_address_set");
    }
}
