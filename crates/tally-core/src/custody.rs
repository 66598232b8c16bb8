//! Value transfer capability
//!
//! Token custody lives outside Tally. Components only see a transfer
//! capability that either moves the full amount or reports failure without
//! moving anything.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

use crate::types::{Address, Amount};

/// Failure reported by a value transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("insufficient funds at {owner}: need {required}, have {available}")]
    InsufficientFunds {
        owner: Address,
        required: Amount,
        available: Amount,
    },

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// External custody able to move value between principals
pub trait ValueTransfer: Send + Sync {
    /// Move `amount` from `from` to `to`. On `Err` nothing has moved.
    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> std::result::Result<(), TransferError>;

    /// Funds held by `owner`
    fn balance_of(&self, owner: &Address) -> Amount;
}

/// In-memory custody used by the node wiring, scenario replay and tests
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    balances: RwLock<HashMap<Address, Amount>>,
    frozen: RwLock<Vec<Address>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `owner` out of thin air (genesis allocations)
    pub fn mint(&self, owner: Address, amount: Amount) {
        let mut balances = self.balances.write();
        let entry = balances.entry(owner).or_insert_with(Amount::zero);
        *entry = entry.saturating_add(amount);
    }

    /// Make every transfer touching `owner` fail
    pub fn freeze(&self, owner: Address) {
        self.frozen.write().push(owner);
    }

    pub fn unfreeze(&self, owner: &Address) {
        self.frozen.write().retain(|a| a != owner);
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> Amount {
        self.balances
            .read()
            .values()
            .fold(Amount::zero(), |acc, v| acc.saturating_add(*v))
    }
}

impl ValueTransfer for InMemoryCustody {
    fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> std::result::Result<(), TransferError> {
        {
            let frozen = self.frozen.read();
            if let Some(addr) = frozen.iter().find(|a| *a == from || *a == to) {
                return Err(TransferError::Rejected(format!("{} is frozen", addr)));
            }
        }

        let mut balances = self.balances.write();
        let available = balances.get(from).copied().unwrap_or_default();
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                owner: *from,
                required: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }

        let credited = balances
            .get(to)
            .copied()
            .unwrap_or_default()
            .checked_add(amount)
            .ok_or_else(|| TransferError::Rejected("recipient balance overflow".to_string()))?;

        balances.insert(*from, available - amount);
        balances.insert(*to, credited);
        Ok(())
    }

    fn balance_of(&self, owner: &Address) -> Amount {
        self.balances.read().get(owner).copied().unwrap_or_default()
    }
}
