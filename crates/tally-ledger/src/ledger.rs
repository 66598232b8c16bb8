//! # Position & Balance Ledger
//!
//! Tracks each trader's free collateral and single open position. Every
//! position action reports `delta * leverage` to a [`VolumeSink`]:
//!
//! | Action | Balance | Position | Volume reported |
//! |--------|---------|----------|-----------------|
//! | open | -amount | created | amount × leverage |
//! | increase | -amount | +amount | amount × leverage |
//! | close | +amount | -amount (deleted at 0) | amount × leverage |
//!
//! Each action validates and computes everything first, reports volume,
//! and only then commits; a rejected report leaves the ledger unchanged.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tally_core::{
    Address, Amount, Event, EventLog, Leverage, ReentrancyGuard, Result, Side, TallyError,
    ValueTransfer, VolumeSink,
};
use tracing::{debug, warn};

use crate::position::{leveraged, Position};

/// Default upper bound on position leverage
pub const DEFAULT_MAX_LEVERAGE: Leverage = 100;

/// Construction parameters for [`PositionLedger`]
#[derive(Clone, Copy, Debug)]
pub struct LedgerConfig {
    /// Custody address holding deposited collateral; also the capability
    /// presented to the volume sink
    pub address: Address,
    pub max_leverage: Leverage,
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<Address, Amount>,
    positions: HashMap<Address, Position>,
}

impl LedgerState {
    fn balance(&self, trader: &Address) -> Amount {
        self.balances.get(trader).copied().unwrap_or_default()
    }
}

pub struct PositionLedger {
    address: Address,
    max_leverage: Leverage,
    custody: Arc<dyn ValueTransfer>,
    sink: Arc<dyn VolumeSink>,
    events: Arc<EventLog>,
    state: RwLock<LedgerState>,
    withdraw_guard: ReentrancyGuard,
}

impl PositionLedger {
    pub fn new(
        config: LedgerConfig,
        custody: Arc<dyn ValueTransfer>,
        sink: Arc<dyn VolumeSink>,
        events: Arc<EventLog>,
    ) -> Result<Self> {
        if config.max_leverage == 0 {
            return Err(TallyError::InvalidConfig(
                "max leverage must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            address: config.address,
            max_leverage: config.max_leverage,
            custody,
            sink,
            events,
            state: RwLock::new(LedgerState::default()),
            withdraw_guard: ReentrancyGuard::new(),
        })
    }

    /// Pull `amount` from the trader's custody into their free balance
    pub fn deposit(&self, trader: &Address, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(TallyError::ZeroAmount);
        }
        self.balance(trader)
            .checked_add(amount)
            .ok_or(TallyError::ArithmeticOverflow)?;

        self.custody
            .transfer(trader, &self.address, amount)
            .map_err(|e| TallyError::ExternalTransferFailed(e.to_string()))?;

        {
            let mut state = self.state.write();
            let balance = state.balances.entry(*trader).or_default();
            // bounded by custody supply, which already held `amount`
            *balance = balance.saturating_add(amount);
        }

        self.events.emit(Event::Deposit {
            trader: *trader,
            amount,
        });
        Ok(())
    }

    /// Push `amount` of free balance back to the trader's custody
    pub fn withdraw(&self, trader: &Address, amount: Amount) -> Result<()> {
        let _token = self.withdraw_guard.enter().map_err(|e| {
            warn!(%trader, "re-entrant withdraw rejected");
            e
        })?;

        if amount.is_zero() {
            return Err(TallyError::ZeroAmount);
        }

        {
            let mut state = self.state.write();
            let available = state.balance(trader);
            if available < amount {
                return Err(TallyError::InsufficientBalance {
                    required: amount,
                    available,
                });
            }
            state.balances.insert(*trader, available - amount);
        }

        if let Err(e) = self.custody.transfer(&self.address, trader, amount) {
            let mut state = self.state.write();
            let balance = state.balances.entry(*trader).or_default();
            *balance = balance.saturating_add(amount);
            warn!(%trader, %amount, error = %e, "withdrawal transfer failed, balance restored");
            return Err(TallyError::ExternalTransferFailed(e.to_string()));
        }

        self.events.emit(Event::Withdraw {
            trader: *trader,
            amount,
        });
        Ok(())
    }

    /// Lock `amount` of free balance into a new position
    pub fn open(&self, trader: &Address, amount: Amount, side: Side, leverage: Leverage) -> Result<()> {
        if amount.is_zero() {
            return Err(TallyError::ZeroAmount);
        }
        if leverage == 0 || leverage > self.max_leverage {
            return Err(TallyError::InvalidLeverage {
                leverage,
                max: self.max_leverage,
            });
        }

        let mut state = self.state.write();
        let available = state.balance(trader);
        if available < amount {
            return Err(TallyError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        if state.positions.contains_key(trader) {
            return Err(TallyError::PositionAlreadyOpen);
        }

        let volume = leveraged(amount, leverage)?;
        self.sink.report_volume(&self.address, trader, volume)?;

        let position = Position::new(amount, side, leverage);
        state.balances.insert(*trader, available - amount);
        state.positions.insert(*trader, position);
        drop(state);

        debug!(%trader, %amount, %side, leverage, %volume, "position opened");
        self.events.emit(Event::PositionOpened {
            trader: *trader,
            amount,
            side,
            leverage,
        });
        Ok(())
    }

    /// Add `amount` of free balance to the open position
    pub fn increase(&self, trader: &Address, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(TallyError::ZeroAmount);
        }

        let mut state = self.state.write();
        let mut position = state
            .positions
            .get(trader)
            .copied()
            .ok_or(TallyError::NoPositionOpen)?;
        let available = state.balance(trader);
        if available < amount {
            return Err(TallyError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        position.amount = position
            .amount
            .checked_add(amount)
            .ok_or(TallyError::ArithmeticOverflow)?;
        let volume = position.leveraged(amount)?;
        self.sink.report_volume(&self.address, trader, volume)?;

        state.balances.insert(*trader, available - amount);
        state.positions.insert(*trader, position);
        drop(state);

        debug!(%trader, %amount, %volume, "position increased");
        self.events.emit(Event::PositionIncreased {
            trader: *trader,
            amount,
            new_amount: position.amount,
        });
        Ok(())
    }

    /// Release `amount` of the open position back to free balance. Closing
    /// counts as trading volume just like opening.
    pub fn close(&self, trader: &Address, amount: Amount) -> Result<()> {
        if amount.is_zero() {
            return Err(TallyError::ZeroAmount);
        }

        let mut state = self.state.write();
        let position = state
            .positions
            .get(trader)
            .copied()
            .ok_or(TallyError::NoPositionOpen)?;
        if amount > position.amount {
            return Err(TallyError::ExceedsPosition {
                requested: amount,
                open: position.amount,
            });
        }

        let balance = state
            .balance(trader)
            .checked_add(amount)
            .ok_or(TallyError::ArithmeticOverflow)?;
        let volume = position.leveraged(amount)?;
        self.sink.report_volume(&self.address, trader, volume)?;

        let remaining = position.amount - amount;
        if remaining.is_zero() {
            state.positions.remove(trader);
        } else {
            state.positions.insert(
                *trader,
                Position {
                    amount: remaining,
                    ..position
                },
            );
        }
        state.balances.insert(*trader, balance);
        drop(state);

        debug!(%trader, %amount, %remaining, %volume, "position closed");
        self.events.emit(Event::PositionClosed {
            trader: *trader,
            amount,
            remaining,
        });
        Ok(())
    }

    // === Views ===

    pub fn position(&self, trader: &Address) -> Option<Position> {
        self.state.read().positions.get(trader).copied()
    }

    pub fn balance(&self, trader: &Address) -> Amount {
        self.state.read().balance(trader)
    }

    /// Free balance plus collateral locked in the open position
    pub fn locked_total(&self, trader: &Address) -> Amount {
        let state = self.state.read();
        let locked = state
            .positions
            .get(trader)
            .map(|p| p.amount)
            .unwrap_or_default();
        state.balance(trader).saturating_add(locked)
    }

    pub fn open_positions(&self) -> usize {
        self.state.read().positions.len()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn max_leverage(&self) -> Leverage {
        self.max_leverage
    }
}
