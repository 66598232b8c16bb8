//! Market genesis
//!
//! Builds one reward engine and one position ledger over shared custody
//! and a shared event log, wires the ledger as the engine's only volume
//! reporter, and funds the reward pool.

use std::sync::Arc;
use tally_core::{
    Address, Amount, EventLog, InMemoryCustody, ManualClock, TallyError, Timestamp,
};
use tally_economics::{EngineConfig, RewardEngine};
use tally_ledger::{LedgerConfig, PositionLedger};
use tracing::info;

use crate::config::TallyConfig;
use crate::error::Result;

/// Well-known market principals, derived from fixed labels
pub mod principals {
    use tally_core::Address;

    pub fn admin() -> Address {
        Address::from_label("tally/admin")
    }

    pub fn ledger() -> Address {
        Address::from_label("tally/ledger")
    }

    pub fn reward_pool() -> Address {
        Address::from_label("tally/reward-pool")
    }
}

/// A fully wired market driven by a manual clock
pub struct Market {
    pub engine: Arc<RewardEngine>,
    pub ledger: PositionLedger,
    pub custody: Arc<InMemoryCustody>,
    pub events: Arc<EventLog>,
    pub time: Arc<ManualClock>,
    decimals: u32,
}

impl Market {
    /// Genesis at `genesis_time` using `config`
    pub fn genesis(config: &TallyConfig, genesis_time: Timestamp) -> Result<Self> {
        config.validate()?;

        let custody = Arc::new(InMemoryCustody::new());
        let events = Arc::new(EventLog::new());
        let time = Arc::new(ManualClock::new(genesis_time));
        let admin = principals::admin();

        let engine = Arc::new(RewardEngine::new(
            EngineConfig {
                address: principals::reward_pool(),
                admin,
                clock: config.season_clock(genesis_time)?,
                params: config.reward_params()?,
            },
            time.clone(),
            custody.clone(),
            events.clone(),
        ));
        engine.set_ledger_address(&admin, principals::ledger())?;

        let ledger = PositionLedger::new(
            LedgerConfig {
                address: principals::ledger(),
                max_leverage: config.market.max_leverage,
            },
            custody.clone(),
            engine.clone(),
            events.clone(),
        )?;

        let funding = config.pool_funding()?;
        custody.mint(principals::reward_pool(), funding);

        info!(
            genesis = genesis_time,
            season_length = config.market.season_length_secs,
            max_leverage = config.market.max_leverage,
            pool = %funding,
            "market genesis"
        );

        Ok(Self {
            engine,
            ledger,
            custody,
            events,
            time,
            decimals: config.rewards.scale_decimals,
        })
    }

    /// Register a trader by name and mint `funds` into their wallet
    pub fn fund_trader(&self, name: &str, funds: Amount) -> Address {
        let trader = Address::from_label(name);
        if !funds.is_zero() {
            self.custody.mint(trader, funds);
        }
        trader
    }

    /// Advance the clock by whole seasons. Fails without moving the clock
    /// if the new time would not fit in a timestamp.
    pub fn advance_seasons(&self, seasons: u64) -> tally_core::Result<Timestamp> {
        let secs = self
            .engine
            .clock()
            .period()
            .checked_mul(seasons)
            .ok_or(TallyError::ArithmeticOverflow)?;
        self.time.try_advance(secs)
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }
}
