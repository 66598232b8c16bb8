//! # Reward Accrual Engine
//!
//! Lazy, per-trader reward bookkeeping. Nothing happens at season
//! boundaries; instead each trader's state is brought up to date whenever
//! the trader next produces volume or claims ("touch").
//!
//! ## Touch state machine
//!
//! With `S` the current season and `P` the trader's last active season:
//!
//! | Case | Condition | Effect |
//! |------|-----------|--------|
//! | A | `P` is none or `P == S` | recompute snapshot for `S` |
//! | B | `P != S` | recompute snapshot for `P`, fold it into `claimable` once, then case A |
//!
//! `last_finalized_season` guards the fold so a season is credited at most
//! once no matter how many touches follow the rollover. Every step is
//! computed as a [`TouchPlan`] first and committed only after the whole
//! action has succeeded.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tally_core::{
    Address, Amount, Event, EventLog, ReentrancyGuard, Result, Season, SeasonClock, TallyError,
    TimeSource, Timestamp, ValueTransfer, VolumeSink,
};
use tracing::{debug, warn};

use crate::rewards::RewardParams;
use crate::volume::{VolumeLedger, VolumeUpdate};

/// Per-trader accrual bookkeeping
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualState {
    /// Season of the trader's last touch
    pub last_active_season: Option<Season>,
    /// Finalized, unclaimed reward
    pub claimable: Amount,
    /// Last season folded into `claimable`
    pub last_finalized_season: Option<Season>,
}

/// Outcome of a touch, not yet committed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TouchPlan {
    pub trader: Address,
    pub season: Season,
    /// Snapshot writes, in order
    pub snapshots: Vec<(Season, Amount)>,
    /// Season folded into `claimable` by this touch, with the amount added
    pub finalized: Option<(Season, Amount)>,
    /// Resulting accrual state
    pub accrual: AccrualState,
}

/// Market-wide view of one season
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub season: Season,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub market_volume: Amount,
    pub is_current: bool,
}

/// Construction parameters for [`RewardEngine`]
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Custody address holding the reward pool
    pub address: Address,
    /// Principal allowed to wire the ledger address
    pub admin: Address,
    pub clock: SeasonClock,
    pub params: RewardParams,
}

#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) ledger: Option<Address>,
    pub(crate) volumes: VolumeLedger,
    pub(crate) snapshots: HashMap<(Address, Season), Amount>,
    pub(crate) accruals: HashMap<Address, AccrualState>,
}

impl EngineState {
    fn snapshot(&self, trader: &Address, season: Season) -> Amount {
        self.snapshots
            .get(&(*trader, season))
            .copied()
            .unwrap_or_default()
    }

    /// Compute a touch for `trader` at season `season`, reading volumes with
    /// `pending` overlaid.
    pub(crate) fn plan_touch(
        &self,
        params: &RewardParams,
        trader: &Address,
        season: Season,
        pending: Option<&VolumeUpdate>,
    ) -> Result<TouchPlan> {
        let mut accrual = self.accruals.get(trader).cloned().unwrap_or_default();
        let mut snapshots = Vec::with_capacity(2);
        let mut finalized = None;

        if let Some(prev) = accrual.last_active_season.filter(|p| *p != season) {
            let volumes = self.volumes.volumes(prev, trader, pending);
            let reward = match params.season_reward(volumes.trader, volumes.market)? {
                Some(reward) => {
                    snapshots.push((prev, reward));
                    reward
                }
                None => self.snapshot(trader, prev),
            };

            if accrual.last_finalized_season != Some(prev) {
                accrual.claimable = accrual
                    .claimable
                    .checked_add(reward)
                    .ok_or(TallyError::ArithmeticOverflow)?;
                accrual.last_finalized_season = Some(prev);
                finalized = Some((prev, reward));
            }
        }

        let volumes = self.volumes.volumes(season, trader, pending);
        if let Some(reward) = params.season_reward(volumes.trader, volumes.market)? {
            snapshots.push((season, reward));
        }
        accrual.last_active_season = Some(season);

        Ok(TouchPlan {
            trader: *trader,
            season,
            snapshots,
            finalized,
            accrual,
        })
    }

    pub(crate) fn commit(&mut self, plan: &TouchPlan) {
        for (season, reward) in &plan.snapshots {
            self.snapshots.insert((plan.trader, *season), *reward);
        }
        self.accruals.insert(plan.trader, plan.accrual.clone());
    }
}

/// Season-based reward engine
///
/// Owns the volume ledger, reward snapshots and accrual states. Volume is
/// accepted only from the wired ledger address.
pub struct RewardEngine {
    pub(crate) address: Address,
    admin: Address,
    pub(crate) params: RewardParams,
    clock: SeasonClock,
    time: Arc<dyn TimeSource>,
    pub(crate) custody: Arc<dyn ValueTransfer>,
    pub(crate) events: Arc<EventLog>,
    pub(crate) state: RwLock<EngineState>,
    pub(crate) claim_guard: ReentrancyGuard,
}

impl RewardEngine {
    pub fn new(
        config: EngineConfig,
        time: Arc<dyn TimeSource>,
        custody: Arc<dyn ValueTransfer>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            address: config.address,
            admin: config.admin,
            params: config.params,
            clock: config.clock,
            time,
            custody,
            events,
            state: RwLock::new(EngineState::default()),
            claim_guard: ReentrancyGuard::new(),
        }
    }

    /// Wire the ledger allowed to report volume. Administrator only, once.
    pub fn set_ledger_address(&self, caller: &Address, ledger: Address) -> Result<()> {
        if *caller != self.admin {
            warn!(%caller, "rejected ledger wiring from non-admin");
            return Err(TallyError::Unauthorized);
        }
        if ledger == Address::ZERO {
            return Err(TallyError::InvalidInput("ledger address is zero".to_string()));
        }

        {
            let mut state = self.state.write();
            if state.ledger.is_some() {
                return Err(TallyError::LedgerAlreadyConfigured);
            }
            state.ledger = Some(ledger);
        }

        self.events.emit(Event::LedgerAddressSet { ledger });
        Ok(())
    }

    /// Add leveraged volume for `trader` in the current season and bring the
    /// trader's reward state up to date.
    pub fn report_volume(&self, caller: &Address, trader: &Address, leveraged_amount: Amount) -> Result<()> {
        let season = self.current_season();
        let mut state = self.state.write();

        if state.ledger != Some(*caller) {
            warn!(%caller, %trader, "rejected volume report from unauthorized caller");
            return Err(TallyError::Unauthorized);
        }
        if leveraged_amount.is_zero() {
            return Err(TallyError::ZeroAmount);
        }

        let update = state.volumes.prepare(season, trader, leveraged_amount)?;
        let plan = state.plan_touch(&self.params, trader, season, Some(&update))?;

        state.volumes.apply(update);
        state.commit(&plan);
        drop(state);

        debug!(
            %trader,
            season,
            amount = %leveraged_amount,
            trader_volume = %update.trader_total,
            market_volume = %update.market_total,
            "volume recorded"
        );
        self.publish(&plan);
        Ok(())
    }

    /// What a touch made now would do, without committing it
    pub fn preview_touch(&self, trader: &Address) -> Result<TouchPlan> {
        let season = self.current_season();
        self.state.read().plan_touch(&self.params, trader, season, None)
    }

    pub(crate) fn publish(&self, plan: &TouchPlan) {
        if let Some((season, amount)) = plan.finalized {
            debug!(trader = %plan.trader, season, %amount, "season finalized");
        }
        for (season, reward) in &plan.snapshots {
            self.events.emit(Event::RewardSet {
                trader: plan.trader,
                season: *season,
                reward: *reward,
            });
        }
    }

    // === Views ===

    pub fn current_season(&self) -> Season {
        self.clock.season_at(self.time.now())
    }

    pub fn trader_season_volume(&self, season: Season, trader: &Address) -> Amount {
        self.state.read().volumes.trader_volume(season, trader)
    }

    pub fn market_season_volume(&self, season: Season) -> Amount {
        self.state.read().volumes.market_volume(season)
    }

    /// Latest snapshot for (trader, season); an estimate while the season is current
    pub fn reward_snapshot(&self, trader: &Address, season: Season) -> Amount {
        self.state.read().snapshot(trader, season)
    }

    pub fn accrual_state(&self, trader: &Address) -> AccrualState {
        self.state
            .read()
            .accruals
            .get(trader)
            .cloned()
            .unwrap_or_default()
    }

    /// Committed claimable amount
    pub fn claimable(&self, trader: &Address) -> Amount {
        self.accrual_state(trader).claimable
    }

    /// Amount a claim made now would pay out
    pub fn pending_claimable(&self, trader: &Address) -> Result<Amount> {
        Ok(self.preview_touch(trader)?.accrual.claimable)
    }

    pub fn season_summary(&self, season: Season) -> SeasonSummary {
        SeasonSummary {
            season,
            starts_at: self.clock.season_start(season),
            ends_at: self.clock.season_end(season),
            market_volume: self.market_season_volume(season),
            is_current: season == self.current_season(),
        }
    }

    /// Seasons with any recorded volume
    pub fn active_seasons(&self) -> Vec<Season> {
        self.state.read().volumes.active_seasons()
    }

    pub fn ledger_address(&self) -> Option<Address> {
        self.state.read().ledger
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Custody address of the reward pool
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn params(&self) -> RewardParams {
        self.params
    }

    pub fn clock(&self) -> SeasonClock {
        self.clock
    }
}

impl VolumeSink for RewardEngine {
    fn report_volume(&self, caller: &Address, trader: &Address, leveraged_amount: Amount) -> Result<()> {
        RewardEngine::report_volume(self, caller, trader, leveraged_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{InMemoryCustody, ManualClock, DEFAULT_SEASON_LENGTH_SECS};

    const GENESIS: Timestamp = 1_000_000;
    const PERIOD: u64 = DEFAULT_SEASON_LENGTH_SECS;

    struct Fixture {
        engine: RewardEngine,
        time: Arc<ManualClock>,
        ledger: Address,
        events: Arc<EventLog>,
    }

    fn fixture() -> Fixture {
        let time = Arc::new(ManualClock::new(GENESIS));
        let custody = Arc::new(InMemoryCustody::new());
        let events = Arc::new(EventLog::new());
        let admin = Address::from_label("admin");
        let ledger = Address::from_label("ledger");
        let config = EngineConfig {
            address: Address::from_label("pool"),
            admin,
            clock: SeasonClock::new(GENESIS, PERIOD).unwrap(),
            params: RewardParams::default(),
        };
        let engine = RewardEngine::new(config, time.clone(), custody, events.clone());
        engine.set_ledger_address(&admin, ledger).unwrap();
        Fixture {
            engine,
            time,
            ledger,
            events,
        }
    }

    fn tokens(n: u64) -> Amount {
        Amount::from(n) * Amount::exp10(18)
    }

    fn reward(trader: Amount, market: Amount) -> Amount {
        RewardParams::default()
            .season_reward(trader, market)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_first_activity_snapshots_without_claimable() {
        let f = fixture();
        let alice = Address::from_label("alice");

        f.engine.report_volume(&f.ledger, &alice, tokens(100)).unwrap();

        let state = f.engine.accrual_state(&alice);
        assert_eq!(state.last_active_season, Some(1));
        assert_eq!(state.claimable, Amount::zero());
        assert_eq!(state.last_finalized_season, None);
        assert_eq!(f.engine.reward_snapshot(&alice, 1), reward(tokens(100), tokens(100)));
    }

    #[test]
    fn test_snapshot_is_estimate_until_rollover() {
        let f = fixture();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        f.engine.report_volume(&f.ledger, &alice, tokens(100)).unwrap();
        f.engine.report_volume(&f.ledger, &bob, tokens(300)).unwrap();

        // alice's stored estimate still reflects the market before bob traded
        assert_eq!(f.engine.reward_snapshot(&alice, 1), reward(tokens(100), tokens(100)));

        f.time.advance(PERIOD);
        assert_eq!(
            f.engine.pending_claimable(&alice).unwrap(),
            reward(tokens(100), tokens(400))
        );
        // preview commits nothing
        assert_eq!(f.engine.claimable(&alice), Amount::zero());
    }

    #[test]
    fn test_rollover_finalizes_once() {
        let f = fixture();
        let alice = Address::from_label("alice");

        f.engine.report_volume(&f.ledger, &alice, tokens(10)).unwrap();
        f.time.advance(PERIOD);
        f.engine.report_volume(&f.ledger, &alice, tokens(10)).unwrap();
        f.engine.report_volume(&f.ledger, &alice, tokens(10)).unwrap();

        let state = f.engine.accrual_state(&alice);
        assert_eq!(state.claimable, reward(tokens(10), tokens(10)));
        assert_eq!(state.last_finalized_season, Some(1));
        assert_eq!(state.last_active_season, Some(2));
    }

    #[test]
    fn test_rollover_boundary() {
        let f = fixture();
        let alice = Address::from_label("alice");

        f.time.set(GENESIS + PERIOD - 1);
        assert_eq!(f.engine.current_season(), 1);
        f.engine.report_volume(&f.ledger, &alice, tokens(1)).unwrap();

        f.time.set(GENESIS + PERIOD);
        assert_eq!(f.engine.current_season(), 2);
        f.engine.report_volume(&f.ledger, &alice, tokens(2)).unwrap();

        assert_eq!(f.engine.market_season_volume(1), tokens(1));
        assert_eq!(f.engine.trader_season_volume(1, &alice), tokens(1));
        assert_eq!(f.engine.market_season_volume(2), tokens(2));
    }

    #[test]
    fn test_skipped_seasons_finalize_last_active_only() {
        let f = fixture();
        let alice = Address::from_label("alice");

        f.engine.report_volume(&f.ledger, &alice, tokens(10)).unwrap();
        f.time.advance(4 * PERIOD);
        f.engine.report_volume(&f.ledger, &alice, tokens(10)).unwrap();

        let state = f.engine.accrual_state(&alice);
        assert_eq!(state.last_finalized_season, Some(1));
        assert_eq!(state.last_active_season, Some(5));
        assert_eq!(state.claimable, reward(tokens(10), tokens(10)));
    }

    #[test]
    fn test_unauthorized_reporter() {
        let f = fixture();
        let alice = Address::from_label("alice");

        let err = f.engine.report_volume(&alice, &alice, tokens(1)).unwrap_err();
        assert_eq!(err, TallyError::Unauthorized);
        assert_eq!(f.engine.market_season_volume(1), Amount::zero());
    }

    #[test]
    fn test_unwired_engine_rejects_everyone() {
        let time = Arc::new(ManualClock::new(GENESIS));
        let config = EngineConfig {
            address: Address::from_label("pool"),
            admin: Address::from_label("admin"),
            clock: SeasonClock::with_default_period(GENESIS),
            params: RewardParams::default(),
        };
        let engine = RewardEngine::new(
            config,
            time,
            Arc::new(InMemoryCustody::new()),
            Arc::new(EventLog::new()),
        );
        let ledger = Address::from_label("ledger");
        assert_eq!(
            engine.report_volume(&ledger, &ledger, tokens(1)).unwrap_err(),
            TallyError::Unauthorized
        );
    }

    #[test]
    fn test_ledger_wiring_is_admin_only_and_once() {
        let f = fixture();
        let admin = f.engine.admin();
        let intruder = Address::from_label("intruder");

        assert_eq!(
            f.engine.set_ledger_address(&intruder, intruder).unwrap_err(),
            TallyError::Unauthorized
        );
        assert_eq!(
            f.engine.set_ledger_address(&admin, intruder).unwrap_err(),
            TallyError::LedgerAlreadyConfigured
        );
        assert_eq!(f.engine.ledger_address(), Some(f.ledger));
        assert_eq!(f.events.count("LedgerAddressSet"), 1);
    }

    #[test]
    fn test_zero_volume_rejected() {
        let f = fixture();
        let alice = Address::from_label("alice");
        assert_eq!(
            f.engine.report_volume(&f.ledger, &alice, Amount::zero()).unwrap_err(),
            TallyError::ZeroAmount
        );
        assert_eq!(f.engine.accrual_state(&alice), AccrualState::default());
    }

    #[test]
    fn test_overflow_rolls_back_whole_report() {
        let f = fixture();
        let alice = Address::from_label("alice");

        // the formula overflows long before the volume addition does
        let err = f
            .engine
            .report_volume(&f.ledger, &alice, Amount::MAX / 100u64)
            .unwrap_err();
        assert_eq!(err, TallyError::ArithmeticOverflow);
        assert_eq!(f.engine.market_season_volume(1), Amount::zero());
        assert_eq!(f.engine.accrual_state(&alice), AccrualState::default());
        assert!(f.events.count("RewardSet") == 0);
    }

    #[test]
    fn test_reward_set_events() {
        let f = fixture();
        let alice = Address::from_label("alice");

        f.engine.report_volume(&f.ledger, &alice, tokens(5)).unwrap();
        f.time.advance(PERIOD);
        f.engine.report_volume(&f.ledger, &alice, tokens(5)).unwrap();

        // one for season 1, then season 1 re-snapshot and season 2
        assert_eq!(f.events.count("RewardSet"), 3);
    }

    #[test]
    fn test_season_summary() {
        let f = fixture();
        let alice = Address::from_label("alice");
        f.engine.report_volume(&f.ledger, &alice, tokens(3)).unwrap();

        let summary = f.engine.season_summary(1);
        assert_eq!(summary.starts_at, GENESIS);
        assert_eq!(summary.ends_at, GENESIS + PERIOD);
        assert_eq!(summary.market_volume, tokens(3));
        assert!(summary.is_current);
        assert_eq!(f.engine.active_seasons(), vec![1]);
    }
}
