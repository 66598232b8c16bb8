//! # Volume Ledger
//!
//! Append-only accumulators of leveraged trading volume, per
//! `(season, trader)` and per season market-wide. There is no removal:
//! closing a position adds volume exactly like opening one.
//!
//! Recording is split into [`VolumeLedger::prepare`], which computes the new
//! totals with checked arithmetic and touches nothing, and
//! [`VolumeLedger::apply`], which commits them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tally_core::{Address, Amount, Result, Season, TallyError};

/// Pending increment computed by [`VolumeLedger::prepare`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeUpdate {
    pub season: Season,
    pub trader: Address,
    pub trader_total: Amount,
    pub market_total: Amount,
}

/// Volumes that feed the reward formula for one (trader, season)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonVolumes {
    pub trader: Amount,
    pub market: Amount,
}

#[derive(Clone, Debug, Default)]
pub struct VolumeLedger {
    trader_volume: HashMap<(Season, Address), Amount>,
    market_volume: HashMap<Season, Amount>,
}

impl VolumeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// `TraderSeasonVolume(season, trader)`, zero if never written
    pub fn trader_volume(&self, season: Season, trader: &Address) -> Amount {
        self.trader_volume
            .get(&(season, *trader))
            .copied()
            .unwrap_or_default()
    }

    /// `MarketSeasonVolume(season)`, zero if never written
    pub fn market_volume(&self, season: Season) -> Amount {
        self.market_volume.get(&season).copied().unwrap_or_default()
    }

    /// Both volumes for a (trader, season), with `pending` overlaid if it
    /// targets the same season
    pub fn volumes(&self, season: Season, trader: &Address, pending: Option<&VolumeUpdate>) -> SeasonVolumes {
        let mut volumes = SeasonVolumes {
            trader: self.trader_volume(season, trader),
            market: self.market_volume(season),
        };

        if let Some(update) = pending.filter(|u| u.season == season) {
            volumes.market = update.market_total;
            if update.trader == *trader {
                volumes.trader = update.trader_total;
            }
        }

        volumes
    }

    /// Compute the totals after adding `amount` for `trader` in `season`
    pub fn prepare(&self, season: Season, trader: &Address, amount: Amount) -> Result<VolumeUpdate> {
        let trader_total = self
            .trader_volume(season, trader)
            .checked_add(amount)
            .ok_or(TallyError::ArithmeticOverflow)?;
        let market_total = self
            .market_volume(season)
            .checked_add(amount)
            .ok_or(TallyError::ArithmeticOverflow)?;

        Ok(VolumeUpdate {
            season,
            trader: *trader,
            trader_total,
            market_total,
        })
    }

    /// Commit a prepared update
    pub fn apply(&mut self, update: VolumeUpdate) {
        self.trader_volume
            .insert((update.season, update.trader), update.trader_total);
        self.market_volume.insert(update.season, update.market_total);
    }

    /// Prepare and apply in one step
    pub fn record(&mut self, season: Season, trader: &Address, amount: Amount) -> Result<VolumeUpdate> {
        let update = self.prepare(season, trader, amount)?;
        self.apply(update);
        Ok(update)
    }

    /// Seasons that have any volume, ascending
    pub fn active_seasons(&self) -> Vec<Season> {
        let mut seasons: Vec<Season> = self.market_volume.keys().copied().collect();
        seasons.sort_unstable();
        seasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut ledger = VolumeLedger::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        ledger.record(1, &alice, Amount::from(100u64)).unwrap();
        ledger.record(1, &bob, Amount::from(50u64)).unwrap();
        ledger.record(1, &alice, Amount::from(25u64)).unwrap();
        ledger.record(2, &bob, Amount::from(10u64)).unwrap();

        assert_eq!(ledger.trader_volume(1, &alice), Amount::from(125u64));
        assert_eq!(ledger.trader_volume(1, &bob), Amount::from(50u64));
        assert_eq!(ledger.market_volume(1), Amount::from(175u64));
        assert_eq!(ledger.market_volume(2), Amount::from(10u64));
        assert_eq!(ledger.trader_volume(2, &alice), Amount::zero());
        assert_eq!(ledger.active_seasons(), vec![1, 2]);
    }

    #[test]
    fn test_prepare_does_not_mutate() {
        let mut ledger = VolumeLedger::new();
        let alice = Address::from_label("alice");
        ledger.record(1, &alice, Amount::from(5u64)).unwrap();

        let update = ledger.prepare(1, &alice, Amount::from(7u64)).unwrap();
        assert_eq!(update.trader_total, Amount::from(12u64));
        assert_eq!(ledger.trader_volume(1, &alice), Amount::from(5u64));

        let seen = ledger.volumes(1, &alice, Some(&update));
        assert_eq!(seen.trader, Amount::from(12u64));
        assert_eq!(seen.market, Amount::from(12u64));
    }

    #[test]
    fn test_overlay_for_other_trader_only_moves_market() {
        let mut ledger = VolumeLedger::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        ledger.record(1, &alice, Amount::from(5u64)).unwrap();

        let update = ledger.prepare(1, &bob, Amount::from(5u64)).unwrap();
        let seen = ledger.volumes(1, &alice, Some(&update));
        assert_eq!(seen.trader, Amount::from(5u64));
        assert_eq!(seen.market, Amount::from(10u64));

        let other_season = ledger.volumes(2, &alice, Some(&update));
        assert_eq!(other_season, SeasonVolumes::default());
    }

    #[test]
    fn test_overflow_leaves_ledger_untouched() {
        let mut ledger = VolumeLedger::new();
        let alice = Address::from_label("alice");
        ledger.record(1, &alice, Amount::MAX).unwrap();

        let err = ledger.record(1, &alice, Amount::one()).unwrap_err();
        assert_eq!(err, TallyError::ArithmeticOverflow);
        assert_eq!(ledger.trader_volume(1, &alice), Amount::MAX);
        assert_eq!(ledger.market_volume(1), Amount::MAX);
    }
}
