//! Season clock and time sources
//!
//! Seasons are fixed-length epochs counted from an immutable genesis time:
//!
//! ```text
//! season(t) = floor((t - genesis) / period) + 1
//! ```
//!
//! The clock is a pure function of the observed time. Components read "now"
//! from a [`TimeSource`], which lets tests and scenario replay drive time
//! explicitly.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, TallyError};
use crate::types::{Season, Timestamp};

/// Thirty days in seconds
pub const DEFAULT_SEASON_LENGTH_SECS: u64 = 30 * 24 * 3600;

/// Maps timestamps to season indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonClock {
    genesis: Timestamp,
    period: u64,
}

impl SeasonClock {
    /// Create a clock; the period must be non-zero
    pub fn new(genesis: Timestamp, period: u64) -> Result<Self> {
        if period == 0 {
            return Err(TallyError::InvalidConfig(
                "season length must be greater than zero".to_string(),
            ));
        }
        Ok(Self { genesis, period })
    }

    /// Clock with the standard 30-day season
    pub fn with_default_period(genesis: Timestamp) -> Self {
        Self {
            genesis,
            period: DEFAULT_SEASON_LENGTH_SECS,
        }
    }

    pub fn genesis(&self) -> Timestamp {
        self.genesis
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Season index at `t`. Timestamps before genesis belong to season 1.
    pub fn season_at(&self, t: Timestamp) -> Season {
        t.saturating_sub(self.genesis) / self.period + 1
    }

    /// First second of `season`
    pub fn season_start(&self, season: Season) -> Timestamp {
        season
            .saturating_sub(1)
            .saturating_mul(self.period)
            .saturating_add(self.genesis)
    }

    /// First second after `season` (exclusive end), capped at `u64::MAX`
    pub fn season_end(&self, season: Season) -> Timestamp {
        self.season_start(season).saturating_add(self.period)
    }

    /// Seconds remaining until the season containing `t` rolls over
    pub fn seconds_until_next(&self, t: Timestamp) -> u64 {
        self.season_end(self.season_at(t))
            .saturating_sub(t.max(self.genesis))
    }
}

/// Source of the current time
pub trait TimeSource: Send + Sync {
    /// Current unix time in seconds
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Manually driven clock for tests and replay
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, t: Timestamp) {
        self.now.fetch_max(t, Ordering::SeqCst);
    }

    /// Move forward by `secs`, returning the new time. Stops at `u64::MAX`.
    pub fn advance(&self, secs: u64) -> Timestamp {
        let prev = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_add(secs))
            })
            .unwrap_or_else(|n| n);
        prev.saturating_add(secs)
    }

    /// Move forward by `secs`, failing without moving if the time would overflow
    pub fn try_advance(&self, secs: u64) -> Result<Timestamp> {
        let prev = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(secs))
            .map_err(|_| TallyError::ArithmeticOverflow)?;
        Ok(prev + secs)
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENESIS: Timestamp = 1_700_000_000;

    #[test]
    fn test_season_boundaries() {
        let clock = SeasonClock::with_default_period(GENESIS);
        let period = DEFAULT_SEASON_LENGTH_SECS;

        assert_eq!(clock.season_at(GENESIS), 1);
        assert_eq!(clock.season_at(GENESIS + period - 1), 1);
        assert_eq!(clock.season_at(GENESIS + period), 2);
        assert_eq!(clock.season_at(GENESIS + 5 * period + 7), 6);
    }

    #[test]
    fn test_before_genesis_is_season_one() {
        let clock = SeasonClock::with_default_period(GENESIS);
        assert_eq!(clock.season_at(0), 1);
    }

    #[test]
    fn test_season_window() {
        let clock = SeasonClock::new(100, 10).unwrap();
        assert_eq!(clock.season_start(1), 100);
        assert_eq!(clock.season_end(1), 110);
        assert_eq!(clock.season_start(3), 120);
        assert_eq!(clock.seconds_until_next(105), 5);
        assert_eq!(clock.seconds_until_next(110), 10);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(
            SeasonClock::new(0, 0),
            Err(TallyError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.advance(5), 15);
        clock.set(12);
        assert_eq!(clock.now(), 15);
        clock.set(40);
        assert_eq!(clock.now(), 40);
    }

    #[test]
    fn test_manual_clock_never_wraps() {
        let clock = ManualClock::new(GENESIS);
        let seasons = SeasonClock::with_default_period(GENESIS);

        clock.advance(u64::MAX - GENESIS);
        let last = seasons.season_at(clock.now());
        assert_eq!(clock.advance(10), u64::MAX);
        assert_eq!(seasons.season_at(clock.now()), last);

        assert_eq!(clock.try_advance(1).unwrap_err(), TallyError::ArithmeticOverflow);
        assert_eq!(clock.now(), u64::MAX);
        assert_eq!(clock.try_advance(0).unwrap(), u64::MAX);
    }

    #[test]
    fn test_window_near_max_time() {
        let clock = SeasonClock::with_default_period(GENESIS);
        let t = u64::MAX - 1;
        let season = clock.season_at(t);

        assert!(clock.season_start(season) <= t);
        assert_eq!(clock.season_end(season), u64::MAX);
        assert_eq!(clock.seconds_until_next(t), 1);
        assert_eq!(clock.season_end(u64::MAX), u64::MAX);
    }

    proptest::proptest! {
        #[test]
        fn prop_season_is_monotonic_and_windowed(
            genesis in 0u64..1_000_000_000,
            period in 1u64..10_000_000,
            t in 0u64..2_000_000_000,
            dt in 0u64..100_000_000,
        ) {
            let clock = SeasonClock::new(genesis, period).unwrap();
            let season = clock.season_at(t);
            proptest::prop_assert!(season >= 1);
            proptest::prop_assert!(clock.season_at(t + dt) >= season);
            if t >= genesis {
                proptest::prop_assert!(clock.season_start(season) <= t);
                proptest::prop_assert!(t < clock.season_end(season));
            }
        }
    }
}
