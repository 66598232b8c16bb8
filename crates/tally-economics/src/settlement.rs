//! # Claim Settlement
//!
//! A claim touches the trader (finalizing any season that closed since
//! their last action), pays the whole claimable amount out of the reward
//! pool, and zeroes it. The touch is only committed once the transfer has
//! succeeded, so a failed claim leaves no trace.

use tally_core::{Address, Amount, Event, Result, TallyError};
use tracing::{info, warn};

use crate::accrual::RewardEngine;

impl RewardEngine {
    /// Pay out everything `trader` has accrued, returning the amount paid
    pub fn claim(&self, trader: &Address) -> Result<Amount> {
        let _token = self.claim_guard.enter().map_err(|e| {
            warn!(%trader, "re-entrant claim rejected");
            e
        })?;

        let season = self.current_season();
        let plan = self
            .state
            .read()
            .plan_touch(&self.params, trader, season, None)?;

        let amount = plan.accrual.claimable;
        if amount.is_zero() {
            return Err(TallyError::NoRewardToClaim);
        }

        self.custody
            .transfer(&self.address, trader, amount)
            .map_err(|e| {
                warn!(%trader, %amount, error = %e, "reward payout failed");
                TallyError::ExternalTransferFailed(e.to_string())
            })?;

        // Re-plan under the write lock so anything committed while the
        // transfer was outstanding is kept; only the paid amount is removed.
        let settled = {
            let mut state = self.state.write();
            let mut settled = state.plan_touch(&self.params, trader, season, None)?;
            settled.accrual.claimable = settled.accrual.claimable.saturating_sub(amount);
            state.commit(&settled);
            settled
        };

        self.publish(&settled);
        self.events.emit(Event::RewardClaimed {
            trader: *trader,
            amount,
        });
        info!(%trader, %amount, season, "reward claimed");
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use crate::accrual::{AccrualState, EngineConfig, RewardEngine};
    use crate::rewards::RewardParams;
    use parking_lot::Mutex;
    use std::sync::{Arc, Weak};
    use tally_core::{
        Address, Amount, EventLog, InMemoryCustody, ManualClock, SeasonClock, TallyError,
        TransferError, ValueTransfer, DEFAULT_SEASON_LENGTH_SECS,
    };

    const GENESIS: u64 = 0;
    const PERIOD: u64 = DEFAULT_SEASON_LENGTH_SECS;

    fn tokens(n: u64) -> Amount {
        Amount::from(n) * Amount::exp10(18)
    }

    fn build(custody: Arc<dyn ValueTransfer>) -> (Arc<RewardEngine>, Arc<ManualClock>, Address) {
        let time = Arc::new(ManualClock::new(GENESIS));
        let admin = Address::from_label("admin");
        let ledger = Address::from_label("ledger");
        let config = EngineConfig {
            address: Address::from_label("pool"),
            admin,
            clock: SeasonClock::new(GENESIS, PERIOD).unwrap(),
            params: RewardParams::default(),
        };
        let engine = Arc::new(RewardEngine::new(
            config,
            time.clone(),
            custody,
            Arc::new(EventLog::new()),
        ));
        engine.set_ledger_address(&admin, ledger).unwrap();
        (engine, time, ledger)
    }

    #[test]
    fn test_claim_pays_finalized_reward() {
        let custody = Arc::new(InMemoryCustody::new());
        custody.mint(Address::from_label("pool"), tokens(1_000));
        let (engine, time, ledger) = build(custody.clone());
        let alice = Address::from_label("alice");

        engine.report_volume(&ledger, &alice, tokens(10)).unwrap();
        time.advance(PERIOD);

        let paid = engine.claim(&alice).unwrap();
        assert_eq!(paid, Amount::from(387_000_000_000_000_000u64));
        assert_eq!(custody.balance_of(&alice), paid);

        let state = engine.accrual_state(&alice);
        assert_eq!(state.claimable, Amount::zero());
        assert_eq!(state.last_finalized_season, Some(1));
        assert_eq!(state.last_active_season, Some(2));

        // season 1 is never credited again
        assert_eq!(engine.claim(&alice).unwrap_err(), TallyError::NoRewardToClaim);
    }

    #[test]
    fn test_claim_in_current_season_has_nothing() {
        let custody = Arc::new(InMemoryCustody::new());
        custody.mint(Address::from_label("pool"), tokens(1_000));
        let (engine, _time, ledger) = build(custody);
        let alice = Address::from_label("alice");

        engine.report_volume(&ledger, &alice, tokens(10)).unwrap();
        let before = engine.accrual_state(&alice);

        assert_eq!(engine.claim(&alice).unwrap_err(), TallyError::NoRewardToClaim);
        assert_eq!(engine.accrual_state(&alice), before);
    }

    #[test]
    fn test_empty_claim_changes_nothing() {
        let custody = Arc::new(InMemoryCustody::new());
        let (engine, time, _ledger) = build(custody);
        let nobody = Address::from_label("nobody");
        time.advance(3 * PERIOD);

        assert_eq!(engine.claim(&nobody).unwrap_err(), TallyError::NoRewardToClaim);
        assert_eq!(engine.accrual_state(&nobody), AccrualState::default());
    }

    #[test]
    fn test_failed_transfer_keeps_claimable_and_pending_finalization() {
        let custody = Arc::new(InMemoryCustody::new());
        let (engine, time, ledger) = build(custody.clone());
        let alice = Address::from_label("alice");

        engine.report_volume(&ledger, &alice, tokens(10)).unwrap();
        time.advance(PERIOD);
        let before = engine.accrual_state(&alice);

        // pool is unfunded
        let err = engine.claim(&alice).unwrap_err();
        assert!(matches!(err, TallyError::ExternalTransferFailed(_)));
        assert_eq!(engine.accrual_state(&alice), before);

        custody.mint(engine.address(), tokens(1));
        assert_eq!(engine.claim(&alice).unwrap(), Amount::from(387_000_000_000_000_000u64));
    }

    /// Custody that calls back into the engine while a payout is outstanding
    struct ReentrantCustody {
        inner: InMemoryCustody,
        engine: Mutex<Weak<RewardEngine>>,
        nested: Mutex<Option<Result<Amount, TallyError>>>,
    }

    impl ValueTransfer for ReentrantCustody {
        fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
            let engine = self.engine.lock().upgrade();
            if let Some(engine) = engine {
                let nested = engine.claim(to);
                *self.nested.lock() = Some(nested);
            }
            self.inner.transfer(from, to, amount)
        }

        fn balance_of(&self, owner: &Address) -> Amount {
            self.inner.balance_of(owner)
        }
    }

    #[test]
    fn test_reentrant_claim_rejected() {
        let custody = Arc::new(ReentrantCustody {
            inner: InMemoryCustody::new(),
            engine: Mutex::new(Weak::new()),
            nested: Mutex::new(None),
        });
        custody.inner.mint(Address::from_label("pool"), tokens(1_000));
        let (engine, time, ledger) = build(custody.clone());
        *custody.engine.lock() = Arc::downgrade(&engine);
        let alice = Address::from_label("alice");

        engine.report_volume(&ledger, &alice, tokens(10)).unwrap();
        time.advance(PERIOD);

        let paid = engine.claim(&alice).unwrap();
        assert_eq!(custody.nested.lock().clone(), Some(Err(TallyError::Reentrancy)));
        assert_eq!(custody.balance_of(&alice), paid);
        assert_eq!(engine.claimable(&alice), Amount::zero());
    }
}
