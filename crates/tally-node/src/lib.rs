//! # Tally Node
//!
//! Glue between configuration and the market components: loads
//! [`TallyConfig`], performs genesis (engine, ledger, custody, event log,
//! ledger wiring and reward pool funding) and replays scripted scenarios.

pub mod config;
pub mod error;
pub mod market;
pub mod scenario;

pub use self::config::{LoggingConfig, MarketConfig, RewardsConfig, TallyConfig};
pub use error::{NodeError, Result};
pub use market::{principals, Market};
pub use scenario::{Scenario, ScenarioReport, Step, StepFailure, TraderReport};
