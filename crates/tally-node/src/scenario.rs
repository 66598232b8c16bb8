//! # Scenario Replay
//!
//! A scenario is a TOML script of trader actions replayed against a fresh
//! market with a manual clock:
//!
//! ```toml
//! stop_on_error = false
//!
//! [[traders]]
//! name = "alice"
//! funds = "100000"
//!
//! [[steps]]
//! action = "deposit"
//! trader = "alice"
//! amount = "10000"
//!
//! [[steps]]
//! action = "open"
//! trader = "alice"
//! amount = "10000"
//! side = "long"
//! leverage = 10
//!
//! [[steps]]
//! action = "advance_seasons"
//! seasons = 1
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tally_core::{
    format_units, parse_units, Address, Amount, Leverage, Season, Side, TallyError, TimeSource,
    Timestamp, ValueTransfer,
};
use tracing::{debug, info, warn};

use crate::config::TallyConfig;
use crate::error::{NodeError, Result};
use crate::market::Market;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    /// Stop at the first failed step instead of recording it and continuing
    #[serde(default)]
    pub stop_on_error: bool,

    #[serde(default)]
    pub traders: Vec<TraderSetup>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TraderSetup {
    pub name: String,
    /// Wallet funds minted at genesis (decimal string)
    #[serde(default)]
    pub funds: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Deposit { trader: String, amount: String },
    Withdraw { trader: String, amount: String },
    Open {
        trader: String,
        amount: String,
        side: Side,
        leverage: Leverage,
    },
    Increase { trader: String, amount: String },
    Close { trader: String, amount: String },
    Claim { trader: String },
    Advance { secs: u64 },
    AdvanceSeasons { seasons: u64 },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::Open { .. } => "open",
            Self::Increase { .. } => "increase",
            Self::Close { .. } => "close",
            Self::Claim { .. } => "claim",
            Self::Advance { .. } => "advance",
            Self::AdvanceSeasons { .. } => "advance_seasons",
        }
    }

    pub fn trader(&self) -> Option<&str> {
        match self {
            Self::Deposit { trader, .. }
            | Self::Withdraw { trader, .. }
            | Self::Open { trader, .. }
            | Self::Increase { trader, .. }
            | Self::Close { trader, .. }
            | Self::Claim { trader } => Some(trader),
            Self::Advance { .. } | Self::AdvanceSeasons { .. } => None,
        }
    }
}

/// A step that was rejected
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub index: usize,
    pub action: String,
    pub code: u32,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionReport {
    pub side: Side,
    pub leverage: Leverage,
    pub amount: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderReport {
    pub name: String,
    pub address: String,
    /// Custody balance outside the ledger
    pub wallet: String,
    /// Free collateral in the ledger
    pub balance: String,
    pub position: Option<PositionReport>,
    /// Finalized, unclaimed reward
    pub claimable: String,
    /// Claimable after a touch made now
    pub pending_claimable: String,
    /// Total paid out by claims during replay
    pub claimed: String,
    /// Leveraged volume per season
    pub volumes: BTreeMap<Season, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonReport {
    pub season: Season,
    pub starts_at: Timestamp,
    pub market_volume: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub steps_run: usize,
    pub stopped_early: bool,
    pub failures: Vec<StepFailure>,
    pub final_time: Timestamp,
    pub final_season: Season,
    pub traders: Vec<TraderReport>,
    pub seasons: Vec<SeasonReport>,
    pub events: usize,
}

impl ScenarioReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn trader(&self, name: &str) -> Option<&TraderReport> {
        self.traders.iter().find(|t| t.name == name)
    }
}

impl Scenario {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let scenario: Self = toml::from_str(s)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// Trader names must be unique and every step must name a declared trader
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for trader in &self.traders {
            if !names.insert(trader.name.as_str()) {
                return Err(NodeError::Scenario(format!("duplicate trader {}", trader.name)));
            }
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(name) = step.trader() {
                if !names.contains(name) {
                    return Err(NodeError::Scenario(format!(
                        "step {} ({}) names unknown trader {}",
                        index,
                        step.name(),
                        name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Replay against a fresh market built from `config`
    pub fn replay(&self, config: &TallyConfig) -> Result<ScenarioReport> {
        self.validate()?;
        let market = Market::genesis(config, config.market.genesis_time)?;
        let decimals = market.decimals();

        let mut addresses = BTreeMap::new();
        for setup in &self.traders {
            let funds = match &setup.funds {
                Some(funds) => parse_units(funds, decimals)?,
                None => Amount::zero(),
            };
            addresses.insert(setup.name.clone(), market.fund_trader(&setup.name, funds));
        }

        let mut claimed: BTreeMap<Address, Amount> = BTreeMap::new();
        let mut failures = Vec::new();
        let mut steps_run = 0;
        let mut stopped_early = false;

        for (index, step) in self.steps.iter().enumerate() {
            steps_run += 1;
            match run_step(&market, &addresses, step, decimals) {
                Ok(Some((trader, paid))) => {
                    let total = claimed.entry(trader).or_default();
                    *total = total.saturating_add(paid);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(index, action = step.name(), error = %e, "step rejected");
                    failures.push(StepFailure {
                        index,
                        action: step.name().to_string(),
                        code: e.code(),
                        error: e.to_string(),
                    });
                    if self.stop_on_error {
                        warn!(index, "stopping replay at first failure");
                        stopped_early = true;
                        break;
                    }
                }
            }
        }

        let report = build_report(&market, &self.traders, &addresses, &claimed, ReplayOutcome {
            steps_run,
            stopped_early,
            failures,
        })?;
        info!(
            steps = report.steps_run,
            failures = report.failures.len(),
            season = report.final_season,
            "scenario replayed"
        );
        Ok(report)
    }
}

/// Run one step; claims return the trader and amount paid
fn run_step(
    market: &Market,
    addresses: &BTreeMap<String, Address>,
    step: &Step,
    decimals: u32,
) -> std::result::Result<Option<(Address, Amount)>, TallyError> {
    let lookup = |name: &str| {
        addresses
            .get(name)
            .copied()
            .ok_or_else(|| TallyError::InvalidInput(format!("unknown trader {}", name)))
    };
    let units = |amount: &str| parse_units(amount, decimals);

    match step {
        Step::Deposit { trader, amount } => market.ledger.deposit(&lookup(trader)?, units(amount)?)?,
        Step::Withdraw { trader, amount } => market.ledger.withdraw(&lookup(trader)?, units(amount)?)?,
        Step::Open {
            trader,
            amount,
            side,
            leverage,
        } => market
            .ledger
            .open(&lookup(trader)?, units(amount)?, *side, *leverage)?,
        Step::Increase { trader, amount } => market.ledger.increase(&lookup(trader)?, units(amount)?)?,
        Step::Close { trader, amount } => market.ledger.close(&lookup(trader)?, units(amount)?)?,
        Step::Claim { trader } => {
            let trader = lookup(trader)?;
            let paid = market.engine.claim(&trader)?;
            return Ok(Some((trader, paid)));
        }
        Step::Advance { secs } => {
            market.time.try_advance(*secs)?;
        }
        Step::AdvanceSeasons { seasons } => {
            market.advance_seasons(*seasons)?;
        }
    }
    Ok(None)
}

struct ReplayOutcome {
    steps_run: usize,
    stopped_early: bool,
    failures: Vec<StepFailure>,
}

fn build_report(
    market: &Market,
    traders: &[TraderSetup],
    addresses: &BTreeMap<String, Address>,
    claimed: &BTreeMap<Address, Amount>,
    outcome: ReplayOutcome,
) -> Result<ScenarioReport> {
    let decimals = market.decimals();
    let fmt = |amount: Amount| format_units(amount, decimals);
    let seasons = market.engine.active_seasons();

    let mut trader_reports = Vec::with_capacity(traders.len());
    for setup in traders {
        let Some(address) = addresses.get(&setup.name).copied() else {
            continue;
        };

        let volumes = seasons
            .iter()
            .map(|s| (*s, market.engine.trader_season_volume(*s, &address)))
            .filter(|(_, v)| !v.is_zero())
            .map(|(s, v)| (s, fmt(v)))
            .collect();

        trader_reports.push(TraderReport {
            name: setup.name.clone(),
            address: format!("0x{}", address.to_hex()),
            wallet: fmt(market.custody.balance_of(&address)),
            balance: fmt(market.ledger.balance(&address)),
            position: market.ledger.position(&address).map(|p| PositionReport {
                side: p.side,
                leverage: p.leverage,
                amount: fmt(p.amount),
            }),
            claimable: fmt(market.engine.claimable(&address)),
            pending_claimable: fmt(market.engine.pending_claimable(&address)?),
            claimed: fmt(claimed.get(&address).copied().unwrap_or_default()),
            volumes,
        });
    }

    let season_reports = seasons
        .iter()
        .map(|s| {
            let summary = market.engine.season_summary(*s);
            SeasonReport {
                season: summary.season,
                starts_at: summary.starts_at,
                market_volume: fmt(summary.market_volume),
            }
        })
        .collect();

    Ok(ScenarioReport {
        steps_run: outcome.steps_run,
        stopped_early: outcome.stopped_early,
        failures: outcome.failures,
        final_time: market.time.now(),
        final_season: market.engine.current_season(),
        traders: trader_reports,
        seasons: season_reports,
        events: market.events.len(),
    })
}
