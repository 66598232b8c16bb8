//! Market configuration
//!
//! Loaded from an optional TOML file layered with `TALLY__`-prefixed
//! environment variables, e.g. `TALLY__MARKET__MAX_LEVERAGE=50`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_core::{parse_units, Amount, SeasonClock, Timestamp, DEFAULT_SEASON_LENGTH_SECS};
use tally_economics::{RewardParams, REWARD_RATE, REWARD_RATE_DIVISOR, SCALE_DECIMALS};
use tally_ledger::DEFAULT_MAX_LEVERAGE;

use crate::error::{NodeError, Result};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "TALLY";

/// Complete market configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Season and position parameters
    #[serde(default)]
    pub market: MarketConfig,

    /// Reward formula and pool
    #[serde(default)]
    pub rewards: RewardsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TallyConfig {
    /// Load from `path` (if given) with environment overrides on top
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.market.season_length_secs == 0 {
            return Err(NodeError::InvalidConfig(
                "market.season_length_secs must be positive".to_string(),
            ));
        }
        if self.market.max_leverage == 0 {
            return Err(NodeError::InvalidConfig(
                "market.max_leverage must be at least 1".to_string(),
            ));
        }
        if self.rewards.divisor == 0 {
            return Err(NodeError::InvalidConfig(
                "rewards.divisor must be positive".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(NodeError::InvalidConfig(format!(
                "logging.format must be \"text\" or \"json\", got {:?}",
                self.logging.format
            )));
        }
        self.reward_params()?;
        self.pool_funding()?;
        Ok(())
    }

    pub fn reward_params(&self) -> Result<RewardParams> {
        Ok(RewardParams::new(
            self.rewards.rate,
            self.rewards.divisor,
            self.rewards.scale_decimals,
        )?)
    }

    /// Season clock anchored at `genesis`
    pub fn season_clock(&self, genesis: Timestamp) -> Result<SeasonClock> {
        Ok(SeasonClock::new(genesis, self.market.season_length_secs)?)
    }

    /// Reward pool funding in base units
    pub fn pool_funding(&self) -> Result<Amount> {
        Ok(parse_units(&self.rewards.pool_funding, self.rewards.scale_decimals)?)
    }
}

/// Season and position parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Genesis as unix seconds; 0 means "now" when launched from the CLI
    #[serde(default)]
    pub genesis_time: Timestamp,

    #[serde(default = "default_season_length")]
    pub season_length_secs: u64,

    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
}

fn default_season_length() -> u64 {
    DEFAULT_SEASON_LENGTH_SECS
}

fn default_max_leverage() -> u32 {
    DEFAULT_MAX_LEVERAGE
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            genesis_time: 0,
            season_length_secs: default_season_length(),
            max_leverage: default_max_leverage(),
        }
    }
}

/// Reward formula constants and pool size
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardsConfig {
    #[serde(default = "default_rate")]
    pub rate: u64,

    #[serde(default = "default_divisor")]
    pub divisor: u64,

    #[serde(default = "default_scale_decimals")]
    pub scale_decimals: u32,

    /// Tokens minted into the reward pool at genesis (decimal string)
    #[serde(default = "default_pool_funding")]
    pub pool_funding: String,
}

fn default_rate() -> u64 {
    REWARD_RATE
}

fn default_divisor() -> u64 {
    REWARD_RATE_DIVISOR
}

fn default_scale_decimals() -> u32 {
    SCALE_DECIMALS
}

fn default_pool_funding() -> String {
    "1000000".to_string()
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            divisor: default_divisor(),
            scale_decimals: default_scale_decimals(),
            pool_funding: default_pool_funding(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
