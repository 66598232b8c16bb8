//! Tally CLI
//!
//! Replays trading scenarios and inspects season and reward arithmetic.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tally_core::{format_units, parse_units, SystemTimeSource, TimeSource, Timestamp};
use tally_node::{LoggingConfig, Scenario, TallyConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Tally - leveraged trading ledger with season-based volume rewards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file against a fresh market
    Simulate {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Configuration file path
        #[arg(short, long, env = "TALLY_CONFIG")]
        config: Option<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the season index and window at a point in time
    Season {
        /// Unix timestamp (defaults to now)
        #[arg(long)]
        at: Option<Timestamp>,

        /// Configuration file path
        #[arg(short, long, env = "TALLY_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Evaluate the season reward formula
    Reward {
        /// Trader's leveraged volume for the season (tokens)
        #[arg(long)]
        trader_volume: String,

        /// Market-wide leveraged volume for the season (tokens)
        #[arg(long)]
        market_volume: String,

        /// Configuration file path
        #[arg(short, long, env = "TALLY_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "tally.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Version information
    Version,
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TallyConfig> {
    TallyConfig::load(path).with_context(|| match path {
        Some(path) => format!("loading config {}", path.display()),
        None => "loading config from environment".to_string(),
    })
}

/// Genesis 0 means "now"
fn resolve_genesis(config: &mut TallyConfig) {
    if config.market.genesis_time == 0 {
        config.market.genesis_time = SystemTimeSource.now();
    }
}

fn format_time(t: Timestamp) -> String {
    i64::try_from(t)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| t.to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            scenario,
            config,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            init_logging(cli.verbose, &config.logging);
            resolve_genesis(&mut config);

            let scenario = Scenario::from_file(&scenario)?;
            let report = scenario.replay(&config)?;

            if json {
                println!("{}", report.to_json()?);
                return Ok(());
            }

            println!("Steps run: {}", report.steps_run);
            println!("Final season: {}", report.final_season);
            println!("Events: {}", report.events);
            for failure in &report.failures {
                println!(
                    "  step {} ({}) failed [{}]: {}",
                    failure.index, failure.action, failure.code, failure.error
                );
            }
            if report.stopped_early {
                println!("Stopped at first failure");
            }
            println!();
            for trader in &report.traders {
                println!("{} ({})", trader.name, trader.address);
                println!("  wallet:    {}", trader.wallet);
                println!("  balance:   {}", trader.balance);
                match &trader.position {
                    Some(p) => println!("  position:  {} {} x{}", p.side, p.amount, p.leverage),
                    None => println!("  position:  none"),
                }
                println!("  claimable: {} (pending {})", trader.claimable, trader.pending_claimable);
                println!("  claimed:   {}", trader.claimed);
            }
            println!();
            for season in &report.seasons {
                println!("Season {}: market volume {}", season.season, season.market_volume);
            }
        }

        Commands::Season { at, config } => {
            let mut config = load_config(config.as_deref())?;
            init_logging(cli.verbose, &config.logging);
            resolve_genesis(&mut config);

            let clock = config.season_clock(config.market.genesis_time)?;
            let t = at.unwrap_or_else(|| SystemTimeSource.now());
            let season = clock.season_at(t);

            println!("Season: {}", season);
            println!("Starts: {}", format_time(clock.season_start(season)));
            println!("Ends:   {}", format_time(clock.season_end(season)));
            println!("Next season in {}s", clock.seconds_until_next(t));
        }

        Commands::Reward {
            trader_volume,
            market_volume,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            init_logging(cli.verbose, &config.logging);

            let decimals = config.rewards.scale_decimals;
            let params = config.reward_params()?;
            let trader_volume = parse_units(&trader_volume, decimals)?;
            let market_volume = parse_units(&market_volume, decimals)?;
            anyhow::ensure!(
                trader_volume <= market_volume,
                "trader volume exceeds market volume"
            );

            match params.season_reward(trader_volume, market_volume)? {
                Some(reward) => {
                    println!("Reward: {}", format_units(reward, decimals));
                    println!("Base units: {}", reward);
                }
                None => println!("Reward: none (zero volume)"),
            }
        }

        Commands::InitConfig { output, force } => {
            init_logging(cli.verbose, &LoggingConfig::default());
            anyhow::ensure!(
                force || !output.exists(),
                "{} already exists (use --force to overwrite)",
                output.display()
            );

            let text = TallyConfig::default().to_toml()?;
            std::fs::write(&output, text)
                .with_context(|| format!("writing {}", output.display()))?;
            tracing::info!(path = %output.display(), "config written");
            println!("Config written to {}", output.display());
        }

        Commands::Version => {
            println!("tally v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Reward rate: {}/{} per season", tally_economics::REWARD_RATE, tally_economics::REWARD_RATE_DIVISOR);
            println!("Season length: {}s", tally_economics::SEASON_LENGTH_SECS);
        }
    }

    Ok(())
}
