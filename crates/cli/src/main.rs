//! Candle replay CLI.
//!
//! Commands:
//! - `run`: replay a candle series through the buy-and-hold policy, store
//!   the ledger and print the run summary

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use replay_backtest::{open_store, Simulator};
use replay_core::config::StoreKind;
use replay_core::time::parse_date_time;
use replay_core::Config;
use replay_ingestion::{CandleSource, JsonFileSource, UpbitClient};
use replay_strategy::BuyAndHold;

#[derive(Parser)]
#[command(name = "replay", about = "Candle replay trading simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay candles through the virtual market.
    Run {
        /// Path to a JSON config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Last candle time (YYYY-MM-DDTHH:MM:SS, KST). Defaults to now.
        #[arg(long)]
        end: Option<String>,

        /// Number of candles to replay.
        #[arg(long)]
        count: Option<usize>,

        /// Starting cash.
        #[arg(long)]
        budget: Option<f64>,

        /// Minimum order value.
        #[arg(long)]
        min_price: Option<f64>,

        /// Saved candle API response to replay instead of fetching.
        #[arg(long)]
        candles: Option<PathBuf>,

        /// Output directory for the ledger.
        #[arg(long)]
        output: Option<String>,

        /// Ledger storage backend: json or sqlite.
        #[arg(long)]
        store: Option<StoreKind>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            end,
            count,
            budget,
            min_price,
            candles,
            output,
            store,
        } => {
            let mut cfg = match config {
                Some(path) => Config::from_json_file(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(end) = end {
                parse_date_time(&end).with_context(|| format!("invalid --end '{end}'"))?;
                cfg.simulation.end = Some(end);
            }
            if let Some(count) = count {
                cfg.simulation.count = count;
            }
            if let Some(budget) = budget {
                cfg.simulation.budget = budget;
            }
            if let Some(min_price) = min_price {
                cfg.simulation.min_price = min_price;
            }
            if let Some(output) = output {
                cfg.output.dir = output;
            }
            if let Some(store) = store {
                cfg.output.store = store;
            }
            cfg.validate().context("invalid configuration")?;

            run_simulation(&cfg, candles)
        }
    }
}

fn run_simulation(cfg: &Config, candles: Option<PathBuf>) -> Result<()> {
    let source: Box<dyn CandleSource> = match candles {
        Some(path) => {
            info!(path = %path.display(), "replaying saved candles");
            Box::new(JsonFileSource::new(path))
        }
        None => Box::new(
            UpbitClient::new(&cfg.market).context("failed to create candle client")?,
        ),
    };
    let strategy = BuyAndHold::new(true, cfg.market.commission_ratio);

    let mut simulator = Simulator::new(cfg, source, Box::new(strategy));
    simulator.initialize().context("failed to initialize simulation")?;
    let summary = simulator.run().context("simulation failed")?;

    open_store(&cfg.output)
        .save(&simulator.records(), &summary)
        .with_context(|| format!("failed to save ledger to {}", cfg.output.dir))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
