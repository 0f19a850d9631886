//! Arbitrage Detector Service
//!
//! Joins harvested venue catalogs against Steam reference prices and
//! surfaces ranked buy-here-sell-on-Steam opportunities.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use common::{
    AppConfig, PathRegistry, ProfitConfig, ProfitEngine, ProfitMode, ScrapeError,
};
use tokio::time::sleep;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Arbitrage Detector - ranks cross-venue opportunities
#[derive(Parser, Debug)]
#[command(name = "arb-detector")]
#[command(about = "Finds items cheaper on third-party venues than their net Steam price")]
struct Args {
    /// Fee handling: fast (gross) or complete (net of Steam fees)
    #[arg(long, default_value = "complete")]
    mode: String,

    /// Minimum profit percentage, e.g. 5 for 5%
    #[arg(long, default_value = "1.0")]
    min_profit: f64,

    /// Minimum buy price in USD
    #[arg(long, default_value = "1.0")]
    min_price: f64,

    /// Maximum number of reported opportunities
    #[arg(long, default_value = "100")]
    max_results: usize,

    /// Named filter preset from search_filters.json (wins over flags)
    #[arg(long)]
    preset: Option<String>,

    /// Run once and exit (instead of continuous scanning)
    #[arg(long)]
    once: bool,

    /// Scan interval in seconds
    #[arg(long, default_value = "120")]
    interval: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("BOT_LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let args = Args::parse();

    info!("Arbitrage Detector starting...");
    info!(
        "Mode: {} | min profit: {}% | min price: ${}",
        args.mode, args.min_profit, args.min_price
    );

    let paths = PathRegistry::from_env();
    let config = match AppConfig::load(&paths) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let Some(mode) = ProfitMode::from_str(&args.mode) else {
        error!("invalid --mode '{}' (expected fast|complete)", args.mode);
        return ExitCode::from(2);
    };

    let mut profit_config = ProfitConfig {
        mode,
        min_profit_percentage: args.min_profit / 100.0,
        min_price: args.min_price,
        max_results: args.max_results,
        ..Default::default()
    };
    if let Some(name) = &args.preset {
        match config.preset(name) {
            Some(preset) => profit_config = profit_config.with_preset(preset),
            None => {
                error!("unknown filter preset '{name}'");
                return ExitCode::from(2);
            }
        }
    }

    let engine = ProfitEngine::new(Arc::new(paths));

    loop {
        match scan_once(&engine, &profit_config) {
            Ok(()) => {}
            Err(e @ ScrapeError::Config(_)) => {
                error!("configuration error: {e}");
                return ExitCode::from(2);
            }
            Err(e) => {
                error!("scan failed: {e}");
                return ExitCode::from(4);
            }
        }

        if args.once {
            break;
        }
        info!("sleeping for {}s...", args.interval);
        sleep(Duration::from_secs(args.interval)).await;
    }

    ExitCode::SUCCESS
}

fn scan_once(engine: &ProfitEngine, config: &ProfitConfig) -> common::Result<()> {
    let opportunities = engine.compute(config)?;
    info!("found {} opportunities", opportunities.len());

    for (rank, opp) in opportunities.iter().take(10).enumerate() {
        info!(
            "{:>2}. {} | buy ${:.2} on {} | steam ${:.2} (net ${:.2}) | +${:.2} ({:.1}%)",
            rank + 1,
            opp.item_name,
            opp.buy_price,
            opp.buy_venue,
            opp.steam_price,
            opp.net_steam_price,
            opp.profit_absolute,
            opp.profit_percentage * 100.0
        );
    }

    engine.save(config.mode, opportunities)
}
