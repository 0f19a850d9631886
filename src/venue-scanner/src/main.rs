//! Venue Scanner Service
//!
//! Harvests item listings from the configured marketplaces and persists
//! normalized per-venue catalogs for the arbitrage detector.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use common::{AppConfig, Orchestrator, PathRegistry, ScrapeError, Selection, Venue};
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Venue Scanner - harvests marketplace catalogs
#[derive(Parser, Debug)]
#[command(name = "venue-scanner")]
#[command(about = "Harvests CS:GO skin listings from configured marketplaces")]
struct Args {
    /// Venues to run (default: all)
    venues: Vec<String>,

    /// Named venue group: all, api, fast, essential, steam
    #[arg(long)]
    group: Option<String>,

    /// Concurrent adapter cap (default: derived from system resources)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Run once and exit (instead of continuous harvesting)
    #[arg(long)]
    once: bool,

    /// Harvest interval in seconds
    #[arg(long, default_value = "300")]
    interval: u64,

    /// Disable proxying for this run
    #[arg(long)]
    no_proxy: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // BOT_LOG_LEVEL drives verbosity; RUST_LOG still wins when set.
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("BOT_LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let args = Args::parse();

    info!("Venue Scanner starting...");
    info!(
        "Mode: {}",
        if args.once { "single run" } else { "continuous" }
    );

    let paths = PathRegistry::from_env();
    let mut config = match AppConfig::load(&paths) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    if args.no_proxy {
        config.settings.use_proxy = false;
    }

    let selection = match build_selection(&args) {
        Ok(selection) => selection,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let orchestrator = match Orchestrator::new(config, paths) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("startup failed: {e}");
            return ExitCode::from(4);
        }
    };
    orchestrator.init_proxies().await;

    // Ctrl-C requests cooperative shutdown; adapters persist what they
    // already validated before exiting.
    let cancel_handle = std::sync::Arc::new(orchestrator);
    {
        let orchestrator = cancel_handle.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, canceling in-flight adapters...");
                orchestrator.cancel();
            }
        });
    }
    let orchestrator = cancel_handle;

    let mut worst_exit = 0u8;
    loop {
        let started = Instant::now();
        match orchestrator.run(&selection, args.concurrency).await {
            Ok(summary) => {
                info!(
                    "harvest complete: {} adapters, {} items, {:.1}s",
                    summary.reports.len(),
                    summary.total_items(),
                    summary.elapsed.as_secs_f64()
                );
                orchestrator.telemetry().print_summary(started);
                let proxy_stats = orchestrator.proxies().stats();
                for pool in proxy_stats.pools.iter().filter(|p| p.proxy_count > 0) {
                    info!(
                        "pool {} [{}]: {} proxies, {} ok / {} failed, score {:.1}{}",
                        pool.name,
                        pool.region,
                        pool.proxy_count,
                        pool.successes,
                        pool.failures,
                        pool.score,
                        if pool.degraded { " (degraded)" } else { "" }
                    );
                }
                worst_exit = worst_exit.max(summary.exit_code() as u8);
            }
            Err(e @ ScrapeError::Config(_)) => {
                error!("configuration error: {e}");
                return ExitCode::from(2);
            }
            Err(e) => {
                error!("harvest failed: {e}");
                return ExitCode::from(4);
            }
        }

        if args.once || orchestrator.is_canceled() {
            break;
        }
        info!("sleeping for {}s...", args.interval);
        sleep(Duration::from_secs(args.interval)).await;
    }

    ExitCode::from(worst_exit)
}

/// Positional venue names win over `--group`; bare invocation runs all.
fn build_selection(args: &Args) -> Result<Selection, String> {
    if !args.venues.is_empty() {
        let venues: Result<Vec<Venue>, String> = args
            .venues
            .iter()
            .map(|name| {
                Venue::from_str(name).ok_or_else(|| format!("unknown venue '{name}'"))
            })
            .collect();
        return Ok(Selection::Venues(venues?));
    }
    if let Some(group) = &args.group {
        return Ok(Selection::Group(group.clone()));
    }
    Ok(Selection::All)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_venues_win_over_group() {
        let args = Args {
            venues: vec!["waxpeer".to_string(), "skinport".to_string()],
            group: Some("api".to_string()),
            concurrency: None,
            once: true,
            interval: 300,
            no_proxy: false,
        };
        match build_selection(&args).unwrap() {
            Selection::Venues(venues) => {
                assert_eq!(venues, vec![Venue::Waxpeer, Venue::Skinport])
            }
            _ => panic!("expected explicit venue selection"),
        }
    }

    #[test]
    fn unknown_venue_is_rejected() {
        let args = Args {
            venues: vec!["ebay".to_string()],
            group: None,
            concurrency: None,
            once: true,
            interval: 300,
            no_proxy: false,
        };
        assert!(build_selection(&args).is_err());
    }
}
