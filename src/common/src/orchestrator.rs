//! Concurrent orchestrator: runs many venue adapters in parallel under a
//! resource-derived cap, with per-adapter timeouts and cooperative
//! cancellation. One process-scoped object graph, built here and threaded
//! explicitly; no global state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use sysinfo::System;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapter::{run_adapter, RunContext};
use crate::cache::{ImageCache, KvCache};
use crate::config::AppConfig;
use crate::error::{Result, ScrapeError};
use crate::http::HttpEngine;
use crate::models::Venue;
use crate::paths::PathRegistry;
use crate::proxy::ProxyManager;
use crate::ratelimit::RateLimiters;
use crate::telemetry::{AdapterOutcome, AdapterReport, Telemetry};
use crate::venues;

/// Hard bounds on concurrently running adapters regardless of hardware.
const MIN_ADAPTERS: usize = 2;
const MAX_ADAPTERS: usize = 16;

/// Stagger between adapter starts so the first burst of requests does not
/// hit every host at the same instant.
const START_STAGGER: Duration = Duration::from_millis(250);

/// Grace on top of the cooperative deadline before the task is dropped.
const HARD_TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// Which adapters a run covers.
#[derive(Debug, Clone)]
pub enum Selection {
    All,
    Group(String),
    Venues(Vec<Venue>),
}

impl Selection {
    /// Resolve to a concrete venue list.
    pub fn resolve(&self) -> Result<Vec<Venue>> {
        match self {
            Selection::All => Ok(Venue::ALL.to_vec()),
            Selection::Group(name) => venues::group(name)
                .ok_or_else(|| ScrapeError::Config(format!("unknown venue group '{name}'"))),
            Selection::Venues(list) => {
                if list.is_empty() {
                    return Err(ScrapeError::Config("empty venue selection".to_string()));
                }
                Ok(list.clone())
            }
        }
    }
}

/// Result of one orchestrated run.
#[derive(Debug)]
pub struct RunSummary {
    pub reports: Vec<AdapterReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// CLI exit code: 0 all ok, 3 when at least one adapter failed.
    pub fn exit_code(&self) -> i32 {
        let failed = self
            .reports
            .iter()
            .any(|r| matches!(r.outcome, AdapterOutcome::Failed { .. }));
        if failed {
            3
        } else {
            0
        }
    }

    pub fn total_items(&self) -> usize {
        self.reports.iter().map(|r| r.items).sum()
    }
}

/// Process-scoped object graph plus the scheduling loop.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    paths: Arc<PathRegistry>,
    engine: Arc<HttpEngine>,
    limiters: Arc<RateLimiters>,
    cache: Arc<KvCache>,
    images: Arc<ImageCache>,
    telemetry: Arc<Telemetry>,
    proxies: Arc<ProxyManager>,
    cancel: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(config: AppConfig, paths: PathRegistry) -> Result<Self> {
        paths.ensure_dirs()?;
        let config = Arc::new(config);
        let paths = Arc::new(paths);
        let telemetry = Arc::new(Telemetry::new());
        let proxies = Arc::new(ProxyManager::new(&config));
        let engine = Arc::new(HttpEngine::new(
            config.settings.clone(),
            proxies.clone(),
            telemetry.clone(),
        )?);
        let cache = Arc::new(KvCache::new(
            config.settings.cache_memory_items,
            config.settings.cache_enabled,
        ));
        let images = Arc::new(ImageCache::new(paths.image_cache_dir()));
        let (cancel, _) = watch::channel(false);
        Ok(Self {
            config,
            paths,
            engine,
            limiters: Arc::new(RateLimiters::new()),
            cache,
            images,
            telemetry,
            proxies,
            cancel,
        })
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn proxies(&self) -> Arc<ProxyManager> {
        self.proxies.clone()
    }

    pub fn paths(&self) -> Arc<PathRegistry> {
        self.paths.clone()
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Signal every in-flight adapter to stop after its current page.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    pub fn is_canceled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Seed proxy pools and synchronize the vendor allow-list. Skipped
    /// entirely when proxying is off.
    pub async fn init_proxies(&self) {
        if self.config.settings.use_proxy {
            self.proxies.init().await;
        }
    }

    /// Adapter concurrency derived from system resources: CPU count scaled
    /// by available memory and the runtime environment, clamped hard.
    pub fn optimal_concurrency(&self) -> usize {
        if let Some(explicit) = self.config.settings.max_concurrent_adapters {
            return explicit.clamp(1, MAX_ADAPTERS);
        }
        let mut system = System::new();
        system.refresh_memory();
        let cpus = num_cpus();
        let available_gb = system.available_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let memory_factor = (available_gb / 2.0).clamp(0.5, 3.0);
        let environment_factor = if std::path::Path::new("/.dockerenv").exists() {
            0.75
        } else {
            1.0
        };
        let derived = (cpus as f64 * memory_factor * environment_factor) as usize;
        derived.clamp(MIN_ADAPTERS, MAX_ADAPTERS)
    }

    /// Run the selected adapters concurrently and collect the summary.
    /// Adapter failures are recorded, never propagated; only configuration
    /// problems abort the run.
    pub async fn run(&self, selection: &Selection, concurrency: Option<usize>) -> Result<RunSummary> {
        let started = Instant::now();
        let selected = selection.resolve()?;
        let selected: Vec<Venue> = selected
            .into_iter()
            .filter(|v| {
                let enabled = self.config.scraper(*v).enabled;
                if !enabled {
                    info!("{v}: disabled in config, skipping");
                }
                enabled
            })
            .collect();

        if selected.iter().any(|v| self.config.use_proxy_for(*v)) {
            self.proxies.refresh_allow_list_if_needed().await;
        }

        let cap = concurrency
            .unwrap_or_else(|| self.optimal_concurrency())
            .max(1);
        info!(
            "running {} adapters with concurrency {cap}",
            selected.len()
        );

        let reports: Vec<AdapterReport> = stream::iter(selected.into_iter().enumerate().map(
            |(index, venue)| async move {
                // Interleave starts so simultaneous first requests land on
                // distinct hosts.
                tokio::time::sleep(START_STAGGER * (index % cap) as u32).await;
                self.run_one(venue).await
            },
        ))
        .buffer_unordered(cap)
        .collect()
        .await;

        for report in &reports {
            self.telemetry.record_adapter(report.clone());
        }

        Ok(RunSummary {
            reports,
            elapsed: started.elapsed(),
        })
    }

    async fn run_one(&self, venue: Venue) -> AdapterReport {
        let started = Instant::now();
        let budget = Duration::from_secs(self.config.settings.adapter_timeout_secs);
        let ctx = RunContext {
            config: self.config.clone(),
            paths: self.paths.clone(),
            engine: self.engine.clone(),
            limiters: self.limiters.clone(),
            cache: self.cache.clone(),
            images: self.images.clone(),
            telemetry: self.telemetry.clone(),
            cancel: self.cancel.subscribe(),
            deadline: started + budget,
        };
        let adapter = venues::adapter_for(venue);

        let outcome = tokio::time::timeout(budget + HARD_TIMEOUT_GRACE, async {
            run_adapter(&ctx, adapter.as_ref()).await
        })
        .await;

        let (outcome, items) = match outcome {
            Ok(Ok(result)) => {
                let outcome = match (&result.partial_reason, &result.skip_reason) {
                    (Some(reason), _) => AdapterOutcome::Partial {
                        reason: reason.clone(),
                    },
                    (None, Some(reason)) => {
                        info!("{venue}: skipped ({reason})");
                        AdapterOutcome::Ok
                    }
                    (None, None) => AdapterOutcome::Ok,
                };
                (outcome, result.items)
            }
            Ok(Err(e)) => {
                warn!("{venue}: failed: {e}");
                (
                    AdapterOutcome::Failed {
                        reason: e.to_string(),
                    },
                    0,
                )
            }
            Err(_) => {
                warn!("{venue}: exceeded wall-clock budget, task dropped");
                (
                    AdapterOutcome::Failed {
                        reason: "timeout".to_string(),
                    },
                    0,
                )
            }
        };

        AdapterReport {
            venue,
            outcome,
            items,
            elapsed: started.elapsed(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::load_listings;
    use serial_test::serial;

    fn orchestrator() -> (Orchestrator, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathRegistry::rooted_at(tmp.path());
        let orchestrator = Orchestrator::new(AppConfig::defaults(), paths).unwrap();
        (orchestrator, tmp)
    }

    #[test]
    fn selection_resolves_groups_and_rejects_unknown() {
        assert_eq!(Selection::All.resolve().unwrap().len(), Venue::ALL.len());
        assert!(Selection::Group("api".to_string()).resolve().is_ok());
        assert!(Selection::Group("bogus".to_string()).resolve().is_err());
        assert!(Selection::Venues(vec![]).resolve().is_err());
    }

    #[test]
    fn concurrency_stays_within_bounds() {
        let (orchestrator, _tmp) = orchestrator();
        let cap = orchestrator.optimal_concurrency();
        assert!((MIN_ADAPTERS..=MAX_ADAPTERS).contains(&cap));
    }

    #[tokio::test]
    #[serial]
    async fn missing_api_key_fails_without_network() {
        std::env::remove_var("EMPIRE_API_KEY");
        let (orchestrator, _tmp) = orchestrator();
        let summary = orchestrator
            .run(&Selection::Venues(vec![Venue::Empire]), Some(1))
            .await
            .unwrap();

        assert_eq!(summary.exit_code(), 3);
        let report = &summary.reports[0];
        assert!(matches!(report.outcome, AdapterOutcome::Failed { .. }));
        if let AdapterOutcome::Failed { reason } = &report.outcome {
            assert!(reason.contains("API key"), "reason was: {reason}");
        }
        // The credential gate sits before any request.
        assert_eq!(orchestrator.telemetry.requests(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn dynamic_content_venue_publishes_empty_snapshot() {
        let (orchestrator, _tmp) = orchestrator();
        let summary = orchestrator
            .run(&Selection::Venues(vec![Venue::Rapidskins]), Some(1))
            .await
            .unwrap();

        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.total_items(), 0);
        let on_disk = load_listings(&orchestrator.paths, Venue::Rapidskins).unwrap();
        assert!(on_disk.is_empty());
        assert_eq!(orchestrator.telemetry.requests(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn cancellation_before_fetch_yields_partial_with_parseable_snapshot() {
        let (orchestrator, _tmp) = orchestrator();
        orchestrator.cancel();
        let summary = orchestrator
            .run(&Selection::Venues(vec![Venue::Waxpeer]), Some(1))
            .await
            .unwrap();

        let report = &summary.reports[0];
        assert!(matches!(report.outcome, AdapterOutcome::Partial { .. }));
        // Whatever was persisted parses as a valid listing array.
        let on_disk = load_listings(&orchestrator.paths, Venue::Waxpeer).unwrap();
        assert!(on_disk.iter().all(|l| l.is_valid()));
        assert_eq!(orchestrator.telemetry.requests(), 0);
    }
}
