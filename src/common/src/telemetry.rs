//! Run telemetry: per-request latencies, adapter outcomes, session report.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::models::Venue;

/// Bounded latency sample kept per telemetry instance.
const LATENCY_SAMPLES: usize = 100;

/// How one adapter run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterOutcome {
    Ok,
    /// Canceled or timed out after persisting some pages.
    Partial { reason: String },
    Failed { reason: String },
}

impl AdapterOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AdapterOutcome::Ok => "ok",
            AdapterOutcome::Partial { .. } => "partial",
            AdapterOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result line for one adapter in the session report.
#[derive(Debug, Clone)]
pub struct AdapterReport {
    pub venue: Venue,
    pub outcome: AdapterOutcome,
    pub items: usize,
    pub elapsed: Duration,
}

/// Shared request counters. Cheap enough to clone an `Arc` of this into
/// every adapter task; increments are atomic, the latency sample sits
/// behind a short lock.
#[derive(Default)]
pub struct Telemetry {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rate_limit_hits: AtomicU64,
    proxy_rotations: AtomicU64,
    latencies_ms: Mutex<Vec<f64>>,
    reports: Mutex<Vec<AdapterReport>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.push_latency(latency);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_proxy_rotation(&self) {
        self.proxy_rotations.fetch_add(1, Ordering::Relaxed);
    }

    fn push_latency(&self, latency: Duration) {
        let mut samples = self.latencies_ms.lock();
        if samples.len() >= LATENCY_SAMPLES {
            samples.remove(0);
        }
        samples.push(latency.as_secs_f64() * 1000.0);
    }

    pub fn record_adapter(&self, report: AdapterReport) {
        self.reports.lock().push(report);
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn average_latency_ms(&self) -> f64 {
        let samples = self.latencies_ms.lock();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn reports(&self) -> Vec<AdapterReport> {
        self.reports.lock().clone()
    }

    /// Counts of adapters per outcome label.
    pub fn outcome_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for report in self.reports.lock().iter() {
            *counts.entry(report.outcome.label()).or_insert(0) += 1;
        }
        counts
    }

    /// Print the end-of-session summary table.
    pub fn print_summary(&self, started: Instant) {
        let elapsed = started.elapsed();
        let reports = self.reports();
        let total_items: usize = reports.iter().map(|r| r.items).sum();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║                     HARVEST SESSION REPORT                   ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║  Elapsed:      {:>8.1}s   Requests: {:>7}                 ║",
            elapsed.as_secs_f64(),
            self.requests()
        );
        info!(
            "║  Success rate: {:>8.1}%   Avg latency: {:>7.1} ms          ║",
            self.success_rate() * 100.0,
            self.average_latency_ms()
        );
        info!(
            "║  Rate-limit hits: {:>5}    Proxy rotations: {:>5}           ║",
            self.rate_limit_hits.load(Ordering::Relaxed),
            self.proxy_rotations.load(Ordering::Relaxed)
        );
        info!(
            "║  Items harvested: {:>7}                                    ║",
            total_items
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for report in &reports {
            let reason = match &report.outcome {
                AdapterOutcome::Ok => String::new(),
                AdapterOutcome::Partial { reason } | AdapterOutcome::Failed { reason } => {
                    format!(" ({reason})")
                }
            };
            info!(
                "║  {:<14} {:>7} items  {:>6.1}s  {}{}",
                report.venue.as_str(),
                report.items,
                report.elapsed.as_secs_f64(),
                report.outcome.label(),
                reason
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_and_latency_average() {
        let telemetry = Telemetry::new();
        telemetry.record_request();
        telemetry.record_request();
        telemetry.record_success(Duration::from_millis(100));
        telemetry.record_failure(Duration::from_millis(300));

        assert_eq!(telemetry.requests(), 2);
        assert!((telemetry.success_rate() - 0.5).abs() < 1e-9);
        assert!((telemetry.average_latency_ms() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn latency_sample_is_bounded() {
        let telemetry = Telemetry::new();
        for i in 0..(LATENCY_SAMPLES + 50) {
            telemetry.record_success(Duration::from_millis(i as u64));
        }
        assert_eq!(telemetry.latencies_ms.lock().len(), LATENCY_SAMPLES);
    }

    #[test]
    fn outcome_counts_group_by_label() {
        let telemetry = Telemetry::new();
        telemetry.record_adapter(AdapterReport {
            venue: Venue::Waxpeer,
            outcome: AdapterOutcome::Ok,
            items: 10,
            elapsed: Duration::from_secs(1),
        });
        telemetry.record_adapter(AdapterReport {
            venue: Venue::Empire,
            outcome: AdapterOutcome::Failed {
                reason: "API key missing".into(),
            },
            items: 0,
            elapsed: Duration::from_secs(0),
        });
        let counts = telemetry.outcome_counts();
        assert_eq!(counts.get("ok"), Some(&1));
        assert_eq!(counts.get("failed"), Some(&1));
    }
}
