//! Rotating proxy pools with vendor allow-list synchronization.
//!
//! Endpoints come from the Oculus vendor API in named pools, one region per
//! pool. Borrowers take the next endpoint round-robin from the best-scoring
//! pool; health is tracked per pool, not per endpoint. Running out of
//! proxies is never an error here; the HTTP engine falls back to direct
//! requests.

use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, ProxyCredentials};
use crate::error::{Result, ScrapeError};

const VENDOR_URL: &str = "https://api.oculusproxies.com/v1/configure/proxy/getProxies";

/// A pool is degraded once this many requests in a row have failed.
const DEGRADE_THRESHOLD: u32 = 5;

/// Bounded recent-latency sample per pool.
const LATENCY_SAMPLES: usize = 50;

/// Regions assigned to pools round-robin, most reliable tiers first.
const REGIONS: [&str; 16] = [
    "us", "gb", "de", "ca", "au", "fr", "nl", "jp", "sg", "br", "mx", "in", "kr", "pl", "es",
    "se",
];

/// One borrowed proxy endpoint. `pool` links request outcomes back to the
/// pool that served the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub url: String,
    pub pool: String,
}

#[derive(Debug)]
struct Pool {
    name: String,
    region: String,
    proxies: Vec<String>,
    cursor: usize,
    successes: u64,
    failures: u64,
    consecutive_errors: u32,
    latencies_ms: Vec<f64>,
}

impl Pool {
    fn new(name: String, region: String) -> Self {
        Self {
            name,
            region,
            proxies: Vec::new(),
            cursor: 0,
            successes: 0,
            failures: 0,
            consecutive_errors: 0,
            latencies_ms: Vec::new(),
        }
    }

    /// A pool is active iff it holds endpoints; degradation only changes
    /// its score, never its eligibility.
    fn is_active(&self) -> bool {
        !self.proxies.is_empty()
    }

    fn is_degraded(&self) -> bool {
        self.consecutive_errors >= DEGRADE_THRESHOLD
    }

    fn success_rate(&self) -> f64 {
        let total = self.successes + self.failures;
        if total == 0 {
            // Unused pools rank as if perfect so fresh regions get traffic.
            return 1.0;
        }
        self.successes as f64 / total as f64
    }

    fn score(&self) -> f64 {
        self.success_rate() * self.proxies.len() as f64 - self.consecutive_errors as f64 * 5.0
    }

    fn next_endpoint(&mut self) -> Option<ProxyEndpoint> {
        if self.proxies.is_empty() {
            return None;
        }
        let url = self.proxies[self.cursor % self.proxies.len()].clone();
        self.cursor = (self.cursor + 1) % self.proxies.len();
        Some(ProxyEndpoint {
            url,
            pool: self.name.clone(),
        })
    }
}

/// Per-pool line in [`PoolStats`].
#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub name: String,
    pub region: String,
    pub proxy_count: usize,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_errors: u32,
    pub degraded: bool,
    pub score: f64,
}

/// Aggregate stats for reports.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub current_ip: Option<String>,
    pub pools: Vec<PoolReport>,
}

/// Pool-based rotating proxy manager.
pub struct ProxyManager {
    pools: Mutex<Vec<Pool>>,
    current_ip: Mutex<Option<String>>,
    credentials: Option<ProxyCredentials>,
    proxies_per_pool: usize,
    http: reqwest::Client,
}

impl ProxyManager {
    pub fn new(config: &AppConfig) -> Self {
        let pool_count = config.settings.proxy_pool_count.max(1);
        let pools = (0..pool_count)
            .map(|i| {
                Pool::new(
                    format!("pool_{}", i + 1),
                    REGIONS[i % REGIONS.len()].to_string(),
                )
            })
            .collect();
        Self {
            pools: Mutex::new(pools),
            current_ip: Mutex::new(None),
            credentials: config.proxy_credentials(),
            proxies_per_pool: config.settings.proxies_per_pool,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Manager with fixed pools and no vendor, for tests and for
    /// deployments that bring their own proxy list.
    pub fn with_static_pools(pools: Vec<(&str, Vec<String>)>) -> Self {
        let pools = pools
            .into_iter()
            .map(|(name, proxies)| {
                let mut pool = Pool::new(name.to_string(), "static".to_string());
                pool.proxies = proxies;
                pool
            })
            .collect();
        Self {
            pools: Mutex::new(pools),
            current_ip: Mutex::new(None),
            credentials: None,
            proxies_per_pool: 0,
            http: reqwest::Client::new(),
        }
    }

    /// Detect the egress IP, push it to the vendor allow-list, and seed
    /// every pool. Each step is best-effort: a proxyless manager is a
    /// working manager.
    pub async fn init(&self) {
        if self.credentials.is_none() {
            debug!("proxy vendor credentials absent, running without proxies");
            return;
        }
        match self.detect_ip().await {
            Ok(ip) => {
                info!("egress IP detected: {ip}");
                *self.current_ip.lock() = Some(ip);
            }
            Err(e) => warn!("IP detection failed: {e}"),
        }
        self.reload_pools().await;
    }

    /// Borrow the next endpoint: best-scoring pool that has proxies,
    /// round-robin inside it. `None` when every pool is empty.
    pub fn acquire(&self) -> Option<ProxyEndpoint> {
        let mut pools = self.pools.lock();
        let best = pools
            .iter_mut()
            .filter(|p| p.is_active())
            .max_by(|a, b| {
                a.score()
                    .partial_cmp(&b.score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;
        best.next_endpoint()
    }

    pub fn record_success(&self, pool_name: &str, latency: Duration) {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.iter_mut().find(|p| p.name == pool_name) {
            pool.successes += 1;
            pool.consecutive_errors = 0;
            if pool.latencies_ms.len() >= LATENCY_SAMPLES {
                pool.latencies_ms.remove(0);
            }
            pool.latencies_ms.push(latency.as_secs_f64() * 1000.0);
        }
    }

    pub fn record_failure(&self, pool_name: &str) {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.iter_mut().find(|p| p.name == pool_name) {
            pool.failures += 1;
            pool.consecutive_errors += 1;
            // A failure burst usually means one dead endpoint stretch; skip
            // past it but keep the pool eligible.
            if pool.consecutive_errors % DEGRADE_THRESHOLD == 0 && !pool.proxies.is_empty() {
                pool.cursor =
                    (pool.cursor + DEGRADE_THRESHOLD as usize) % pool.proxies.len();
                debug!(
                    "pool {} degraded ({} consecutive errors), cursor skipped",
                    pool.name, pool.consecutive_errors
                );
            }
        }
    }

    /// Re-detect the egress IP; when it moved, re-register with the vendor
    /// (reseeding pools carries the new allow-list). Detection failure
    /// keeps the last known IP and is never fatal.
    pub async fn refresh_allow_list_if_needed(&self) {
        if self.credentials.is_none() {
            return;
        }
        let detected = match self.detect_ip().await {
            Ok(ip) => ip,
            Err(e) => {
                warn!("IP re-detection failed, keeping last known: {e}");
                return;
            }
        };
        let changed = {
            let current = self.current_ip.lock();
            current.as_deref() != Some(detected.as_str())
        };
        if changed {
            info!("egress IP changed to {detected}, refreshing allow-list");
            *self.current_ip.lock() = Some(detected);
            self.reload_pools().await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let pools = self.pools.lock();
        PoolStats {
            current_ip: self.current_ip.lock().clone(),
            pools: pools
                .iter()
                .map(|p| PoolReport {
                    name: p.name.clone(),
                    region: p.region.clone(),
                    proxy_count: p.proxies.len(),
                    successes: p.successes,
                    failures: p.failures,
                    consecutive_errors: p.consecutive_errors,
                    degraded: p.is_degraded(),
                    score: p.score(),
                })
                .collect(),
        }
    }

    async fn detect_ip(&self) -> Result<String> {
        // Several detectors because each one alone flakes; response shapes
        // differ per service.
        const SERVICES: [&str; 3] = [
            "https://api.ipify.org?format=json",
            "https://httpbin.org/ip",
            "https://api.myip.com",
        ];
        for service in SERVICES {
            let response = match self.http.get(service).send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!("IP service {service} failed: {e}");
                    continue;
                }
            };
            let body: serde_json::Value = match response.json().await {
                Ok(v) => v,
                Err(_) => continue,
            };
            for field in ["ip", "origin", "query"] {
                if let Some(ip) = body.get(field).and_then(|v| v.as_str()) {
                    return Ok(ip.to_string());
                }
            }
        }
        Err(ScrapeError::Connection(
            "all IP detection services failed".to_string(),
        ))
    }

    async fn reload_pools(&self) {
        let Some(credentials) = self.credentials.clone() else {
            return;
        };
        let whitelist: Vec<String> = self.current_ip.lock().iter().cloned().collect();
        let targets: Vec<(String, String)> = {
            let pools = self.pools.lock();
            pools
                .iter()
                .map(|p| (p.name.clone(), p.region.clone()))
                .collect()
        };
        for (name, region) in targets {
            match self
                .fetch_region_proxies(&credentials, &region, &whitelist)
                .await
            {
                Ok(proxies) if !proxies.is_empty() => {
                    info!("pool {name}: {} proxies loaded for {region}", proxies.len());
                    let mut pools = self.pools.lock();
                    if let Some(pool) = pools.iter_mut().find(|p| p.name == name) {
                        pool.proxies = proxies;
                        pool.cursor = 0;
                        pool.consecutive_errors = 0;
                    }
                }
                Ok(_) => warn!("pool {name}: vendor returned no proxies for {region}"),
                Err(e) => warn!("pool {name}: vendor load failed: {e}"),
            }
        }
    }

    async fn fetch_region_proxies(
        &self,
        credentials: &ProxyCredentials,
        region: &str,
        whitelist: &[String],
    ) -> Result<Vec<String>> {
        let payload = serde_json::json!({
            "orderToken": credentials.order_token,
            "country": region.to_uppercase(),
            "numberOfProxies": self.proxies_per_pool,
            "whiteListIP": whitelist,
            "enableSock5": false,
            "planType": "SHARED_DC",
        });
        let response = self
            .http
            .post(VENDOR_URL)
            .header("authToken", &credentials.auth_token)
            .json(&payload)
            .send()
            .await
            .map_err(ScrapeError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Http {
                status: status.as_u16(),
                url: VENDOR_URL.to_string(),
            });
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ScrapeError::parse("vendor proxy list", e.to_string()))?;
        let raw: Vec<&str> = match &body {
            serde_json::Value::Object(map) => map
                .get("proxies")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default(),
            serde_json::Value::Array(items) => {
                items.iter().filter_map(|v| v.as_str()).collect()
            }
            serde_json::Value::String(s) => vec![s.as_str()],
            _ => Vec::new(),
        };
        Ok(raw.iter().filter_map(|r| parse_vendor_proxy(r)).collect())
    }
}

/// Vendor format `host:port:user:pass` to a proxy URL.
fn parse_vendor_proxy(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split(':').collect();
    match parts.as_slice() {
        [host, port, user, pass] => Some(format!("http://{user}:{pass}@{host}:{port}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn endpoints(n: usize, prefix: &str) -> Vec<String> {
        (0..n)
            .map(|i| format!("http://{prefix}-{i}.proxy:8080"))
            .collect()
    }

    #[test]
    fn round_robin_is_fair_within_a_pool() {
        let manager = ProxyManager::with_static_pools(vec![("p1", endpoints(3, "a"))]);
        let n = 10;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..n {
            let endpoint = manager.acquire().expect("pool has proxies");
            *counts.entry(endpoint.url).or_insert(0) += 1;
        }
        // Each of the 3 endpoints appears floor(10/3)..=ceil(10/3) times.
        for count in counts.values() {
            assert!(*count == 3 || *count == 4, "unfair rotation: {counts:?}");
        }
        assert_eq!(counts.values().sum::<usize>(), n);
    }

    #[test]
    fn failover_prefers_healthy_pool() {
        let manager = ProxyManager::with_static_pools(vec![
            ("p1", endpoints(3, "a")),
            ("p2", endpoints(3, "b")),
        ]);
        for _ in 0..15 {
            manager.record_failure("p1");
        }
        let endpoint = manager.acquire().expect("p2 still active");
        assert_eq!(endpoint.pool, "p2");

        let stats = manager.stats();
        let score = |name: &str| {
            stats
                .pools
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.score)
                .expect("pool exists")
        };
        assert!(score("p2") > score("p1"));
        assert!(stats.pools.iter().any(|p| p.name == "p1" && p.degraded));
    }

    #[test]
    fn degraded_pool_recovers_on_success() {
        let manager = ProxyManager::with_static_pools(vec![("p1", endpoints(2, "a"))]);
        for _ in 0..DEGRADE_THRESHOLD {
            manager.record_failure("p1");
        }
        assert!(manager.stats().pools[0].degraded);
        manager.record_success("p1", Duration::from_millis(80));
        let stats = manager.stats();
        assert!(!stats.pools[0].degraded);
        assert_eq!(stats.pools[0].consecutive_errors, 0);
        // Eligibility never changed.
        assert!(manager.acquire().is_some());
    }

    #[test]
    fn acquire_returns_none_when_all_pools_empty() {
        let manager = ProxyManager::with_static_pools(vec![("p1", vec![])]);
        assert!(manager.acquire().is_none());
    }

    #[test]
    fn vendor_proxy_parsing() {
        assert_eq!(
            parse_vendor_proxy("1.2.3.4:8080:alice:pw").as_deref(),
            Some("http://alice:pw@1.2.3.4:8080")
        );
        assert_eq!(parse_vendor_proxy("not-a-proxy"), None);
    }
}
