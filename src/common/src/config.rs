//! Configuration and secrets registry.
//!
//! Structured knobs come from JSON files in the config directory
//! (`settings.json`, `scrapers.json`, `search_filters.json`); secrets come
//! exclusively from environment variables. The config files must never
//! contain credentials, and nothing in this module writes secrets back out.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeError};
use crate::models::Venue;
use crate::paths::PathRegistry;

/// Global knobs from `settings.json`, with env overrides applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Default retry count for retryable request failures.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (doubled per attempt).
    pub retry_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub retry_backoff_cap_ms: u64,
    /// Hard cap on concurrently running adapters (None = derived from
    /// system resources).
    pub max_concurrent_adapters: Option<usize>,
    /// Wall-clock budget per adapter run in seconds.
    pub adapter_timeout_secs: u64,
    /// Global proxy enable flag (`BOT_USE_PROXY` overrides).
    pub use_proxy: bool,
    /// In-memory cache entry limit.
    pub cache_memory_items: usize,
    /// Default cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Cache enable flag (`BOT_CACHE_ENABLED` overrides).
    pub cache_enabled: bool,
    /// Proxy pool count for batch venues.
    pub proxy_pool_count: usize,
    /// Proxies requested per pool from the vendor.
    pub proxies_per_pool: usize,
    /// Logging verbosity (`BOT_LOG_LEVEL` overrides).
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            retry_backoff_cap_ms: 30_000,
            max_concurrent_adapters: None,
            adapter_timeout_secs: 600,
            use_proxy: false,
            cache_memory_items: 1_000,
            cache_ttl_secs: 300,
            cache_enabled: true,
            proxy_pool_count: 5,
            proxies_per_pool: 100,
            log_level: "info".to_string(),
        }
    }
}

/// Per-venue overrides from `scrapers.json`. Venue-specific decisions live
/// here, not in adapter code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub enabled: bool,
    /// Token-bucket refill rate.
    pub rate_per_minute: u32,
    /// Token-bucket burst capacity.
    pub burst: u32,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub use_proxy: Option<bool>,
    /// Endpoint is fronted by a WAF that fingerprints modern HTTP clients;
    /// route through the low-level client profile.
    pub low_level_client: bool,
    /// Storefront is SPA-rendered; the framework short-circuits with an
    /// empty snapshot instead of attempting HTML heuristics.
    pub dynamic_content: bool,
    /// Coin/currency to USD ratio for venues that price in site credit.
    pub conversion_rate: Option<f64>,
    pub cache_ttl_secs: Option<u64>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_per_minute: 60,
            burst: 10,
            timeout_secs: None,
            max_retries: None,
            use_proxy: None,
            low_level_client: false,
            dynamic_content: false,
            conversion_rate: None,
            cache_ttl_secs: None,
        }
    }
}

/// Named opportunity filter preset from `search_filters.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchFilterPreset {
    /// Fractional threshold, e.g. 0.05 for 5%.
    pub min_profit_percentage: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Restrict buy side to these venues.
    pub platforms: Option<Vec<Venue>>,
    /// Substring match against item names.
    pub query: Option<String>,
}

/// Oculus proxy vendor credentials, environment-only.
#[derive(Clone)]
pub struct ProxyCredentials {
    pub auth_token: String,
    pub order_token: String,
}

impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens never reach logs, not even truncated.
        f.debug_struct("ProxyCredentials").finish_non_exhaustive()
    }
}

/// Process-wide configuration: settings + per-venue overrides + read-only
/// secret accessors.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub settings: Settings,
    scrapers: HashMap<Venue, ScraperConfig>,
    presets: HashMap<String, SearchFilterPreset>,
}

impl AppConfig {
    /// Load from the config directory, then apply env overrides. A missing
    /// file yields defaults; a malformed file is a configuration error.
    pub fn load(paths: &PathRegistry) -> Result<Self> {
        // .env is a development convenience; real deployments set the
        // environment directly.
        dotenvy::dotenv().ok();

        let settings: Settings = read_json_or_default(&paths.config_dir().join("settings.json"))?;
        let scrapers_raw: HashMap<String, ScraperConfig> =
            read_json_or_default(&paths.config_dir().join("scrapers.json"))?;
        let presets: HashMap<String, SearchFilterPreset> =
            read_json_or_default(&paths.config_dir().join("search_filters.json"))?;

        let mut scrapers = HashMap::new();
        for (name, cfg) in scrapers_raw {
            match Venue::from_str(&name) {
                Some(venue) => {
                    scrapers.insert(venue, cfg);
                }
                None => {
                    return Err(ScrapeError::Config(format!(
                        "scrapers.json references unknown venue '{name}'"
                    )));
                }
            }
        }

        let mut config = Self {
            settings,
            scrapers,
            presets,
        };
        config.apply_env_overrides();
        config.apply_builtin_venue_defaults();
        Ok(config)
    }

    /// Defaults-only configuration (tests, or a bare checkout with no
    /// config directory).
    pub fn defaults() -> Self {
        let mut config = Self {
            settings: Settings::default(),
            scrapers: HashMap::new(),
            presets: HashMap::new(),
        };
        config.apply_builtin_venue_defaults();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("BOT_LOG_LEVEL") {
            self.settings.log_level = level;
        }
        if let Ok(v) = std::env::var("BOT_USE_PROXY") {
            self.settings.use_proxy = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("BOT_CACHE_ENABLED") {
            self.settings.cache_enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    /// Venue tuning that is a property of the remote service rather than the
    /// deployment, applied only where the config file stayed silent.
    fn apply_builtin_venue_defaults(&mut self) {
        // Steam throttles aggressively.
        let steam_listing = self.scrapers.entry(Venue::SteamListing).or_default();
        steam_listing.rate_per_minute = steam_listing.rate_per_minute.min(10);
        steam_listing.burst = 1;
        steam_listing.timeout_secs.get_or_insert(60);

        let steam_market = self.scrapers.entry(Venue::SteamMarket).or_default();
        steam_market.rate_per_minute = steam_market.rate_per_minute.min(50);
        steam_market.burst = steam_market.burst.min(5);

        let steamid = self.scrapers.entry(Venue::Steamid).or_default();
        steamid.rate_per_minute = steamid.rate_per_minute.min(20);
        steamid.burst = steamid.burst.min(2);

        // Large single-JSON venues need the longer timeout.
        self.scrapers
            .entry(Venue::Cstrade)
            .or_default()
            .timeout_secs
            .get_or_insert(60);
        self.scrapers
            .entry(Venue::Lisskins)
            .or_default()
            .timeout_secs
            .get_or_insert(60);

        let empire = self.scrapers.entry(Venue::Empire).or_default();
        empire.conversion_rate.get_or_insert(0.614);

        // Cloudflare fingerprints the default client profile on mannco.
        self.scrapers
            .entry(Venue::Manncostore)
            .or_default()
            .low_level_client = true;

        // SPA storefront, no JSON surface.
        self.scrapers
            .entry(Venue::Rapidskins)
            .or_default()
            .dynamic_content = true;
    }

    /// Effective config for a venue (defaults when the file has no entry).
    pub fn scraper(&self, venue: Venue) -> ScraperConfig {
        self.scrapers.get(&venue).cloned().unwrap_or_default()
    }

    pub fn preset(&self, name: &str) -> Option<&SearchFilterPreset> {
        self.presets.get(name)
    }

    /// Whether proxying applies to this venue's requests.
    pub fn use_proxy_for(&self, venue: Venue) -> bool {
        self.scraper(venue)
            .use_proxy
            .unwrap_or(self.settings.use_proxy)
    }

    /// Bearer token for a venue, from `<VENUE>_API_KEY` only.
    pub fn api_key(&self, venue: Venue) -> Option<String> {
        std::env::var(venue.api_key_env())
            .ok()
            .filter(|s| !s.trim().is_empty())
    }

    /// Proxy vendor credentials from `OCULUS_AUTH_TOKEN` / `OCULUS_ORDER_TOKEN`.
    pub fn proxy_credentials(&self) -> Option<ProxyCredentials> {
        let auth_token = std::env::var("OCULUS_AUTH_TOKEN").ok()?;
        let order_token = std::env::var("OCULUS_ORDER_TOKEN").ok()?;
        if auth_token.trim().is_empty() || order_token.trim().is_empty() {
            return None;
        }
        Some(ProxyCredentials {
            auth_token,
            order_token,
        })
    }
}

fn read_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| ScrapeError::Config(format!("malformed {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(ScrapeError::Config(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}
