//! Venue adapter framework.
//!
//! Adapters contribute URL construction and response decoding. Everything
//! else (headers, credentials, rate limiting, retries, pagination,
//! cancellation, validation, dedup, persistence, telemetry) lives in the
//! shared runner so it behaves identically across venues.

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{ImageCache, KvCache};
use crate::config::{AppConfig, ScraperConfig};
use crate::error::{Result, ScrapeError};
use crate::http::{HttpEngine, RequestOptions};
use crate::merge::merge_into_store;
use crate::models::{Listing, Venue, VenueSnapshot};
use crate::paths::PathRegistry;
use crate::ratelimit::RateLimiters;
use crate::storage::save_snapshot;
use crate::telemetry::Telemetry;

/// Reason string recorded for SPA venues the framework refuses to scrape.
pub const DYNAMIC_CONTENT_REASON: &str = "dynamic content";

/// Pagination stops after this many consecutive failed pages.
const MAX_CONSECUTIVE_PAGE_ERRORS: u32 = 3;

/// One entry of a nameid-driven batch.
#[derive(Debug, Clone)]
pub struct NameidEntry {
    pub item: String,
    pub nameid: u64,
}

/// What one batch request produced.
#[derive(Debug, Clone)]
pub enum BatchItem {
    Listing(Listing),
    /// A freshly resolved Steam nameid (harvester output).
    Nameid { item: String, nameid: u64 },
}

/// How an adapter wants its data fetched.
pub enum FetchPlan {
    /// One request, one payload.
    Single { url: String },
    /// Offset/skip pagination; the adapter renders each page URL.
    Paginated { max_pages: usize },
    /// Per-item requests keyed by Steam nameids, bounded by the shared
    /// Steam semaphore.
    NameidBatch { entries: Vec<NameidEntry>, concurrency: usize },
    /// Data only reachable through full browser automation; the framework
    /// publishes an empty snapshot with the documented reason instead.
    Browser { reason: &'static str },
}

/// Contract every venue implements. All methods are synchronous data
/// description; the runner owns the IO.
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> Venue;

    /// Decide the fetch shape. Reads config and the data directory (e.g.
    /// the nameid table) but performs no network IO.
    fn plan(&self, ctx: &AdapterContext) -> Result<FetchPlan>;

    /// URL for a zero-based page of a [`FetchPlan::Paginated`] plan.
    fn page_url(&self, _page: usize) -> String {
        String::new()
    }

    /// URL for one entry of a [`FetchPlan::NameidBatch`] plan.
    fn batch_url(&self, _entry: &NameidEntry) -> String {
        String::new()
    }

    /// Extra headers beyond the engine profile and bearer token.
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Decode one payload (single fetch or one page) into listings.
    fn parse(&self, _body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        Ok(Vec::new())
    }

    /// Decode one batch payload for `entry`.
    fn parse_batch(
        &self,
        _entry: &NameidEntry,
        _body: &[u8],
        _ctx: &AdapterContext,
    ) -> Result<Vec<BatchItem>> {
        Ok(Vec::new())
    }

    /// Whether persisted output merges into the existing store instead of
    /// replacing it (huge, slow-changing catalogs).
    fn incremental(&self) -> bool {
        false
    }
}

/// Static surroundings an adapter may consult while planning/parsing.
pub struct AdapterContext {
    pub paths: Arc<PathRegistry>,
    pub scraper: ScraperConfig,
    pub api_key: Option<String>,
    pub images: Arc<ImageCache>,
}

/// Everything the runner needs for one adapter execution.
pub struct RunContext {
    pub config: Arc<AppConfig>,
    pub paths: Arc<PathRegistry>,
    pub engine: Arc<HttpEngine>,
    pub limiters: Arc<RateLimiters>,
    pub cache: Arc<KvCache>,
    pub images: Arc<ImageCache>,
    pub telemetry: Arc<Telemetry>,
    pub cancel: watch::Receiver<bool>,
    /// Wall-clock cutoff for this adapter run.
    pub deadline: Instant,
}

impl RunContext {
    fn canceled(&self) -> bool {
        *self.cancel.borrow() || Instant::now() >= self.deadline
    }

    fn stop_reason(&self) -> &'static str {
        if *self.cancel.borrow() {
            "canceled"
        } else {
            "timeout"
        }
    }
}

/// Outcome of one adapter run.
#[derive(Debug, Clone)]
pub struct AdapterRunResult {
    pub venue: Venue,
    pub items: usize,
    /// Present when the run stopped early but persisted validated pages.
    pub partial_reason: Option<String>,
    /// Present when the framework skipped fetching entirely (documented
    /// short-circuits, not errors).
    pub skip_reason: Option<String>,
}

/// Execute one adapter end-to-end: fetch → parse → validate → normalize →
/// persist. Single-item problems never escape; adapter-level failures are
/// returned to the orchestrator.
pub async fn run_adapter(ctx: &RunContext, adapter: &dyn VenueAdapter) -> Result<AdapterRunResult> {
    let venue = adapter.venue();
    let scraper = ctx.config.scraper(venue);

    // Declared-dynamic venues publish an empty snapshot with the reason
    // rather than guessing at rendered HTML.
    if scraper.dynamic_content {
        info!("{venue}: requires browser rendering, publishing empty snapshot");
        let snapshot = VenueSnapshot::build(venue, Vec::new());
        save_snapshot(&ctx.paths, &snapshot)?;
        return Ok(AdapterRunResult {
            venue,
            items: 0,
            partial_reason: None,
            skip_reason: Some(DYNAMIC_CONTENT_REASON.to_string()),
        });
    }

    // Credential gate before any network traffic.
    let api_key = ctx.config.api_key(venue);
    if venue.requires_api_key() && api_key.is_none() {
        return Err(ScrapeError::MissingApiKey(venue));
    }

    let adapter_ctx = AdapterContext {
        paths: ctx.paths.clone(),
        scraper: scraper.clone(),
        api_key: api_key.clone(),
        images: ctx.images.clone(),
    };

    let mut options = RequestOptions {
        headers: adapter.headers(),
        timeout: scraper
            .timeout_secs
            .map(std::time::Duration::from_secs),
        use_proxy: ctx.config.use_proxy_for(venue),
        low_level: scraper.low_level_client,
        max_retries: scraper.max_retries,
    };
    if let Some(key) = &api_key {
        options
            .headers
            .push(("Authorization".to_string(), format!("Bearer {key}")));
    }

    let plan = adapter.plan(&adapter_ctx)?;
    let mut partial_reason = None;
    let mut skip_reason = None;
    let mut listings = Vec::new();
    let mut nameids = Vec::new();

    match plan {
        FetchPlan::Single { url } => {
            // Single-payload venues benefit most from the hot cache: a
            // profitability pass shortly after a harvest re-reads the same
            // catalog.
            let cache_key = format!("{venue}:{url}");
            let cached = ctx
                .cache
                .get(&cache_key)
                .and_then(|v| v.as_str().map(|s| s.as_bytes().to_vec()));
            let body = match cached {
                Some(body) => body,
                None => {
                    ctx.limiters.acquire(venue, &ctx.config).await;
                    let body = ctx.engine.get(&url, &options).await?;
                    if let Ok(text) = std::str::from_utf8(&body) {
                        let ttl = scraper
                            .cache_ttl_secs
                            .unwrap_or(ctx.config.settings.cache_ttl_secs);
                        ctx.cache.set(
                            cache_key,
                            serde_json::Value::String(text.to_string()),
                            std::time::Duration::from_secs(ttl),
                        );
                    }
                    body
                }
            };
            listings = adapter.parse(&body, &adapter_ctx)?;
        }
        FetchPlan::Paginated { max_pages } => {
            let mut consecutive_errors = 0u32;
            for page in 0..max_pages {
                if ctx.canceled() {
                    partial_reason = Some(ctx.stop_reason().to_string());
                    break;
                }
                ctx.limiters.acquire(venue, &ctx.config).await;
                let url = adapter.page_url(page);
                match ctx.engine.get(&url, &options).await {
                    Ok(body) => match adapter.parse(&body, &adapter_ctx) {
                        Ok(page_items) if page_items.is_empty() => {
                            debug!("{venue}: page {page} empty, stopping pagination");
                            break;
                        }
                        Ok(page_items) => {
                            consecutive_errors = 0;
                            listings.extend(page_items);
                        }
                        Err(e) => {
                            // One bad page does not abort the catalog.
                            warn!("{venue}: page {page} unparseable: {e}");
                            consecutive_errors += 1;
                            if consecutive_errors >= MAX_CONSECUTIVE_PAGE_ERRORS {
                                partial_reason = Some(format!(
                                    "stopped after {consecutive_errors} consecutive bad pages"
                                ));
                                break;
                            }
                        }
                    },
                    Err(ScrapeError::EmptyBody(_)) => {
                        debug!("{venue}: page {page} returned no body, stopping");
                        break;
                    }
                    Err(e) if page == 0 => return Err(e),
                    Err(e) => {
                        warn!("{venue}: page {page} failed: {e}");
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_PAGE_ERRORS {
                            partial_reason = Some(format!(
                                "stopped after {consecutive_errors} consecutive failed pages"
                            ));
                            break;
                        }
                    }
                }
            }
        }
        FetchPlan::NameidBatch { entries, concurrency } => {
            let semaphore = ctx.limiters.steam_semaphore();
            let results: Vec<Result<Vec<BatchItem>>> = stream::iter(entries.iter().map(|entry| {
                let semaphore = semaphore.clone();
                let options = options.clone();
                let entry = entry.clone();
                let adapter_ctx = &adapter_ctx;
                async move {
                    if ctx.canceled() {
                        return Err(ScrapeError::Canceled);
                    }
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| ScrapeError::Canceled)?;
                    ctx.limiters.acquire(venue, &ctx.config).await;
                    let url = adapter.batch_url(&entry);
                    let body = ctx.engine.get(&url, &options).await?;
                    adapter.parse_batch(&entry, &body, adapter_ctx)
                }
            }))
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

            let mut canceled = false;
            for result in results {
                match result {
                    Ok(items) => {
                        for item in items {
                            match item {
                                BatchItem::Listing(listing) => listings.push(listing),
                                BatchItem::Nameid { item, nameid } => {
                                    nameids.push((item, nameid))
                                }
                            }
                        }
                    }
                    Err(ScrapeError::Canceled) => canceled = true,
                    Err(e) => debug!("{venue}: batch entry failed: {e}"),
                }
            }
            if canceled {
                partial_reason = Some(ctx.stop_reason().to_string());
            }
        }
        FetchPlan::Browser { reason } => {
            info!("{venue}: requires browser rendering, publishing empty snapshot");
            skip_reason = Some(reason.to_string());
        }
    }

    // Persist whatever was validated, even for partial runs.
    let items = if adapter.incremental() {
        let snapshot = VenueSnapshot::build(venue, listings);
        let count = snapshot.len();
        merge_into_store(&ctx.paths, venue, snapshot.listings)?;
        count
    } else if venue == Venue::Steamid {
        // The harvester's product is the nameid table, not a snapshot.
        merge_nameids(&ctx.paths, &nameids)?
    } else {
        let snapshot = VenueSnapshot::build(venue, listings);
        save_snapshot(&ctx.paths, &snapshot)?;
        snapshot.len()
    };

    Ok(AdapterRunResult {
        venue,
        items,
        partial_reason,
        skip_reason,
    })
}

/// Merge freshly resolved nameids into `item_nameids.json`. Existing
/// entries win: nameids are permanent Steam identifiers.
pub fn merge_nameids(paths: &PathRegistry, fresh: &[(String, u64)]) -> Result<usize> {
    let path = paths.nameids_file();
    let mut table: std::collections::BTreeMap<String, u64> = match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| ScrapeError::parse(path.display().to_string(), e.to_string()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Default::default(),
        Err(e) => {
            return Err(ScrapeError::Persistence {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };
    let mut added = 0;
    for (item, nameid) in fresh {
        if !table.contains_key(item) {
            table.insert(item.clone(), *nameid);
            added += 1;
        }
    }
    crate::storage::write_json_atomic(&path, &table)?;
    Ok(added)
}

/// Load the nameid table for batch planning.
pub fn load_nameids(paths: &PathRegistry) -> Result<Vec<NameidEntry>> {
    let path = paths.nameids_file();
    let table: std::collections::BTreeMap<String, u64> = match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| ScrapeError::parse(path.display().to_string(), e.to_string()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Default::default(),
        Err(e) => {
            return Err(ScrapeError::Persistence {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };
    Ok(table
        .into_iter()
        .map(|(item, nameid)| NameidEntry { item, nameid })
        .collect())
}
