//! Shared library for the skin-arbitrage services.
//!
//! Provides the harvesting and arbitrage core:
//! - Configuration and secrets registry
//! - Path registry for on-disk artifacts
//! - Error taxonomy
//! - Proxy pool manager with allow-list sync
//! - HTTP engine with retries and proxy rotation
//! - KV + image cache tiers
//! - Venue adapter framework and per-venue adapters
//! - Concurrent orchestrator
//! - Incremental merge store for Steam catalogs
//! - Steam fee calculator and profitability engine
//! - Run telemetry

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod fees;
pub mod http;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod paths;
pub mod profit;
pub mod proxy;
pub mod ratelimit;
pub mod storage;
pub mod telemetry;
pub mod venues;

pub use adapter::{
    run_adapter, AdapterContext, AdapterRunResult, BatchItem, FetchPlan, NameidEntry,
    RunContext, VenueAdapter,
};
pub use cache::{CacheStats, ImageCache, KvCache};
pub use config::{AppConfig, ProxyCredentials, ScraperConfig, SearchFilterPreset, Settings};
pub use error::{Result, ScrapeError};
pub use fees::{net_price, profit_margin};
pub use merge::{merge_into_store, MergeOutcome};
pub use models::{
    decode_item_name, encode_item_name, steam_url, Listing, Opportunity, OpportunityArchive,
    OpportunityBatch, Venue, VenueSnapshot,
};
pub use orchestrator::{Orchestrator, RunSummary, Selection};
pub use paths::PathRegistry;
pub use profit::{ProfitConfig, ProfitEngine, ProfitMode};
pub use proxy::{PoolStats, ProxyEndpoint, ProxyManager};
pub use ratelimit::RateLimiters;
pub use storage::{load_listings, save_snapshot};
pub use telemetry::{AdapterOutcome, AdapterReport, Telemetry};
pub use venues::{adapter_for, group};
