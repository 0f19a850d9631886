//! Profitability engine: join venue catalogs against Steam reference
//! prices, apply the fee ladder, rank and persist opportunities.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::{AppConfig, SearchFilterPreset};
use crate::error::{Result, ScrapeError};
use crate::fees;
use crate::models::{
    steam_url, Opportunity, OpportunityArchive, OpportunityBatch, Venue,
};
use crate::paths::PathRegistry;
use crate::storage::{load_listings, write_json_atomic};

/// Fee handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfitMode {
    /// Gross Steam price, no fees; quick triage.
    Fast,
    /// Net Steam price through the fee ladder.
    Complete,
}

impl ProfitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfitMode::Fast => "fast",
            ProfitMode::Complete => "complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(ProfitMode::Fast),
            "complete" => Some(ProfitMode::Complete),
            _ => None,
        }
    }
}

/// Engine thresholds. A named preset, when given, wins over these.
#[derive(Debug, Clone)]
pub struct ProfitConfig {
    pub mode: ProfitMode,
    /// Fractional, e.g. 0.05 for 5%.
    pub min_profit_percentage: f64,
    pub min_price: f64,
    pub max_results: usize,
    pub max_price: Option<f64>,
    pub platforms: Option<Vec<Venue>>,
    pub query: Option<String>,
}

impl Default for ProfitConfig {
    fn default() -> Self {
        Self {
            mode: ProfitMode::Complete,
            min_profit_percentage: 0.01,
            min_price: 1.0,
            max_results: 100,
            max_price: None,
            platforms: None,
            query: None,
        }
    }
}

impl ProfitConfig {
    /// Overlay a preset; preset fields win wherever both are set.
    pub fn with_preset(mut self, preset: &SearchFilterPreset) -> Self {
        if let Some(p) = preset.min_profit_percentage {
            self.min_profit_percentage = p;
        }
        if let Some(p) = preset.min_price {
            self.min_price = p;
        }
        if let Some(p) = preset.max_price {
            self.max_price = Some(p);
        }
        if let Some(platforms) = &preset.platforms {
            self.platforms = Some(platforms.clone());
        }
        if let Some(query) = &preset.query {
            self.query = Some(query.clone());
        }
        self
    }
}

/// Cross-venue arbitrage engine over persisted snapshots.
pub struct ProfitEngine {
    paths: std::sync::Arc<PathRegistry>,
    /// Serializes archive read-modify-write cycles.
    archive_lock: Mutex<()>,
}

impl ProfitEngine {
    pub fn new(paths: std::sync::Arc<PathRegistry>) -> Self {
        Self {
            paths,
            archive_lock: Mutex::new(()),
        }
    }

    /// Union all Steam-origin snapshots into `name -> gross price`,
    /// keeping the maximum on conflict (fresher listings trend higher).
    pub fn steam_reference(&self) -> Result<HashMap<String, f64>> {
        let mut reference: HashMap<String, f64> = HashMap::new();
        for venue in Venue::ALL.iter().filter(|v| v.is_steam_origin()) {
            for listing in load_listings(&self.paths, *venue)? {
                if listing.price <= 0.0 {
                    continue;
                }
                reference
                    .entry(listing.item)
                    .and_modify(|price| *price = price.max(listing.price))
                    .or_insert(listing.price);
            }
        }
        info!("steam reference table: {} unique items", reference.len());
        Ok(reference)
    }

    /// Compute ranked opportunities across every buyable venue snapshot.
    pub fn compute(&self, config: &ProfitConfig) -> Result<Vec<Opportunity>> {
        let steam = self.steam_reference()?;
        if steam.is_empty() {
            return Err(ScrapeError::Config(
                "no Steam reference data on disk; harvest steam_listing first".to_string(),
            ));
        }

        let buy_venues: Vec<Venue> = Venue::ALL
            .iter()
            .copied()
            .filter(|v| v.storefront_url().is_some())
            .filter(|v| match &config.platforms {
                Some(allowed) => allowed.contains(v),
                None => true,
            })
            .collect();

        let now = Utc::now();
        let mut opportunities = Vec::new();
        for venue in buy_venues {
            let listings = load_listings(&self.paths, venue)?;
            if listings.is_empty() {
                continue;
            }
            let mut venue_hits = 0usize;
            for listing in listings {
                if listing.price < config.min_price {
                    continue;
                }
                if let Some(max_price) = config.max_price {
                    if listing.price > max_price {
                        continue;
                    }
                }
                if let Some(query) = &config.query {
                    if !listing
                        .item
                        .to_lowercase()
                        .contains(&query.to_lowercase())
                    {
                        continue;
                    }
                }
                let Some(&gross) = steam.get(&listing.item) else {
                    continue;
                };
                if gross <= listing.price {
                    continue;
                }

                let (net, profit_absolute) = match config.mode {
                    ProfitMode::Complete => {
                        let net = fees::net_price(gross);
                        (net, net - listing.price)
                    }
                    ProfitMode::Fast => (gross, gross - listing.price),
                };
                let profit_percentage = profit_absolute / listing.price;
                if profit_percentage < config.min_profit_percentage {
                    continue;
                }

                let buy_url = listing
                    .url
                    .clone()
                    .or_else(|| venue.item_url(&listing.item))
                    .unwrap_or_default();
                opportunities.push(Opportunity {
                    steam_url: steam_url(&listing.item),
                    item_name: listing.item,
                    buy_venue: venue,
                    buy_price: listing.price,
                    buy_url,
                    steam_price: gross,
                    net_steam_price: net,
                    profit_absolute,
                    profit_percentage,
                    timestamp: now,
                });
                venue_hits += 1;
            }
            debug!("{venue}: {venue_hits} opportunities");
        }

        // Rank: percentage, then absolute, then name for a stable order.
        opportunities.sort_by(|a, b| {
            b.profit_percentage
                .partial_cmp(&a.profit_percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.profit_absolute
                        .partial_cmp(&a.profit_absolute)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.item_name.cmp(&b.item_name))
        });
        opportunities.truncate(config.max_results);
        Ok(opportunities)
    }

    /// Persist a batch into the archive: previous current rotates into the
    /// bounded history. The whole read-modify-write runs under one lock.
    pub fn save(&self, mode: ProfitMode, opportunities: Vec<Opportunity>) -> Result<()> {
        let _guard = self.archive_lock.lock();
        let path = self.paths.profitability_file();

        let batch = OpportunityBatch {
            timestamp: Utc::now(),
            total_opportunities: opportunities.len(),
            mode: mode.as_str().to_string(),
            opportunities,
        };

        let archive = match std::fs::read(&path) {
            Ok(bytes) => {
                let mut existing: OpportunityArchive = serde_json::from_slice(&bytes)
                    .map_err(|e| ScrapeError::parse(path.display().to_string(), e.to_string()))?;
                existing.push(batch);
                existing
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OpportunityArchive::new(batch),
            Err(e) => {
                return Err(ScrapeError::Persistence {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        write_json_atomic(&path, &archive)?;
        info!(
            "archived {} opportunities ({} history entries)",
            archive.current.total_opportunities,
            archive.history.len()
        );
        Ok(())
    }

    /// Load the persisted archive, if any.
    pub fn load_archive(&self) -> Result<Option<OpportunityArchive>> {
        let path = self.paths.profitability_file();
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ScrapeError::parse(path.display().to_string(), e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScrapeError::Persistence {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Listing, VenueSnapshot, STEAM_LISTING_URL};
    use crate::storage::save_snapshot;
    use std::sync::Arc;

    fn engine_with_data(
        steam: Vec<(&str, f64)>,
        venue_listings: Vec<(Venue, &str, f64)>,
    ) -> (ProfitEngine, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Arc::new(PathRegistry::rooted_at(tmp.path()));

        let steam_rows: Vec<Listing> = steam
            .into_iter()
            .map(|(name, price)| Listing::new(Venue::SteamListing, name, price))
            .collect();
        save_snapshot(
            &paths,
            &VenueSnapshot::build(Venue::SteamListing, steam_rows),
        )
        .unwrap();

        let mut by_venue: HashMap<Venue, Vec<Listing>> = HashMap::new();
        for (venue, name, price) in venue_listings {
            by_venue
                .entry(venue)
                .or_default()
                .push(Listing::new(venue, name, price));
        }
        for (venue, listings) in by_venue {
            save_snapshot(&paths, &VenueSnapshot::build(venue, listings)).unwrap();
        }

        (ProfitEngine::new(paths), tmp)
    }

    const REDLINE: &str = "AK-47 | Redline (Field-Tested)";

    #[test]
    fn complete_mode_applies_fee_ladder() {
        let (engine, _tmp) = engine_with_data(
            vec![(REDLINE, 45.50)],
            vec![(Venue::Waxpeer, REDLINE, 37.83)],
        );
        let config = ProfitConfig {
            mode: ProfitMode::Complete,
            min_profit_percentage: 0.01,
            ..Default::default()
        };
        let opportunities = engine.compute(&config).unwrap();
        assert_eq!(opportunities.len(), 1);
        let opp = &opportunities[0];
        assert!((opp.net_steam_price - 39.56).abs() < 1e-9);
        assert!((opp.profit_absolute - 1.73).abs() < 1e-9);
        assert!((opp.profit_percentage - 0.0457).abs() < 0.001);
        assert!(opp.steam_url.starts_with(STEAM_LISTING_URL));
        assert_eq!(opp.buy_venue, Venue::Waxpeer);
    }

    #[test]
    fn higher_margin_ranks_first_for_the_same_name() {
        // Same item, two venues: 4.6% on waxpeer vs ~3% on lisskins.
        let (engine, _tmp) = engine_with_data(
            vec![(REDLINE, 45.50)],
            vec![
                (Venue::Waxpeer, REDLINE, 37.83),
                (Venue::Lisskins, REDLINE, 38.40),
            ],
        );
        let opportunities = engine
            .compute(&ProfitConfig {
                min_profit_percentage: 0.01,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(opportunities.len(), 2);
        assert_eq!(opportunities[0].buy_venue, Venue::Waxpeer);
        assert!(opportunities[0].profit_percentage > opportunities[1].profit_percentage);
    }

    #[test]
    fn fast_mode_skips_fees() {
        let (engine, _tmp) = engine_with_data(
            vec![("Item A", 10.0)],
            vec![(Venue::Skinport, "Item A", 8.0)],
        );
        let opportunities = engine
            .compute(&ProfitConfig {
                mode: ProfitMode::Fast,
                min_profit_percentage: 0.01,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(opportunities[0].net_steam_price, 10.0);
        assert!((opportunities[0].profit_absolute - 2.0).abs() < 1e-9);
    }

    #[test]
    fn filters_price_floor_and_missing_reference() {
        let (engine, _tmp) = engine_with_data(
            vec![("Pricey", 50.0)],
            vec![
                (Venue::Skinport, "Pricey", 0.50),   // below min_price
                (Venue::Skinport, "Unknown", 5.00),  // no steam reference
            ],
        );
        let opportunities = engine
            .compute(&ProfitConfig {
                min_profit_percentage: 0.01,
                min_price: 1.0,
                ..Default::default()
            })
            .unwrap();
        assert!(opportunities.is_empty());
    }

    #[test]
    fn preset_wins_over_engine_config() {
        let preset = SearchFilterPreset {
            min_profit_percentage: Some(0.50),
            ..Default::default()
        };
        let config = ProfitConfig {
            min_profit_percentage: 0.01,
            ..Default::default()
        }
        .with_preset(&preset);
        assert_eq!(config.min_profit_percentage, 0.50);

        let (engine, _tmp) = engine_with_data(
            vec![(REDLINE, 45.50)],
            vec![(Venue::Waxpeer, REDLINE, 37.83)],
        );
        // 4.6% margin does not clear the preset's 50% bar.
        assert!(engine.compute(&config).unwrap().is_empty());
    }

    #[test]
    fn archive_rotates_history_and_stamps_last_updated() {
        let (engine, _tmp) = engine_with_data(
            vec![(REDLINE, 45.50)],
            vec![(Venue::Waxpeer, REDLINE, 37.83)],
        );
        let config = ProfitConfig::default();

        for _ in 0..13 {
            let opportunities = engine.compute(&config).unwrap();
            engine.save(config.mode, opportunities).unwrap();
        }

        let archive = engine.load_archive().unwrap().expect("archive written");
        assert_eq!(archive.history.len(), OpportunityArchive::HISTORY_CAP);
        assert_eq!(archive.last_updated, archive.current.timestamp);
        assert_eq!(archive.current.mode, "complete");
        assert_eq!(archive.current.total_opportunities, 1);
    }

    #[test]
    fn empty_reference_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Arc::new(PathRegistry::rooted_at(tmp.path()));
        let engine = ProfitEngine::new(paths);
        assert!(engine.compute(&ProfitConfig::default()).is_err());
    }
}
