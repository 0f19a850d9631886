//! The three Steam-origin adapters.
//!
//! `steam_listing` walks the market search pages (paginated, merged
//! incrementally: the full catalog is six figures and mostly static
//! between harvests). `steamid` resolves the numeric nameid each listing
//! page embeds, because the order-histogram endpoint only accepts nameids.
//! `steam_market` then batch-queries histograms for live buy-order prices.

use serde::Deserialize;

use crate::adapter::{
    load_nameids, AdapterContext, BatchItem, FetchPlan, NameidEntry, VenueAdapter,
};
use crate::error::{Result, ScrapeError};
use crate::models::{steam_url, Listing, Venue};
use crate::storage::load_listings;

const SEARCH_PAGE_SIZE: usize = 100;
const SEARCH_MAX_PAGES: usize = 500;
const ICON_BASE: &str = "https://community.fastly.steamstatic.com/economy/image/";

/// Batch width for nameid-driven endpoints; the shared Steam semaphore is
/// the real ceiling.
const STEAM_BATCH_CONCURRENCY: usize = 5;

// ---------------------------------------------------------------------------
// steam_listing

#[derive(Debug, Deserialize)]
struct SearchPage {
    success: bool,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    hash_name: Option<String>,
    name: Option<String>,
    /// Cents.
    sell_price: Option<i64>,
    #[serde(default)]
    sell_listings: Option<u64>,
    asset_description: Option<AssetDescription>,
}

#[derive(Debug, Deserialize)]
struct AssetDescription {
    icon_url: Option<String>,
}

pub struct SteamListingAdapter;

impl VenueAdapter for SteamListingAdapter {
    fn venue(&self) -> Venue {
        Venue::SteamListing
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Paginated {
            max_pages: SEARCH_MAX_PAGES,
        })
    }

    fn page_url(&self, page: usize) -> String {
        format!(
            "https://steamcommunity.com/market/search/render/?query=&start={}&count={SEARCH_PAGE_SIZE}\
             &search_descriptions=0&sort_column=name&sort_dir=asc&appid=730&norender=1",
            page * SEARCH_PAGE_SIZE
        )
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "X-Requested-With".to_string(),
                "XMLHttpRequest".to_string(),
            ),
            (
                "Referer".to_string(),
                "https://steamcommunity.com/market/search?appid=730".to_string(),
            ),
        ]
    }

    fn parse(&self, body: &[u8], ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let page: SearchPage = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("steam search page", e.to_string()))?;
        if !page.success {
            return Err(ScrapeError::parse("steam search page", "success=false"));
        }

        let listings = page
            .results
            .into_iter()
            .filter_map(|result| {
                let name = result.hash_name.or(result.name)?;
                let cents = result.sell_price?;
                if name.trim().is_empty() || cents <= 0 {
                    return None;
                }
                let mut listing =
                    Listing::new(Venue::SteamListing, name.clone(), cents as f64 / 100.0)
                        .with_url(steam_url(&name));
                if let Some(count) = result.sell_listings {
                    listing = listing.with_quantity(count);
                }
                if let Some(icon_part) = result
                    .asset_description
                    .and_then(|d| d.icon_url)
                    .filter(|p| !p.is_empty())
                {
                    let remote = format!("{ICON_BASE}{icon_part}");
                    // Prefer the locally-cached form once the asset landed
                    // on disk; the merge store upgrades old entries.
                    let icon = ctx.images.public_path(&remote).unwrap_or(remote);
                    listing = listing.with_extra("icon_url", serde_json::json!(icon));
                }
                Some(listing)
            })
            .collect();
        Ok(listings)
    }

    fn incremental(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// steam_market

#[derive(Debug, Deserialize)]
struct Histogram {
    success: Option<i64>,
    /// Cents, string-typed.
    highest_buy_order: Option<String>,
}

pub struct SteamMarketAdapter;

impl VenueAdapter for SteamMarketAdapter {
    fn venue(&self) -> Venue {
        Venue::SteamMarket
    }

    fn plan(&self, ctx: &AdapterContext) -> Result<FetchPlan> {
        let entries = load_nameids(&ctx.paths)?;
        if entries.is_empty() {
            return Err(ScrapeError::Config(
                "item_nameids.json is empty; run the steamid harvester first".to_string(),
            ));
        }
        Ok(FetchPlan::NameidBatch {
            entries,
            concurrency: STEAM_BATCH_CONCURRENCY,
        })
    }

    fn batch_url(&self, entry: &NameidEntry) -> String {
        format!(
            "https://steamcommunity.com/market/itemordershistogram?country=US&language=english\
             &currency=1&item_nameid={}&two_factor=0&norender=1",
            entry.nameid
        )
    }

    fn parse_batch(
        &self,
        entry: &NameidEntry,
        body: &[u8],
        _ctx: &AdapterContext,
    ) -> Result<Vec<BatchItem>> {
        let histogram: Histogram = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("steam order histogram", e.to_string()))?;
        if histogram.success != Some(1) {
            return Err(ScrapeError::parse("steam order histogram", "success != 1"));
        }
        let Some(cents) = histogram
            .highest_buy_order
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
        else {
            // No open buy orders; nothing to record for this item.
            return Ok(Vec::new());
        };
        let price = cents / 100.0;
        if price <= 0.0 {
            return Ok(Vec::new());
        }
        Ok(vec![BatchItem::Listing(
            Listing::new(Venue::SteamMarket, entry.item.clone(), price)
                .with_url(steam_url(&entry.item)),
        )])
    }

    fn incremental(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// steamid

pub struct SteamidAdapter;

impl VenueAdapter for SteamidAdapter {
    fn venue(&self) -> Venue {
        Venue::Steamid
    }

    /// Plan over listing-snapshot items that have no nameid yet.
    fn plan(&self, ctx: &AdapterContext) -> Result<FetchPlan> {
        let known: std::collections::HashSet<String> = load_nameids(&ctx.paths)?
            .into_iter()
            .map(|e| e.item)
            .collect();
        let entries: Vec<NameidEntry> = load_listings(&ctx.paths, Venue::SteamListing)?
            .into_iter()
            .filter(|l| !known.contains(&l.item))
            .map(|l| NameidEntry {
                item: l.item,
                nameid: 0,
            })
            .collect();
        Ok(FetchPlan::NameidBatch {
            entries,
            concurrency: STEAM_BATCH_CONCURRENCY,
        })
    }

    fn batch_url(&self, entry: &NameidEntry) -> String {
        steam_url(&entry.item)
    }

    fn parse_batch(
        &self,
        entry: &NameidEntry,
        body: &[u8],
        _ctx: &AdapterContext,
    ) -> Result<Vec<BatchItem>> {
        let html = String::from_utf8_lossy(body);
        let Some(nameid) = extract_nameid(&html) else {
            return Err(ScrapeError::parse(
                "steam listing page",
                format!("no nameid found for '{}'", entry.item),
            ));
        };
        Ok(vec![BatchItem::Nameid {
            item: entry.item.clone(),
            nameid,
        }])
    }
}

/// Pull the item nameid out of a listing page. The id shows up either in
/// the `Market_LoadOrderSpread( 12345 )` call or as `"nameid":12345`.
fn extract_nameid(html: &str) -> Option<u64> {
    for marker in ["Market_LoadOrderSpread(", "\"nameid\":", "nameid="] {
        if let Some(at) = html.find(marker) {
            let rest = &html[at + marker.len()..];
            let digits: String = rest
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(id) = digits.parse() {
                return Some(id);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::test_support;

    #[test]
    fn listing_page_parse_converts_cents_and_builds_icon() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{"success": true, "total_count": 2, "results": [
            {"hash_name": "AK-47 | Redline (Field-Tested)", "sell_price": 4550,
             "sell_listings": 210, "asset_description": {"icon_url": "abc123"}},
            {"name": "Zero priced", "sell_price": 0}
        ]}"#;
        let listings = SteamListingAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert!((listings[0].price - 45.50).abs() < 1e-9);
        assert_eq!(listings[0].quantity, Some(210));
        let extra = listings[0].extra.as_ref().unwrap();
        assert_eq!(
            extra["icon_url"],
            serde_json::json!(format!("{ICON_BASE}abc123"))
        );
        assert!(listings[0]
            .url
            .as_deref()
            .unwrap()
            .starts_with("https://steamcommunity.com/market/listings/730/"));
    }

    #[test]
    fn histogram_parse_uses_highest_buy_order() {
        let (ctx, _tmp) = test_support::ctx();
        let entry = NameidEntry {
            item: "AK-47 | Redline (Field-Tested)".to_string(),
            nameid: 282822,
        };
        let body = br#"{"success": 1, "highest_buy_order": "4375", "lowest_sell_order": "4550"}"#;
        let items = SteamMarketAdapter.parse_batch(&entry, body, &ctx).unwrap();
        assert_eq!(items.len(), 1);
        match &items[0] {
            BatchItem::Listing(listing) => {
                assert!((listing.price - 43.75).abs() < 1e-9);
                assert_eq!(listing.item, entry.item);
            }
            other => panic!("expected listing, got {other:?}"),
        }

        // No buy orders: empty, not an error.
        let body = br#"{"success": 1}"#;
        assert!(SteamMarketAdapter
            .parse_batch(&entry, body, &ctx)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn nameid_extraction_handles_both_markers() {
        assert_eq!(
            extract_nameid("Market_LoadOrderSpread( 282822 );"),
            Some(282822)
        );
        assert_eq!(extract_nameid(r#"{"nameid":12345}"#), Some(12345));
        assert_eq!(extract_nameid("<html>nothing here</html>"), None);
    }

    #[test]
    fn steamid_plans_only_unresolved_items() {
        let (ctx, _tmp) = test_support::ctx();
        // Two listed items, one already resolved.
        let snapshot = crate::models::VenueSnapshot::build(
            Venue::SteamListing,
            vec![
                Listing::new(Venue::SteamListing, "A", 1.0),
                Listing::new(Venue::SteamListing, "B", 2.0),
            ],
        );
        crate::storage::save_snapshot(&ctx.paths, &snapshot).unwrap();
        crate::adapter::merge_nameids(&ctx.paths, &[("A".to_string(), 11)]).unwrap();

        match SteamidAdapter.plan(&ctx).unwrap() {
            FetchPlan::NameidBatch { entries, .. } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].item, "B");
            }
            _ => panic!("expected a batch plan"),
        }
    }
}
