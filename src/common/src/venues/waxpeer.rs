//! Waxpeer: paginated price API, prices in cents.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PRICES_URL: &str = "https://api.waxpeer.com/v1/prices";
const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
struct PricesResponse {
    #[serde(default)]
    items: Vec<PriceItem>,
}

#[derive(Debug, Deserialize)]
struct PriceItem {
    name: String,
    /// Cents.
    price: Option<i64>,
    /// Units listed for sale.
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    steam_price: Option<i64>,
    #[serde(default)]
    img: Option<String>,
}

pub struct WaxpeerAdapter;

impl VenueAdapter for WaxpeerAdapter {
    fn venue(&self) -> Venue {
        Venue::Waxpeer
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Paginated { max_pages: MAX_PAGES })
    }

    fn page_url(&self, page: usize) -> String {
        format!(
            "{PRICES_URL}?game=csgo&offset={}&limit={PAGE_SIZE}",
            page * PAGE_SIZE
        )
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: PricesResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("waxpeer prices", e.to_string()))?;

        let listings = response
            .items
            .into_iter()
            .filter_map(|item| {
                let cents = item.price?;
                if item.name.trim().is_empty() || cents <= 0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::Waxpeer, item.name, cents as f64 / 100.0);
                if let Some(count) = item.count {
                    listing = listing.with_quantity(count);
                }
                if let Some(steam_cents) = item.steam_price {
                    listing = listing.with_extra(
                        "steam_price",
                        serde_json::json!(steam_cents as f64 / 100.0),
                    );
                }
                if let Some(img) = item.img {
                    listing = listing.with_extra("image", serde_json::json!(img));
                }
                Some(listing)
            })
            .collect();
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::test_support;

    #[test]
    fn page_urls_use_offsets() {
        assert!(WaxpeerAdapter.page_url(0).contains("offset=0"));
        assert!(WaxpeerAdapter.page_url(3).contains("offset=300"));
    }

    #[test]
    fn parses_cents_and_counts() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{
            "success": true,
            "count": 2,
            "items": [
                {"name": "AK-47 | Redline (Field-Tested)", "price": 3783, "count": 12, "steam_price": 4550},
                {"name": "Sticker | Crown (Foil)", "price": 0},
                {"name": "", "price": 100}
            ]
        }"#;
        let listings = WaxpeerAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].item, "AK-47 | Redline (Field-Tested)");
        assert!((listings[0].price - 37.83).abs() < 1e-9);
        assert_eq!(listings[0].quantity, Some(12));
        let extra = listings[0].extra.as_ref().unwrap();
        assert_eq!(extra["steam_price"], serde_json::json!(45.50));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let (ctx, _tmp) = test_support::ctx();
        assert!(WaxpeerAdapter.parse(b"<html>503</html>", &ctx).is_err());
    }
}
