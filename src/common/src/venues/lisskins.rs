//! LIS-Skins: one USD price dump.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PRICES_URL: &str = "https://lis-skins.com/market_export_json/api_csgo_full.json";

#[derive(Debug, Deserialize)]
struct ExportItem {
    name: String,
    price: Option<f64>,
    #[serde(default)]
    count: Option<u64>,
}

pub struct LisskinsAdapter;

impl VenueAdapter for LisskinsAdapter {
    fn venue(&self) -> Venue {
        Venue::Lisskins
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: PRICES_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let items: Vec<ExportItem> = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("lisskins export", e.to_string()))?;

        let listings = items
            .into_iter()
            .filter_map(|item| {
                let price = item.price?;
                // The site tops out well below this; anything higher is a
                // feed glitch.
                if item.name.trim().is_empty() || price <= 0.0 || price > 25_000.0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::Lisskins, item.name, price);
                if let Some(count) = item.count {
                    listing = listing.with_quantity(count);
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
    fn caps_glitched_prices() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"[
            {"name": "M4A1-S | Printstream (Field-Tested)", "price": 89.9, "count": 7},
            {"name": "Glitch", "price": 26000.0}
        ]"#;
        let listings = LisskinsAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].item, "M4A1-S | Printstream (Field-Tested)");
    }
}
