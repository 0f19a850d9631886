//! White.market: public price export.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const EXPORT_URL: &str = "https://api.white.market/export/v1/prices/730.json";

#[derive(Debug, Deserialize)]
struct ExportItem {
    market_hash_name: String,
    /// Decimal string or number depending on export revision.
    price: serde_json::Value,
    #[serde(default)]
    market_product_link: Option<String>,
}

pub struct WhiteAdapter;

impl VenueAdapter for WhiteAdapter {
    fn venue(&self) -> Venue {
        Venue::White
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: EXPORT_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let items: Vec<ExportItem> = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("white export", e.to_string()))?;

        let listings = items
            .into_iter()
            .filter_map(|item| {
                let price = match &item.price {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.parse().ok(),
                    _ => None,
                }?;
                if item.market_hash_name.trim().is_empty() || price <= 0.0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::White, item.market_hash_name, price);
                if let Some(link) = item.market_product_link {
                    listing = listing.with_url(link);
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
    fn accepts_string_and_numeric_prices() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"[
            {"market_hash_name": "P90 | Asiimov (Field-Tested)", "price": "11.20"},
            {"market_hash_name": "MAC-10 | Neon Rider (Minimal Wear)", "price": 8.4}
        ]"#;
        let listings = WhiteAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 2);
        assert!((listings[0].price - 11.20).abs() < 1e-9);
        assert!((listings[1].price - 8.4).abs() < 1e-9);
    }
}
