//! Market.CSGO: USD price list with string-typed prices.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PRICES_URL: &str = "https://market.csgo.com/api/v2/prices/USD.json";

#[derive(Debug, Deserialize)]
struct PricesResponse {
    success: bool,
    #[serde(default)]
    items: Vec<PriceItem>,
}

#[derive(Debug, Deserialize)]
struct PriceItem {
    market_hash_name: String,
    /// Decimal string, e.g. "12.34".
    price: String,
    #[serde(default)]
    volume: Option<u64>,
}

pub struct MarketcsgoAdapter;

impl VenueAdapter for MarketcsgoAdapter {
    fn venue(&self) -> Venue {
        Venue::Marketcsgo
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: PRICES_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: PricesResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("marketcsgo prices", e.to_string()))?;
        if !response.success {
            return Err(ScrapeError::parse(
                "marketcsgo prices",
                "API reported success=false",
            ));
        }

        let listings = response
            .items
            .into_iter()
            .filter_map(|item| {
                let price: f64 = item.price.parse().ok()?;
                if item.market_hash_name.trim().is_empty() || price <= 0.0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::Marketcsgo, item.market_hash_name, price);
                if let Some(volume) = item.volume {
                    // Listings count, not verified stock.
                    listing = listing.with_extra("quantity_raw", serde_json::json!(volume));
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
    fn parses_string_prices_and_keeps_raw_volume() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{"success": true, "items": [
            {"market_hash_name": "Five-SeveN | Case Hardened (Battle-Scarred)", "price": "4.06", "volume": 18},
            {"market_hash_name": "Bad", "price": "not-a-number"}
        ]}"#;
        let listings = MarketcsgoAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert!((listings[0].price - 4.06).abs() < 1e-9);
        // Volume semantics are unclear, so it stays out of Quantity.
        assert_eq!(listings[0].quantity, None);
        let extra = listings[0].extra.as_ref().unwrap();
        assert_eq!(extra["quantity_raw"], serde_json::json!(18));
    }
}
