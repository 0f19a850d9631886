//! ShadowPay: authenticated price list (bearer token required).

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PRICES_URL: &str = "https://api.shadowpay.com/api/v2/user/items/prices?project=csgo";

#[derive(Debug, Deserialize)]
struct PricesResponse {
    #[serde(default)]
    data: Vec<PriceItem>,
}

#[derive(Debug, Deserialize)]
struct PriceItem {
    steam_market_hash_name: String,
    price: Option<f64>,
    #[serde(default)]
    count: Option<u64>,
}

pub struct ShadowpayAdapter;

impl VenueAdapter for ShadowpayAdapter {
    fn venue(&self) -> Venue {
        Venue::Shadowpay
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: PRICES_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: PricesResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("shadowpay prices", e.to_string()))?;

        let listings = response
            .data
            .into_iter()
            .filter_map(|item| {
                let price = item.price?;
                if item.steam_market_hash_name.trim().is_empty()
                    || price <= 0.0
                    || price > 50_000.0
                {
                    return None;
                }
                let mut listing =
                    Listing::new(Venue::Shadowpay, item.steam_market_hash_name, price);
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
    fn parses_price_rows() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{"data": [
            {"steam_market_hash_name": "USP-S | Cortex (Minimal Wear)", "price": 7.77, "count": 5},
            {"steam_market_hash_name": "Too expensive", "price": 60000.0}
        ]}"#;
        let listings = ShadowpayAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].price, 7.77);
        assert_eq!(listings[0].quantity, Some(5));
    }
}
