//! Tradeit.gg: inventory dump; `priceForTrade` is cents and reflects the
//! site's trade pricing, kept raw alongside the converted figure.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const INVENTORY_URL: &str =
    "https://tradeit.gg/api/v2/inventory/data?gameId=730&sortType=Price+-+high&limit=1000";

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    #[serde(default)]
    items: Vec<InventoryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryItem {
    name: String,
    price_for_trade: Option<i64>,
    #[serde(default)]
    current_stock: Option<u64>,
}

pub struct TradeitAdapter;

impl VenueAdapter for TradeitAdapter {
    fn venue(&self) -> Venue {
        Venue::Tradeit
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: INVENTORY_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: InventoryResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("tradeit inventory", e.to_string()))?;

        let listings = response
            .items
            .into_iter()
            .filter_map(|item| {
                let raw = item.price_for_trade?;
                let price = raw as f64 / 100.0;
                if item.name.trim().is_empty() || price <= 0.0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::Tradeit, item.name, price)
                    .with_extra("price_for_trade", serde_json::json!(raw));
                if let Some(stock) = item.current_stock {
                    listing = listing.with_quantity(stock);
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
    fn converts_trade_cents() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{"items": [
            {"name": "AWP | Chromatic Aberration (Factory New)", "priceForTrade": 3199, "currentStock": 2}
        ]}"#;
        let listings = TradeitAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert!((listings[0].price - 31.99).abs() < 1e-9);
        assert_eq!(listings[0].quantity, Some(2));
        let extra = listings[0].extra.as_ref().unwrap();
        assert_eq!(extra["price_for_trade"], serde_json::json!(3199));
    }
}
