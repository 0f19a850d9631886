//! Skinout: paginated market API; price field naming has drifted across
//! API revisions, so several keys are accepted in order.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const MAX_PAGES: usize = 100;

#[derive(Debug, Deserialize)]
struct MarketResponse {
    #[serde(default)]
    items: Vec<MarketItem>,
}

#[derive(Debug, Deserialize)]
struct MarketItem {
    name: String,
    price: Option<serde_json::Value>,
    current_price: Option<serde_json::Value>,
    sell_price: Option<serde_json::Value>,
}

impl MarketItem {
    fn best_price(&self) -> Option<f64> {
        [&self.price, &self.current_price, &self.sell_price]
            .into_iter()
            .flatten()
            .find_map(as_price)
    }
}

fn as_price(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub struct SkinoutAdapter;

impl VenueAdapter for SkinoutAdapter {
    fn venue(&self) -> Venue {
        Venue::Skinout
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Paginated { max_pages: MAX_PAGES })
    }

    fn page_url(&self, page: usize) -> String {
        format!("https://skinout.gg/api/market/items?page={}", page + 1)
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: MarketResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("skinout market", e.to_string()))?;

        let listings = response
            .items
            .into_iter()
            .filter_map(|item| {
                let price = item.best_price()?;
                if item.name.trim().is_empty() || price <= 0.0 {
                    return None;
                }
                Some(Listing::new(Venue::Skinout, item.name, price))
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
    fn accepts_price_field_variants() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{"items": [
            {"name": "A", "price": 1.25},
            {"name": "B", "current_price": "2.50"},
            {"name": "C", "sell_price": 3.75},
            {"name": "D"}
        ]}"#;
        let listings = SkinoutAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 3);
        assert_eq!(listings[0].price, 1.25);
        assert_eq!(listings[1].price, 2.50);
        assert_eq!(listings[2].price, 3.75);
    }
}
