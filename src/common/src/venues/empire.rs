//! CSGOEmpire: authenticated market dump priced in site coins. The coin
//! value is ×100 in the payload; USD conversion uses the configured
//! coin-to-dollar ratio.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const MARKET_URL: &str = "https://csgoempire.com/api/v2/trading/items?per_page=2500&page=1";

#[derive(Debug, Deserialize)]
struct MarketResponse {
    #[serde(default)]
    data: Vec<MarketItem>,
}

#[derive(Debug, Deserialize)]
struct MarketItem {
    market_name: String,
    /// Coin value ×100.
    market_value: Option<f64>,
}

pub struct EmpireAdapter;

impl VenueAdapter for EmpireAdapter {
    fn venue(&self) -> Venue {
        Venue::Empire
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: MARKET_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: MarketResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("empire market", e.to_string()))?;
        let coin_rate = ctx.scraper.conversion_rate.unwrap_or(0.614);

        let listings = response
            .data
            .into_iter()
            .filter_map(|item| {
                let value = item.market_value?;
                let coins = value / 100.0;
                let price = coins * coin_rate;
                if item.market_name.trim().is_empty() || price < 0.01 || price > 50_000.0 {
                    return None;
                }
                Some(
                    Listing::new(Venue::Empire, item.market_name, price)
                        .with_extra("price_coins", serde_json::json!(coins))
                        .with_extra("coin_rate", serde_json::json!(coin_rate)),
                )
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
    fn converts_coins_with_configured_ratio() {
        let (mut ctx, _tmp) = test_support::ctx();
        ctx.scraper.conversion_rate = Some(0.614);
        let body = br#"{"data": [
            {"market_name": "AK-47 | Slate (Factory New)", "market_value": 1000}
        ]}"#;
        let listings = EmpireAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        // 1000 -> 10 coins -> $6.14.
        assert!((listings[0].price - 6.14).abs() < 1e-9);
        let extra = listings[0].extra.as_ref().unwrap();
        assert_eq!(extra["price_coins"], serde_json::json!(10.0));
    }
}
