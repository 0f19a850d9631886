//! CS.Trade: price dump listed with the site's 50% trade bonus baked in.
//! The effective cash price is listed / (1 + bonus); both figures are kept
//! so downstream consumers can tell them apart.

use std::collections::HashMap;

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PRICES_URL: &str = "https://cdn.cs.trade:2096/api/prices_CSGO";

/// Site-wide trade bonus percentage.
const BONUS_RATE: f64 = 50.0;

#[derive(Debug, Deserialize)]
struct PriceEntry {
    price: Option<f64>,
    #[serde(default)]
    have: Option<u64>,
    #[serde(default)]
    tradable: Option<u64>,
}

pub struct CstradeAdapter;

impl CstradeAdapter {
    fn effective_price(listed: f64) -> f64 {
        listed / (1.0 + BONUS_RATE / 100.0)
    }
}

impl VenueAdapter for CstradeAdapter {
    fn venue(&self) -> Venue {
        Venue::Cstrade
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: PRICES_URL.to_string(),
        })
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Referer".to_string(), "https://cs.trade/".to_string()),
            ("Origin".to_string(), "https://cs.trade".to_string()),
        ]
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let entries: HashMap<String, PriceEntry> = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("cstrade prices", e.to_string()))?;

        let listings = entries
            .into_iter()
            .filter_map(|(name, entry)| {
                let listed = entry.price?;
                if name.trim().is_empty() || listed <= 0.0 {
                    return None;
                }
                let effective = Self::effective_price(listed);
                let stock = entry.have.or(entry.tradable);
                let mut listing = Listing::new(Venue::Cstrade, name, effective)
                    .with_extra("price_with_bonus", serde_json::json!(listed))
                    .with_extra("bonus_rate", serde_json::json!(BONUS_RATE));
                if let Some(stock) = stock {
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
    fn strips_trade_bonus() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{
            "AK-47 | Redline (Field-Tested)": {"price": 56.745, "have": 3, "tradable": 3}
        }"#;
        let listings = CstradeAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        // 56.745 listed at +50% bonus is 37.83 cash.
        assert!((listings[0].price - 37.83).abs() < 1e-9);
        let extra = listings[0].extra.as_ref().unwrap();
        assert_eq!(extra["price_with_bonus"], serde_json::json!(56.745));
        assert_eq!(listings[0].quantity, Some(3));
    }
}
