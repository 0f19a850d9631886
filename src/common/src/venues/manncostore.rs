//! Mannco.store: skip-paginated catalog behind a fingerprinting WAF (the
//! low-level client profile is forced in config). Prices are integers with
//! the cents inlined: 1250 means $12.50.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PAGE_SIZE: usize = 50;
const MAX_PAGES: usize = 200;

#[derive(Debug, Deserialize)]
struct CatalogItem {
    name: String,
    price: Option<i64>,
}

pub struct ManncostoreAdapter;

impl ManncostoreAdapter {
    /// 1250 -> 12.50, 99 -> 0.99, 5 -> 0.05.
    fn decode_price(raw: i64) -> Option<f64> {
        if raw <= 0 {
            return None;
        }
        Some(raw as f64 / 100.0)
    }
}

impl VenueAdapter for ManncostoreAdapter {
    fn venue(&self) -> Venue {
        Venue::Manncostore
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Paginated { max_pages: MAX_PAGES })
    }

    fn page_url(&self, page: usize) -> String {
        format!(
            "https://mannco.store/items/get?price=DESC&page=1&i=0&game=730&skip={}",
            page * PAGE_SIZE
        )
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let items: Vec<CatalogItem> = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("manncostore catalog", e.to_string()))?;

        let listings = items
            .into_iter()
            .filter_map(|item| {
                let price = Self::decode_price(item.price?)?;
                if item.name.trim().is_empty() {
                    return None;
                }
                Some(Listing::new(Venue::Manncostore, item.name, price))
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
    fn inline_cents_decode() {
        assert_eq!(ManncostoreAdapter::decode_price(1250), Some(12.50));
        assert_eq!(ManncostoreAdapter::decode_price(99), Some(0.99));
        assert_eq!(ManncostoreAdapter::decode_price(5), Some(0.05));
        assert_eq!(ManncostoreAdapter::decode_price(0), None);
    }

    #[test]
    fn skip_parameter_advances_by_page_size() {
        assert!(ManncostoreAdapter.page_url(0).ends_with("skip=0"));
        assert!(ManncostoreAdapter.page_url(4).ends_with("skip=200"));
    }

    #[test]
    fn parses_catalog_page() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"[
            {"name": "Tec-9 | Isaac (Field-Tested)", "price": 134},
            {"name": "Free?", "price": 0}
        ]"#;
        let listings = ManncostoreAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert!((listings[0].price - 1.34).abs() < 1e-9);
    }
}
