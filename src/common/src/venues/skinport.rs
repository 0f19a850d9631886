//! Skinport: one USD price dump, Brotli-compressed. Items with zero
//! quantity are listed but unavailable and are dropped here.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const ITEMS_URL: &str = "https://api.skinport.com/v1/items?app_id=730&currency=USD";

#[derive(Debug, Deserialize)]
struct SkinportItem {
    market_hash_name: String,
    min_price: Option<f64>,
    #[serde(default)]
    quantity: u64,
    #[serde(default)]
    item_page: Option<String>,
}

pub struct SkinportAdapter;

impl VenueAdapter for SkinportAdapter {
    fn venue(&self) -> Venue {
        Venue::Skinport
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: ITEMS_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let items: Vec<SkinportItem> = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("skinport items", e.to_string()))?;

        let listings = items
            .into_iter()
            .filter_map(|item| {
                let price = item.min_price?;
                if item.quantity == 0 || price <= 0.0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::Skinport, item.market_hash_name, price)
                    .with_quantity(item.quantity);
                if let Some(page) = item.item_page {
                    listing = listing.with_url(page);
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
    fn filters_unavailable_items() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"[
            {"market_hash_name": "AWP | Asiimov (Field-Tested)", "min_price": 79.5, "quantity": 4,
             "item_page": "https://skinport.com/item/awp-asiimov-field-tested"},
            {"market_hash_name": "Out of stock", "min_price": 10.0, "quantity": 0},
            {"market_hash_name": "No price", "min_price": null, "quantity": 3}
        ]"#;
        let listings = SkinportAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].item, "AWP | Asiimov (Field-Tested)");
        assert_eq!(listings[0].quantity, Some(4));
        assert_eq!(
            listings[0].url.as_deref(),
            Some("https://skinport.com/item/awp-asiimov-field-tested")
        );
    }
}
