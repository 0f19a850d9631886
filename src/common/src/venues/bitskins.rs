//! BitSkins: sell-order summary, prices in thousandths of a dollar.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const INSELL_URL: &str = "https://api.bitskins.com/market/insell/730";

#[derive(Debug, Deserialize)]
struct InsellResponse {
    #[serde(default)]
    list: Vec<InsellItem>,
}

#[derive(Debug, Deserialize)]
struct InsellItem {
    name: String,
    /// Thousandths of a dollar: $1.00 = 1000.
    price_min: Option<f64>,
    #[serde(default)]
    quantity: u64,
}

pub struct BitskinsAdapter;

impl VenueAdapter for BitskinsAdapter {
    fn venue(&self) -> Venue {
        Venue::Bitskins
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: INSELL_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: InsellResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("bitskins insell", e.to_string()))?;

        let listings = response
            .list
            .into_iter()
            .filter_map(|item| {
                let thousandths = item.price_min?;
                let price = thousandths / 1000.0;
                if item.name.trim().is_empty() || price < 0.01 || price > 50_000.0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::Bitskins, item.name, price);
                if item.quantity > 0 {
                    listing = listing.with_quantity(item.quantity);
                }
                Some(listing)
            })
            .collect();
        Ok(listings)
    }
}
