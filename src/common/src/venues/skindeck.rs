//! SkinDeck: authenticated, paginated offer listing.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PAGE_SIZE: usize = 500;
const MAX_PAGES: usize = 40;

#[derive(Debug, Deserialize)]
struct MarketResponse {
    #[serde(default)]
    offers: Vec<Offer>,
}

#[derive(Debug, Deserialize)]
struct Offer {
    #[serde(rename = "marketHashName")]
    market_hash_name: String,
    price: Option<f64>,
}

pub struct SkindeckAdapter;

impl VenueAdapter for SkindeckAdapter {
    fn venue(&self) -> Venue {
        Venue::Skindeck
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Paginated { max_pages: MAX_PAGES })
    }

    fn page_url(&self, page: usize) -> String {
        format!(
            "https://api.skindeck.com/client/market?page={}&perPage={PAGE_SIZE}&sort=price_desc",
            page + 1
        )
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let response: MarketResponse = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("skindeck market", e.to_string()))?;

        let listings = response
            .offers
            .into_iter()
            .filter_map(|offer| {
                let price = offer.price?;
                if offer.market_hash_name.trim().is_empty() || price <= 0.0 {
                    return None;
                }
                Some(Listing::new(Venue::Skindeck, offer.market_hash_name, price))
            })
            .collect();
        Ok(listings)
    }
}
