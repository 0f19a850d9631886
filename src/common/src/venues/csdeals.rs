//! CS.Deals: lowest-price dump behind a `success` envelope.

use serde::Deserialize;

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter};
use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue};

const PRICING_URL: &str =
    "https://cs.deals/API/IPricing/GetLowestPrices/v1?appid=730";

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    response: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    items: Vec<PriceItem>,
}

#[derive(Debug, Deserialize)]
struct PriceItem {
    marketname: String,
    lowest_price: Option<f64>,
    #[serde(default)]
    marketable_quantity: Option<u64>,
}

pub struct CsdealsAdapter;

impl VenueAdapter for CsdealsAdapter {
    fn venue(&self) -> Venue {
        Venue::Csdeals
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Single {
            url: PRICING_URL.to_string(),
        })
    }

    fn parse(&self, body: &[u8], _ctx: &AdapterContext) -> Result<Vec<Listing>> {
        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| ScrapeError::parse("csdeals pricing", e.to_string()))?;
        if !envelope.success {
            return Err(ScrapeError::parse(
                "csdeals pricing",
                "API reported success=false",
            ));
        }
        let payload = envelope.response.ok_or_else(|| {
            ScrapeError::parse("csdeals pricing", "success response without payload")
        })?;

        let listings = payload
            .items
            .into_iter()
            .filter_map(|item| {
                let price = item.lowest_price?;
                if item.marketname.trim().is_empty() || price <= 0.0 {
                    return None;
                }
                let mut listing = Listing::new(Venue::Csdeals, item.marketname, price);
                if let Some(quantity) = item.marketable_quantity {
                    listing = listing.with_quantity(quantity);
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
    fn unwraps_success_envelope() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{"success": true, "response": {"items": [
            {"marketname": "P250 | Sand Dune (Field-Tested)", "lowest_price": 0.03}
        ]}}"#;
        let listings = CsdealsAdapter.parse(body, &ctx).unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].price, 0.03);
    }

    #[test]
    fn failed_envelope_is_an_error() {
        let (ctx, _tmp) = test_support::ctx();
        let body = br#"{"success": false}"#;
        assert!(CsdealsAdapter.parse(body, &ctx).is_err());
    }
}
