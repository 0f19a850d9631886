//! RapidSkins: the storefront is rendered client-side with no stable data
//! endpoint, so the adapter declares itself browser-only and the framework
//! publishes an empty snapshot with the documented reason.

use crate::adapter::{AdapterContext, FetchPlan, VenueAdapter, DYNAMIC_CONTENT_REASON};
use crate::error::Result;
use crate::models::Venue;

pub struct RapidskinsAdapter;

impl VenueAdapter for RapidskinsAdapter {
    fn venue(&self) -> Venue {
        Venue::Rapidskins
    }

    fn plan(&self, _ctx: &AdapterContext) -> Result<FetchPlan> {
        Ok(FetchPlan::Browser {
            reason: DYNAMIC_CONTENT_REASON,
        })
    }
}
