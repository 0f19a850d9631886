//! Venue adapter implementations, one file per marketplace.

mod bitskins;
mod csdeals;
mod cstrade;
mod empire;
mod lisskins;
mod manncostore;
mod marketcsgo;
mod rapidskins;
mod shadowpay;
mod skindeck;
mod skinout;
mod skinport;
mod steam;
mod tradeit;
mod waxpeer;
mod white;

use crate::adapter::VenueAdapter;
use crate::models::Venue;

/// Construct the adapter for a venue.
pub fn adapter_for(venue: Venue) -> Box<dyn VenueAdapter> {
    match venue {
        Venue::Waxpeer => Box::new(waxpeer::WaxpeerAdapter),
        Venue::Skinport => Box::new(skinport::SkinportAdapter),
        Venue::Bitskins => Box::new(bitskins::BitskinsAdapter),
        Venue::SteamMarket => Box::new(steam::SteamMarketAdapter),
        Venue::SteamListing => Box::new(steam::SteamListingAdapter),
        Venue::Empire => Box::new(empire::EmpireAdapter),
        Venue::Shadowpay => Box::new(shadowpay::ShadowpayAdapter),
        Venue::Csdeals => Box::new(csdeals::CsdealsAdapter),
        Venue::Cstrade => Box::new(cstrade::CstradeAdapter),
        Venue::Lisskins => Box::new(lisskins::LisskinsAdapter),
        Venue::Marketcsgo => Box::new(marketcsgo::MarketcsgoAdapter),
        Venue::Manncostore => Box::new(manncostore::ManncostoreAdapter),
        Venue::Tradeit => Box::new(tradeit::TradeitAdapter),
        Venue::Rapidskins => Box::new(rapidskins::RapidskinsAdapter),
        Venue::Skindeck => Box::new(skindeck::SkindeckAdapter),
        Venue::Skinout => Box::new(skinout::SkinoutAdapter),
        Venue::White => Box::new(white::WhiteAdapter),
        Venue::Steamid => Box::new(steam::SteamidAdapter),
    }
}

/// Named selection groups for the CLI.
pub fn group(name: &str) -> Option<Vec<Venue>> {
    match name {
        "all" => Some(Venue::ALL.to_vec()),
        // Keyless JSON APIs, safe to hammer in one go.
        "api" => Some(vec![
            Venue::Waxpeer,
            Venue::Skinport,
            Venue::Bitskins,
            Venue::Csdeals,
            Venue::Cstrade,
            Venue::Lisskins,
            Venue::Marketcsgo,
            Venue::Tradeit,
            Venue::Skinout,
            Venue::White,
        ]),
        // Single-request venues: one payload each, fastest full pass.
        "fast" => Some(vec![
            Venue::Skinport,
            Venue::Bitskins,
            Venue::Csdeals,
            Venue::Cstrade,
            Venue::Lisskins,
            Venue::Marketcsgo,
            Venue::Tradeit,
            Venue::White,
        ]),
        // The set a profitability pass actually needs.
        "essential" => Some(vec![
            Venue::Waxpeer,
            Venue::Skinport,
            Venue::Csdeals,
            Venue::Marketcsgo,
            Venue::SteamListing,
        ]),
        "steam" => Some(vec![Venue::SteamListing, Venue::Steamid, Venue::SteamMarket]),
        _ => None,
    }
}
