//! Shared data model: venues, normalized listings, snapshots, opportunities.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Steam Community Market listing URL prefix for CS:GO (app 730).
pub const STEAM_LISTING_URL: &str = "https://steamcommunity.com/market/listings/730/";

/// Supported marketplaces. Closed set: snapshots and opportunities only ever
/// carry one of these identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Waxpeer,
    Skinport,
    Bitskins,
    SteamMarket,
    SteamListing,
    Empire,
    Shadowpay,
    Csdeals,
    Cstrade,
    Lisskins,
    Marketcsgo,
    Manncostore,
    Tradeit,
    Rapidskins,
    Skindeck,
    Skinout,
    White,
    Steamid,
}

impl Venue {
    pub const ALL: [Venue; 18] = [
        Venue::Waxpeer,
        Venue::Skinport,
        Venue::Bitskins,
        Venue::SteamMarket,
        Venue::SteamListing,
        Venue::Empire,
        Venue::Shadowpay,
        Venue::Csdeals,
        Venue::Cstrade,
        Venue::Lisskins,
        Venue::Marketcsgo,
        Venue::Manncostore,
        Venue::Tradeit,
        Venue::Rapidskins,
        Venue::Skindeck,
        Venue::Skinout,
        Venue::White,
        Venue::Steamid,
    ];

    /// Identifier used in config files, CLI arguments, and data file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Waxpeer => "waxpeer",
            Venue::Skinport => "skinport",
            Venue::Bitskins => "bitskins",
            Venue::SteamMarket => "steam_market",
            Venue::SteamListing => "steam_listing",
            Venue::Empire => "empire",
            Venue::Shadowpay => "shadowpay",
            Venue::Csdeals => "csdeals",
            Venue::Cstrade => "cstrade",
            Venue::Lisskins => "lisskins",
            Venue::Marketcsgo => "marketcsgo",
            Venue::Manncostore => "manncostore",
            Venue::Tradeit => "tradeit",
            Venue::Rapidskins => "rapidskins",
            Venue::Skindeck => "skindeck",
            Venue::Skinout => "skinout",
            Venue::White => "white",
            Venue::Steamid => "steamid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let lower = s.to_lowercase();
        Venue::ALL.iter().copied().find(|v| v.as_str() == lower)
    }

    /// Venues whose snapshots feed the Steam reference table.
    pub fn is_steam_origin(&self) -> bool {
        matches!(self, Venue::SteamMarket | Venue::SteamListing)
    }

    /// Venues that must not hit the network without a bearer token.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Venue::Empire | Venue::Shadowpay | Venue::Skindeck)
    }

    /// Environment variable holding this venue's API key.
    pub fn api_key_env(&self) -> String {
        format!("{}_API_KEY", self.as_str().to_uppercase())
    }

    /// Storefront URL template for buy links. `None` for venues that never
    /// appear as a buy side (Steam itself and the nameid harvester).
    pub fn storefront_url(&self) -> Option<&'static str> {
        match self {
            Venue::Waxpeer => Some("https://waxpeer.com/item/cs-go/"),
            Venue::Csdeals => Some("https://cs.deals/market/"),
            Venue::Empire => Some("https://csgoempire.com/shop/"),
            Venue::Skinport => Some("https://skinport.com/market/730?search="),
            Venue::Bitskins => Some("https://bitskins.com/market/730/search?market_hash_name="),
            Venue::Cstrade => Some("https://cs.trade/csgo-skins?search="),
            Venue::Marketcsgo => Some("https://market.csgo.com/?search="),
            Venue::Tradeit => Some("https://tradeit.gg/csgo/trade?search="),
            Venue::Skindeck => Some("https://skindeck.com/listings?query="),
            Venue::Rapidskins => Some("https://rapidskins.com/item/"),
            Venue::Manncostore => Some("https://mannco.store/item/730/"),
            Venue::Shadowpay => Some("https://shadowpay.com/csgo?search="),
            Venue::Skinout => Some("https://skinout.gg/market/cs2?item="),
            Venue::Lisskins => Some("https://lis-skins.com/market_730.html?search_item="),
            Venue::White => Some("https://white.market/search?game[]=CS2&query="),
            Venue::SteamMarket | Venue::SteamListing | Venue::Steamid => None,
        }
    }

    /// Buy URL for an item on this venue's storefront.
    pub fn item_url(&self, item_name: &str) -> Option<String> {
        self.storefront_url()
            .map(|base| format!("{base}{}", encode_item_name(item_name)))
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Encode a market hash name for use in venue URLs.
///
/// Only the two characters the storefronts require are touched; anything
/// broader breaks round-tripping against names like
/// "AK-47 | Redline (Field-Tested)".
pub fn encode_item_name(name: &str) -> String {
    name.replace(' ', "%20").replace('|', "%7C")
}

/// Reverse of [`encode_item_name`].
pub fn decode_item_name(encoded: &str) -> String {
    encoded.replace("%20", " ").replace("%7C", "|")
}

/// Steam Market listing URL for an item.
pub fn steam_url(item_name: &str) -> String {
    format!("{STEAM_LISTING_URL}{}", encode_item_name(item_name))
}

/// A normalized item listing on a single venue. Canonical on-disk shape:
/// `{ "Item": ..., "Price": ..., "Platform": ..., "URL": ..., "Quantity": ..., "Extra": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    #[serde(rename = "Item")]
    pub item: String,
    /// USD, venue-native currency already converted.
    #[serde(rename = "Price")]
    pub price: f64,
    #[serde(rename = "Platform")]
    pub platform: Venue,
    #[serde(rename = "URL", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Units for sale. `None` means present but count unknown.
    #[serde(rename = "Quantity", default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    /// Venue-specific extras (stock, tradable flag, raw prices). Freeform
    /// top-level keys are not allowed; everything non-canonical lands here.
    #[serde(rename = "Extra", default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<BTreeMap<String, serde_json::Value>>,
}

impl Listing {
    pub fn new(venue: Venue, item: impl Into<String>, price: f64) -> Self {
        let item = item.into();
        let url = venue.item_url(&item);
        Self {
            item,
            price,
            platform: venue,
            url,
            quantity: None,
            extra: None,
        }
    }

    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value);
        self
    }

    /// Basic validity: non-empty name, non-negative finite price.
    pub fn is_valid(&self) -> bool {
        !self.item.trim().is_empty() && self.price >= 0.0 && self.price.is_finite()
    }
}

/// Immutable per-venue catalog produced by one adapter run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSnapshot {
    pub venue: Venue,
    pub fetched_at: DateTime<Utc>,
    pub listings: Vec<Listing>,
}

impl VenueSnapshot {
    /// Build a snapshot from raw listings: drop invalid entries, keep the
    /// lowest price per item name, sort by name for stable on-disk order.
    pub fn build(venue: Venue, raw: Vec<Listing>) -> Self {
        let mut by_name: BTreeMap<String, Listing> = BTreeMap::new();
        for listing in raw {
            if !listing.is_valid() {
                continue;
            }
            match by_name.get(&listing.item) {
                Some(existing) if existing.price <= listing.price => {}
                _ => {
                    by_name.insert(listing.item.clone(), listing);
                }
            }
        }
        Self {
            venue,
            fetched_at: Utc::now(),
            listings: by_name.into_values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

/// A computed arbitrage candidate: buy on `buy_venue`, resell on Steam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub item_name: String,
    pub buy_venue: Venue,
    pub buy_price: f64,
    pub buy_url: String,
    /// Gross last-sale price on Steam.
    pub steam_price: f64,
    /// Seller-received price after Steam's fee ladder.
    pub net_steam_price: f64,
    pub profit_absolute: f64,
    /// Fraction of buy price, e.g. 0.046 for 4.6%.
    pub profit_percentage: f64,
    pub steam_url: String,
    pub timestamp: DateTime<Utc>,
}

/// One persisted batch of opportunities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityBatch {
    pub timestamp: DateTime<Utc>,
    pub total_opportunities: usize,
    pub mode: String,
    pub opportunities: Vec<Opportunity>,
}

/// On-disk archive: current batch plus a ring of previous batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityArchive {
    pub current: OpportunityBatch,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<OpportunityBatch>,
}

impl OpportunityArchive {
    /// History ring size. Writing a new current pushes the previous current
    /// onto history and trims to the newest entries.
    pub const HISTORY_CAP: usize = 10;

    pub fn new(batch: OpportunityBatch) -> Self {
        Self {
            last_updated: batch.timestamp,
            current: batch,
            history: Vec::new(),
        }
    }

    /// Replace the current batch, rotating the old one into history.
    pub fn push(&mut self, batch: OpportunityBatch) {
        let previous = std::mem::replace(&mut self.current, batch);
        self.history.push(previous);
        if self.history.len() > Self::HISTORY_CAP {
            let excess = self.history.len() - Self::HISTORY_CAP;
            self.history.drain(..excess);
        }
        self.last_updated = self.current.timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_round_trips_through_str() {
        for venue in Venue::ALL {
            assert_eq!(Venue::from_str(venue.as_str()), Some(venue));
        }
        assert_eq!(Venue::from_str("WAXPEER"), Some(Venue::Waxpeer));
        assert_eq!(Venue::from_str("nope"), None);
    }

    #[test]
    fn item_name_encoding_round_trips() {
        let name = "AK-47 | Redline (Field-Tested)";
        let encoded = encode_item_name(name);
        assert_eq!(encoded, "AK-47%20%7C%20Redline%20(Field-Tested)");
        assert_eq!(decode_item_name(&encoded), name);
    }

    #[test]
    fn steam_url_uses_listing_prefix() {
        let url = steam_url("M4A4 | Howl");
        assert!(url.starts_with(STEAM_LISTING_URL));
        assert!(url.ends_with("M4A4%20%7C%20Howl"));
    }

    #[test]
    fn snapshot_keeps_lowest_price_per_name() {
        let raw = vec![
            Listing::new(Venue::Waxpeer, "AWP | Asiimov", 30.0),
            Listing::new(Venue::Waxpeer, "AWP | Asiimov", 27.5),
            Listing::new(Venue::Waxpeer, "AWP | Asiimov", 31.0),
            Listing::new(Venue::Waxpeer, "AK-47 | Slate", 4.2),
            Listing::new(Venue::Waxpeer, "", 1.0),
            Listing::new(Venue::Waxpeer, "Negative", -2.0),
        ];
        let snapshot = VenueSnapshot::build(Venue::Waxpeer, raw);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.listings[0].item, "AK-47 | Slate");
        assert_eq!(snapshot.listings[1].item, "AWP | Asiimov");
        assert_eq!(snapshot.listings[1].price, 27.5);
    }

    #[test]
    fn listing_serializes_with_canonical_field_names() {
        let listing = Listing::new(Venue::Skinport, "Glock-18 | Fade", 120.0).with_quantity(3);
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["Item"], "Glock-18 | Fade");
        assert_eq!(json["Price"], 120.0);
        assert_eq!(json["Platform"], "skinport");
        assert_eq!(json["Quantity"], 3);
    }

    #[test]
    fn archive_history_saturates_at_cap() {
        let batch = |i: usize| OpportunityBatch {
            timestamp: Utc::now(),
            total_opportunities: i,
            mode: "complete".to_string(),
            opportunities: vec![],
        };
        let mut archive = OpportunityArchive::new(batch(0));
        for i in 1..=25 {
            archive.push(batch(i));
        }
        assert_eq!(archive.history.len(), OpportunityArchive::HISTORY_CAP);
        assert_eq!(archive.current.total_opportunities, 25);
        assert_eq!(archive.last_updated, archive.current.timestamp);
        assert_eq!(archive.history[0].total_opportunities, 15);
    }
}
