//! Incremental merge store for catalogs too large to rescrape wholesale.
//!
//! Steam's full catalog runs to six figures; most entries do not move
//! between harvests. New pages are merged entry-by-entry into the on-disk
//! snapshot instead of rewriting identical records.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::Result;
use crate::models::{Listing, Venue};
use crate::paths::PathRegistry;
use crate::storage::{load_listings, write_json_atomic};

/// Price moves smaller than this are noise and skipped.
const PRICE_EPSILON: f64 = 0.01;

/// Counters from one merge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub duplicates_skipped: usize,
    pub total: usize,
}

/// Merge incoming listings into a venue's persisted catalog and write the
/// result atomically. Keyed by item name:
/// - unknown name: insert;
/// - known name: take the new price only when it moved by at least a cent;
/// - asset URLs upgrade from remote to locally-cached form, never back.
pub fn merge_into_store(
    paths: &PathRegistry,
    venue: Venue,
    incoming: Vec<Listing>,
) -> Result<MergeOutcome> {
    let existing = load_listings(paths, venue)?;
    let mut by_name: BTreeMap<String, Listing> = existing
        .into_iter()
        .map(|l| (l.item.clone(), l))
        .collect();

    let mut outcome = MergeOutcome::default();
    for new_item in incoming {
        if !new_item.is_valid() {
            continue;
        }
        match by_name.get_mut(&new_item.item) {
            None => {
                by_name.insert(new_item.item.clone(), new_item);
                outcome.inserted += 1;
            }
            Some(current) => {
                let price_moved = (new_item.price - current.price).abs() >= PRICE_EPSILON;
                let url_upgraded = upgrade_asset_url(current, &new_item);
                if price_moved {
                    current.price = new_item.price;
                    outcome.updated += 1;
                } else if url_upgraded {
                    outcome.updated += 1;
                } else {
                    outcome.duplicates_skipped += 1;
                }
            }
        }
    }
    outcome.total = by_name.len();

    let listings: Vec<&Listing> = by_name.values().collect();
    write_json_atomic(&paths.venue_data_file(venue), &listings)?;
    info!(
        "{venue}: merged (+{} inserted, {} updated, {} duplicates, {} total)",
        outcome.inserted, outcome.updated, outcome.duplicates_skipped, outcome.total
    );
    Ok(outcome)
}

/// Swap the stored URL for the new one when the new URL points at the
/// local asset tree and the stored one does not. Returns whether a swap
/// happened.
fn upgrade_asset_url(current: &mut Listing, new_item: &Listing) -> bool {
    let is_local =
        |url: &str| url.starts_with("/static/") || url.starts_with("/cache/");
    match (&current.url, &new_item.url) {
        (Some(old), Some(new)) if is_local(new) && !is_local(old) => {
            current.url = Some(new.clone());
            true
        }
        (None, Some(new)) if is_local(new) => {
            current.url = Some(new.clone());
            true
        }
        _ => false,
    }
}
