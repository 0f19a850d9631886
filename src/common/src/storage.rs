//! Snapshot persistence: `<venue>_data.json` arrays in the canonical
//! record shape, written atomically.

use std::path::Path;

use tracing::info;

use crate::error::{Result, ScrapeError};
use crate::models::{Listing, Venue, VenueSnapshot};
use crate::paths::PathRegistry;

/// Atomically write serializable data: temp file in the target directory,
/// then rename. A crash or cancellation mid-write leaves either the old
/// file or nothing, never a truncated JSON document.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let persist_err = |reason: String| ScrapeError::Persistence {
        path: path.display().to_string(),
        reason,
    };
    let parent = path
        .parent()
        .ok_or_else(|| persist_err("path has no parent directory".to_string()))?;
    std::fs::create_dir_all(parent).map_err(|e| persist_err(e.to_string()))?;

    let bytes = serde_json::to_vec_pretty(value).map_err(|e| persist_err(e.to_string()))?;
    let temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| persist_err(e.to_string()))?;
    std::fs::write(temp.path(), &bytes).map_err(|e| persist_err(e.to_string()))?;
    temp.persist(path)
        .map_err(|e| persist_err(e.error.to_string()))?;
    Ok(())
}

/// Persist a snapshot's listings as the venue's data file.
pub fn save_snapshot(paths: &PathRegistry, snapshot: &VenueSnapshot) -> Result<()> {
    let path = paths.venue_data_file(snapshot.venue);
    write_json_atomic(&path, &snapshot.listings)?;
    info!(
        "saved {} listings to {}",
        snapshot.listings.len(),
        path.display()
    );
    Ok(())
}

/// Load a venue's persisted listings; a missing file is an empty catalog.
pub fn load_listings(paths: &PathRegistry, venue: Venue) -> Result<Vec<Listing>> {
    let path = paths.venue_data_file(venue);
    match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| ScrapeError::parse(path.display().to_string(), e.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(ScrapeError::Persistence {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Listing;

    #[test]
    fn snapshot_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathRegistry::rooted_at(tmp.path());

        let snapshot = VenueSnapshot::build(
            Venue::Skinport,
            vec![
                Listing::new(Venue::Skinport, "AK-47 | Slate", 4.20).with_quantity(7),
                Listing::new(Venue::Skinport, "AWP | Asiimov", 30.0),
            ],
        );
        save_snapshot(&paths, &snapshot).unwrap();

        let loaded = load_listings(&paths, Venue::Skinport).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].item, "AK-47 | Slate");
        assert_eq!(loaded[0].quantity, Some(7));
    }

    #[test]
    fn missing_file_is_empty_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathRegistry::rooted_at(tmp.path());
        assert!(load_listings(&paths, Venue::Waxpeer).unwrap().is_empty());
    }

    #[test]
    fn partial_snapshot_on_disk_is_always_parseable() {
        // Cancellation persists whatever pages were already validated; the
        // file on disk must parse as a complete array regardless of when
        // the run stopped.
        let tmp = tempfile::tempdir().unwrap();
        let paths = PathRegistry::rooted_at(tmp.path());

        for pages_done in 1..=5 {
            let listings: Vec<Listing> = (0..pages_done * 10)
                .map(|i| Listing::new(Venue::SteamListing, format!("Item {i}"), i as f64))
                .collect();
            let snapshot = VenueSnapshot::build(Venue::SteamListing, listings);
            save_snapshot(&paths, &snapshot).unwrap();

            let loaded = load_listings(&paths, Venue::SteamListing).unwrap();
            assert_eq!(loaded.len(), pages_done * 10);
            assert!(loaded.iter().all(|l| l.is_valid()));
        }
    }
}
