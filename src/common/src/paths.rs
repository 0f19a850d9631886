//! Well-known filesystem locations.
//!
//! Components never build paths from literals; everything goes through this
//! registry so the data root can be relocated with a single environment
//! variable.

use std::path::{Path, PathBuf};

use crate::error::{Result, ScrapeError};
use crate::models::Venue;

/// Resolved directory layout for one process.
#[derive(Debug, Clone)]
pub struct PathRegistry {
    root: PathBuf,
    data_dir: PathBuf,
    config_dir: PathBuf,
    cache_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathRegistry {
    /// Resolve from the environment:
    /// - `BOT_DATA_ROOT` relocates everything (default: current directory)
    /// - `BOT_DATA_DIR` / `BOT_CONFIG_DIR` / `BOT_CACHE_DIR` / `BOT_LOG_DIR`
    ///   override individual locations.
    pub fn from_env() -> Self {
        let root = std::env::var("BOT_DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        let dir = |var: &str, default: &str| {
            std::env::var(var)
                .map(PathBuf::from)
                .unwrap_or_else(|_| root.join(default))
        };
        Self {
            data_dir: dir("BOT_DATA_DIR", "data"),
            config_dir: dir("BOT_CONFIG_DIR", "config"),
            cache_dir: dir("BOT_CACHE_DIR", "cache"),
            log_dir: dir("BOT_LOG_DIR", "logs"),
            root,
        }
    }

    /// Registry rooted at an explicit directory, used by tests.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            log_dir: root.join("logs"),
            root,
        }
    }

    /// Create every directory the registry points at.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.data_dir, &self.config_dir, &self.cache_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|e| ScrapeError::Persistence {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn image_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("images")
    }

    /// Catalog file for a venue, e.g. `data/waxpeer_data.json`.
    pub fn venue_data_file(&self, venue: Venue) -> PathBuf {
        self.data_dir.join(format!("{}_data.json", venue.as_str()))
    }

    /// Nameid table produced by the steamid harvester.
    pub fn nameids_file(&self) -> PathBuf {
        self.data_dir.join("item_nameids.json")
    }

    /// Opportunity archive written by the profitability engine.
    pub fn profitability_file(&self) -> PathBuf {
        self.data_dir.join("profitability_data.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_layout() {
        let reg = PathRegistry::rooted_at("/tmp/botroot");
        assert_eq!(
            reg.venue_data_file(Venue::SteamListing),
            PathBuf::from("/tmp/botroot/data/steam_listing_data.json")
        );
        assert_eq!(reg.image_cache_dir(), PathBuf::from("/tmp/botroot/cache/images"));
        assert_eq!(
            reg.profitability_file(),
            PathBuf::from("/tmp/botroot/data/profitability_data.json")
        );
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let reg = PathRegistry::rooted_at(tmp.path());
        reg.ensure_dirs().unwrap();
        assert!(reg.data_dir().is_dir());
        assert!(reg.config_dir().is_dir());
        assert!(reg.cache_dir().is_dir());
        assert!(reg.log_dir().is_dir());
    }
}
