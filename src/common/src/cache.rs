//! Two cache tiers: a bounded in-process key/value store for hot payloads
//! and a content-addressed on-disk image cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Result, ScrapeError};

/// Hit/miss counters for reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
    pub entries: usize,
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
    /// Monotonic access stamp; smallest = least recently used.
    last_access: u64,
}

struct KvState {
    entries: HashMap<String, Entry>,
    clock: u64,
    stats: CacheStats,
}

/// Bounded in-memory cache with per-entry TTL and LRU eviction.
///
/// Single writer lock; payloads are JSON values because that is what every
/// adapter response reduces to before parsing.
pub struct KvCache {
    state: Mutex<KvState>,
    capacity: usize,
    enabled: bool,
}

impl KvCache {
    pub fn new(capacity: usize, enabled: bool) -> Self {
        Self {
            state: Mutex::new(KvState {
                entries: HashMap::new(),
                clock: 0,
                stats: CacheStats::default(),
            }),
            capacity: capacity.max(1),
            enabled,
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        let mut state = self.state.lock();
        state.clock += 1;
        let clock = state.clock;
        let now = Instant::now();

        let expired = matches!(state.entries.get(key), Some(e) if e.expires_at <= now);
        if expired {
            // Lazy expiry on access.
            state.entries.remove(key);
            state.stats.expired += 1;
            state.stats.misses += 1;
            return None;
        }

        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = clock;
            let value = entry.value.clone();
            state.stats.hits += 1;
            return Some(value);
        }

        state.stats.misses += 1;
        None
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock();
        state.clock += 1;
        let clock = state.clock;
        state.entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                last_access: clock,
            },
        );
        while state.entries.len() > self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    state.entries.remove(&key);
                    state.stats.evictions += 1;
                }
                None => break,
            }
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.state.lock().entries.remove(key);
    }

    /// Drop every expired entry. Called opportunistically between adapter
    /// runs; correctness only needs the lazy path in `get`.
    pub fn sweep(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, e| e.expires_at > now);
        state.stats.expired += (before - state.entries.len()) as u64;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats;
        stats.entries = state.entries.len();
        stats
    }
}

/// Content-addressed image cache. The path is a pure function of the source
/// URL; file existence is the cache check.
pub struct ImageCache {
    root: PathBuf,
}

impl ImageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Deterministic local path for a remote image URL:
    /// `<root>/<first 2 hash hex>/<hash>.jpg`. The two-character fan-out
    /// keeps directories below filesystem slowdown thresholds with six-digit
    /// icon counts.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        self.root.join(&hex[..2]).join(format!("{hex}.jpg"))
    }

    /// Whether the image for `url` is already cached.
    pub fn contains(&self, url: &str) -> bool {
        self.path_for(url).is_file()
    }

    /// Site-relative path (`/cache/images/...`) for a cached image, `None`
    /// when the asset has not been stored yet. This is the form persisted
    /// catalogs carry once an asset goes local.
    pub fn public_path(&self, url: &str) -> Option<String> {
        if !self.contains(url) {
            return None;
        }
        let path = self.path_for(url);
        let hash_name = path.file_name()?.to_str()?.to_string();
        let shard = path.parent()?.file_name()?.to_str()?.to_string();
        Some(format!("/cache/images/{shard}/{hash_name}"))
    }

    /// Store image bytes for a URL; parent directories are created on
    /// demand. Returns the final path.
    pub fn store(&self, url: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(url);
        let parent = path.parent().ok_or_else(|| ScrapeError::Persistence {
            path: path.display().to_string(),
            reason: "cache path has no parent directory".to_string(),
        })?;
        std::fs::create_dir_all(parent).map_err(|e| ScrapeError::Persistence {
            path: parent.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, bytes).map_err(|e| ScrapeError::Persistence {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(path)
    }

    /// Adopt a pre-existing image tree by symlinking it under the cache
    /// root. Contents are never copied; a broken or unsupported symlink
    /// degrades to a warning because the cache is only an optimization.
    pub fn import_tree(&self, external: &Path) -> Result<()> {
        if !external.is_dir() {
            debug!("no external image tree at {}", external.display());
            return Ok(());
        }
        std::fs::create_dir_all(&self.root).map_err(|e| ScrapeError::Persistence {
            path: self.root.display().to_string(),
            reason: e.to_string(),
        })?;
        let link = self.root.join("external");
        if link.exists() {
            return Ok(());
        }
        #[cfg(unix)]
        let outcome = std::os::unix::fs::symlink(external, &link);
        #[cfg(not(unix))]
        let outcome = std::os::windows::fs::symlink_dir(external, &link);
        match outcome {
            Ok(()) => {
                info!(
                    "imported external image tree {} -> {}",
                    link.display(),
                    external.display()
                );
                Ok(())
            }
            Err(e) => {
                warn!("could not link external image tree: {e}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_set_and_ttl_expiry() {
        let cache = KvCache::new(16, true);
        cache.set("k", json!({"a": 1}), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));

        cache.set("gone", json!(1), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("gone"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let cache = KvCache::new(2, true);
        cache.set("a", json!(1), Duration::from_secs(60));
        cache.set("b", json!(2), Duration::from_secs(60));
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.set("c", json!(3), Duration::from_secs(60));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let cache = KvCache::new(16, false);
        cache.set("k", json!(1), Duration::from_secs(60));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn sweep_removes_expired_entries() {
        let cache = KvCache::new(16, true);
        cache.set("live", json!(1), Duration::from_secs(60));
        cache.set("dead", json!(2), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        cache.sweep();
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn image_paths_are_deterministic_and_distinct() {
        let cache = ImageCache::new("/tmp/imgcache");
        let a1 = cache.path_for("https://img/a.png");
        let a2 = cache.path_for("https://img/a.png");
        let b = cache.path_for("https://img/b.png");
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert!(a1.starts_with("/tmp/imgcache"));
        assert_eq!(a1.extension().unwrap(), "jpg");
    }

    #[test]
    fn store_then_contains() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(tmp.path());
        let url = "https://community.fastly.steamstatic.com/economy/image/xyz";
        assert!(!cache.contains(url));
        cache.store(url, b"fake-jpeg").unwrap();
        assert!(cache.contains(url));
    }

    #[cfg(unix)]
    #[test]
    fn import_tree_links_external_dir() {
        let external = tempfile::tempdir().unwrap();
        std::fs::write(external.path().join("icon.jpg"), b"x").unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let cache = ImageCache::new(tmp.path().join("images"));
        cache.import_tree(external.path()).unwrap();
        let link = tmp.path().join("images/external");
        assert!(link.join("icon.jpg").is_file());
    }
}
