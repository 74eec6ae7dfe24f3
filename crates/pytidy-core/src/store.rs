use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;

pub mod file;
pub mod remote;

pub use file::{FileCache, FileCacheStats};
pub use remote::{NullRemoteCache, RemoteCache};

/// Two-tier lookup/store fronting every registry fetch: a remote
/// key-value tier for speed, a local file tier for durability, each
/// independently expirable and independently disposable.
pub struct CacheStore {
    remote: Box<dyn RemoteCache>,
    file: FileCache,
    ttl: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub file: FileCacheStats,
    pub remote_live: bool,
    pub file_enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CacheClearReport {
    pub file_entries: u64,
    pub remote_entries: u64,
}

impl CacheStore {
    /// Assemble both tiers from configuration. The remote connection is
    /// attempted exactly once; failure leaves the store file-only for the
    /// process lifetime.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            remote: remote::connect(&config.remote),
            file: FileCache::new(&config.cache.dir, config.cache.ttl, config.cache.enabled),
            ttl: config.cache.ttl,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_tiers(remote: Box<dyn RemoteCache>, file: FileCache, ttl: Duration) -> Self {
        Self { remote, file, ttl }
    }

    /// Look `key` up remote-first. A file-tier hit is promoted into the
    /// remote tier before returning so the next lookup takes the fast
    /// path. Never fails; every failure inside a tier is a miss.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        if let Some(raw) = self.remote.get(key) {
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => return Some(value),
                Err(err) => {
                    warn!(key, %err, "corrupt remote cache payload removed");
                    self.remote.delete(key);
                }
            }
        }

        let value = self.file.get(key)?;
        if self.remote.is_live() {
            match serde_json::to_string(&value) {
                Ok(raw) => {
                    debug!(key, "promoting file cache hit to remote tier");
                    self.remote.put(key, &raw, self.ttl);
                }
                Err(err) => warn!(key, %err, "cannot promote cache entry"),
            }
        }
        Some(value)
    }

    /// Store `payload` in both enabled tiers.
    pub fn put(&mut self, key: &str, payload: &Value) {
        match serde_json::to_string(payload) {
            Ok(raw) => self.remote.put(key, &raw, self.ttl),
            Err(err) => warn!(key, %err, "cannot serialize cache payload"),
        }
        self.file.put(key, payload);
    }

    /// Drop every entry from both tiers.
    pub fn clear(&mut self) -> CacheClearReport {
        CacheClearReport {
            file_entries: self.file.clear(),
            remote_entries: self.remote.clear(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            file: self.file.stats(),
            remote_live: self.remote.is_live(),
            file_enabled: self.file.is_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;
    use tempfile::tempdir;

    use super::remote::MemoryRemoteCache;
    use super::*;

    fn memory_remote() -> Box<MemoryRemoteCache> {
        Box::new(MemoryRemoteCache {
            entries: HashMap::new(),
        })
    }

    #[test]
    fn round_trips_through_both_tiers() {
        let dir = tempdir().unwrap();
        let file = FileCache::new(dir.path(), Duration::from_secs(60), true);
        let mut store = CacheStore::with_tiers(memory_remote(), file, Duration::from_secs(60));

        let payload = json!({"info": {"version": "2.0.0"}});
        store.put("package_info:demo", &payload);
        assert_eq!(store.get("package_info:demo"), Some(payload));
    }

    #[test]
    fn round_trips_with_remote_disabled() {
        let dir = tempdir().unwrap();
        let file = FileCache::new(dir.path(), Duration::from_secs(60), true);
        let mut store = CacheStore::with_tiers(
            Box::new(NullRemoteCache),
            file,
            Duration::from_secs(60),
        );

        let payload = json!(["a", "b"]);
        store.put("key", &payload);
        assert_eq!(store.get("key"), Some(payload));
    }

    #[test]
    fn round_trips_with_file_tier_disabled() {
        let dir = tempdir().unwrap();
        let file = FileCache::new(dir.path(), Duration::from_secs(60), false);
        let mut store = CacheStore::with_tiers(memory_remote(), file, Duration::from_secs(60));

        let payload = json!(42);
        store.put("key", &payload);
        assert_eq!(store.get("key"), Some(payload));
    }

    #[test]
    fn file_hits_are_promoted_to_the_remote_tier() {
        let dir = tempdir().unwrap();

        // Seed only the file tier.
        let seed = FileCache::new(dir.path(), Duration::from_secs(60), true);
        seed.put("key", &json!("cached"));

        let file = FileCache::new(dir.path(), Duration::from_secs(60), true);
        let mut store = CacheStore::with_tiers(memory_remote(), file, Duration::from_secs(60));

        assert_eq!(store.get("key"), Some(json!("cached")));
        // A second get is served by the remote tier even after the file
        // entry disappears.
        let removed = FileCache::new(dir.path(), Duration::from_secs(60), true).clear();
        assert_eq!(removed, 1);
        assert_eq!(store.get("key"), Some(json!("cached")));
    }

    #[test]
    fn corrupt_remote_payload_is_deleted_and_falls_through() {
        let dir = tempdir().unwrap();
        let file = FileCache::new(dir.path(), Duration::from_secs(60), true);
        file.put("key", &json!("from-file"));

        let mut remote = memory_remote();
        remote.entries.insert("key".to_string(), "{not json".to_string());
        let mut store = CacheStore::with_tiers(remote, file, Duration::from_secs(60));

        assert_eq!(store.get("key"), Some(json!("from-file")));
    }

    #[test]
    fn clear_reports_both_tiers() {
        let dir = tempdir().unwrap();
        let file = FileCache::new(dir.path(), Duration::from_secs(60), true);
        let mut store = CacheStore::with_tiers(memory_remote(), file, Duration::from_secs(60));

        store.put("a", &json!(1));
        store.put("b", &json!(2));
        let report = store.clear();
        assert_eq!(report.file_entries, 2);
        assert_eq!(report.remote_entries, 2);
        assert_eq!(store.get("a"), None);
    }
}
