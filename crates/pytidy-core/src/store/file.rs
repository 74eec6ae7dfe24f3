use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// On-disk blob format: the payload wrapped in a self-describing envelope
/// so partial or foreign files fail to deserialize instead of being
/// misread.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    data: Value,
}

#[derive(Debug, Clone, Default)]
pub struct FileCacheStats {
    pub entries: u64,
    pub total_bytes: u64,
}

/// The local-file cache tier: one file per key under a flat root
/// directory, named by the hex digest of the key, expired by comparing
/// file modification time against a fixed window at read time.
#[derive(Debug)]
pub struct FileCache {
    root: Option<PathBuf>,
    ttl: Duration,
}

impl FileCache {
    /// Prepare the file tier rooted at `dir`. If the root cannot be
    /// created, file caching is disabled for this process and every
    /// lookup is a miss.
    #[must_use]
    pub fn new(dir: &Path, ttl: Duration, enabled: bool) -> Self {
        if !enabled {
            return Self { root: None, ttl };
        }
        match fs::create_dir_all(dir) {
            Ok(()) => Self {
                root: Some(dir.to_path_buf()),
                ttl,
            },
            Err(err) => {
                warn!(dir = %dir.display(), %err, "cannot create cache directory; file cache disabled");
                Self { root: None, ttl }
            }
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Look up `key`, deleting the entry as a side effect when it has
    /// expired or cannot be deserialized. Never fails; every problem is
    /// a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        let path = self.entry_path(key)?;
        let age = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified.elapsed().unwrap_or_default(),
            Err(_) => return None,
        };
        if age >= self.ttl {
            debug!(key, "file cache entry expired");
            remove_entry(&path);
            return None;
        }

        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(key, %err, "file cache read error");
                remove_entry(&path);
                return None;
            }
        };
        match serde_json::from_slice::<CacheEnvelope>(&contents) {
            Ok(envelope) => {
                debug!(key, "file cache hit");
                Some(envelope.data)
            }
            Err(err) => {
                warn!(key, %err, "corrupt file cache entry removed");
                remove_entry(&path);
                None
            }
        }
    }

    /// Store `payload` under `key` with an atomic whole-file replace, so
    /// overlapping invocations never observe a torn entry.
    pub fn put(&self, key: &str, payload: &Value) {
        let Some(path) = self.entry_path(key) else {
            return;
        };
        let Some(root) = self.root.as_deref() else {
            return;
        };
        let envelope = CacheEnvelope {
            data: payload.clone(),
        };
        let result = (|| -> std::io::Result<()> {
            let mut temp = NamedTempFile::new_in(root)?;
            serde_json::to_writer(&mut temp, &envelope)?;
            temp.flush()?;
            temp.persist(&path).map_err(|err| err.error)?;
            Ok(())
        })();
        match result {
            Ok(()) => debug!(key, "file cache write"),
            Err(err) => warn!(key, %err, "file cache write error"),
        }
    }

    /// Delete every entry; returns the number of files removed.
    pub fn clear(&self) -> u64 {
        let Some(root) = self.root.as_deref() else {
            return 0;
        };
        let mut removed = 0;
        for path in cache_files(root) {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(file = %path.display(), %err, "failed to delete cache file"),
            }
        }
        removed
    }

    /// Entry count and byte total for the tier.
    #[must_use]
    pub fn stats(&self) -> FileCacheStats {
        let Some(root) = self.root.as_deref() else {
            return FileCacheStats::default();
        };
        let mut stats = FileCacheStats::default();
        for path in cache_files(root) {
            if let Ok(meta) = fs::metadata(&path) {
                stats.entries += 1;
                stats.total_bytes += meta.len();
            }
        }
        stats
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        let root = self.root.as_deref()?;
        let digest = Sha256::digest(key.as_bytes());
        Some(root.join(format!("{}.cache", hex::encode(digest))))
    }
}

fn remove_entry(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(file = %path.display(), %err, "failed to delete cache entry");
        }
    }
}

fn cache_files(root: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "cache"))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn round_trips_payloads() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(60), true);
        let payload = json!({"info": {"version": "1.2.3"}});

        cache.put("package_info:demo", &payload);
        assert_eq!(cache.get("package_info:demo"), Some(payload));
    }

    #[test]
    fn disabled_tier_misses_everything() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(60), false);
        cache.put("key", &json!(1));
        assert_eq!(cache.get("key"), None);
        assert!(!cache.is_enabled());
    }

    #[test]
    fn expired_entries_miss_and_are_removed() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(0), true);
        cache.put("key", &json!("stale"));

        // TTL of zero means any existing entry is already expired.
        assert_eq!(cache.get("key"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn corrupt_entries_miss_and_are_removed() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(60), true);
        cache.put("key", &json!("good"));

        let file = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|entry| entry.path())
            .find(|path| path.extension().is_some_and(|ext| ext == "cache"))
            .unwrap();
        fs::write(&file, b"not json").unwrap();

        assert_eq!(cache.get("key"), None);
        assert!(!file.exists());
    }

    #[test]
    fn clear_removes_all_entries() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path(), Duration::from_secs(60), true);
        cache.put("a", &json!(1));
        cache.put("b", &json!(2));

        assert_eq!(cache.stats().entries, 2);
        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.stats().entries, 0);
    }
}
