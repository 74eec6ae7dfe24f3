use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use pytidy_domain::source::{python_files, scan_source};

use crate::store::CacheStore;

/// Scan one source file for imports, consulting the cache first. The key
/// includes a content fingerprint, so an edited file never reuses a stale
/// scan and an unchanged file is never re-parsed.
///
/// # Errors
///
/// Returns an error when the file cannot be read.
pub fn scan_file_cached(store: &mut CacheStore, path: &Path) -> Result<BTreeSet<String>> {
    let source =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let digest = Sha256::digest(source.as_bytes());
    let key = format!("imports:{}:{}", path.display(), hex::encode(digest));

    if let Some(value) = store.get(&key) {
        if let Some(modules) = modules_from_value(&value) {
            debug!(file = %path.display(), "import scan served from cache");
            return Ok(modules);
        }
    }

    let modules = scan_source(&source, &path.display().to_string());
    let payload = Value::from(
        modules
            .iter()
            .map(|name| Value::from(name.as_str()))
            .collect::<Vec<_>>(),
    );
    store.put(&key, &payload);
    Ok(modules)
}

/// Scan every `.py` file under `path`, reusing cached per-file results.
/// Unreadable files are skipped with a warning.
///
/// # Errors
///
/// Returns an error when the directory cannot be listed.
pub fn scan_directory_cached(
    store: &mut CacheStore,
    path: &Path,
    recursive: bool,
) -> Result<BTreeSet<String>> {
    let mut modules = BTreeSet::new();
    for file in python_files(path, recursive)? {
        match scan_file_cached(store, &file) {
            Ok(found) => modules.extend(found),
            Err(err) => tracing::warn!(file = %file.display(), %err, "skipping unreadable file"),
        }
    }
    Ok(modules)
}

fn modules_from_value(value: &Value) -> Option<BTreeSet<String>> {
    let array = value.as_array()?;
    let mut modules = BTreeSet::new();
    for item in array {
        modules.insert(item.as_str()?.to_string());
    }
    Some(modules)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::store::remote::MemoryRemoteCache;
    use crate::store::FileCache;

    fn test_store(dir: &Path) -> CacheStore {
        CacheStore::with_tiers(
            Box::new(MemoryRemoteCache {
                entries: HashMap::new(),
            }),
            FileCache::new(dir, Duration::from_secs(60), true),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn caches_by_content_fingerprint() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let mut store = test_store(&cache_dir);

        let file = dir.path().join("app.py");
        fs::write(&file, "import requests\n").unwrap();

        let first = scan_file_cached(&mut store, &file).unwrap();
        assert!(first.contains("requests"));

        let again = scan_file_cached(&mut store, &file).unwrap();
        assert_eq!(first, again);

        // Changing the content changes the key, so the fresh scan sees
        // the new import set.
        fs::write(&file, "import numpy\n").unwrap();
        let changed = scan_file_cached(&mut store, &file).unwrap();
        assert!(changed.contains("numpy"));
        assert!(!changed.contains("requests"));
    }
}
