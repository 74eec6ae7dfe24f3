use std::time::Duration;

use redis::{Commands, Connection};
use tracing::{debug, info, warn};

use crate::config::RemoteConfig;

/// The remote key-value tier as the store sees it. Selected once at
/// startup: either a live networked connection or the null object, never
/// probed again mid-run.
pub trait RemoteCache {
    /// Raw payload stored under `key`, or `None` on miss or any error.
    fn get(&mut self, key: &str) -> Option<String>;
    /// Store `payload` with the given expiry; errors are logged and
    /// swallowed.
    fn put(&mut self, key: &str, payload: &str, ttl: Duration);
    /// Best-effort removal, used when a payload fails to decode.
    fn delete(&mut self, key: &str);
    /// Remove every key in this cache's namespace; returns the count.
    fn clear(&mut self) -> u64;
    /// Whether this is a live connection rather than the null object.
    fn is_live(&self) -> bool;
}

/// Connect to the configured remote tier, degrading permanently to the
/// null object when the service is disabled or unreachable.
#[must_use]
pub fn connect(config: &RemoteConfig) -> Box<dyn RemoteCache> {
    if !config.enabled {
        debug!("remote cache disabled by configuration");
        return Box::new(NullRemoteCache);
    }

    let client = match redis::Client::open(config.url.as_str()) {
        Ok(client) => client,
        Err(err) => {
            warn!(url = %config.url, %err, "invalid remote cache URL; falling back to file cache");
            return Box::new(NullRemoteCache);
        }
    };
    let mut connection = match client.get_connection_with_timeout(config.timeout) {
        Ok(connection) => connection,
        Err(err) => {
            warn!(url = %config.url, %err, "remote cache unreachable; falling back to file cache");
            return Box::new(NullRemoteCache);
        }
    };
    if let Err(err) = redis::cmd("PING").query::<String>(&mut connection) {
        warn!(url = %config.url, %err, "remote cache did not answer; falling back to file cache");
        return Box::new(NullRemoteCache);
    }

    info!(url = %config.url, "remote cache connected");
    Box::new(RedisCache {
        connection,
        prefix: config.prefix.clone(),
    })
}

/// Networked variant backed by a key-value store speaking
/// GET/SETEX/DEL/KEYS.
pub struct RedisCache {
    connection: Connection,
    prefix: String,
}

impl RedisCache {
    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

impl RemoteCache for RedisCache {
    fn get(&mut self, key: &str) -> Option<String> {
        let namespaced = self.namespaced(key);
        match self.connection.get::<_, Option<String>>(&namespaced) {
            Ok(Some(payload)) => {
                debug!(key, "remote cache hit");
                Some(payload)
            }
            Ok(None) => {
                debug!(key, "remote cache miss");
                None
            }
            Err(err) => {
                warn!(key, %err, "remote cache get error");
                None
            }
        }
    }

    fn put(&mut self, key: &str, payload: &str, ttl: Duration) {
        let namespaced = self.namespaced(key);
        let seconds = ttl.as_secs().max(1);
        if let Err(err) = self
            .connection
            .set_ex::<_, _, ()>(&namespaced, payload, seconds)
        {
            warn!(key, %err, "remote cache set error");
        }
    }

    fn delete(&mut self, key: &str) {
        let namespaced = self.namespaced(key);
        if let Err(err) = self.connection.del::<_, ()>(&namespaced) {
            warn!(key, %err, "remote cache delete error");
        }
    }

    fn clear(&mut self) -> u64 {
        let pattern = format!("{}*", self.prefix);
        let keys = match self.connection.keys::<_, Vec<String>>(&pattern) {
            Ok(keys) => keys,
            Err(err) => {
                warn!(%err, "remote cache key listing failed");
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }
        match self.connection.del::<_, u64>(keys) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(%err, "remote cache clear failed");
                0
            }
        }
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// Null object standing in when no remote tier is available; every
/// lookup is a miss and every write a no-op.
pub struct NullRemoteCache;

impl RemoteCache for NullRemoteCache {
    fn get(&mut self, _key: &str) -> Option<String> {
        None
    }

    fn put(&mut self, _key: &str, _payload: &str, _ttl: Duration) {}

    fn delete(&mut self, _key: &str) {}

    fn clear(&mut self) -> u64 {
        0
    }

    fn is_live(&self) -> bool {
        false
    }
}

/// In-memory stand-in used by store tests; behaves like a healthy remote
/// tier without the network.
#[cfg(test)]
pub(crate) struct MemoryRemoteCache {
    pub entries: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl RemoteCache for MemoryRemoteCache {
    fn get(&mut self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: &str, payload: &str, _ttl: Duration) {
        self.entries.insert(key.to_string(), payload.to_string());
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&mut self) -> u64 {
        let count = self.entries.len() as u64;
        self.entries.clear();
        count
    }

    fn is_live(&self) -> bool {
        true
    }
}
