use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use dirs_next::home_dir;

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_REDIS_PREFIX: &str = "pytidy:";
const DEFAULT_INDEX_URL: &str = "https://pypi.org/pypi";
const REMOTE_TIMEOUT: Duration = Duration::from_secs(5);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable snapshot of the process environment, captured once so that
/// configuration reads stay deterministic for the whole run.
#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        matches!(self.vars.get(key).map(String::as_str), Some("1"))
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Explicit configuration handed to each component's constructor; no
/// component reads process-wide state on its own.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    pub registry: RegistryConfig,
    pub python: PythonConfig,
}

impl Config {
    /// Builds a configuration snapshot from the current process
    /// environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let ttl = snapshot
            .var("PYTIDY_CACHE_TTL")
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_SECS);

        Self {
            cache: CacheConfig {
                dir: snapshot
                    .var("PYTIDY_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_cache_dir),
                ttl: Duration::from_secs(ttl),
                enabled: !snapshot.flag_is_enabled("PYTIDY_NO_CACHE"),
            },
            remote: RemoteConfig {
                url: snapshot
                    .var("PYTIDY_REDIS_URL")
                    .unwrap_or(DEFAULT_REDIS_URL)
                    .to_string(),
                prefix: snapshot
                    .var("PYTIDY_REDIS_PREFIX")
                    .unwrap_or(DEFAULT_REDIS_PREFIX)
                    .to_string(),
                enabled: !snapshot.flag_is_enabled("PYTIDY_NO_REDIS"),
                timeout: REMOTE_TIMEOUT,
            },
            registry: RegistryConfig {
                base_url: snapshot
                    .var("PYTIDY_INDEX_URL")
                    .unwrap_or(DEFAULT_INDEX_URL)
                    .trim_end_matches('/')
                    .to_string(),
                timeout: HTTP_TIMEOUT,
            },
            python: PythonConfig {
                interpreter: snapshot
                    .var("PYTIDY_PYTHON")
                    .unwrap_or(default_interpreter())
                    .to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl: Duration,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub prefix: String,
    pub enabled: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PythonConfig {
    pub interpreter: String,
}

fn default_cache_dir() -> PathBuf {
    if let Some(xdg) = env::var_os("XDG_CACHE_HOME") {
        return PathBuf::from(xdg).join("pytidy").join("registry");
    }
    if let Some(home) = home_dir() {
        return home.join(".cache").join("pytidy").join("registry");
    }
    env::temp_dir().join("pytidy-cache")
}

fn default_interpreter() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[]));
        assert!(config.cache.enabled);
        assert!(config.remote.enabled);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.remote.prefix, "pytidy:");
        assert_eq!(config.registry.base_url, "https://pypi.org/pypi");
    }

    #[test]
    fn environment_overrides_are_honored() {
        let config = Config::from_snapshot(&EnvSnapshot::testing(&[
            ("PYTIDY_CACHE_DIR", "/tmp/alt-cache"),
            ("PYTIDY_CACHE_TTL", "60"),
            ("PYTIDY_NO_REDIS", "1"),
            ("PYTIDY_INDEX_URL", "https://mirror.example/pypi/"),
        ]));
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/alt-cache"));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert!(!config.remote.enabled);
        assert_eq!(config.registry.base_url, "https://mirror.example/pypi");
    }
}
