use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RegistryConfig;
use crate::store::CacheStore;

const USER_AGENT: &str = concat!("pytidy/", env!("CARGO_PKG_VERSION"));

/// Typed failure kinds for a registry lookup, so callers branch on kind
/// instead of catching by type.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("package '{name}' not found on the registry")]
    NotFound { name: String },
    #[error("registry unreachable for '{name}': {reason}")]
    Unreachable { name: String, reason: String },
    #[error("registry response for '{name}' could not be decoded: {reason}")]
    Malformed { name: String, reason: String },
}

/// Metadata block of a registry record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub requires_python: Option<String>,
    #[serde(default)]
    pub requires_dist: Option<Vec<String>>,
}

/// One published release file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub packagetype: Option<String>,
}

/// A package's registry record: latest version, interpreter requirement,
/// declared dependencies, and release files keyed by version. Owned by
/// the cache once fetched and shared read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryRecord {
    #[serde(default)]
    pub info: RegistryInfo,
    #[serde(default)]
    pub releases: BTreeMap<String, Vec<ReleaseFile>>,
    #[serde(default)]
    pub urls: Vec<ReleaseFile>,
}

impl RegistryRecord {
    #[must_use]
    pub fn latest_version(&self) -> Option<&str> {
        self.info.version.as_deref()
    }

    #[must_use]
    pub fn requires_python(&self) -> Option<&str> {
        self.info.requires_python.as_deref()
    }

    /// Raw dependency-specifier strings as published.
    #[must_use]
    pub fn dependency_list(&self) -> &[String] {
        self.info.requires_dist.as_deref().unwrap_or_default()
    }
}

/// Fetches package metadata through the cache store, hitting the network
/// only on a cache miss and writing successful responses back into both
/// tiers.
pub struct RegistryClient {
    http: Client,
    base_url: String,
}

impl RegistryClient {
    /// Build the client with the configured base URL and bounded timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(config: &RegistryConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(base_url: String, timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .expect("http client"),
            base_url,
        }
    }

    /// Fetch the record for `name`, optionally pinned to `version`.
    ///
    /// # Errors
    ///
    /// `NotFound` when the registry answers 404, `Unreachable` for
    /// network, timeout, or other non-success responses, `Malformed`
    /// when the body cannot be decoded.
    pub fn fetch_info(
        &self,
        store: &mut CacheStore,
        name: &str,
        version: Option<&str>,
    ) -> Result<RegistryRecord, RegistryError> {
        let cache_key = match version {
            Some(version) => format!("package_version:{name}:{version}"),
            None => format!("package_info:{name}"),
        };

        if let Some(value) = store.get(&cache_key) {
            match serde_json::from_value::<RegistryRecord>(value) {
                Ok(record) => return Ok(record),
                Err(err) => {
                    // Shape drift in a cached payload; refetch live.
                    warn!(name, %err, "cached registry payload unusable");
                }
            }
        }

        let url = match version {
            Some(version) => format!("{}/{name}/{version}/json", self.base_url),
            None => format!("{}/{name}/json", self.base_url),
        };
        debug!(name, url, "fetching registry metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .map_err(|err| RegistryError::Unreachable {
                name: name.to_string(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound {
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            return Err(RegistryError::Unreachable {
                name: name.to_string(),
                reason: format!(
                    "status {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("unknown")
                ),
            });
        }

        let value: Value = response.json().map_err(|err| RegistryError::Malformed {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
        let record = serde_json::from_value::<RegistryRecord>(value.clone()).map_err(|err| {
            RegistryError::Malformed {
                name: name.to_string(),
                reason: err.to_string(),
            }
        })?;

        store.put(&cache_key, &value);
        Ok(record)
    }
}
