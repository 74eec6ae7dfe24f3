use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pytidy_domain::{normalize_name, InstalledIndex};
use tracing::{debug, warn};

/// Installed-package index built by reading `*.dist-info` metadata under
/// the environment's site-packages roots. Rebuilt on every run; installed
/// state is authoritative and never cached.
#[derive(Debug, Default)]
pub struct SitePackagesIndex {
    versions: HashMap<String, String>,
}

impl SitePackagesIndex {
    /// Build the index from explicit site-packages roots.
    #[must_use]
    pub fn from_roots(roots: &[PathBuf]) -> Self {
        let mut versions = HashMap::new();
        for root in roots {
            collect_dist_info(root, &mut versions);
        }
        debug!(packages = versions.len(), "scanned installed packages");
        Self { versions }
    }

    /// Ask `interpreter` for its site-packages roots and scan them. A
    /// missing or broken interpreter logs a warning and produces an empty
    /// index, which reads as "nothing installed".
    #[must_use]
    pub fn discover(interpreter: &str) -> Self {
        let output = Command::new(interpreter)
            .arg("-c")
            .arg(
                "import json, site; paths = list(site.getsitepackages()); \
                 paths.append(site.getusersitepackages()); print(json.dumps(paths))",
            )
            .output();
        let roots = match output {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                serde_json::from_str::<Vec<String>>(stdout.trim())
                    .map(|paths| paths.into_iter().map(PathBuf::from).collect::<Vec<_>>())
                    .unwrap_or_else(|err| {
                        warn!(%err, "unexpected site-packages listing");
                        Vec::new()
                    })
            }
            Ok(output) => {
                warn!(
                    status = %output.status,
                    "interpreter failed to report site-packages"
                );
                Vec::new()
            }
            Err(err) => {
                warn!(interpreter, %err, "could not invoke interpreter");
                Vec::new()
            }
        };
        Self::from_roots(&roots)
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let versions = pairs
            .iter()
            .map(|(name, version)| (normalize_name(name), (*version).to_string()))
            .collect();
        Self { versions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

impl InstalledIndex for SitePackagesIndex {
    fn installed_version(&self, name: &str) -> Option<String> {
        self.versions.get(&normalize_name(name)).cloned()
    }
}

fn collect_dist_info(root: &Path, versions: &mut HashMap<String, String>) {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(root = %root.display(), %err, "skipping unreadable site-packages root");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(dirname) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let Some(stem) = dirname.strip_suffix(".dist-info") else {
            continue;
        };
        if let Some((name, version)) = parse_dist_info_stem(stem) {
            versions.insert(normalize_name(&name), version);
        } else if let Some((name, version)) = read_metadata(&path) {
            versions.insert(normalize_name(&name), version);
        }
    }
}

/// `{name}-{version}` with the version being the part after the last
/// dash that starts with a digit.
fn parse_dist_info_stem(stem: &str) -> Option<(String, String)> {
    let (name, version) = stem.rsplit_once('-')?;
    if name.is_empty() || !version.starts_with(|ch: char| ch.is_ascii_digit()) {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

/// Fallback for nonconforming directory names: read the `Name:` and
/// `Version:` headers out of the METADATA file.
fn read_metadata(dist_info: &Path) -> Option<(String, String)> {
    let contents = fs::read_to_string(dist_info.join("METADATA")).ok()?;
    let mut name = None;
    let mut version = None;
    for line in contents.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Name:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("Version:") {
            version = Some(value.trim().to_string());
        }
        if name.is_some() && version.is_some() {
            break;
        }
    }
    Some((name?, version?))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn reads_versions_from_dist_info_names() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("requests-2.32.3.dist-info")).unwrap();
        fs::create_dir(dir.path().join("ruamel.yaml-0.18.6.dist-info")).unwrap();
        fs::create_dir(dir.path().join("not-a-distribution")).unwrap();

        let index = SitePackagesIndex::from_roots(&[dir.path().to_path_buf()]);
        assert_eq!(
            index.installed_version("requests"),
            Some("2.32.3".to_string())
        );
        assert_eq!(
            index.installed_version("Ruamel.Yaml"),
            Some("0.18.6".to_string())
        );
        assert_eq!(index.installed_version("missing"), None);
    }

    #[test]
    fn falls_back_to_metadata_headers() {
        let dir = tempdir().unwrap();
        let dist_info = dir.path().join("odd.dist-info");
        fs::create_dir(&dist_info).unwrap();
        fs::write(
            dist_info.join("METADATA"),
            "Metadata-Version: 2.1\nName: odd-package\nVersion: 1.0.0\n\nBody\n",
        )
        .unwrap();

        let index = SitePackagesIndex::from_roots(&[dir.path().to_path_buf()]);
        assert_eq!(
            index.installed_version("odd-package"),
            Some("1.0.0".to_string())
        );
    }

    #[test]
    fn lookups_normalize_names() {
        let index = SitePackagesIndex::from_pairs(&[("Pillow", "10.3.0")]);
        assert_eq!(index.installed_version("pillow"), Some("10.3.0".to_string()));
        assert_eq!(
            index.installed_version("PILLOW"),
            Some("10.3.0".to_string())
        );
    }
}
