use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustpython_parser::ast::Stmt;
use tracing::{debug, warn};

use super::names::{is_stdlib_module, registry_package_name};
use super::visitor::{parse_module, walk_statements, StatementSink};
use crate::installed::InstalledIndex;
use crate::requirement::Requirement;

struct ImportCollector {
    modules: BTreeSet<String>,
}

impl StatementSink for ImportCollector {
    fn on_statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Import(import) => {
                for alias in &import.names {
                    self.add(alias.name.as_str());
                }
            }
            Stmt::ImportFrom(import) => {
                if let Some(module) = &import.module {
                    self.add(module.as_str());
                }
            }
            _ => {}
        }
    }
}

impl ImportCollector {
    fn add(&mut self, dotted: &str) {
        if let Some(root) = dotted.split('.').next() {
            if !root.is_empty() {
                self.modules.insert(root.to_string());
            }
        }
    }
}

/// Collect the root segment of every import statement in `source`.
/// Unparseable source logs a warning and contributes nothing.
#[must_use]
pub fn scan_source(source: &str, label: &str) -> BTreeSet<String> {
    let body = match parse_module(source, label) {
        Ok(body) => body,
        Err(err) => {
            warn!(file = label, %err, "could not parse source file; skipping");
            return BTreeSet::new();
        }
    };
    let mut collector = ImportCollector {
        modules: BTreeSet::new(),
    };
    walk_statements(&body, &mut collector);
    debug!(file = label, count = collector.modules.len(), "extracted imports");
    collector.modules
}

/// Scan one source file for imported module names.
///
/// # Errors
///
/// Returns an error when the file cannot be read; syntax errors inside the
/// file are logged and produce an empty set.
pub fn scan_file(path: &Path) -> Result<BTreeSet<String>> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(scan_source(&source, &path.display().to_string()))
}

/// Scan every `.py` file under `path` for imported module names.
/// Unreadable or unparseable files are logged and skipped.
///
/// # Errors
///
/// Returns an error when the directory itself cannot be listed.
pub fn scan_directory(path: &Path, recursive: bool) -> Result<BTreeSet<String>> {
    let mut modules = BTreeSet::new();
    for file in python_files(path, recursive)? {
        match scan_file(&file) {
            Ok(found) => modules.extend(found),
            Err(err) => warn!(file = %file.display(), %err, "skipping unreadable file"),
        }
    }
    Ok(modules)
}

/// List the `.py` files under `path`, sorted for deterministic scans.
///
/// # Errors
///
/// Returns an error when a directory listing fails.
pub fn python_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
        {
            let entry = entry?;
            let entry_path = entry.path();
            if entry_path.is_dir() {
                if recursive {
                    stack.push(entry_path);
                }
            } else if entry_path.extension().is_some_and(|ext| ext == "py") {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Reduce raw import names to third-party registry package names:
/// standard-library modules are dropped, aliased import names are mapped
/// to their registry package, and everything else passes through whether
/// or not it is currently installed.
#[must_use]
pub fn filter_third_party(
    imports: &BTreeSet<String>,
    index: &dyn InstalledIndex,
) -> BTreeSet<String> {
    let mut third_party = BTreeSet::new();
    for module in imports {
        if is_stdlib_module(module) {
            debug!(%module, "skipping standard-library module");
            continue;
        }
        let package = registry_package_name(module);
        if index.installed_version(package).is_some() {
            debug!(package, "import resolves to an installed package");
        } else {
            debug!(package, "import assumed to be an uninstalled package");
        }
        third_party.insert(package.to_string());
    }
    third_party
}

/// Unconstrained requirements for a set of third-party package names.
#[must_use]
pub fn requirements_from_packages(packages: &BTreeSet<String>) -> Vec<Requirement> {
    packages
        .iter()
        .map(|name| Requirement::unconstrained(name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::installed::InstalledIndex;

    struct EmptyIndex;

    impl InstalledIndex for EmptyIndex {
        fn installed_version(&self, _name: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn collects_root_segments_only() {
        let imports = scan_source(
            "import os.path\nfrom urllib.request import urlopen\nimport requests\n",
            "<test>",
        );
        let names: Vec<&str> = imports.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["os", "requests", "urllib"]);
    }

    #[test]
    fn relative_imports_without_module_are_ignored() {
        let imports = scan_source("from . import sibling\nfrom .base import Thing\n", "<test>");
        let names: Vec<&str> = imports.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["base"]);
    }

    #[test]
    fn stdlib_only_files_produce_no_third_party_packages() {
        let imports = scan_source(
            "import os\nimport sys\nfrom json import loads\nimport asyncio\n",
            "<test>",
        );
        let third_party = filter_third_party(&imports, &EmptyIndex);
        assert!(third_party.is_empty());
    }

    #[test]
    fn aliases_and_unknowns_map_to_registry_names() {
        let imports = scan_source("import cv2\nimport numpy\nimport bs4\n", "<test>");
        let third_party = filter_third_party(&imports, &EmptyIndex);
        let names: Vec<&str> = third_party.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["beautifulsoup4", "numpy", "opencv-python"]);
    }

    #[test]
    fn syntax_errors_yield_empty_set() {
        let imports = scan_source("def broken(:\n", "<test>");
        assert!(imports.is_empty());
    }

    #[test]
    fn directory_scan_honors_recursion_flag() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("top.py"), "import requests\n")?;
        let nested = dir.path().join("pkg");
        fs::create_dir(&nested)?;
        fs::write(nested.join("inner.py"), "import numpy\n")?;

        let flat = scan_directory(dir.path(), false)?;
        assert!(flat.contains("requests"));
        assert!(!flat.contains("numpy"));

        let deep = scan_directory(dir.path(), true)?;
        assert!(deep.contains("requests"));
        assert!(deep.contains("numpy"));
        Ok(())
    }
}
