use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub const REQ_INSTALL_FILE: &str = "requirements-install.txt";

/// Terminal state of a watched install, keyed by package name. Only
/// eventual visibility is promised; the watcher thread publishes the
/// status whenever the spawned process finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Running,
    Succeeded,
    Failed,
}

/// Shared map of watched installs. Cloning shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InstallTracker {
    statuses: Arc<Mutex<HashMap<String, InstallStatus>>>,
}

impl InstallTracker {
    pub fn mark(&self, name: &str, status: InstallStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(name.to_string(), status);
        }
    }

    #[must_use]
    pub fn status(&self, name: &str) -> Option<InstallStatus> {
        self.statuses
            .lock()
            .ok()
            .and_then(|statuses| statuses.get(name).copied())
    }

    /// Stable snapshot of every watched install.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, InstallStatus)> {
        let Ok(statuses) = self.statuses.lock() else {
            return Vec::new();
        };
        let mut entries: Vec<(String, InstallStatus)> = statuses
            .iter()
            .map(|(name, status)| (name.clone(), *status))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Invokes the external package manager. Process mechanics only; every
/// decision about *what* to install was made upstream by the reconciler.
pub struct InstallExecutor {
    interpreter: String,
}

impl InstallExecutor {
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Install from a generated requirement file. With `force_retry` the
    /// attempt loops until it succeeds or the user interrupts the
    /// process; otherwise a failure reports `false`.
    ///
    /// # Errors
    ///
    /// Returns an error when the package manager cannot be spawned at
    /// all.
    pub fn install_from_file(&self, path: &Path, force_retry: bool) -> Result<bool> {
        loop {
            let status = Command::new(&self.interpreter)
                .args(["-m", "pip", "install", "-r"])
                .arg(path)
                .status()
                .with_context(|| format!("failed to run {} -m pip", self.interpreter))?;
            if status.success() {
                return Ok(true);
            }
            if !force_retry {
                warn!(%status, "install failed");
                return Ok(false);
            }
            warn!(%status, "install failed; retrying");
        }
    }

    /// Write `specs` to the install file, install from it, and remove
    /// the file again on success.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be written or the package
    /// manager cannot be spawned.
    pub fn install_specs(&self, specs: &[String], force_retry: bool) -> Result<bool> {
        let path = PathBuf::from(REQ_INSTALL_FILE);
        fs::write(&path, specs.join("\n"))
            .with_context(|| format!("failed to write {REQ_INSTALL_FILE}"))?;
        let ok = self.install_from_file(&path, force_retry)?;
        if ok {
            if let Err(err) = fs::remove_file(&path) {
                warn!(%err, "could not remove {REQ_INSTALL_FILE}");
            }
            info!(count = specs.len(), "installed packages");
        }
        Ok(ok)
    }

    /// Spawn one install and watch it from a background thread, so the
    /// caller can keep issuing independent installs. The terminal status
    /// appears in `tracker` under `name` once the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error when the process cannot be spawned.
    pub fn spawn_watched(
        &self,
        spec: &str,
        name: &str,
        tracker: &InstallTracker,
    ) -> Result<JoinHandle<()>> {
        let child = Command::new(&self.interpreter)
            .args(["-m", "pip", "install", spec])
            .spawn()
            .with_context(|| format!("failed to spawn install for {name}"))?;
        tracker.mark(name, InstallStatus::Running);
        Ok(watch(child, name.to_string(), tracker.clone()))
    }
}

fn watch(mut child: Child, name: String, tracker: InstallTracker) -> JoinHandle<()> {
    thread::spawn(move || {
        let status = match child.wait() {
            Ok(status) if status.success() => InstallStatus::Succeeded,
            Ok(_) => InstallStatus::Failed,
            Err(err) => {
                warn!(%name, %err, "install watcher lost its process");
                InstallStatus::Failed
            }
        };
        tracker.mark(&name, status);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_publishes_terminal_status() {
        let tracker = InstallTracker::default();
        tracker.mark("demo", InstallStatus::Running);
        assert_eq!(tracker.status("demo"), Some(InstallStatus::Running));

        let cloned = tracker.clone();
        let handle = thread::spawn(move || {
            cloned.mark("demo", InstallStatus::Succeeded);
        });
        handle.join().unwrap();

        assert_eq!(tracker.status("demo"), Some(InstallStatus::Succeeded));
        assert_eq!(
            tracker.snapshot(),
            vec![("demo".to_string(), InstallStatus::Succeeded)]
        );
    }

    #[test]
    fn unknown_packages_have_no_status() {
        let tracker = InstallTracker::default();
        assert_eq!(tracker.status("ghost"), None);
    }
}
