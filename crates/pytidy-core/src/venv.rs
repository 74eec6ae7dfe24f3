use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use dirs_next::home_dir;
use tracing::info;

use pytidy_domain::Requirement;

/// Resolve the base directory holding isolated environments: the first
/// existing candidate wins, and the last one is created on demand.
///
/// # Errors
///
/// Returns an error when no candidate exists and the fallback cannot be
/// created.
pub fn venv_base_dir() -> Result<PathBuf> {
    let candidates = venv_candidates()?;
    for candidate in &candidates[..candidates.len() - 1] {
        if candidate.is_dir() {
            return Ok(candidate.clone());
        }
    }
    let fallback = candidates
        .last()
        .ok_or_else(|| anyhow!("no environment base candidates"))?;
    fs::create_dir_all(fallback)
        .with_context(|| format!("failed to create {}", fallback.display()))?;
    Ok(fallback.clone())
}

#[cfg(not(target_os = "windows"))]
fn venv_candidates() -> Result<Vec<PathBuf>> {
    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok(vec![
        home.join(".venv"),
        home.join(".pip").join("VENV"),
        home.join(".local").join("share").join("pytidy").join("venvs"),
    ])
}

#[cfg(target_os = "windows")]
fn venv_candidates() -> Result<Vec<PathBuf>> {
    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    let appdata = std::env::var_os("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|| home.join("AppData").join("Roaming"));
    Ok(vec![
        PathBuf::from("C:\\VENV"),
        home.join(".pip").join("VENV"),
        appdata.join("pytidy").join("VENV"),
    ])
}

/// Builds fresh isolated environments when in-place installation would
/// disturb already-satisfied packages.
pub struct VenvBuilder {
    interpreter: String,
}

impl VenvBuilder {
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Create the environment `name` under the venv base and install the
    /// full requirement set into it. Returns the environment's location.
    ///
    /// # Errors
    ///
    /// Returns an error when environment creation or any install step
    /// fails.
    pub fn create(&self, name: &str, requirements: &[Requirement]) -> Result<PathBuf> {
        let base = venv_base_dir()?;
        let venv_path = base.join(name);
        info!(path = %venv_path.display(), "creating isolated environment");

        self.run(
            Command::new(&self.interpreter)
                .args(["-m", "venv"])
                .arg(&venv_path),
            "environment creation",
        )?;

        let venv_python = interpreter_path(&venv_path);
        self.run(
            Command::new(&venv_python).args(["-m", "pip", "install", "--upgrade", "pip"]),
            "pip upgrade",
        )?;

        for requirement in requirements {
            let spec = requirement.display_spec();
            info!(%spec, "installing into isolated environment");
            self.run(
                Command::new(&venv_python).args(["-m", "pip", "install", &spec]),
                "package install",
            )?;
        }

        Ok(venv_path)
    }

    fn run(&self, command: &mut Command, what: &str) -> Result<()> {
        let status = command
            .status()
            .with_context(|| format!("{what} could not be started"))?;
        if !status.success() {
            bail!("{what} failed with {status}");
        }
        Ok(())
    }
}

fn interpreter_path(venv: &std::path::Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Shell instruction for entering the environment, surfaced to the user
/// after isolation.
#[must_use]
pub fn activation_hint(venv: &std::path::Path) -> String {
    if cfg!(windows) {
        format!("{}\\Scripts\\activate", venv.display())
    } else {
        format!("source {}/bin/activate", venv.display())
    }
}
