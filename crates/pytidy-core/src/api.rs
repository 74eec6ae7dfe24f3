use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use pytidy_domain::source::{filter_third_party, requirements_from_packages};
use pytidy_domain::{manifest, InstalledIndex, Platform, Requirement};

use crate::config::Config;
use crate::install::{InstallExecutor, InstallStatus, InstallTracker, REQ_INSTALL_FILE};
use crate::project::project_name;
use crate::python::PythonVersion;
use crate::reconcile::{
    resolution_plan, ReconcileOptions, ReconcileReport, Reconciler, ResolutionPlan, RunOutcome,
};
use crate::registry::{RegistryClient, RegistryError};
use crate::scan;
use crate::site::SitePackagesIndex;
use crate::store::{CacheClearReport, CacheStats, CacheStore};
use crate::venv::{activation_hint, VenvBuilder};

/// One reconciliation request: where the requirements come from and what
/// the run is allowed to do about the result.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    /// Path to a manifest, source file, or directory; or a bare package
    /// name to look up on the registry. `None` triggers auto-discovery
    /// in the working directory.
    pub input: Option<String>,
    /// Check a registry package's published dependency list instead of a
    /// local manifest.
    pub registry_package: Option<String>,
    pub recursive: bool,
    pub auto_install: bool,
    pub force_install: bool,
    pub force_retry: bool,
    pub summary_only: bool,
}

/// What the run did after comparing.
#[derive(Debug, Clone)]
pub enum ActionTaken {
    /// Report only; nothing touched.
    None,
    Installed(Vec<String>),
    InstallFailed(Vec<String>),
    Isolated { path: PathBuf, hint: String },
    /// Interpreter incompatibility; nothing automatic is safe.
    Blocked,
}

#[derive(Debug)]
pub struct CheckOutcome {
    /// Human-readable description of where requirements came from.
    pub source: String,
    pub requirements: Vec<Requirement>,
    pub report: ReconcileReport,
    pub action: ActionTaken,
    /// Terminal statuses of background-watched installs, keyed by
    /// package name.
    pub watched: Vec<(String, InstallStatus)>,
}

/// Run the full check: gather requirements, reconcile them against the
/// installed environment and the registry, then act on the outcome.
///
/// # Errors
///
/// Returns an error only when the requested operation is meaningless
/// (no requirement source found, interpreter unavailable) or an invoked
/// collaborator fails outright; per-package problems degrade to warnings
/// and conflicts instead.
pub fn run_check(config: &Config, request: &CheckRequest) -> Result<CheckOutcome> {
    let mut store = CacheStore::new(config);
    let registry = RegistryClient::new(&config.registry)?;
    let python = PythonVersion::probe(&config.python.interpreter)
        .with_context(|| format!("interpreter '{}' unavailable", config.python.interpreter))?;
    let index = SitePackagesIndex::discover(&config.python.interpreter);
    let executor = InstallExecutor::new(config.python.interpreter.clone());

    // A pending install file short-circuits straight to installation.
    if request.input.is_none() && request.registry_package.is_none() && !request.summary_only {
        let pending = Path::new(REQ_INSTALL_FILE);
        if file_has_content(pending) {
            info!(file = REQ_INSTALL_FILE, "found pending install file; installing directly");
            let specs = manifest::parse_requirements_file(pending, Platform::current())
                .iter()
                .map(Requirement::display_spec)
                .collect::<Vec<_>>();
            let ok = executor.install_from_file(pending, request.force_retry)?;
            let action = if ok {
                ActionTaken::Installed(specs)
            } else {
                ActionTaken::InstallFailed(specs)
            };
            return Ok(CheckOutcome {
                source: REQ_INSTALL_FILE.to_string(),
                requirements: Vec::new(),
                report: empty_report(),
                action,
                watched: Vec::new(),
            });
        }
    }

    let (source, requirements) =
        gather_requirements(request, &mut store, &registry, &index)?;
    if requirements.is_empty() {
        bail!("no requirements found in {source}");
    }

    let reconciler = Reconciler::new(&registry, &index, python);
    let report = reconciler.reconcile(&mut store, &requirements);

    let options = ReconcileOptions {
        auto_install: request.auto_install,
        force_install: request.force_install,
        summary_only: request.summary_only,
    };
    let action = match resolution_plan(&report, options) {
        ResolutionPlan::UpToDate | ResolutionPlan::ReportOnly => ActionTaken::None,
        ResolutionPlan::Blocked => ActionTaken::Blocked,
        ResolutionPlan::InstallInPlace(specs) => {
            if executor.install_specs(&specs, request.force_retry)? {
                ActionTaken::Installed(specs)
            } else {
                ActionTaken::InstallFailed(specs)
            }
        }
        ResolutionPlan::Isolate => {
            let label = request
                .registry_package
                .clone()
                .unwrap_or_else(|| project_name(&std::env::current_dir().unwrap_or_default()));
            let venv_name = format!("{label}-env");
            let builder = VenvBuilder::new(config.python.interpreter.clone());
            let path = builder.create(&venv_name, &requirements)?;
            let hint = activation_hint(&path);
            ActionTaken::Isolated { path, hint }
        }
    };

    // In registry-package mode a conflict-free run also installs the
    // package itself, watched from a background thread so the main
    // thread stays free for further work; the terminal status becomes
    // visible in the tracker once the process exits.
    let mut watched = Vec::new();
    if let Some(package) = &request.registry_package {
        let may_install = request.auto_install
            && !request.summary_only
            && !matches!(
                action,
                ActionTaken::Blocked | ActionTaken::Isolated { .. } | ActionTaken::InstallFailed(_)
            );
        if may_install {
            let tracker = InstallTracker::default();
            let handle = executor.spawn_watched(package, package, &tracker)?;
            if handle.join().is_err() {
                warn!(%package, "install watcher thread panicked");
            }
            watched = tracker.snapshot();
        }
    }

    Ok(CheckOutcome {
        source,
        requirements,
        report,
        action,
        watched,
    })
}

/// Inspect both cache tiers.
#[must_use]
pub fn cache_stats(config: &Config) -> CacheStats {
    CacheStore::new(config).stats()
}

/// Drop every cached registry response from both tiers.
pub fn cache_clear(config: &Config) -> CacheClearReport {
    CacheStore::new(config).clear()
}

fn gather_requirements(
    request: &CheckRequest,
    store: &mut CacheStore,
    registry: &RegistryClient,
    index: &dyn InstalledIndex,
) -> Result<(String, Vec<Requirement>)> {
    if let Some(package) = &request.registry_package {
        return registry_requirements(store, registry, package)
            .map(|reqs| (format!("registry record for '{package}'"), reqs));
    }

    if let Some(input) = &request.input {
        let path = Path::new(input);
        if path.is_file() {
            return Ok((input.clone(), requirements_from_file(store, index, path)?));
        }
        if path.is_dir() {
            let packages = scan_directory(store, index, path, request.recursive)?;
            return Ok((format!("imports under {input}"), packages));
        }
        // Not a path at all; the original behavior is to try it as a
        // registry package name before giving up.
        return match registry_requirements(store, registry, input) {
            Ok(reqs) => Ok((format!("registry record for '{input}'"), reqs)),
            Err(err) => {
                bail!("'{input}' is not a file, directory, or known package: {err}")
            }
        };
    }

    discover_in_cwd(store, index, request)
}

fn requirements_from_file(
    store: &mut CacheStore,
    index: &dyn InstalledIndex,
    path: &Path,
) -> Result<Vec<Requirement>> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    if filename == "setup.py" {
        return Ok(manifest::parse_setup_py(path));
    }
    if filename == "pyproject.toml" {
        return Ok(manifest::parse_pyproject(path));
    }
    if path.extension().is_some_and(|ext| ext == "py") {
        let imports = scan::scan_file_cached(store, path)?;
        return Ok(requirements_from_packages(&filter_third_party(
            &imports, index,
        )));
    }
    if !(filename.starts_with("require") && path.extension().is_some_and(|ext| ext == "txt")) {
        warn!(file = %path.display(), "unrecognized manifest shape; parsing as a requirement list");
    }
    Ok(manifest::parse_requirements_file(path, Platform::current()))
}

fn scan_directory(
    store: &mut CacheStore,
    index: &dyn InstalledIndex,
    path: &Path,
    recursive: bool,
) -> Result<Vec<Requirement>> {
    let imports = scan::scan_directory_cached(store, path, recursive)?;
    Ok(requirements_from_packages(&filter_third_party(
        &imports, index,
    )))
}

fn registry_requirements(
    store: &mut CacheStore,
    registry: &RegistryClient,
    package: &str,
) -> Result<Vec<Requirement>> {
    let record = match registry.fetch_info(store, package, None) {
        Ok(record) => record,
        Err(err @ RegistryError::NotFound { .. }) => bail!("{err}"),
        Err(err) => return Err(err).context("registry lookup failed"),
    };
    Ok(manifest::parse_registry_deps(record.dependency_list()))
}

/// No explicit input: probe the standard manifests in order, then fall
/// back to scanning the working directory's source files.
fn discover_in_cwd(
    store: &mut CacheStore,
    index: &dyn InstalledIndex,
    request: &CheckRequest,
) -> Result<(String, Vec<Requirement>)> {
    let cwd = std::env::current_dir().context("working directory unavailable")?;

    let setup_py = cwd.join("setup.py");
    if file_has_content(&setup_py) {
        let requirements = manifest::parse_setup_py(&setup_py);
        if !requirements.is_empty() {
            return Ok(("setup.py".to_string(), requirements));
        }
    }

    let pyproject = cwd.join("pyproject.toml");
    if file_has_content(&pyproject) {
        let requirements = manifest::parse_pyproject(&pyproject);
        if !requirements.is_empty() {
            return Ok(("pyproject.toml".to_string(), requirements));
        }
    }

    let requirements_txt = cwd.join("requirements.txt");
    if file_has_content(&requirements_txt) {
        let requirements =
            manifest::parse_requirements_file(&requirements_txt, Platform::current());
        if !requirements.is_empty() {
            return Ok(("requirements.txt".to_string(), requirements));
        }
    }

    warn!("no manifest found; scanning the working directory for imports");
    let requirements = scan_directory(store, index, &cwd, request.recursive)?;
    if requirements.is_empty() {
        bail!("no manifest found and no third-party imports detected");
    }
    Ok(("imports in the working directory".to_string(), requirements))
}

fn file_has_content(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

fn empty_report() -> ReconcileReport {
    ReconcileReport {
        rows: Vec::new(),
        conflicts: Vec::new(),
        to_install: Vec::new(),
        outcome: RunOutcome::Clean,
    }
}
