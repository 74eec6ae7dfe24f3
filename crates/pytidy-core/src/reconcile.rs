use std::str::FromStr;

use pep440_rs::Version;
use serde::Serialize;
use tracing::{debug, warn};

use pytidy_domain::{constraint, InstalledIndex, Requirement};

use crate::python::PythonVersion;
use crate::registry::{RegistryClient, RegistryError};
use crate::store::CacheStore;

/// A detected disagreement between declared requirements and the local
/// environment. Produced per run, never persisted; the aggregate drives
/// the install decision exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Conflict {
    Version {
        name: String,
        installed: String,
        required: String,
    },
    Missing {
        name: String,
        required: Option<String>,
    },
    PythonIncompatible {
        name: String,
        requires_python: String,
        current: String,
    },
}

/// Per-requirement verdict, kept alongside the raw versions for the
/// summary rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequirementStatus {
    ExactMatch,
    WithinRange,
    Mismatch,
    NotInstalled,
    Unconstrained,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub installed: Option<String>,
    pub required: Option<String>,
    pub latest: Option<String>,
    pub status: RequirementStatus,
}

/// Terminal state of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    Clean,
    Conflicted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub rows: Vec<ReportRow>,
    pub conflicts: Vec<Conflict>,
    pub to_install: Vec<String>,
    pub outcome: RunOutcome,
}

impl ReconcileReport {
    #[must_use]
    pub fn has_python_conflicts(&self) -> bool {
        self.conflicts
            .iter()
            .any(|conflict| matches!(conflict, Conflict::PythonIncompatible { .. }))
    }

    #[must_use]
    pub fn has_version_conflicts(&self) -> bool {
        self.conflicts
            .iter()
            .any(|conflict| matches!(conflict, Conflict::Version { .. }))
    }
}

/// Flags steering what a finished reconciliation is allowed to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    pub auto_install: bool,
    pub force_install: bool,
    pub summary_only: bool,
}

/// What the caller should do with the requirement set as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionPlan {
    /// Everything satisfied; nothing to do.
    UpToDate,
    /// No conflicts; install the missing packages in place.
    InstallInPlace(Vec<String>),
    /// Version conflicts present; build a fresh isolated environment
    /// holding the full requirement set instead of touching this one.
    Isolate,
    /// Interpreter incompatibilities block any automatic action.
    Blocked,
    /// Summary-only run, or auto-install declined; report and stop.
    ReportOnly,
}

/// The decision core: compares each requirement against installed state
/// and registry metadata, classifies the result, and aggregates the
/// conflict lists that feed the install-or-isolate decision.
pub struct Reconciler<'a> {
    registry: &'a RegistryClient,
    index: &'a dyn InstalledIndex,
    python: PythonVersion,
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new(
        registry: &'a RegistryClient,
        index: &'a dyn InstalledIndex,
        python: PythonVersion,
    ) -> Self {
        Self {
            registry,
            index,
            python,
        }
    }

    /// Check every requirement in sequence. Registry data is best-effort:
    /// a failed lookup only skips that entry's interpreter-compatibility
    /// check and latest-version column, never the whole batch.
    pub fn reconcile(
        &self,
        store: &mut CacheStore,
        requirements: &[Requirement],
    ) -> ReconcileReport {
        let mut rows = Vec::with_capacity(requirements.len());
        let mut conflicts = Vec::new();
        let mut to_install = Vec::new();

        for requirement in requirements {
            let record = match self.registry.fetch_info(store, &requirement.name, None) {
                Ok(record) => Some(record),
                Err(err @ RegistryError::NotFound { .. }) => {
                    debug!(name = %requirement.name, %err, "no registry record");
                    None
                }
                Err(err) => {
                    warn!(name = %requirement.name, %err, "registry lookup failed; continuing without metadata");
                    None
                }
            };
            let latest = record
                .as_ref()
                .and_then(|record| record.latest_version())
                .map(ToString::to_string);

            if let Some(requires_python) = record.as_ref().and_then(|r| r.requires_python()) {
                if !self.python.satisfies(requires_python) {
                    conflicts.push(Conflict::PythonIncompatible {
                        name: requirement.name.clone(),
                        requires_python: requires_python.to_string(),
                        current: self.python.to_string(),
                    });
                }
            }

            let installed = self.index.installed_version(&requirement.name);
            let status = match (&installed, &requirement.constraint) {
                (None, required) => {
                    conflicts.push(Conflict::Missing {
                        name: requirement.name.clone(),
                        required: required.clone(),
                    });
                    to_install.push(requirement.display_spec());
                    RequirementStatus::NotInstalled
                }
                (Some(_), None) => RequirementStatus::Unconstrained,
                (Some(installed), Some(required)) => {
                    let status = compare_versions(installed, required);
                    if status == RequirementStatus::Mismatch {
                        conflicts.push(Conflict::Version {
                            name: requirement.name.clone(),
                            installed: installed.clone(),
                            required: required.clone(),
                        });
                    }
                    status
                }
            };

            rows.push(ReportRow {
                name: requirement.name.clone(),
                installed,
                required: requirement.constraint.clone(),
                latest,
                status,
            });
        }

        let outcome = if conflicts.is_empty() {
            RunOutcome::Clean
        } else {
            RunOutcome::Conflicted
        };
        ReconcileReport {
            rows,
            conflicts,
            to_install,
            outcome,
        }
    }
}

/// Exact pins compare version equality; everything else is range
/// membership in the canonical grammar.
fn compare_versions(installed: &str, required: &str) -> RequirementStatus {
    let Ok(installed_version) = Version::from_str(installed) else {
        warn!(installed, "installed version does not parse; treating as mismatch");
        return RequirementStatus::Mismatch;
    };

    if let Some(pinned) = exact_pin(required) {
        return match Version::from_str(&pinned) {
            Ok(required_version) if installed_version == required_version => {
                RequirementStatus::ExactMatch
            }
            Ok(_) => RequirementStatus::Mismatch,
            Err(err) => {
                warn!(required, %err, "unparseable pinned version; treating as mismatch");
                RequirementStatus::Mismatch
            }
        };
    }

    if constraint::allows(required, &installed_version) {
        RequirementStatus::WithinRange
    } else {
        RequirementStatus::Mismatch
    }
}

/// The pinned version of an `==`-style constraint, if that is what this
/// constraint is.
fn exact_pin(required: &str) -> Option<String> {
    let (_, after) = required.split_once("==")?;
    let version: String = after
        .chars()
        .take_while(|ch| !matches!(ch, ',' | '|'))
        .collect();
    let version = version.trim();
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Turn a finished report plus the run's flags into the one action the
/// whole requirement set takes. In-place installs and isolation are never
/// mixed in a single run.
#[must_use]
pub fn resolution_plan(report: &ReconcileReport, options: ReconcileOptions) -> ResolutionPlan {
    if report.has_python_conflicts() {
        // Interpreter incompatibility disables automatic handling for
        // the entire run; the user has to resolve it.
        return ResolutionPlan::Blocked;
    }
    if report.has_version_conflicts() && !options.force_install {
        if options.summary_only {
            return ResolutionPlan::ReportOnly;
        }
        return ResolutionPlan::Isolate;
    }
    if report.to_install.is_empty() {
        return ResolutionPlan::UpToDate;
    }
    if options.summary_only || !options.auto_install {
        return ResolutionPlan::ReportOnly;
    }
    ResolutionPlan::InstallInPlace(report.to_install.clone())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use httptest::{matchers::request, responders::status_code, Expectation, Server};
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::site::SitePackagesIndex;
    use crate::store::remote::MemoryRemoteCache;
    use crate::store::FileCache;

    fn test_store(dir: &std::path::Path) -> CacheStore {
        CacheStore::with_tiers(
            Box::new(MemoryRemoteCache {
                entries: HashMap::new(),
            }),
            FileCache::new(dir, Duration::from_secs(60), true),
            Duration::from_secs(60),
        )
    }

    fn offline_registry() -> RegistryClient {
        // Unroutable per RFC 5737; every lookup fails fast as
        // unreachable, which reconciliation tolerates.
        RegistryClient::with_base_url(
            "http://192.0.2.1:9".to_string(),
            Duration::from_millis(250),
        )
    }

    fn python() -> PythonVersion {
        "3.11.0".parse().unwrap()
    }

    #[test]
    fn exact_pin_match_yields_no_conflict() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let registry = offline_registry();
        let index = SitePackagesIndex::from_pairs(&[("pkgX", "1.0.0")]);
        let reconciler = Reconciler::new(&registry, &index, python());

        let report = reconciler.reconcile(
            &mut store,
            &[Requirement::new("pkgX", Some("==1.0.0".to_string()))],
        );
        assert!(report.conflicts.is_empty());
        assert_eq!(report.outcome, RunOutcome::Clean);
        assert_eq!(report.rows[0].status, RequirementStatus::ExactMatch);
    }

    #[test]
    fn exact_pin_mismatch_yields_exactly_one_version_conflict() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let registry = offline_registry();
        let index = SitePackagesIndex::from_pairs(&[("pkgX", "1.1.0")]);
        let reconciler = Reconciler::new(&registry, &index, python());

        let report = reconciler.reconcile(
            &mut store,
            &[Requirement::new("pkgX", Some("==1.0.0".to_string()))],
        );
        assert_eq!(
            report.conflicts,
            vec![Conflict::Version {
                name: "pkgX".to_string(),
                installed: "1.1.0".to_string(),
                required: "==1.0.0".to_string(),
            }]
        );
        assert_eq!(report.outcome, RunOutcome::Conflicted);
        assert!(report.to_install.is_empty());
    }

    #[test]
    fn missing_package_yields_exactly_one_missing_conflict() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let registry = offline_registry();
        let index = SitePackagesIndex::from_pairs(&[]);
        let reconciler = Reconciler::new(&registry, &index, python());

        let report = reconciler.reconcile(&mut store, &[Requirement::unconstrained("pkgY")]);
        assert_eq!(
            report.conflicts,
            vec![Conflict::Missing {
                name: "pkgY".to_string(),
                required: None,
            }]
        );
        assert_eq!(report.to_install, vec!["pkgY".to_string()]);
    }

    #[test]
    fn range_membership_is_checked() {
        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let registry = offline_registry();
        let index = SitePackagesIndex::from_pairs(&[("rich", "13.7.0"), ("click", "9.0.0")]);
        let reconciler = Reconciler::new(&registry, &index, python());

        let report = reconciler.reconcile(
            &mut store,
            &[
                Requirement::new("rich", Some(">=13.0,<14.0".to_string())),
                Requirement::new("click", Some(">=7.0,<9.0".to_string())),
            ],
        );
        assert_eq!(report.rows[0].status, RequirementStatus::WithinRange);
        assert_eq!(report.rows[1].status, RequirementStatus::Mismatch);
        assert!(report.has_version_conflicts());
    }

    #[test]
    fn python_incompatibility_marks_run_blocked() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/strict/json")).respond_with(
                status_code(200)
                    .append_header("content-type", "application/json")
                    .body(
                        json!({"info": {"version": "1.0.0", "requires_python": ">=3.99"}})
                            .to_string(),
                    ),
            ),
        );
        let base = server.url_str("/").trim_end_matches('/').to_string();
        let registry = RegistryClient::with_base_url(base, Duration::from_secs(5));

        let dir = tempdir().unwrap();
        let mut store = test_store(dir.path());
        let index = SitePackagesIndex::from_pairs(&[("strict", "1.0.0")]);
        let reconciler = Reconciler::new(&registry, &index, python());

        let report = reconciler.reconcile(&mut store, &[Requirement::unconstrained("strict")]);
        assert!(report.has_python_conflicts());
        assert_eq!(
            resolution_plan(
                &report,
                ReconcileOptions {
                    auto_install: true,
                    ..ReconcileOptions::default()
                }
            ),
            ResolutionPlan::Blocked
        );
    }

    #[test]
    fn version_conflicts_route_to_isolation_with_zero_installs() {
        let report = ReconcileReport {
            rows: Vec::new(),
            conflicts: vec![
                Conflict::Version {
                    name: "pkgX".to_string(),
                    installed: "1.1.0".to_string(),
                    required: "==1.0.0".to_string(),
                },
                Conflict::Missing {
                    name: "pkgY".to_string(),
                    required: None,
                },
            ],
            to_install: vec!["pkgY".to_string()],
            outcome: RunOutcome::Conflicted,
        };
        let plan = resolution_plan(
            &report,
            ReconcileOptions {
                auto_install: true,
                ..ReconcileOptions::default()
            },
        );
        assert_eq!(plan, ResolutionPlan::Isolate);
    }

    #[test]
    fn clean_runs_install_missing_packages_in_place() {
        let report = ReconcileReport {
            rows: Vec::new(),
            conflicts: vec![Conflict::Missing {
                name: "pkgY".to_string(),
                required: Some(">=1.0".to_string()),
            }],
            to_install: vec!["pkgY>=1.0".to_string()],
            outcome: RunOutcome::Conflicted,
        };
        let plan = resolution_plan(
            &report,
            ReconcileOptions {
                auto_install: true,
                ..ReconcileOptions::default()
            },
        );
        assert_eq!(
            plan,
            ResolutionPlan::InstallInPlace(vec!["pkgY>=1.0".to_string()])
        );

        let summary = resolution_plan(
            &report,
            ReconcileOptions {
                auto_install: true,
                summary_only: true,
                ..ReconcileOptions::default()
            },
        );
        assert_eq!(summary, ResolutionPlan::ReportOnly);
    }
}
