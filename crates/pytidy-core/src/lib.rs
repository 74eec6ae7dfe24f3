//! Effectful half of pytidy: configuration, the two-tier registry cache,
//! the registry client, the installed-package index, the reconciler, and
//! the install/isolation executors. Pure parsing and conversion live in
//! `pytidy-domain`.

pub mod api;
pub mod config;
pub mod install;
pub mod project;
pub mod python;
pub mod reconcile;
pub mod registry;
pub mod scan;
pub mod site;
pub mod store;
pub mod venv;

pub use api::{cache_clear, cache_stats, run_check, ActionTaken, CheckOutcome, CheckRequest};
pub use config::Config;
pub use install::{InstallExecutor, InstallStatus, InstallTracker};
pub use python::PythonVersion;
pub use reconcile::{
    resolution_plan, Conflict, ReconcileOptions, ReconcileReport, Reconciler, ReportRow,
    RequirementStatus, ResolutionPlan, RunOutcome,
};
pub use registry::{RegistryClient, RegistryError, RegistryRecord};
pub use site::SitePackagesIndex;
pub use store::{CacheClearReport, CacheStats, CacheStore};
pub use venv::VenvBuilder;
