//! Domain logic for pytidy: requirement normalization, constraint
//! conversion, manifest parsing, and Python source scanning. Everything
//! here is effect-free apart from reading the files it is pointed at;
//! network, caching, and process concerns live in `pytidy-core`.

pub mod constraint;
pub mod installed;
pub mod manifest;
pub mod requirement;
pub mod source;

pub use constraint::{allows, convert};
pub use installed::InstalledIndex;
pub use manifest::{
    parse_pyproject, parse_registry_deps, parse_requirements_file, parse_requirements_lines,
    parse_setup_py, pyproject_project_name, Platform,
};
pub use requirement::{display_name, from_specifier, normalize_name, split_name_spec, Requirement};
