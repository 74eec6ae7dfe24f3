//! Syntax-tree-based scanning of Python source: one generic statement
//! walker with pluggable sinks, used by both the import scanner and the
//! build-script extractor.

pub mod imports;
pub mod names;
pub mod setup;
pub mod visitor;

pub use imports::{
    filter_third_party, python_files, requirements_from_packages, scan_directory, scan_file,
    scan_source,
};
pub use names::{is_stdlib_module, registry_package_name};
pub use setup::{install_requires, project_name};
pub use visitor::{parse_module, statement_call, walk_statements, StatementSink};
