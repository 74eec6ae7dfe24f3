use std::fs;
use std::path::Path;

use pytidy_domain::manifest::pyproject_project_name;
use pytidy_domain::source;
use tracing::debug;

/// Discover the project's name for labeling an isolated environment:
/// the build script's `name` keyword, then the structured manifest, then
/// the directory's own name.
#[must_use]
pub fn project_name(root: &Path) -> String {
    let setup_py = root.join("setup.py");
    if let Ok(contents) = fs::read_to_string(&setup_py) {
        if let Some(name) = source::project_name(&contents, &setup_py.display().to_string()) {
            debug!(%name, "project name from build script");
            return name;
        }
    }

    let pyproject = root.join("pyproject.toml");
    if let Some(name) = pyproject_project_name(&pyproject) {
        debug!(%name, "project name from manifest");
        return name;
    }

    root.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("project")
        .to_string()
}
