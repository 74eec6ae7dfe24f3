use std::fs;
use std::path::Path;

use toml_edit::{DocumentMut, Item, Value as TomlValue};
use tracing::{debug, warn};

use crate::constraint;
use crate::requirement::{from_specifier, split_name_spec, Requirement};
use crate::source::setup;

/// Platform identity used when evaluating `sys_platform` markers, kept
/// explicit so tests can simulate any platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl Platform {
    #[must_use]
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            _ => Self::Other,
        }
    }

    /// The value `sys_platform` reports on this platform.
    #[must_use]
    pub fn sys_platform(self) -> &'static str {
        match self {
            Self::Windows => "win32",
            Self::Linux => "linux",
            Self::MacOs => "darwin",
            Self::Other => "unknown",
        }
    }
}

/// Parse a line-based requirement list (`requirements.txt` shape).
///
/// Blank and comment lines are skipped; a `; sys_platform == "..."`
/// suffix keeps the line only when the named platform matches `platform`.
#[must_use]
pub fn parse_requirements_lines(contents: &str, platform: Platform) -> Vec<Requirement> {
    let mut requirements = Vec::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let head = match trimmed.split_once(';') {
            Some((head, marker)) => {
                if !marker_keeps_line(marker, platform) {
                    continue;
                }
                head.trim()
            }
            None => trimmed,
        };

        if let Some((name, spec)) = split_name_spec(head) {
            requirements.push(Requirement::new(name, spec));
        }
    }
    requirements
}

/// Read and parse a line-based requirement file. A missing or unreadable
/// file logs a warning and yields an empty list.
#[must_use]
pub fn parse_requirements_file(path: &Path, platform: Platform) -> Vec<Requirement> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let requirements = parse_requirements_lines(&contents, platform);
            debug!(file = %path.display(), count = requirements.len(), "parsed requirement list");
            requirements
        }
        Err(err) => {
            warn!(file = %path.display(), %err, "could not read requirement file");
            Vec::new()
        }
    }
}

/// Extract requirements from a build script's `install_requires` keyword.
/// Missing or malformed scripts log a warning and yield an empty list.
#[must_use]
pub fn parse_setup_py(path: &Path) -> Vec<Requirement> {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            warn!(file = %path.display(), %err, "could not read build script");
            return Vec::new();
        }
    };
    let label = path.display().to_string();
    let mut requirements = Vec::new();
    for raw in setup::install_requires(&source, &label) {
        if let Some((name, spec)) = split_name_spec(&raw) {
            requirements.push(Requirement::new(name, spec));
        }
    }
    debug!(file = %path.display(), count = requirements.len(), "parsed build script");
    requirements
}

/// Parse a structured project manifest (`pyproject.toml` shape): the
/// `project.dependencies` list plus `tool.poetry.dependencies`, whose
/// version strings pass through the constraint converter. The interpreter
/// pseudo-dependency is excluded.
#[must_use]
pub fn parse_pyproject(path: &Path) -> Vec<Requirement> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(file = %path.display(), %err, "could not read project manifest");
            return Vec::new();
        }
    };
    match parse_pyproject_source(&contents) {
        Ok(requirements) => {
            debug!(file = %path.display(), count = requirements.len(), "parsed project manifest");
            requirements
        }
        Err(err) => {
            warn!(file = %path.display(), %err, "could not parse project manifest");
            Vec::new()
        }
    }
}

/// Parse manifest contents; split out for tests.
///
/// # Errors
///
/// Returns an error when the document is not valid TOML.
pub fn parse_pyproject_source(contents: &str) -> anyhow::Result<Vec<Requirement>> {
    let doc: DocumentMut = contents.parse()?;
    let mut requirements = Vec::new();

    let project_deps = doc
        .get("project")
        .and_then(Item::as_table)
        .and_then(|table| table.get("dependencies"))
        .and_then(Item::as_array);
    if let Some(array) = project_deps {
        for value in array {
            if let Some(raw) = value.as_str() {
                if let Some((name, spec)) = split_name_spec(raw) {
                    requirements.push(Requirement::new(name, spec));
                }
            }
        }
    }

    let poetry_deps = doc
        .get("tool")
        .and_then(Item::as_table)
        .and_then(|tool| tool.get("poetry"))
        .and_then(Item::as_table)
        .and_then(|poetry| poetry.get("dependencies"))
        .and_then(Item::as_table_like);
    if let Some(table) = poetry_deps {
        for (name, item) in table.iter() {
            if name == "python" {
                continue;
            }
            let version = poetry_version_text(item);
            let constraint = version.map(|text| constraint::convert(&text));
            requirements.push(Requirement::new(name, constraint));
        }
    }

    Ok(requirements)
}

/// A poetry dependency value is either a bare version string or a table
/// carrying a `version` key.
fn poetry_version_text(item: &Item) -> Option<String> {
    match item {
        Item::Value(TomlValue::String(text)) => Some(text.value().clone()),
        Item::Value(TomlValue::InlineTable(table)) => table
            .get("version")
            .and_then(TomlValue::as_str)
            .map(ToString::to_string),
        Item::Table(table) => table
            .get("version")
            .and_then(Item::as_str)
            .map(ToString::to_string),
        _ => None,
    }
}

/// Project name declared in a structured manifest: `project.name` first,
/// then `tool.poetry.name`.
#[must_use]
pub fn pyproject_project_name(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let doc: DocumentMut = contents.parse().ok()?;
    let project_name = doc
        .get("project")
        .and_then(Item::as_table)
        .and_then(|table| table.get("name"))
        .and_then(Item::as_str);
    if let Some(name) = project_name {
        return Some(name.to_string());
    }
    doc.get("tool")
        .and_then(Item::as_table)
        .and_then(|tool| tool.get("poetry"))
        .and_then(Item::as_table)
        .and_then(|poetry| poetry.get("name"))
        .and_then(Item::as_str)
        .map(ToString::to_string)
}

/// Normalize raw dependency-specifier strings from a registry record into
/// requirements via the shared extractor.
#[must_use]
pub fn parse_registry_deps(specs: &[String]) -> Vec<Requirement> {
    specs
        .iter()
        .filter_map(|spec| from_specifier(spec))
        .collect()
}

fn marker_keeps_line(marker: &str, platform: Platform) -> bool {
    if !marker.contains("sys_platform") {
        // Markers this parser does not understand keep the line.
        return true;
    }
    match quoted_value(marker) {
        Some(wanted) => wanted == platform.sys_platform(),
        None => true,
    }
}

/// The first quoted token in a marker expression.
fn quoted_value(marker: &str) -> Option<&str> {
    for quote in ['"', '\''] {
        if let Some(start) = marker.find(quote) {
            let rest = &marker[start + 1..];
            if let Some(end) = rest.find(quote) {
                return Some(&rest[..end]);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blanks_and_comments() {
        let reqs = parse_requirements_lines(
            "# pinned\n\nrequests>=2.0\nrich==13.7.0\n",
            Platform::Linux,
        );
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0], Requirement::new("requests", Some(">=2.0".into())));
        assert_eq!(reqs[1], Requirement::new("rich", Some("==13.7.0".into())));
    }

    #[test]
    fn platform_marker_filters_lines() {
        let contents = "foo; sys_platform == \"win32\"\nbar\n";
        let on_windows = parse_requirements_lines(contents, Platform::Windows);
        assert_eq!(on_windows.len(), 2);
        assert_eq!(on_windows[0].name, "foo");

        let on_linux = parse_requirements_lines(contents, Platform::Linux);
        assert_eq!(on_linux.len(), 1);
        assert_eq!(on_linux[0].name, "bar");
    }

    #[test]
    fn unknown_markers_keep_the_line() {
        let reqs = parse_requirements_lines(
            "baz; python_version >= \"3.9\"\n",
            Platform::Linux,
        );
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].name, "baz");
    }

    #[test]
    fn pyproject_project_dependencies_are_split() {
        let reqs = parse_pyproject_source(
            "[project]\nname = \"demo\"\ndependencies = [\"requests>=2.0\", \"rich\"]\n",
        )
        .unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0], Requirement::new("requests", Some(">=2.0".into())));
        assert_eq!(reqs[1], Requirement::new("rich", None));
    }

    #[test]
    fn poetry_dependencies_convert_and_skip_python() {
        let reqs = parse_pyproject_source(
            "[tool.poetry.dependencies]\npython = \"^3.9\"\nhttpx = \"^0.27\"\npandas = { version = \"~2.2\", optional = true }\n",
        )
        .unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0], Requirement::new("httpx", Some(">=0.27,<0.28.0".into())));
        assert_eq!(reqs[1], Requirement::new("pandas", Some(">=2.2,<2.3.0".into())));
    }

    #[test]
    fn malformed_manifest_is_an_error_for_the_source_parser() {
        assert!(parse_pyproject_source("project = [broken").is_err());
    }

    #[test]
    fn registry_deps_use_shared_extractor() {
        let specs = vec![
            "charset-normalizer<4,>=2".to_string(),
            "idna".to_string(),
            "colorama; sys_platform == \"win32\"".to_string(),
        ];
        let reqs = parse_registry_deps(&specs);
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[0].name, "charset-normalizer");
        assert_eq!(reqs[0].constraint.as_deref(), Some("<4"));
        assert_eq!(reqs[1], Requirement::unconstrained("idna"));
        assert_eq!(reqs[2], Requirement::unconstrained("colorama"));
    }
}
