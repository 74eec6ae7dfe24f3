use std::str::FromStr;

use pep508_rs::Requirement as PepRequirement;
use serde::Serialize;

/// A single declared dependency: the registry name plus an optional
/// canonical version constraint.
///
/// Instances are produced by the manifest parsers and the import scanner
/// and are never mutated afterwards; a changed requirement is a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    pub name: String,
    pub constraint: Option<String>,
}

impl Requirement {
    #[must_use]
    pub fn new(name: impl Into<String>, constraint: Option<String>) -> Self {
        Self {
            name: name.into(),
            constraint: constraint.filter(|spec| !spec.trim().is_empty()),
        }
    }

    #[must_use]
    pub fn unconstrained(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// Registry-normalized form of the name used for index lookups.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    /// The `name<spec>` form handed to the install executor.
    #[must_use]
    pub fn display_spec(&self) -> String {
        match &self.constraint {
            Some(spec) => format!("{}{}", self.name, spec),
            None => self.name.clone(),
        }
    }
}

/// Normalize a registry name: lowercase, with runs of `-`, `_`, and `.`
/// collapsed to a single `-`.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_sep = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            if !prev_sep {
                out.push('-');
            }
            prev_sep = true;
        } else {
            out.push(ch.to_ascii_lowercase());
            prev_sep = false;
        }
    }
    out
}

/// Split a requirement line into `(name, specifier)`.
///
/// The name is the leading run of `[A-Za-z0-9_.-]` characters; whatever
/// follows is the raw specifier. Returns `None` when the line does not
/// start with a name character.
#[must_use]
pub fn split_name_spec(line: &str) -> Option<(String, Option<String>)> {
    let trimmed = line.trim();
    let end = trimmed
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')))
        .map_or(trimmed.len(), |(idx, _)| idx);
    if end == 0 {
        return None;
    }
    let name = trimmed[..end].to_string();
    let spec = trimmed[end..].trim();
    let spec = if spec.is_empty() {
        None
    } else {
        Some(spec.to_string())
    };
    Some((name, spec))
}

const COMPARISON_OPS: [&str; 7] = [">=", "<=", "==", "!=", "~=", ">", "<"];

/// Shared extractor for raw dependency-specifier strings as reported by a
/// registry record (`requires_dist` entries).
///
/// Strips the environment-marker suffix and any extras bracket, then keeps
/// the bare name plus the first comparison clause, if any. Returns `None`
/// when nothing name-like remains.
#[must_use]
pub fn from_specifier(dep: &str) -> Option<Requirement> {
    let head = dep.split(';').next().unwrap_or(dep).trim();
    if head.is_empty() {
        return None;
    }

    // The comparison clause always comes from the text as written, so the
    // "first operator wins" rule is independent of any parser's ordering.
    let bare = match (head.find('['), head.find(']')) {
        (Some(start), Some(end)) if end > start => {
            format!("{}{}", &head[..start], &head[end + 1..])
        }
        _ => head.to_string(),
    };
    let bare = bare.trim();
    let (split_name, rest) = match COMPARISON_OPS
        .iter()
        .filter_map(|op| bare.find(op).map(|idx| (idx, *op)))
        .min_by_key(|(idx, _)| *idx)
    {
        Some((idx, _)) => (bare[..idx].trim(), Some(bare[idx..].trim())),
        None => (bare, None),
    };

    let name = PepRequirement::from_str(head)
        .map(|parsed| parsed.name.to_string())
        .ok()
        .or_else(|| {
            if split_name.is_empty() {
                None
            } else {
                Some(split_name.to_string())
            }
        })?;
    let constraint = rest.and_then(first_clause);
    Some(Requirement::new(name, constraint))
}

fn first_clause(spec: impl AsRef<str>) -> Option<String> {
    let clause: String = spec
        .as_ref()
        .split(',')
        .next()
        .unwrap_or("")
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    if clause.is_empty() {
        None
    } else {
        Some(clause)
    }
}

/// Best-effort display name for an already-split dependency string.
#[must_use]
pub fn display_name(spec: &str) -> String {
    PepRequirement::from_str(spec.trim()).map_or_else(
        |_| {
            split_name_spec(spec)
                .map(|(name, _)| name)
                .unwrap_or_else(|| spec.trim().to_string())
        },
        |req| req.name.to_string(),
    )
}
