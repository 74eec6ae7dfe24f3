use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};
use tracing::warn;

/// Convert a version constraint written in any supported dialect into the
/// canonical comma-separated comparison form.
///
/// Supported on top of the canonical grammar itself: union (`|`),
/// caret (`^1.2.3`), tilde (`~1.2.3`), wildcard (`1.*`, `1.2.*`), and bare
/// numeric pins. Unsupported syntax yields an empty string after a logged
/// warning; callers treat empty as "no constraint".
#[must_use]
pub fn convert(spec: &str) -> String {
    let spec = spec.trim();
    if spec.is_empty() {
        return String::new();
    }

    if spec.contains('|') {
        let alternatives: Vec<String> = spec
            .split('|')
            .map(convert)
            .filter(|alt| !alt.is_empty())
            .collect();
        if alternatives.is_empty() {
            warn!(spec, "no supported alternative in union constraint");
            return String::new();
        }
        return alternatives.join(" | ");
    }

    if spec.contains(',') {
        let mut clauses = Vec::new();
        for part in spec.split(',') {
            let converted = convert(part);
            if converted.is_empty() {
                warn!(spec, clause = part, "unsupported clause in constraint");
                return String::new();
            }
            clauses.push(converted);
        }
        return clauses.join(",");
    }

    if let Some(version) = spec.strip_prefix('^') {
        return convert_caret(version.trim());
    }
    if let Some(version) = spec.strip_prefix('~') {
        // `~=` is already canonical and must not be treated as tilde.
        if !version.starts_with('=') {
            return convert_tilde(version.trim());
        }
    }
    if spec.contains('*') {
        return convert_wildcard(spec);
    }

    if [">=", "<=", "==", "!=", "~=", ">", "<"]
        .iter()
        .any(|op| spec.starts_with(op))
    {
        return spec.chars().filter(|ch| !ch.is_whitespace()).collect();
    }

    if is_bare_version(spec) {
        return format!("=={spec}");
    }

    warn!(spec, "unsupported version constraint");
    String::new()
}

/// Test whether `version` satisfies a canonical constraint. Union
/// alternatives are tried in order; the first one that accepts the version
/// wins.
#[must_use]
pub fn allows(constraint: &str, version: &Version) -> bool {
    constraint.split('|').any(|alternative| {
        let alternative = alternative.trim();
        match VersionSpecifiers::from_str(alternative) {
            Ok(specs) => specs.contains(version),
            Err(err) => {
                warn!(constraint = alternative, %err, "unparseable constraint; treating as non-matching");
                false
            }
        }
    })
}

/// `^X[.Y[.Z]]`: lower bound as written, upper bound at the next breaking
/// release for the leftmost non-zero component.
fn convert_caret(version: &str) -> String {
    let Some((major, minor, patch)) = components(version) else {
        warn!(version, "unsupported caret constraint");
        return String::new();
    };

    let upper = if major > 0 {
        format!("{}.0.0", major + 1)
    } else if minor > 0 {
        format!("0.{}.0", minor + 1)
    } else {
        format!("0.0.{}", patch + 1)
    };
    format!(">={version},<{upper}")
}

/// `~X[.Y[.Z]]`: upper bound is always the next minor release. A bare
/// major (`~1`) pads to `1.0.0`, so the bound lands on `1.1.0`.
fn convert_tilde(version: &str) -> String {
    let Some((major, minor, _)) = components(version) else {
        warn!(version, "unsupported tilde constraint");
        return String::new();
    };

    format!(">={version},<{}.{}.0", major, minor + 1)
}

/// `X.*` and `X.Y.*` expand to half-open ranges; anything else wildcarded
/// is unsupported.
fn convert_wildcard(spec: &str) -> String {
    let parts: Vec<&str> = spec.split('.').collect();
    match parts.as_slice() {
        [major, "*"] => {
            if let Ok(major) = major.parse::<u64>() {
                return format!(">={major}.0,<{}.0", major + 1);
            }
        }
        [major, minor, "*"] => {
            if let (Ok(major), Ok(minor)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={major}.{minor}.0,<{major}.{}.0", minor + 1);
            }
        }
        _ => {}
    }
    warn!(spec, "unsupported wildcard constraint");
    String::new()
}

/// Parse up to three numeric components, padding the missing ones with
/// zero. Versions with more than three components are rejected rather than
/// guessed at.
fn components(version: &str) -> Option<(u64, u64, u64)> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut numbers = [0_u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.parse().ok()?;
    }
    Some((numbers[0], numbers[1], numbers[2]))
}

fn is_bare_version(spec: &str) -> bool {
    !spec.is_empty()
        && spec
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caret_bumps_leftmost_nonzero_component() {
        assert_eq!(convert("^1.2.3"), ">=1.2.3,<2.0.0");
        assert_eq!(convert("^0.2.3"), ">=0.2.3,<0.3.0");
        assert_eq!(convert("^0.0.3"), ">=0.0.3,<0.0.4");
        assert_eq!(convert("^1.2"), ">=1.2,<2.0.0");
    }

    #[test]
    fn tilde_bumps_minor() {
        assert_eq!(convert("~1.2.3"), ">=1.2.3,<1.3.0");
        assert_eq!(convert("~1"), ">=1,<1.1.0");
    }

    #[test]
    fn wildcard_expands_to_half_open_range() {
        assert_eq!(convert("1.*"), ">=1.0,<2.0");
        assert_eq!(convert("1.2.*"), ">=1.2.0,<1.3.0");
    }

    #[test]
    fn comparison_operators_pass_through_without_whitespace() {
        assert_eq!(convert(">= 1.0"), ">=1.0");
        assert_eq!(convert("!=2.1"), "!=2.1");
        assert_eq!(convert("~=1.4"), "~=1.4");
    }

    #[test]
    fn bare_version_becomes_exact_pin() {
        assert_eq!(convert("1.2.3"), "==1.2.3");
        assert_eq!(convert("2"), "==2");
    }

    #[test]
    fn union_and_intersection_convert_each_side() {
        assert_eq!(convert("^1.0 | ^2.0"), ">=1.0,<2.0.0 | >=2.0,<3.0.0");
        assert_eq!(convert(">=1.0, <2.0"), ">=1.0,<2.0");
    }

    #[test]
    fn conversion_is_idempotent_on_canonical_input() {
        for spec in ["^1.2.3", "~1.2.3", "1.*", "==1.0", ">=1.0,<2.0", "^1 | ~2.1"] {
            let once = convert(spec);
            assert_eq!(convert(&once), once, "not idempotent for {spec}");
        }
    }

    #[test]
    fn unsupported_syntax_yields_empty() {
        assert_eq!(convert("latest"), "");
        assert_eq!(convert("^1.2.3.4"), "");
        assert_eq!(convert("1.2.3.*"), "");
        assert_eq!(convert(">=1.0,nonsense"), "");
    }

    #[test]
    fn union_membership_takes_first_matching_alternative() {
        let version = Version::from_str("2.5.0").unwrap();
        assert!(allows(">=1.0,<2.0.0 | >=2.0,<3.0.0", &version));
        assert!(!allows(">=3.0", &version));
    }

    #[test]
    fn exact_and_range_membership() {
        let version = Version::from_str("1.1.0").unwrap();
        assert!(allows(">=1.0,<2.0", &version));
        assert!(!allows("==1.0.0", &version));
    }
}
