use std::fmt;
use std::process::Command;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use pep440_rs::{Version, VersionSpecifiers};
use tracing::warn;

/// The running interpreter's version, captured once per run and compared
/// against registry-reported `requires_python` constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PythonVersion {
    pub major: u64,
    pub minor: u64,
    pub micro: u64,
}

impl PythonVersion {
    /// Ask `interpreter` for its version.
    ///
    /// # Errors
    ///
    /// Returns an error when the interpreter cannot be spawned or its
    /// output is not a recognizable version banner.
    pub fn probe(interpreter: &str) -> Result<Self> {
        let output = Command::new(interpreter)
            .arg("--version")
            .output()
            .with_context(|| format!("failed to invoke {interpreter}"))?;
        if !output.status.success() {
            return Err(anyhow!("{interpreter} exited with {}", output.status));
        }
        // Older interpreters print the banner on stderr.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let banner = if stdout.trim().is_empty() {
            stderr
        } else {
            stdout
        };
        banner.trim().parse()
    }

    /// Whether this interpreter satisfies a registry-reported
    /// `requires_python` constraint. Unparseable constraints are assumed
    /// compatible rather than blocking the run.
    #[must_use]
    pub fn satisfies(&self, requires_python: &str) -> bool {
        let specs = match VersionSpecifiers::from_str(requires_python) {
            Ok(specs) => specs,
            Err(err) => {
                warn!(requires_python, %err, "unparseable interpreter requirement");
                return true;
            }
        };
        let version = Version::from_str(&self.to_string()).expect("own version is valid");
        specs.contains(&version)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl FromStr for PythonVersion {
    type Err = anyhow::Error;

    /// Accepts `3.11.4` or a `Python 3.11.4` banner.
    fn from_str(input: &str) -> Result<Self> {
        let text = input
            .trim()
            .strip_prefix("Python")
            .map_or(input.trim(), str::trim);
        let mut numbers = text.split('.').map(|part| {
            part.trim()
                .parse::<u64>()
                .with_context(|| format!("bad version component '{part}'"))
        });
        let major = numbers
            .next()
            .ok_or_else(|| anyhow!("empty version string"))??;
        let minor = numbers.next().transpose()?.unwrap_or(0);
        let micro = numbers.next().transpose()?.unwrap_or(0);
        Ok(Self {
            major,
            minor,
            micro,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_banners_and_bare_versions() {
        let version: PythonVersion = "Python 3.11.4".parse().unwrap();
        assert_eq!(version.to_string(), "3.11.4");
        let bare: PythonVersion = "3.12".parse().unwrap();
        assert_eq!(bare.to_string(), "3.12.0");
        assert!("three.eleven".parse::<PythonVersion>().is_err());
    }

    #[test]
    fn compatibility_follows_requires_python() {
        let version: PythonVersion = "3.8.10".parse().unwrap();
        assert!(version.satisfies(">=3.8"));
        assert!(!version.satisfies(">=3.9"));
        assert!(version.satisfies(">=3.6, <4"));
    }

    #[test]
    fn unparseable_requirement_is_assumed_compatible() {
        let version: PythonVersion = "3.10.0".parse().unwrap();
        assert!(version.satisfies("not-a-specifier"));
    }
}
