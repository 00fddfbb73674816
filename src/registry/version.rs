//! Version parsing, constraints and registry version selection
//!
//! Versions accept one to three numeric components and an optional leading
//! `v`; missing components are zero. Constraints are comma-separated terms
//! using `=`, `!=`, `>`, `>=`, `<`, `<=` and the pessimistic `~>`.

use std::cmp::Ordering;
use std::fmt;

use semver::{BuildMetadata, Version};

use crate::error::{IngestError, Result};

/// Parse a registry or constraint version string
pub fn parse_version(input: &str) -> Result<Version> {
    parse_with_segments(input).map(|(v, _)| v)
}

fn parse_with_segments(input: &str) -> Result<(Version, usize)> {
    let invalid = || IngestError::InvalidVersion {
        version: input.to_string(),
    };
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }
    let mut numbers = [0_u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = part.parse().map_err(|_| invalid())?;
    }

    let full = format!("{}.{}.{}{suffix}", numbers[0], numbers[1], numbers[2]);
    let version = Version::parse(&full).map_err(|_| invalid())?;
    Ok((version, parts.len()))
}

/// Order two versions ignoring build metadata
pub fn compare(a: &Version, b: &Version) -> Ordering {
    let strip = |v: &Version| {
        let mut v = v.clone();
        v.build = BuildMetadata::EMPTY;
        v
    };
    strip(a).cmp(&strip(b))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Pessimistic,
}

const OPERATORS: [(&str, Op); 7] = [
    ("~>", Op::Pessimistic),
    (">=", Op::Ge),
    ("<=", Op::Le),
    ("!=", Op::Ne),
    ("=", Op::Eq),
    (">", Op::Gt),
    ("<", Op::Lt),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    op: Op,
    version: Version,
    segments: usize,
}

impl Term {
    fn matches(&self, v: &Version) -> bool {
        let ord = compare(v, &self.version);
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Ne => ord != Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Ge => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Le => ord != Ordering::Greater,
            Op::Pessimistic => {
                if ord == Ordering::Less {
                    return false;
                }
                let t = &self.version;
                match self.segments {
                    3 => v.major == t.major && v.minor == t.minor,
                    _ => v.major == t.major,
                }
            }
        }
    }
}

/// A parsed version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    raw: String,
    terms: Vec<Term>,
}

impl Constraint {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| IngestError::InvalidConstraint {
            constraint: input.to_string(),
            reason: reason.to_string(),
        };

        let mut terms = Vec::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid("empty constraint term"));
            }
            let (op, rest) = OPERATORS
                .iter()
                .find_map(|(token, op)| part.strip_prefix(token).map(|rest| (*op, rest)))
                .unwrap_or((Op::Eq, part));
            let (version, segments) = parse_with_segments(rest.trim())
                .map_err(|_| invalid(&format!("invalid version '{}'", rest.trim())))?;
            terms.push(Term {
                op,
                version,
                segments,
            });
        }

        Ok(Self {
            raw: input.trim().to_string(),
            terms,
        })
    }

    /// Whether `v` satisfies every term.
    ///
    /// A pre-release only matches a term naming the same release core with a pre-release.
    pub fn matches(&self, v: &Version) -> bool {
        if !v.pre.is_empty() {
            let named = self.terms.iter().any(|t| {
                !t.version.pre.is_empty()
                    && (t.version.major, t.version.minor, t.version.patch)
                        == (v.major, v.minor, v.patch)
            });
            if !named {
                return false;
            }
        }
        self.terms.iter().all(|t| t.matches(v))
    }

    /// Whether the constraint pins exactly `v`
    pub fn is_exactly(&self, v: &Version) -> bool {
        matches!(self.terms.as_slice(), [t] if t.op == Op::Eq && compare(&t.version, v) == Ordering::Equal)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Pick the version to install among the versions a registry published.
///
/// Unparseable versions are skipped with a warning. Pre-releases are skipped
/// unless the constraint pins that exact version. Without a constraint the
/// greatest release wins; with one, the greatest matching version.
/// Returns the version string as the registry published it.
pub fn select_version(
    versions: &[String],
    constraint: Option<&str>,
    module: &str,
    host: &str,
) -> Result<String> {
    if versions.is_empty() {
        return Err(IngestError::NoVersions {
            module: module.to_string(),
            host: host.to_string(),
        });
    }

    let constraint = constraint
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(Constraint::parse)
        .transpose()?;

    let mut latest: Option<(Version, &String)> = None;
    let mut matched: Option<(Version, &String)> = None;

    for raw in versions {
        let version = match parse_version(raw) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(version = %raw, module, "skipping unparseable module version");
                continue;
            }
        };

        if !version.pre.is_empty()
            && !constraint.as_ref().is_some_and(|c| c.is_exactly(&version))
        {
            continue;
        }

        if latest
            .as_ref()
            .is_none_or(|(v, _)| compare(&version, v) == Ordering::Greater)
        {
            latest = Some((version.clone(), raw));
        }

        let Some(c) = &constraint else {
            continue;
        };
        if c.matches(&version)
            && matched
                .as_ref()
                .is_none_or(|(v, _)| compare(&version, v) == Ordering::Greater)
        {
            matched = Some((version, raw));
        }
    }

    match constraint {
        None => latest
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| IngestError::NoVersions {
                module: module.to_string(),
                host: host.to_string(),
            }),
        Some(c) => matched
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| IngestError::NoMatchingVersion {
                constraint: c.to_string(),
                module: module.to_string(),
                host: host.to_string(),
                latest: latest.map_or_else(|| "none".to_string(), |(v, _)| v.to_string()),
            }),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn versions(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn constraint(c: &str) -> Constraint {
        Constraint::parse(c).expect("valid constraint")
    }

    fn v(s: &str) -> Version {
        parse_version(s).expect("valid version")
    }

    #[test]
    fn test_parse_short_versions() {
        assert_eq!(v("1"), Version::new(1, 0, 0));
        assert_eq!(v("v1.2"), Version::new(1, 2, 0));
        assert_eq!(v("1.2.3-beta1").pre.as_str(), "beta1");
        assert!(parse_version("1.2.3.4").is_err());
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn test_select_without_constraint() {
        let list = versions(&["1.0.0", "1.1.0", "1.2.0"]);
        assert_eq!(select_version(&list, None, "a/b/c", "h").expect("selects"), "1.2.0");
    }

    #[test]
    fn test_select_exact_constraint() {
        let list = versions(&["1.0.0", "1.1.0", "1.2.0"]);
        assert_eq!(
            select_version(&list, Some("1.2.0"), "a/b/c", "h").expect("selects"),
            "1.2.0"
        );
    }

    #[test]
    fn test_select_no_match_names_latest() {
        let list = versions(&["1.0.0", "1.1.0", "1.2.0"]);
        let err = select_version(&list, Some("3.17.0"), "a/b/c", "registry.terraform.io")
            .expect_err("no match");
        let msg = err.to_string();
        assert!(msg.contains("no versions matching: 3.17.0"));
        assert!(msg.contains("latest version found: 1.2.0"));
    }

    #[test]
    fn test_select_skips_prereleases_and_garbage() {
        let list = versions(&["1.0.0", "2.0.0-rc1", "not-a-version", "1.5.0"]);
        assert_eq!(select_version(&list, None, "a/b/c", "h").expect("selects"), "1.5.0");
        assert_eq!(
            select_version(&list, Some(">= 1.0"), "a/b/c", "h").expect("selects"),
            "1.5.0"
        );
    }

    #[test]
    fn test_select_pinned_prerelease() {
        let list = versions(&["1.0.0", "2.0.0-rc1"]);
        assert_eq!(
            select_version(&list, Some("2.0.0-rc1"), "a/b/c", "h").expect("selects"),
            "2.0.0-rc1"
        );
    }

    #[test]
    fn test_select_empty_list() {
        let err = select_version(&[], None, "a/b/c", "h").expect_err("empty");
        assert!(matches!(err, IngestError::NoVersions { .. }));
    }

    #[test]
    fn test_select_keeps_registry_spelling() {
        let list = versions(&["v1.0.0", "v1.1.0"]);
        assert_eq!(
            select_version(&list, Some("~> 1.0"), "a/b/c", "h").expect("selects"),
            "v1.1.0"
        );
    }

    #[test]
    fn test_pessimistic_constraint() {
        assert!(constraint("~> 1.2").matches(&v("1.9.0")));
        assert!(!constraint("~> 1.2").matches(&v("2.0.0")));
        assert!(!constraint("~> 1.2").matches(&v("1.1.0")));
        assert!(constraint("~> 1.2.3").matches(&v("1.2.9")));
        assert!(!constraint("~> 1.2.3").matches(&v("1.3.0")));
    }

    #[test]
    fn test_compound_constraint() {
        let c = constraint(">= 1.0.0, < 2.0.0, != 1.4.0");
        assert!(c.matches(&v("1.3.0")));
        assert!(!c.matches(&v("1.4.0")));
        assert!(!c.matches(&v("2.0.0")));
        assert!(!c.matches(&v("0.9.0")));
    }

    #[test]
    fn test_invalid_constraint() {
        assert!(Constraint::parse(">= banana").is_err());
        assert!(Constraint::parse("1.0,").is_err());
    }
}
