//! The auto-healer's error-pattern table (spec §9 Open Question #3):
//! "an implementation must define the regex/AST patterns as a
//! first-class, testable table" rather than leave pattern recognition
//! as prose. Each entry recognizes one shape of failure text and, on a
//! match, extracts the [`Requirement`] it implies.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sheaf_core::types::PackageName;
use sheaf_installer::Requirement;

struct Pattern {
    label: &'static str,
    regex: Regex,
    extract: fn(&Captures) -> Option<Requirement>,
}

fn parse_requirement(caps: &Captures) -> Option<Requirement> {
    let name = caps.name("name")?.as_str();
    let version = semver::Version::parse(caps.name("version")?.as_str()).ok()?;
    Some(Requirement::new(PackageName::new(name), version))
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    vec![
        // "AssertionError: expected y==1.4.2" / "expected y version 1.4.2"
        // (spec §8 scenario 2's version-assertion failure).
        Pattern {
            label: "expected-version",
            regex: Regex::new(
                r"(?i)expected\s+(?P<name>[A-Za-z0-9_.-]+)\s*(?:==|version)\s*(?P<version>\d+\.\d+\.\d+)",
            )
            .unwrap_or_else(|_| unreachable!("pattern literal is a valid regex")),
            extract: parse_requirement,
        },
        // "y version mismatch: expected 1.4.2, got 1.7.1" — the name and
        // the expected version may be separated by the mismatch clause.
        Pattern {
            label: "version-mismatch",
            regex: Regex::new(
                r"(?i)(?P<name>[A-Za-z0-9_.-]+)\s+version\s+mismatch:?\s*expected\s+(?P<version>\d+\.\d+\.\d+)",
            )
            .unwrap_or_else(|_| unreachable!("pattern literal is a valid regex")),
            extract: parse_requirement,
        },
        // "requires y==1.4.2" / "required: y==1.4.2" (a dependency
        // manifest's pinned requirement surfacing verbatim in output).
        Pattern {
            label: "requires-pin",
            regex: Regex::new(
                r"(?i)requires?:?\s+(?P<name>[A-Za-z0-9_.-]+)==(?P<version>\d+\.\d+\.\d+)",
            )
            .unwrap_or_else(|_| unreachable!("pattern literal is a valid regex")),
            extract: parse_requirement,
        },
    ]
});

/// Scan `failure_text` against every registered pattern and return the
/// distinct requirements it implies, in first-seen order.
///
/// Empty output means no pattern recognized anything in the text — the
/// caller should surface [`crate::HealError::NoPatternMatched`] rather
/// than build an empty plan.
pub fn analyze(failure_text: &str) -> Vec<Requirement> {
    let mut found: Vec<Requirement> = Vec::new();
    for pattern in PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(failure_text) {
            if let Some(requirement) = (pattern.extract)(&caps) {
                if !found.contains(&requirement) {
                    log::debug!("heal pattern '{}' matched: {}", pattern.label, requirement.name);
                    found.push(requirement);
                }
            }
        }
    }
    found
}
