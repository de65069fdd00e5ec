//! The KB's hierarchical key space (spec §3): `pkg:<name>:versions`,
//! `pkg:<name>:<version>:meta`, `bubble:<name>:<version>`,
//! `snapshot:<id>`, plus the ambient `schema:version` and
//! `interp:<registry_id>` keys (spec §4.1, §4.8).

use std::fmt;

/// A single, fully-qualified KB key.
///
/// Keys are opaque strings to the backend, but are always constructed
/// through the helpers below so that every caller agrees on the
/// hierarchy's exact formatting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KbKey(String);

impl KbKey {
    /// Wrap an already-formatted key. Prefer the named constructors below.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string, e.g. for backend storage or logging.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `schema:version`
    pub fn schema_version() -> Self {
        Self::raw("schema:version")
    }

    /// `pkg:<name>:versions`
    pub fn pkg_versions(name: &str) -> Self {
        Self::raw(format!("pkg:{name}:versions"))
    }

    /// `pkg:<name>:active`
    pub fn pkg_active(name: &str) -> Self {
        Self::raw(format!("pkg:{name}:active"))
    }

    /// `pkg:<name>:<version>:meta`
    pub fn pkg_meta(name: &str, version: &semver::Version) -> Self {
        Self::raw(format!("pkg:{name}:{version}:meta"))
    }

    /// `bubble:<name>:<version>`
    pub fn bubble(name: &str, version: &semver::Version) -> Self {
        Self::raw(format!("bubble:{name}:{version}"))
    }

    /// `bubble:<name>:<version>:build` — the build lock key (spec §4.3).
    pub fn bubble_build_lock(name: &str, version: &semver::Version) -> Self {
        Self::raw(format!("bubble:{name}:{version}:build"))
    }

    /// `snapshot:<id>`
    pub fn snapshot(id: &str) -> Self {
        Self::raw(format!("snapshot:{id}"))
    }

    /// `interp:<registry_id>`
    pub fn interpreter(registry_id: &str) -> Self {
        Self::raw(format!("interp:{registry_id}"))
    }

    /// Whether this key falls under `prefix` for `scan` purposes.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for KbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KbKey {
    fn from(value: &str) -> Self {
        Self::raw(value)
    }
}

impl From<String> for KbKey {
    fn from(value: String) -> Self {
        Self::raw(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_is_formatted_as_documented() {
        let v = semver::Version::new(1, 2, 3);
        assert_eq!(KbKey::pkg_versions("demo").as_str(), "pkg:demo:versions");
        assert_eq!(KbKey::pkg_meta("demo", &v).as_str(), "pkg:demo:1.2.3:meta");
        assert_eq!(KbKey::bubble("demo", &v).as_str(), "bubble:demo:1.2.3");
        assert_eq!(KbKey::snapshot("abc").as_str(), "snapshot:abc");
    }

    #[test]
    fn scan_prefix_matching() {
        let key = KbKey::pkg_meta("demo", &semver::Version::new(1, 0, 0));
        assert!(key.starts_with("pkg:demo:"));
        assert!(!key.starts_with("pkg:other:"));
    }
}
