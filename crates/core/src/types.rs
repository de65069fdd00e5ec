//! Entity types shared across the Sheaf subsystems.
//!
//! These mirror the entities of the data model: `Interpreter`, `Package`,
//! `Bubble`, `Manifest`, `Snapshot`. Relations are expressed as references
//! (names, ids, hashes), never ownership cycles — a `Manifest` entry holds
//! a content hash, not a pointer to another bubble.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Canonical, lowercase-normalized package name.
///
/// Two `PackageName`s compare equal iff the ecosystem would treat them as
/// the same package (case-folded, separator-normalized).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageName(String);

impl PackageName {
    /// Normalize and wrap a raw package name.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw.as_ref().trim().to_lowercase().replace(['_', '.'], "-");
        Self(normalized)
    }

    /// Borrow the normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PackageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PackageName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Stable identity of a registered interpreter (the `registry_id` field of
/// `Interpreter`), used as a KB key segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterpreterId(pub String);

impl std::fmt::Display for InterpreterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered language interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    /// Stable registry identity.
    pub registry_id: InterpreterId,
    /// Interpreter's reported version.
    pub version: semver::Version,
    /// Absolute path to the interpreter executable.
    pub executable_path: PathBuf,
    /// Whether Sheaf manages this interpreter's package directory, or it
    /// was only adopted read-only for inspection.
    pub managed: bool,
}

/// An installed package and the set of versions known for it under one
/// interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Canonical name.
    pub name: PackageName,
    /// Every version known to exist, either active or bubbled.
    pub installed_versions: Vec<semver::Version>,
    /// The single version currently resolvable via the main search path.
    pub active_version: semver::Version,
}

impl Package {
    /// Versions of this package that exist only under a bubble root (i.e.
    /// everything except the active version).
    pub fn bubbled_versions(&self) -> impl Iterator<Item = &semver::Version> {
        self.installed_versions.iter().filter(move |v| **v != self.active_version)
    }
}

/// How a manifest entry's bytes are provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestEntryKind {
    /// Bytes are self-contained inside the bubble.
    File,
    /// A symbolic link to the main-environment copy.
    Symlink,
    /// A hard link to the main-environment copy.
    Hardlink,
    /// A manifest-only reference, resolved at activation time.
    DedupRef,
}

/// One file tracked by a bubble's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the bubble root.
    pub relative_path: PathBuf,
    /// How the bytes are provided.
    pub kind: ManifestEntryKind,
    /// SHA-256 of the file's contents.
    pub sha256: [u8; 32],
    /// Size in bytes.
    pub size: u64,
}

/// The per-bubble manifest: every entry is either self-contained bytes or
/// a reference to an identical-hash file in the main environment. No
/// dangling references are permitted once committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// All tracked entries, in deterministic (insertion) order so that
    /// serialize → deserialize → re-serialize is byte-identical.
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Total bytes referenced by `File`/`Hardlink`/`Symlink` entries
    /// (i.e. bytes that actually occupy space in or via the bubble,
    /// excluding manifest-only dedup references).
    pub fn materialized_size(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.kind != ManifestEntryKind::DedupRef)
            .map(|e| e.size)
            .sum()
    }

    /// Bytes saved by deduplication: the size of every `DedupRef` entry,
    /// since those bytes are not duplicated on disk.
    pub fn dedup_savings(&self) -> u64 {
        self.entries.iter().filter(|e| e.kind == ManifestEntryKind::DedupRef).map(|e| e.size).sum()
    }
}

/// Dedup boundary: whether a `DedupRef`-classified file is realized as a
/// symlink, a hard link, or a pure manifest entry resolved at activation.
///
/// This is the Open Question from spec §9 resolved as first-class
/// configuration; see DESIGN.md for the default choice and rationale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupMode {
    /// Record a manifest-only reference; the loader resolves it into a
    /// search-path entry at activation time. Default.
    ManifestRef,
    /// Create a symbolic link inside the bubble root.
    Symlink,
    /// Create a hard link inside the bubble root.
    Hardlink,
}

/// A per-version isolated package directory overlaying the main
/// environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bubble {
    /// The package this bubble provides.
    pub package_name: PackageName,
    /// The (non-active) version this bubble provides.
    pub version: semver::Version,
    /// Absolute path to the bubble root.
    pub root_path: PathBuf,
    /// The bubble's file manifest.
    pub manifest: Manifest,
    /// When the bubble was created.
    pub created_at: DateTime<Utc>,
    /// Total size in bytes, including deduped references' notional size.
    pub size_bytes: u64,
    /// Dependency versions captured at bubble-build time, used by the
    /// loader to decide which search-path links to add on activation.
    pub dependency_snapshot: DependencySnapshot,
}

/// Map of dependency name to the version it was pinned at when a bubble
/// was built.
pub type DependencySnapshot = BTreeMap<PackageName, semver::Version>;

/// Opaque, monotonically-creatable snapshot identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable record of the package→version map at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Opaque identifier.
    pub id: SnapshotId,
    /// Which interpreter this snapshot describes.
    pub interpreter_version: semver::Version,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// Package → active version, for every package visible in the main
    /// environment at capture time.
    pub packages: BTreeMap<PackageName, semver::Version>,
    /// Content hash of the installer's dependency-lock file, if one was
    /// present at capture time.
    pub lockfile_hash: Option<[u8; 32]>,
}

/// The KB's top-level schema version key (`schema:version`); a mismatch
/// against the running code's expected version triggers a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemaVersion(pub u32);

/// The schema version this build of Sheaf expects.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion(1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_name_normalizes_case_and_separators() {
        assert_eq!(PackageName::new("My_Package.Name"), PackageName::new("my-package-name"));
    }

    #[test]
    fn bubbled_versions_excludes_active() {
        let pkg = Package {
            name: "demo".into(),
            installed_versions: vec![
                semver::Version::new(1, 0, 0),
                semver::Version::new(2, 0, 0),
            ],
            active_version: semver::Version::new(2, 0, 0),
        };
        let bubbled: Vec<_> = pkg.bubbled_versions().collect();
        assert_eq!(bubbled, vec![&semver::Version::new(1, 0, 0)]);
    }

    #[test]
    fn manifest_dedup_savings_excludes_materialized_size() {
        let manifest = Manifest {
            entries: vec![
                ManifestEntry {
                    relative_path: "a.py".into(),
                    kind: ManifestEntryKind::File,
                    sha256: [0; 32],
                    size: 100,
                },
                ManifestEntry {
                    relative_path: "b.py".into(),
                    kind: ManifestEntryKind::DedupRef,
                    sha256: [1; 32],
                    size: 200,
                },
            ],
        };
        assert_eq!(manifest.materialized_size(), 100);
        assert_eq!(manifest.dedup_savings(), 200);
    }
}
