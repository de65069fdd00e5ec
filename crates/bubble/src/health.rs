//! Health / Reconciliation sweep (spec §4.7): detect and repair drift
//! between the KB's bubble records and what actually sits on disk.
//!
//! `rescan_interpreters` is deliberately not duplicated here: it is a
//! concern of the Interpreter Registry (`sheaf_core::registry`), which
//! already owns the managed-roots walk and registry diff (spec §4.8).
//! This module covers the remaining three spec §4.7 operations, all of
//! which are specific to bubbles and the KB.

use crate::error::BubbleError;
use crate::hash::hash_file;
use sheaf_core::types::{Bubble, Manifest, ManifestEntry, ManifestEntryKind, PackageName};
use sheaf_kb::{KbBackend, KbKey};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// A bubble directory on disk with no matching KB record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanBubble {
    /// Package the orphaned directory appears to belong to.
    pub package_name: PackageName,
    /// Version parsed from the directory name.
    pub version: semver::Version,
    /// The orphaned directory's path.
    pub root_path: PathBuf,
}

/// A committed KB bubble record whose directory is missing on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostBubble {
    /// Package the missing bubble belonged to.
    pub package_name: PackageName,
    /// Version the missing bubble was for.
    pub version: semver::Version,
}

/// Result of [`scan_bubbles`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// On-disk bubbles with no KB record.
    pub orphans: Vec<OrphanBubble>,
    /// KB records with no on-disk bubble.
    pub ghosts: Vec<GhostBubble>,
    /// Bubbles present and consistent on both sides.
    pub consistent: usize,
}

/// Enumerate bubble directories under `bubble_root_base`, cross-check
/// against the KB's committed `bubble:<name>:<version>` records, and
/// classify any drift (spec §4.7's `scan_bubbles`).
pub fn scan_bubbles(kb: &dyn KbBackend, bubble_root_base: &Path) -> Result<ScanReport, BubbleError> {
    let mut on_disk: BTreeSet<(String, String)> = BTreeSet::new();
    let mut disk_paths = std::collections::HashMap::new();

    if bubble_root_base.exists() {
        for entry in std::fs::read_dir(bubble_root_base)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let raw = file_name.to_string_lossy();
            if raw.starts_with(".stage-") {
                continue;
            }
            if let Some((pkg, ver)) = split_bubble_dir_name(&raw) {
                disk_paths.insert((pkg.clone(), ver.clone()), entry.path());
                on_disk.insert((pkg, ver));
            }
        }
    }

    let mut in_kb: BTreeSet<(String, String)> = BTreeSet::new();
    for (key, _value) in scan_all(kb, "bubble:")? {
        if key.as_str().ends_with(":build") {
            continue;
        }
        if let Some((pkg, ver)) = split_bubble_key(key.as_str()) {
            in_kb.insert((pkg, ver));
        }
    }

    let mut report = ScanReport::default();
    for key in &on_disk {
        if in_kb.contains(key) {
            report.consistent += 1;
        } else {
            report.orphans.push(OrphanBubble {
                package_name: PackageName::new(&key.0),
                version: parse_version_or_corrupted(&key.0, &key.1)?,
                root_path: disk_paths.get(key).cloned().unwrap_or_default(),
            });
        }
    }
    for key in &in_kb {
        if !on_disk.contains(key) {
            report.ghosts.push(GhostBubble {
                package_name: PackageName::new(&key.0),
                version: parse_version_or_corrupted(&key.0, &key.1)?,
            });
        }
    }

    Ok(report)
}

/// One manifest entry whose on-disk bytes no longer match the recorded
/// hash, or that is missing outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// The recorded file is gone.
    Missing(PathBuf),
    /// The recorded file's content hash no longer matches.
    HashMismatch { path: PathBuf, recorded: [u8; 32], found: [u8; 32] },
}

/// Re-hash every manifest entry of a committed bubble and report any
/// drift from its recorded `sha256` (spec §4.7's `verify_bubble`).
///
/// `DedupRef` entries are checked against `main_root`, since their
/// bytes live there rather than under the bubble's own root (the
/// materializer never copies them — see `materialize::materialize`).
pub fn verify_bubble(
    kb: &dyn KbBackend,
    name: &PackageName,
    version: &semver::Version,
    main_root: &Path,
) -> Result<Vec<Drift>, BubbleError> {
    let bubble_key = KbKey::bubble(name.as_str(), version);
    let value = kb.get(&bubble_key)?;
    let bubble: Bubble = serde_json::from_value(value)?;
    rehash_manifest(&bubble.manifest, &bubble.root_path, main_root)
}

fn rehash_manifest(manifest: &Manifest, bubble_root: &Path, main_root: &Path) -> Result<Vec<Drift>, BubbleError> {
    let mut drift = Vec::new();
    for entry in &manifest.entries {
        let source = match entry.kind {
            ManifestEntryKind::DedupRef => main_root.join(&entry.relative_path),
            _ => bubble_root.join(&entry.relative_path),
        };
        if !source.exists() {
            drift.push(Drift::Missing(entry.relative_path.clone()));
            continue;
        }
        let found = hash_file(&source)?;
        if found != entry.sha256 {
            drift.push(Drift::HashMismatch {
                path: entry.relative_path.clone(),
                recorded: entry.sha256,
                found,
            });
        }
    }
    Ok(drift)
}

/// Discard all KB state and reconstruct it from the bubbles actually
/// present on disk (spec §4.7's `rebuild_kb`, used to recover from
/// `KbError::SchemaMismatch`).
///
/// Per-bubble metadata that only ever lived in the KB (`created_at`,
/// `dependency_snapshot`) cannot be recovered from the filesystem
/// alone; rebuilt records carry the directory's modified time as
/// `created_at` and an empty `dependency_snapshot`, with every file
/// classified as a plain `File` (dedup linkage is re-derived the next
/// time the bubble is rebuilt, not reconstructed here).
pub fn rebuild_kb(kb: &dyn KbBackend, bubble_root_base: &Path) -> Result<usize, BubbleError> {
    kb.rebuild()?;
    let mut rebuilt = 0;

    if !bubble_root_base.exists() {
        return Ok(rebuilt);
    }

    for entry in std::fs::read_dir(bubble_root_base)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let raw = entry.file_name().to_string_lossy().to_string();
        if raw.starts_with(".stage-") {
            continue;
        }
        let Some((pkg, ver)) = split_bubble_dir_name(&raw) else { continue };
        let version = match semver::Version::parse(&ver) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let bubble_root = entry.path();
        let manifest = rescan_manifest(&bubble_root)?;
        let created_at = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(|_| chrono::Utc::now());

        let bubble = Bubble {
            package_name: PackageName::new(&pkg),
            version: version.clone(),
            root_path: bubble_root,
            manifest,
            created_at,
            size_bytes: 0,
            dependency_snapshot: sheaf_core::types::DependencySnapshot::new(),
        };
        let size_bytes = bubble.manifest.materialized_size();
        let bubble = Bubble { size_bytes, ..bubble };

        let bubble_key = KbKey::bubble(&pkg, &version);
        let versions_key = KbKey::pkg_versions(&pkg);
        let keys = vec![bubble_key.clone(), versions_key.clone()];
        kb.transaction(&keys, &mut |view| {
            view.set(bubble_key.clone(), serde_json::to_value(&bubble)?);
            let mut versions: Vec<semver::Version> = view
                .get(&versions_key)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            if !versions.contains(&bubble.version) {
                versions.push(bubble.version.clone());
            }
            view.set(versions_key.clone(), serde_json::to_value(&versions)?);
            Ok(())
        })?;
        rebuilt += 1;
    }

    Ok(rebuilt)
}

fn rescan_manifest(bubble_root: &Path) -> Result<Manifest, BubbleError> {
    let mut manifest = Manifest::default();
    let mut stack = vec![PathBuf::new()];
    while let Some(relative_dir) = stack.pop() {
        let dir = bubble_root.join(&relative_dir);
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let relative_path = relative_dir.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(relative_path);
                continue;
            }
            let absolute = bubble_root.join(&relative_path);
            let sha256 = hash_file(&absolute)?;
            let size = entry.metadata()?.len();
            manifest.entries.push(ManifestEntry {
                relative_path,
                kind: ManifestEntryKind::File,
                sha256,
                size,
            });
        }
    }
    Ok(manifest)
}

fn scan_all(kb: &dyn KbBackend, prefix: &str) -> Result<Vec<(KbKey, Value)>, BubbleError> {
    let mut out = Vec::new();
    let mut cursor: Option<KbKey> = None;
    loop {
        let page = kb.scan_page(prefix, cursor.as_ref(), 128)?;
        let exhausted = page.len() < 128;
        cursor = page.last().map(|(k, _)| k.clone());
        out.extend(page);
        if exhausted {
            break;
        }
    }
    Ok(out)
}

fn split_bubble_dir_name(raw: &str) -> Option<(String, String)> {
    // Directory names are `{name}-{version}`; since both names and
    // SemVer pre-release/build metadata can contain hyphens, try each
    // hyphen as a candidate split point and take the earliest one whose
    // suffix parses as a full version (maximizing how much of any
    // hyphenated pre-release tag lands in the version half).
    for (idx, _) in raw.match_indices('-') {
        let name = &raw[..idx];
        let version = &raw[idx + 1..];
        if name.is_empty() {
            continue;
        }
        if semver::Version::parse(version).is_ok() {
            return Some((name.to_string(), version.to_string()));
        }
    }
    None
}

fn split_bubble_key(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("bubble:")?;
    let (pkg, ver) = rest.split_once(':')?;
    Some((pkg.to_string(), ver.to_string()))
}

fn parse_version_or_corrupted(name: &str, raw: &str) -> Result<semver::Version, BubbleError> {
    semver::Version::parse(raw).map_err(|e| BubbleError::Corrupted {
        name: name.to_string(),
        version: semver::Version::new(0, 0, 0),
        detail: format!("unparseable version {raw:?}: {e}"),
    })
}
