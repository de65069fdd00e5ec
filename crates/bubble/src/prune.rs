//! Pruning: remove bubbles that are no longer referenced (spec §3's
//! "destroyed by prune/uninstall"), used by the `sheaf prune` CLI
//! operation.

use crate::error::BubbleError;
use sheaf_core::types::{Bubble, PackageName};
use sheaf_kb::{KbBackend, KbKey};
use std::collections::HashSet;
use std::path::Path;

/// One bubble removed by [`prune`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunedBubble {
    /// Package the removed bubble belonged to.
    pub package_name: PackageName,
    /// Version of the removed bubble.
    pub version: semver::Version,
    /// Bytes reclaimed on disk (the manifest's materialized size; dedup
    /// references cost nothing to reclaim).
    pub reclaimed_bytes: u64,
}

/// Remove every committed bubble whose `(name, version)` is absent from
/// `keep`, deleting both its directory and its KB record.
///
/// `keep` is supplied by the caller (typically: every version still
/// reachable from an interpreter's dependency graph, per spec §3 — a
/// bubble is never pruned while something still depends on it).
pub fn prune(
    kb: &dyn KbBackend,
    keep: &HashSet<(PackageName, semver::Version)>,
) -> Result<Vec<PrunedBubble>, BubbleError> {
    let mut pruned = Vec::new();
    let mut cursor: Option<KbKey> = None;

    loop {
        let page = kb.scan_page("bubble:", cursor.as_ref(), 128)?;
        let exhausted = page.len() < 128;
        cursor = page.last().map(|(k, _)| k.clone());

        for (key, value) in &page {
            if key.as_str().ends_with(":build") {
                continue;
            }
            let bubble: Bubble = match serde_json::from_value(value.clone()) {
                Ok(b) => b,
                Err(_) => continue,
            };
            let identity = (bubble.package_name.clone(), bubble.version.clone());
            if keep.contains(&identity) {
                continue;
            }

            remove_bubble_directory(&bubble.root_path)?;
            remove_from_versions_list(kb, &bubble.package_name, &bubble.version)?;
            kb.set(key, serde_json::Value::Null)?;

            pruned.push(PrunedBubble {
                package_name: bubble.package_name,
                version: bubble.version,
                reclaimed_bytes: bubble.manifest.materialized_size(),
            });
        }

        if exhausted {
            break;
        }
    }

    Ok(pruned)
}

fn remove_bubble_directory(root_path: &Path) -> Result<(), BubbleError> {
    if root_path.exists() {
        std::fs::remove_dir_all(root_path)?;
    }
    Ok(())
}

fn remove_from_versions_list(
    kb: &dyn KbBackend,
    name: &PackageName,
    version: &semver::Version,
) -> Result<(), BubbleError> {
    let versions_key = KbKey::pkg_versions(name.as_str());
    let keys = vec![versions_key.clone()];
    kb.transaction(&keys, &mut |view| {
        let mut versions: Vec<semver::Version> = view
            .get(&versions_key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        versions.retain(|v| v != version);
        view.set(versions_key.clone(), serde_json::to_value(&versions)?);
        Ok(())
    })?;
    Ok(())
}
