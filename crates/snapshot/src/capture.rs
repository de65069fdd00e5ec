//! Capturing a [`sheaf_core::types::Snapshot`] of the main environment
//! (spec §4.4): interpreter identity, the full `(package -> version)`
//! map, and a content hash of the installer's dependency-lock file if
//! present.

use sha2::{Digest, Sha256};
use sheaf_core::types::{PackageName, Snapshot, SnapshotId};
use std::collections::BTreeMap;
use std::path::Path;

/// Capture the current state of the main environment into a new,
/// immutable [`Snapshot`].
///
/// `lockfile_path`, if given and present on disk, is hashed so a later
/// revert can detect whether the installer's own lock state moved
/// independently of the package map Sheaf tracks.
pub fn capture(
    interpreter_version: semver::Version,
    packages: BTreeMap<PackageName, semver::Version>,
    lockfile_path: Option<&Path>,
) -> std::io::Result<Snapshot> {
    let lockfile_hash = match lockfile_path {
        Some(path) if path.exists() => Some(hash_lockfile(path)?),
        _ => None,
    };

    Ok(Snapshot {
        id: SnapshotId(uuid::Uuid::new_v4().to_string()),
        interpreter_version,
        captured_at: chrono::Utc::now(),
        packages,
        lockfile_hash,
    })
}

fn hash_lockfile(path: &Path) -> std::io::Result<[u8; 32]> {
    let contents = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_records_the_full_package_map() {
        let mut packages = BTreeMap::new();
        packages.insert(PackageName::new("demo"), semver::Version::new(1, 0, 0));
        let snapshot =
            capture(semver::Version::new(3, 11, 0), packages.clone(), None).expect("capture");
        assert_eq!(snapshot.packages, packages);
        assert!(snapshot.lockfile_hash.is_none());
    }

    #[test]
    fn capture_hashes_an_existing_lockfile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let lockfile = dir.path().join("lock.json");
        std::fs::write(&lockfile, b"{}").expect("write lockfile");

        let snapshot = capture(semver::Version::new(3, 11, 0), BTreeMap::new(), Some(&lockfile))
            .expect("capture");
        assert!(snapshot.lockfile_hash.is_some());
    }

    #[test]
    fn missing_lockfile_path_is_not_an_error() {
        let snapshot = capture(
            semver::Version::new(3, 11, 0),
            BTreeMap::new(),
            Some(Path::new("/nonexistent/lock.json")),
        )
        .expect("capture");
        assert!(snapshot.lockfile_hash.is_none());
    }
}
