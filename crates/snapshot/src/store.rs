//! On-disk snapshot layout (spec §6): one file per snapshot, named by
//! `id`, under the configured snapshot directory.

use crate::error::SnapshotError;
use sheaf_core::types::{Snapshot, SnapshotId};
use std::path::{Path, PathBuf};

/// Append-only store of snapshot files under `root`.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if absent) the snapshot directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, id: &SnapshotId) -> PathBuf {
        self.root.join(format!("{}.json", id.0))
    }

    /// Persist `snapshot`. Snapshots are append-only: this always
    /// writes a new file and never overwrites an existing one (spec
    /// §3's monotonicity invariant).
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let path = self.path_for(&snapshot.id);
        let contents = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load a previously-saved snapshot by id.
    pub fn load(&self, id: &SnapshotId) -> Result<Snapshot, SnapshotError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(SnapshotError::NotFound(id.0.clone()));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// List every snapshot id known to this store, oldest-first by
    /// capture time.
    pub fn list(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let mut snapshots = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = std::fs::read_to_string(entry.path())?;
            snapshots.push(serde_json::from_str::<Snapshot>(&contents)?);
        }
        snapshots.sort_by_key(|s| s.captured_at);
        Ok(snapshots)
    }

    /// Root directory this store manages.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(id: &str) -> Snapshot {
        Snapshot {
            id: SnapshotId(id.to_string()),
            interpreter_version: semver::Version::new(3, 11, 0),
            captured_at: chrono::Utc::now(),
            packages: BTreeMap::new(),
            lockfile_hash: None,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path()).expect("open");
        let snapshot = sample("abc");
        store.save(&snapshot).expect("save");
        let loaded = store.load(&SnapshotId("abc".to_string())).expect("load");
        assert_eq!(loaded.id, snapshot.id);
    }

    #[test]
    fn loading_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path()).expect("open");
        let err = store.load(&SnapshotId("missing".to_string())).unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound(_)));
    }

    #[test]
    fn list_returns_every_saved_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::open(dir.path()).expect("open");
        store.save(&sample("a")).expect("save a");
        store.save(&sample("b")).expect("save b");
        assert_eq!(store.list().expect("list").len(), 2);
    }
}
