//! `FastBackend`: an in-memory key/value store guarded by a
//! `parking_lot::RwLock`, with a write-ahead log file for durability
//! across restarts (spec §4.1).
//!
//! Mirrors the teacher's `storage::dependency_storage::Registry` pattern
//! of wrapping a `HashMap` behind a lock for thread-safe concurrent
//! access, generalized here to a versioned key/value map plus an
//! append-only log instead of a plain in-memory cache.

use crate::backend::{KbBackend, TransactionView};
use crate::error::KbError;
use crate::key::KbKey;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

struct Entry {
    value: Value,
    /// Monotonic counter bumped on every write; the transaction
    /// mechanism compares this against the value read at transaction
    /// start to detect a concurrent commit.
    version: u64,
}

struct State {
    entries: BTreeMap<KbKey, Entry>,
}

/// In-memory KB backend with a write-ahead log for durability.
pub struct FastBackend {
    state: RwLock<State>,
    wal_path: Option<PathBuf>,
}

impl FastBackend {
    /// An empty, purely in-memory backend (used by tests and by
    /// short-lived CLI invocations that replay the log on startup).
    pub fn in_memory() -> Self {
        Self { state: RwLock::new(State { entries: BTreeMap::new() }), wal_path: None }
    }

    /// A backend that replays `wal_path` on construction (if it exists)
    /// and appends every subsequent write to it.
    pub fn with_wal(wal_path: impl Into<PathBuf>) -> Result<Self, KbError> {
        let wal_path = wal_path.into();
        let mut entries = BTreeMap::new();
        if wal_path.exists() {
            let contents = std::fs::read_to_string(&wal_path)?;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: WalRecord = serde_json::from_str(line)?;
                entries.insert(
                    KbKey::raw(record.key),
                    Entry { value: record.value, version: record.version },
                );
            }
        }
        Ok(Self { state: RwLock::new(State { entries }), wal_path: Some(wal_path) })
    }

    fn append_wal(&self, key: &KbKey, entry: &Entry) -> Result<(), KbError> {
        let Some(path) = &self.wal_path else { return Ok(()) };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let record = WalRecord {
            key: key.as_str().to_string(),
            value: entry.value.clone(),
            version: entry.version,
        };
        let line = serde_json::to_string(&record)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(())
    }

    /// Path of the write-ahead log, if this backend is durable.
    pub fn wal_path(&self) -> Option<&Path> {
        self.wal_path.as_deref()
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct WalRecord {
    key: String,
    value: Value,
    version: u64,
}

impl Default for FastBackend {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl KbBackend for FastBackend {
    fn get(&self, key: &KbKey) -> Result<Value, KbError> {
        self.state
            .read()
            .entries
            .get(key)
            .map(|e| e.value.clone())
            .ok_or_else(|| KbError::NotFound(key.to_string()))
    }

    fn set(&self, key: &KbKey, value: Value) -> Result<(), KbError> {
        let mut state = self.state.write();
        let version = state.entries.get(key).map_or(0, |e| e.version) + 1;
        let entry = Entry { value, version };
        self.append_wal(key, &entry)?;
        state.entries.insert(key.clone(), entry);
        Ok(())
    }

    fn transaction(
        &self,
        keys: &[KbKey],
        f: &mut dyn FnMut(&mut TransactionView<'_>) -> Result<(), KbError>,
    ) -> Result<(), KbError> {
        // Snapshot the read-phase versions and values while holding only
        // a read lock, so independent key groups never block each other.
        let (read_versions, reads): (Vec<(KbKey, u64)>, Vec<(&KbKey, Option<Value>)>) = {
            let state = self.state.read();
            let versions: Vec<(KbKey, u64)> = keys
                .iter()
                .map(|k| (k.clone(), state.entries.get(k).map_or(0, |e| e.version)))
                .collect();
            let values: Vec<(&KbKey, Option<Value>)> =
                keys.iter().map(|k| (k, state.entries.get(k).map(|e| e.value.clone()))).collect();
            (versions, values)
        };

        let mut view = TransactionView::new(reads);
        f(&mut view)?;
        let writes = view.into_writes();

        // Commit phase: re-check every read key's version under the
        // write lock. Any change since the read phase is a conflict.
        let mut state = self.state.write();
        for (key, seen_version) in &read_versions {
            let current = state.entries.get(key).map_or(0, |e| e.version);
            if current != *seen_version {
                return Err(KbError::Conflict(keys.iter().map(|k| k.to_string()).collect()));
            }
        }

        for (key, value) in writes {
            let version = state.entries.get(&key).map_or(0, |e| e.version) + 1;
            let entry = Entry { value, version };
            self.append_wal(&key, &entry)?;
            state.entries.insert(key, entry);
        }
        Ok(())
    }

    fn scan_page(
        &self,
        prefix: &str,
        after: Option<&KbKey>,
        limit: usize,
    ) -> Result<Vec<(KbKey, Value)>, KbError> {
        let state = self.state.read();
        let page = state
            .entries
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| after.map_or(true, |a| *k > a))
            .take(limit)
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();
        Ok(page)
    }

    fn health(&self) -> Result<(), KbError> {
        Ok(())
    }

    fn rebuild(&self) -> Result<(), KbError> {
        self.state.write().entries.clear();
        if let Some(path) = &self.wal_path {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let backend = FastBackend::in_memory();
        let key = KbKey::raw("pkg:demo:active");
        backend.set(&key, json!("1.0.0")).expect("set");
        assert_eq!(backend.get(&key).expect("get"), json!("1.0.0"));
    }

    #[test]
    fn get_missing_key_is_not_found() {
        let backend = FastBackend::in_memory();
        let err = backend.get(&KbKey::raw("missing")).unwrap_err();
        assert!(matches!(err, KbError::NotFound(_)));
    }

    #[test]
    fn concurrent_commit_conflicts() {
        let backend = FastBackend::in_memory();
        let key = KbKey::raw("pkg:demo:active");
        backend.set(&key, json!("1.0.0")).expect("seed");

        // Simulate an interleaved writer: a transaction reads the key,
        // then someone else mutates it before the transaction commits.
        let keys = vec![key.clone()];
        let result = backend.transaction(&keys, &mut |view| {
            let _ = view.get(&key);
            backend.set(&key, json!("2.0.0")).expect("interleaved write");
            view.set(key.clone(), json!("3.0.0"));
            Ok(())
        });
        assert!(matches!(result, Err(KbError::Conflict(_))));
        assert_eq!(backend.get(&key).expect("get"), json!("2.0.0"));
    }

    #[test]
    fn scan_pages_results_by_prefix() {
        let backend = FastBackend::in_memory();
        backend.set(&KbKey::raw("pkg:a:active"), json!("1.0.0")).expect("set a");
        backend.set(&KbKey::raw("pkg:b:active"), json!("2.0.0")).expect("set b");
        backend.set(&KbKey::raw("interp:py311"), json!("x")).expect("set c");

        let found: Vec<_> = backend.scan("pkg:").collect::<Result<_, _>>().expect("scan");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn rebuild_clears_all_state() {
        let backend = FastBackend::in_memory();
        backend.set(&KbKey::raw("pkg:a:active"), json!("1.0.0")).expect("set");
        backend.rebuild().expect("rebuild");
        assert!(backend.get(&KbKey::raw("pkg:a:active")).is_err());
    }

    #[test]
    fn wal_replay_restores_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wal = dir.path().join("kb.wal");
        {
            let backend = FastBackend::with_wal(&wal).expect("open");
            backend.set(&KbKey::raw("pkg:a:active"), json!("1.0.0")).expect("set");
        }
        let reopened = FastBackend::with_wal(&wal).expect("reopen");
        assert_eq!(reopened.get(&KbKey::raw("pkg:a:active")).expect("get"), json!("1.0.0"));
    }
}
