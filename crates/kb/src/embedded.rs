//! `EmbeddedBackend`: a `rusqlite`-backed relational store, selected
//! whenever `FastBackend::health()` fails at startup (spec §4.1).

use crate::backend::{KbBackend, TransactionView};
use crate::error::KbError;
use crate::key::KbKey;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kb_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    version INTEGER NOT NULL
);
";

/// Embedded relational KB backend, file-based and durable by default.
pub struct EmbeddedBackend {
    conn: Mutex<Connection>,
}

impl EmbeddedBackend {
    /// Open (creating if absent) the SQLite file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KbError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// An ephemeral, process-local embedded backend, used by tests.
    pub fn open_in_memory() -> Result<Self, KbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn read_row(conn: &Connection, key: &KbKey) -> Result<Option<(Value, u64)>, KbError> {
        let mut stmt =
            conn.prepare_cached("SELECT value, version FROM kb_entries WHERE key = ?1")?;
        let mut rows = stmt.query(params![key.as_str()])?;
        if let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let version: i64 = row.get(1)?;
            Ok(Some((serde_json::from_str(&raw)?, version as u64)))
        } else {
            Ok(None)
        }
    }
}

impl KbBackend for EmbeddedBackend {
    fn get(&self, key: &KbKey) -> Result<Value, KbError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        Self::read_row(&conn, key)?
            .map(|(value, _)| value)
            .ok_or_else(|| KbError::NotFound(key.to_string()))
    }

    fn set(&self, key: &KbKey, value: Value) -> Result<(), KbError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let next_version = Self::read_row(&conn, key)?.map_or(1, |(_, v)| v + 1);
        let raw = serde_json::to_string(&value)?;
        conn.execute(
            "INSERT INTO kb_entries (key, value, version) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, version = excluded.version",
            params![key.as_str(), raw, next_version as i64],
        )?;
        Ok(())
    }

    fn transaction(
        &self,
        keys: &[KbKey],
        f: &mut dyn FnMut(&mut TransactionView<'_>) -> Result<(), KbError>,
    ) -> Result<(), KbError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());

        let read_state: Vec<(KbKey, Option<Value>, u64)> = keys
            .iter()
            .map(|k| {
                let row = Self::read_row(&conn, k)?;
                Ok::<_, KbError>(match row {
                    Some((value, version)) => (k.clone(), Some(value), version),
                    None => (k.clone(), None, 0),
                })
            })
            .collect::<Result<_, _>>()?;

        let reads: Vec<(&KbKey, Option<Value>)> =
            read_state.iter().map(|(k, v, _)| (k, v.clone())).collect();
        let mut view = TransactionView::new(reads);
        f(&mut view)?;
        let writes = view.into_writes();

        for (key, _, seen_version) in &read_state {
            let current = Self::read_row(&conn, key)?.map_or(0, |(_, v)| v);
            if current != *seen_version {
                return Err(KbError::Conflict(keys.iter().map(|k| k.to_string()).collect()));
            }
        }

        for (key, value) in writes {
            let next_version = Self::read_row(&conn, &key)?.map_or(1, |(_, v)| v + 1);
            let raw = serde_json::to_string(&value)?;
            conn.execute(
                "INSERT INTO kb_entries (key, value, version) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, version = excluded.version",
                params![key.as_str(), raw, next_version as i64],
            )?;
        }
        Ok(())
    }

    fn scan_page(
        &self,
        prefix: &str,
        after: Option<&KbKey>,
        limit: usize,
    ) -> Result<Vec<(KbKey, Value)>, KbError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        let like_pattern = format!("{prefix}%");
        let after_key = after.map(|k| k.as_str().to_string()).unwrap_or_default();
        let mut stmt = conn.prepare_cached(
            "SELECT key, value FROM kb_entries WHERE key LIKE ?1 AND key > ?2
             ORDER BY key ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![like_pattern, after_key, limit as i64], |row| {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            Ok((key, value))
        })?;

        let mut page = Vec::new();
        for row in rows {
            let (key, value) = row?;
            page.push((KbKey::raw(key), serde_json::from_str(&value)?));
        }
        Ok(page)
    }

    fn health(&self) -> Result<(), KbError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        conn.execute_batch("SELECT 1;")?;
        Ok(())
    }

    fn rebuild(&self) -> Result<(), KbError> {
        let conn = self.conn.lock().unwrap_or_else(|p| p.into_inner());
        conn.execute("DELETE FROM kb_entries", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let backend = EmbeddedBackend::open_in_memory().expect("open");
        let key = KbKey::raw("pkg:demo:active");
        backend.set(&key, json!("1.0.0")).expect("set");
        assert_eq!(backend.get(&key).expect("get"), json!("1.0.0"));
    }

    #[test]
    fn transaction_conflict_is_detected() {
        let backend = EmbeddedBackend::open_in_memory().expect("open");
        let key = KbKey::raw("pkg:demo:active");
        backend.set(&key, json!("1.0.0")).expect("seed");

        let keys = vec![key.clone()];
        let result = backend.transaction(&keys, &mut |view| {
            let _ = view.get(&key);
            backend.set(&key, json!("2.0.0")).expect("interleaved write");
            view.set(key.clone(), json!("3.0.0"));
            Ok(())
        });
        assert!(matches!(result, Err(KbError::Conflict(_))));
    }

    #[test]
    fn scan_respects_prefix_and_pagination() {
        let backend = EmbeddedBackend::open_in_memory().expect("open");
        backend.set(&KbKey::raw("pkg:a:active"), json!("1.0.0")).expect("set a");
        backend.set(&KbKey::raw("pkg:b:active"), json!("2.0.0")).expect("set b");
        backend.set(&KbKey::raw("interp:py311"), json!("x")).expect("set c");

        let page1 = backend.scan_page("pkg:", None, 1).expect("page 1");
        assert_eq!(page1.len(), 1);
        let page2 = backend.scan_page("pkg:", Some(&page1[0].0), 1).expect("page 2");
        assert_eq!(page2.len(), 1);
        assert_ne!(page1[0].0, page2[0].0);
    }
}
