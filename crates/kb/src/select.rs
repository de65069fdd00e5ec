//! Backend selection: prefer `FastBackend` if reachable at startup,
//! otherwise fall back to `EmbeddedBackend` (spec §4.1, config
//! `kb_backend: auto | fast | embedded`).

use crate::backend::KbBackend;
use crate::embedded::EmbeddedBackend;
use crate::error::KbError;
use crate::fast::FastBackend;
use crate::key::KbKey;
use sheaf_core::types::{SchemaVersion, CURRENT_SCHEMA_VERSION};

/// Which concrete backend `select` resolved to, surfaced for logging and
/// `sheaf doctor` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedBackend {
    /// `FastBackend` (in-memory, write-ahead logged).
    Fast,
    /// `EmbeddedBackend` (SQLite-backed).
    Embedded,
}

/// Resolve a concrete [`KbBackend`] per the `kb_backend` config key.
///
/// `auto` probes `FastBackend::health()`; `fast`/`embedded` force a
/// specific backend and surface `BackendUnavailable` if that backend
/// can't be reached, rather than silently falling back (a forced choice
/// is a user decision, not a hint).
pub fn select(
    kind: sheaf_core::config::KbBackendKind,
    wal_path: &std::path::Path,
    sqlite_path: &std::path::Path,
) -> Result<(Box<dyn KbBackend>, SelectedBackend), KbError> {
    use sheaf_core::config::KbBackendKind as Kind;

    let fast = FastBackend::with_wal(wal_path)?;

    let backend: (Box<dyn KbBackend>, SelectedBackend) = match kind {
        Kind::Fast => (Box::new(fast), SelectedBackend::Fast),
        Kind::Embedded => (Box::new(EmbeddedBackend::open(sqlite_path)?), SelectedBackend::Embedded),
        Kind::Auto => {
            if fast.health().is_ok() {
                log::debug!("kb_backend=auto selected FastBackend");
                (Box::new(fast), SelectedBackend::Fast)
            } else {
                log::warn!("FastBackend unreachable, falling back to EmbeddedBackend");
                (Box::new(EmbeddedBackend::open(sqlite_path)?), SelectedBackend::Embedded)
            }
        }
    };

    check_schema(backend.0.as_ref())?;
    Ok(backend)
}

/// Check the `schema:version` key against this build's expectation,
/// writing it if absent (first run), erroring with `SchemaMismatch`
/// otherwise (spec §4.1, §7).
fn check_schema(backend: &dyn KbBackend) -> Result<(), KbError> {
    let key = KbKey::schema_version();
    match backend.get(&key) {
        Ok(value) => {
            let found_raw: u32 = serde_json::from_value(value).unwrap_or(0);
            let found = SchemaVersion(found_raw);
            if found != CURRENT_SCHEMA_VERSION {
                return Err(KbError::SchemaMismatch {
                    found: found.0,
                    expected: CURRENT_SCHEMA_VERSION.0,
                });
            }
            Ok(())
        }
        Err(KbError::NotFound(_)) => {
            backend.set(&key, serde_json::json!(CURRENT_SCHEMA_VERSION.0))?;
            Ok(())
        }
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_core::config::KbBackendKind;

    #[test]
    fn auto_selects_fast_backend_when_reachable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (backend, kind) =
            select(KbBackendKind::Auto, &dir.path().join("kb.wal"), &dir.path().join("kb.sqlite"))
                .expect("select");
        assert_eq!(kind, SelectedBackend::Fast);
        assert!(backend.health().is_ok());
    }

    #[test]
    fn forced_embedded_backend_is_honored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_backend, kind) = select(
            KbBackendKind::Embedded,
            &dir.path().join("kb.wal"),
            &dir.path().join("kb.sqlite"),
        )
        .expect("select");
        assert_eq!(kind, SelectedBackend::Embedded);
    }

    #[test]
    fn schema_is_stamped_on_first_run_and_checked_thereafter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let wal = dir.path().join("kb.wal");
        let sqlite = dir.path().join("kb.sqlite");
        select(KbBackendKind::Fast, &wal, &sqlite).expect("first select stamps schema");
        select(KbBackendKind::Fast, &wal, &sqlite).expect("second select matches schema");
    }
}
