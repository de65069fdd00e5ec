//! Persists the Interpreter Registry (`sheaf_core::registry`) against
//! the KB under the `interp:<registry_id>` key prefix (spec §4.8).
//!
//! `InterpreterRegistry` itself stays a plain, KB-agnostic in-memory
//! type in `sheaf_core` — it cannot depend on `sheaf_kb` without a
//! dependency cycle, since `sheaf_kb` already depends on `sheaf_core`.
//! This module is the thin façade that bridges the two, the same way
//! `health.rs` bridges `sheaf_core::types::Bubble` and the KB rather
//! than teaching either crate about the other.

use crate::error::BubbleError;
use sheaf_core::registry::InterpreterRegistry;
use sheaf_core::types::{Interpreter, InterpreterId};
use sheaf_kb::{KbBackend, KbKey};

/// Record `interpreter` under its own `interp:<registry_id>` key.
///
/// Called after `InterpreterRegistry::adopt` succeeds in memory, so a
/// failed write here can be surfaced without having already mutated the
/// registry the caller holds.
pub fn save_interpreter(kb: &dyn KbBackend, interpreter: &Interpreter) -> Result<(), BubbleError> {
    let key = KbKey::interpreter(&interpreter.registry_id.0);
    kb.set(&key, serde_json::to_value(interpreter)?)?;
    Ok(())
}

/// Remove `id`'s KB record, mirroring `InterpreterRegistry::remove`.
///
/// The KB has no dedicated "delete key" primitive (spec §4.1's contract
/// is `get`/`set`/`transaction`/`scan`), so removal is recorded as an
/// explicit tombstone rather than leaving the previous value in place.
pub fn remove_interpreter(kb: &dyn KbBackend, id: &InterpreterId) -> Result<(), BubbleError> {
    let key = KbKey::interpreter(&id.0);
    kb.set(&key, serde_json::Value::Null)?;
    Ok(())
}

/// Rebuild an in-memory [`InterpreterRegistry`] from every non-tombstone
/// `interp:` record in the KB, for startup and for `rebuild_kb` (spec
/// §4.7) to repopulate the registry alongside bubble records.
pub fn load_registry(kb: &dyn KbBackend) -> Result<InterpreterRegistry, BubbleError> {
    let mut registry = InterpreterRegistry::new();
    let mut cursor: Option<KbKey> = None;
    loop {
        let page = kb.scan_page("interp:", cursor.as_ref(), 128)?;
        let exhausted = page.len() < 128;
        cursor = page.last().map(|(k, _)| k.clone());

        for (_, value) in page {
            if value.is_null() {
                continue;
            }
            let interpreter: Interpreter = serde_json::from_value(value)?;
            // `adopt` is infallible here: a rebuilt registry starts
            // empty and each key is scanned at most once, so no id can
            // collide.
            registry.adopt(interpreter).map_err(|e| BubbleError::Corrupted {
                name: "interpreter-registry".to_string(),
                version: semver::Version::new(0, 0, 0),
                detail: e.to_string(),
            })?;
        }

        if exhausted {
            break;
        }
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_kb::FastBackend;
    use std::path::PathBuf;

    fn sample(id: &str) -> Interpreter {
        Interpreter {
            registry_id: InterpreterId(id.to_string()),
            version: semver::Version::new(3, 11, 0),
            executable_path: PathBuf::from(format!("/usr/bin/{id}")),
            managed: true,
        }
    }

    #[test]
    fn saved_interpreters_round_trip_through_load_registry() {
        let kb = FastBackend::in_memory();
        save_interpreter(&kb, &sample("py311")).expect("save");
        save_interpreter(&kb, &sample("py312")).expect("save");

        let registry = load_registry(&kb).expect("load");
        assert!(registry.get(&InterpreterId("py311".to_string())).is_some());
        assert!(registry.get(&InterpreterId("py312".to_string())).is_some());
    }

    #[test]
    fn removed_interpreters_do_not_reappear_on_load() {
        let kb = FastBackend::in_memory();
        save_interpreter(&kb, &sample("py311")).expect("save");
        remove_interpreter(&kb, &InterpreterId("py311".to_string())).expect("remove");

        let registry = load_registry(&kb).expect("load");
        assert!(registry.get(&InterpreterId("py311".to_string())).is_none());
    }
}
