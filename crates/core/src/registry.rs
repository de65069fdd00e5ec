//! Interpreter registry: the mapping from interpreter identity to
//! executable path, with adopt/remove/rescan operations (spec §4.8).

use crate::error::CoreError;
use crate::types::{Interpreter, InterpreterId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// In-memory view of the interpreter registry.
///
/// This type holds no KB connection and does no I/O of its own —
/// `sheaf_core` cannot depend on `sheaf_kb` (which already depends on
/// `sheaf_core`) without a cycle. The authoritative, persisted copy
/// lives in the KB under the `interp:<registry_id>` key prefix, written
/// and read by `sheaf_bubble::interpreter_kb`'s `save_interpreter`/
/// `remove_interpreter`/`load_registry`, which is the crate that can
/// depend on both and is where callers should persist `adopt`/`remove`.
/// Used standalone (no KB backing) in tests and by callers that only
/// need the in-memory bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct InterpreterRegistry {
    interpreters: BTreeMap<InterpreterId, Interpreter>,
    /// How many bubbles currently reference each interpreter, used to
    /// refuse `remove` while bubbles remain (spec §4.8).
    bubble_counts: BTreeMap<InterpreterId, usize>,
}

impl InterpreterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt an interpreter discovered at `executable_path`, reporting
    /// `version`. Fails if `registry_id` is already adopted.
    pub fn adopt(&mut self, interpreter: Interpreter) -> Result<(), CoreError> {
        if self.interpreters.contains_key(&interpreter.registry_id) {
            return Err(CoreError::InterpreterAlreadyRegistered(
                interpreter.registry_id.0.clone(),
            ));
        }
        self.interpreters.insert(interpreter.registry_id.clone(), interpreter);
        Ok(())
    }

    /// Remove a previously-adopted interpreter. Refused if it still has
    /// bubbles recorded against it.
    pub fn remove(&mut self, id: &InterpreterId) -> Result<(), CoreError> {
        let count = self.bubble_counts.get(id).copied().unwrap_or(0);
        if count > 0 {
            return Err(CoreError::InterpreterInUse(id.0.clone(), count));
        }
        self.interpreters
            .remove(id)
            .ok_or_else(|| CoreError::InterpreterNotFound(id.0.clone()))?;
        Ok(())
    }

    /// Look an interpreter up by registry id.
    pub fn get(&self, id: &InterpreterId) -> Option<&Interpreter> {
        self.interpreters.get(id)
    }

    /// All adopted interpreters, in registry-id order.
    pub fn all(&self) -> impl Iterator<Item = &Interpreter> {
        self.interpreters.values()
    }

    /// Record that a bubble now exists for `id` (called by the Bubble
    /// Builder on commit); used only to gate `remove`.
    pub fn note_bubble_created(&mut self, id: &InterpreterId) {
        *self.bubble_counts.entry(id.clone()).or_insert(0) += 1;
    }

    /// Record that a bubble for `id` was pruned or uninstalled.
    pub fn note_bubble_removed(&mut self, id: &InterpreterId) {
        if let Some(count) = self.bubble_counts.get_mut(id) {
            *count = count.saturating_sub(1);
        }
    }

    /// `rescan_interpreters` (spec §4.7): find interpreter executables
    /// under `roots` matching `is_interpreter_executable`, and report
    /// which are new (not yet adopted) versus already known.
    pub fn rescan(
        &self,
        roots: &[PathBuf],
        is_interpreter_executable: impl Fn(&Path) -> bool,
    ) -> RescanReport {
        let mut discovered = Vec::new();
        for root in roots {
            let Ok(read_dir) = std::fs::read_dir(root) else { continue };
            for entry in read_dir.flatten() {
                let path = entry.path();
                if is_interpreter_executable(&path) {
                    discovered.push(path);
                }
            }
        }

        let known_paths: Vec<&PathBuf> =
            self.interpreters.values().map(|i| &i.executable_path).collect();
        let new_paths =
            discovered.iter().filter(|p| !known_paths.contains(p)).cloned().collect();

        RescanReport { discovered_new: new_paths, already_known: known_paths.len() }
    }
}

/// Result of a `rescan_interpreters` sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescanReport {
    /// Executables found that are not yet in the registry.
    pub discovered_new: Vec<PathBuf>,
    /// How many already-registered interpreters were re-confirmed.
    pub already_known: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> Interpreter {
        Interpreter {
            registry_id: InterpreterId(id.to_string()),
            version: semver::Version::new(3, 11, 0),
            executable_path: PathBuf::from(format!("/usr/bin/{id}")),
            managed: true,
        }
    }

    #[test]
    fn adopt_then_remove_round_trips() {
        let mut registry = InterpreterRegistry::new();
        let id = InterpreterId("py311".to_string());
        registry.adopt(sample("py311")).expect("adopt");
        assert!(registry.get(&id).is_some());
        registry.remove(&id).expect("remove");
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn adopting_twice_is_rejected() {
        let mut registry = InterpreterRegistry::new();
        registry.adopt(sample("py311")).expect("first adopt");
        let err = registry.adopt(sample("py311")).unwrap_err();
        assert!(matches!(err, CoreError::InterpreterAlreadyRegistered(_)));
    }

    #[test]
    fn removal_is_refused_while_bubbles_remain() {
        let mut registry = InterpreterRegistry::new();
        let id = InterpreterId("py311".to_string());
        registry.adopt(sample("py311")).expect("adopt");
        registry.note_bubble_created(&id);

        let err = registry.remove(&id).unwrap_err();
        assert!(matches!(err, CoreError::InterpreterInUse(_, 1)));

        registry.note_bubble_removed(&id);
        registry.remove(&id).expect("now removable");
    }
}
