//! `LoaderState`: the activation stack and the process-wide
//! serialization mutex (spec §4.5, §5).

use crate::host::HostEnvironment;
use sheaf_core::types::{Bubble, PackageName};
use std::path::PathBuf;
use std::sync::Mutex;

/// Captured pre-activation state, restored by an [`crate::scope::ActivationScope`]'s
/// `Drop`.
pub(crate) struct Frame {
    pub(crate) bubble_name: PackageName,
    pub(crate) bubble_version: semver::Version,
    pub(crate) restored_search_path: Vec<PathBuf>,
    /// Environment variable overrides to restore: `None` means the key
    /// was absent before activation and should be removed again.
    pub(crate) restored_env: Vec<(String, Option<String>)>,
    pub(crate) provided_modules: Vec<String>,
}

/// Owns the in-process activation stack plus the mutex that serializes
/// concurrent activations (spec §4.5's nesting rule and spec §5's
/// cross-thread visibility requirement: "state accessible to other
/// threads must not see a half-restored view").
pub struct LoaderState {
    pub(crate) activation_mutex: Mutex<()>,
    pub(crate) stack: Mutex<Vec<Frame>>,
    pub(crate) host: Box<dyn HostEnvironment>,
}

impl LoaderState {
    /// Construct loader state over a given host environment binding.
    pub fn new(host: Box<dyn HostEnvironment>) -> Self {
        Self { activation_mutex: Mutex::new(()), stack: Mutex::new(Vec::new()), host }
    }

    /// Current activation nesting depth (0 means the main environment is
    /// active).
    pub fn depth(&self) -> usize {
        self.stack.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// `(name, version)` of every bubble currently active, outermost
    /// first.
    pub fn active_stack(&self) -> Vec<(PackageName, semver::Version)> {
        self.stack
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|f| (f.bubble_name.clone(), f.bubble_version.clone()))
            .collect()
    }
}

/// The top-level module names a bubble provides, derived from its
/// manifest's relative paths (the first path component, minus a
/// source-file extension) — the in-process analogue of the manifest's
/// declared provided-modules set used to decide what to purge on
/// activation and deactivation (spec §4.5 steps 2-3).
pub(crate) fn provided_modules(bubble: &Bubble) -> Vec<String> {
    let mut modules: Vec<String> = bubble
        .manifest
        .entries
        .iter()
        .filter_map(|entry| entry.relative_path.components().next())
        .map(|component| {
            let raw = component.as_os_str().to_string_lossy();
            raw.strip_suffix(".py").map(str::to_string).unwrap_or_else(|| raw.into_owned())
        })
        .collect();
    modules.sort();
    modules.dedup();
    modules
}
