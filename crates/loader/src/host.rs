//! The seam between the Loader Protocol and whatever a real running
//! process exposes for its module search path, loaded-module cache, and
//! environment variables.
//!
//! A real embedding wires this to the host interpreter's actual `sys.path`
//! (or equivalent) and module registry; tests substitute
//! [`FakeHostEnvironment`] so activation/deactivation is fully exercised
//! without an embedded interpreter.

use std::path::PathBuf;
use std::sync::Mutex;

/// Abstracts the mutable process-wide state the Loader Protocol reads
/// and rewrites (spec §4.5).
pub trait HostEnvironment: Send + Sync {
    /// Current module search path, in resolution order.
    fn search_path(&self) -> Vec<PathBuf>;
    /// Replace the module search path wholesale.
    fn set_search_path(&self, path: &[PathBuf]);
    /// Read one environment variable's current value.
    fn env_var(&self, key: &str) -> Option<String>;
    /// Set an environment variable.
    fn set_env_var(&self, key: &str, value: &str);
    /// Remove an environment variable entirely.
    fn remove_env_var(&self, key: &str);
    /// Evict every loaded module whose top-level name is in `names`, so
    /// the next import re-resolves against the current search path.
    fn purge_modules(&self, names: &[String]);
}

/// An in-memory double standing in for a real interpreter's state,
/// recording every mutation so tests can assert on activation's effects
/// without a real process to introspect.
#[derive(Default)]
pub struct FakeHostEnvironment {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    search_path: Vec<PathBuf>,
    env: std::collections::BTreeMap<String, String>,
    purge_log: Vec<Vec<String>>,
}

impl FakeHostEnvironment {
    /// Construct a fake host with an initial search path.
    pub fn new(initial_search_path: Vec<PathBuf>) -> Self {
        Self {
            state: Mutex::new(FakeState { search_path: initial_search_path, ..FakeState::default() }),
        }
    }

    /// Every call to `purge_modules`, in order, for test assertions.
    pub fn purge_log(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).purge_log.clone()
    }
}

impl HostEnvironment for FakeHostEnvironment {
    fn search_path(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).search_path.clone()
    }

    fn set_search_path(&self, path: &[PathBuf]) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).search_path = path.to_vec();
    }

    fn env_var(&self, key: &str) -> Option<String> {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).env.get(key).cloned()
    }

    fn set_env_var(&self, key: &str, value: &str) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).env.insert(key.to_string(), value.to_string());
    }

    fn remove_env_var(&self, key: &str) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).env.remove(key);
    }

    fn purge_modules(&self, names: &[String]) {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).purge_log.push(names.to_vec());
    }
}
