//! Request/response types exchanged with a resident worker (spec §4.6).
//!
//! These are deliberately opaque to *how* a worker executes `code`: the
//! daemon only needs to know which interpreter and which bubble to
//! target, and what came back. A real embedding's [`crate::worker::WorkerBackend`]
//! turns a [`BubbleSpec`] into an actual Runtime Loader Protocol
//! activation inside the worker process; that activation is specified
//! by `sheaf_loader`, not repeated here.

use serde::{Deserialize, Serialize};
use sheaf_core::types::PackageName;
use sheaf_core::InterpreterId;

/// One `(name, version)` pin a worker should have active for a request,
/// mirroring a bubble's identity without requiring the daemon crate to
/// depend on `sheaf_bubble`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleSpec {
    /// Package this activation targets.
    pub name: PackageName,
    /// Version to activate.
    pub version: semver::Version,
}

impl BubbleSpec {
    /// Construct a spec.
    pub fn new(name: impl Into<PackageName>, version: semver::Version) -> Self {
        Self { name: name.into(), version }
    }
}

/// One unit of work dispatched to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Which resident worker (identified by its interpreter) should run
    /// this request.
    pub target_interpreter: InterpreterId,
    /// Bubbles the worker must have active before running `code`, outer
    /// activation first.
    pub bubble_spec: Vec<BubbleSpec>,
    /// The code or command to run inside the worker, opaque to the
    /// daemon (spec §6's `run-script` operation is the primary
    /// producer of this field).
    pub code_or_command: String,
}

/// The outcome of one [`ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Process/worker exit code, if the request ran to completion.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecutionResult {
    /// Whether the request completed successfully.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}
