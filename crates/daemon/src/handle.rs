//! `ExecutionHandle`: the non-blocking counterpart to
//! [`crate::daemon::WorkerDaemon::execute`] (spec §4.6's `execute_async`
//! / `await` / `cancel` trio).
//!
//! Modeled as a task-channel rather than a coroutine (spec §9: "model as
//! a task-channel system with explicit cancellation tokens"): the
//! request runs on a dedicated thread, `cancel` flips a cooperative
//! [`CancellationToken`] the worker backend checks between its smallest
//! interruptible units, and `await_result` blocks on the thread's join.

use crate::error::DaemonError;
use crate::protocol::ExecutionResult;
use sheaf_core::CancellationToken;
use std::thread::JoinHandle;

/// A handle to an in-flight or completed `execute_async` request.
pub struct ExecutionHandle {
    join: Option<JoinHandle<Result<ExecutionResult, DaemonError>>>,
    cancel: CancellationToken,
}

impl ExecutionHandle {
    pub(crate) fn new(
        join: JoinHandle<Result<ExecutionResult, DaemonError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { join: Some(join), cancel }
    }

    /// Request cooperative cancellation of this request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the request has finished (successfully, with an error,
    /// or via cancellation).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the request completes and return its result.
    ///
    /// Returns [`DaemonError::UnknownHandle`] if called twice on the
    /// same handle.
    pub fn await_result(mut self) -> Result<ExecutionResult, DaemonError> {
        match self.join.take() {
            Some(join) => join
                .join()
                .unwrap_or_else(|_| Err(DaemonError::WorkerCrashed("worker thread panicked".to_string()))),
            None => Err(DaemonError::UnknownHandle),
        }
    }
}
