//! `WorkerDaemon`: the Worker Daemon's public contract (spec §4.6) —
//! `execute`, `execute_async`, `await`, `cancel` — over a bounded
//! [`WorkerPool`] of resident, per-interpreter workers.

use crate::error::DaemonError;
use crate::handle::ExecutionHandle;
use crate::pool::WorkerPool;
use crate::protocol::{BubbleSpec, ExecutionRequest, ExecutionResult};
use crate::worker::WorkerSpawner;
use sheaf_core::types::Interpreter;
use sheaf_core::CancellationToken;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Owns the resident worker pool and dispatches requests against it.
///
/// `execute_async` requires `self` behind an [`Arc`] since the request
/// runs on a detached thread outliving the call that spawned it.
pub struct WorkerDaemon {
    pool: Mutex<WorkerPool>,
    default_timeout: Duration,
}

impl WorkerDaemon {
    /// Construct a daemon over a fresh, empty pool.
    pub fn new(
        spawner: Box<dyn WorkerSpawner>,
        max_workers: usize,
        idle_timeout: Duration,
        default_timeout: Duration,
    ) -> Self {
        Self { pool: Mutex::new(WorkerPool::new(spawner, max_workers, idle_timeout)), default_timeout }
    }

    /// Run one request against `interpreter`'s resident worker,
    /// blocking from the caller's perspective (spec §4.6).
    ///
    /// Spawns the worker on demand if none is resident. A crashed
    /// resident is respawned transparently before the request is
    /// retried once against the fresh worker.
    pub fn execute(
        &self,
        interpreter: &Interpreter,
        bubble_spec: Vec<BubbleSpec>,
        code_or_command: String,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, DaemonError> {
        let request = ExecutionRequest {
            target_interpreter: interpreter.registry_id.clone(),
            bubble_spec,
            code_or_command,
        };
        let timeout = timeout.unwrap_or(self.default_timeout);

        let mut pool = self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let worker = pool.acquire(&interpreter.registry_id, &interpreter.executable_path)?;
        worker.execute(&request, timeout, cancel)
    }

    /// Non-blocking counterpart to [`Self::execute`]: runs the request
    /// on a dedicated thread and returns immediately with a handle.
    ///
    /// Takes `self` by `Arc` so the request can outlive the calling
    /// stack frame; callers keep dispatching further requests via
    /// `Arc::clone(&daemon).execute_async(...)`.
    pub fn execute_async(
        self: Arc<Self>,
        interpreter: Interpreter,
        bubble_spec: Vec<BubbleSpec>,
        code_or_command: String,
        timeout: Option<Duration>,
    ) -> ExecutionHandle {
        let daemon = self;
        let cancel = CancellationToken::new();
        let cancel_for_thread = cancel.clone();
        let join = std::thread::spawn(move || {
            daemon.execute(&interpreter, bubble_spec, code_or_command, timeout, &cancel_for_thread)
        });
        ExecutionHandle::new(join, cancel)
    }

    /// Shut every resident worker down (spec §6's `daemon-stop`).
    pub fn shutdown(&self) {
        self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner).shutdown_all();
    }

    /// How many workers are currently resident (spec §6's
    /// `daemon-status`).
    pub fn resident_count(&self) -> usize {
        self.pool.lock().unwrap_or_else(std::sync::PoisonError::into_inner).resident_count()
    }
}
