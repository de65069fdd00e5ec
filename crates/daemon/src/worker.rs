//! `WorkerBackend`: the seam between the Worker Daemon and an actual
//! persistent child process (spec §4.6).
//!
//! A real embedding spawns the target interpreter in "subprocess mode"
//! (suppressing interactive prompts) and drives it over a line-delimited
//! request/response protocol on stdin/stdout; tests substitute
//! [`FakeWorkerBackend`] so pool lifecycle, eviction, and cancellation
//! are exercised without a real interpreter.

use crate::error::DaemonError;
use crate::protocol::{ExecutionRequest, ExecutionResult};
use sheaf_core::CancellationToken;
use std::time::Duration;

/// Environment variable naming the interpreter a spawned subprocess
/// should dispatch to (spec §6).
pub const ENV_TARGET_INTERPRETER: &str = "SHEAF_TARGET_INTERPRETER";
/// Environment variable that, when set, tells a subprocess to suppress
/// interactive prompts (spec §6).
pub const ENV_SUBPROCESS_MODE: &str = "SHEAF_SUBPROCESS_MODE";
/// Environment variable carrying the active bubble spec a spawned
/// subprocess should activate on startup (spec §6).
pub const ENV_ACTIVE_BUBBLE: &str = "SHEAF_ACTIVE_BUBBLE";

/// Environment variables scrubbed from a worker's inherited environment
/// before it activates its configured bubble (spec §4.6's isolation
/// rule): a dynamic-library search path variable and a language-level
/// module path variable, whose presence would otherwise leak whatever
/// bubble the *parent* process happened to have active.
pub const DEFAULT_SCRUBBED_ENV_VARS: &[&str] =
    &["LD_LIBRARY_PATH", "DYLD_LIBRARY_PATH", "PYTHONPATH", "SHEAF_DYLIB_PATH"];

/// A live or spawnable worker process for one interpreter.
pub trait WorkerBackend: Send {
    /// Run one request against this worker, blocking until it completes,
    /// the timeout elapses, or `cancel` is triggered between the
    /// smallest units the backend can interrupt at.
    fn execute(
        &mut self,
        request: &ExecutionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, DaemonError>;

    /// Whether this worker is still responsive (used by the pool to
    /// decide whether a resident worker can be reused or must be
    /// respawned).
    fn is_alive(&self) -> bool;

    /// Tear the worker process down. Called on idle-timeout eviction
    /// and on pool shutdown.
    fn shutdown(&mut self);
}

/// Constructs a fresh [`WorkerBackend`] for a given interpreter, scrubbed
/// of the environment variables in `scrubbed_env_vars` before the
/// process is spawned (spec §4.6).
pub trait WorkerSpawner: Send + Sync {
    /// Spawn a new worker for `interpreter_executable`, with
    /// `scrubbed_env_vars` removed from its inherited environment.
    fn spawn(
        &self,
        interpreter_executable: &std::path::Path,
        scrubbed_env_vars: &[&str],
    ) -> Result<Box<dyn WorkerBackend>, DaemonError>;
}

/// An in-memory worker double: records every request it receives and
/// returns scripted results, so pool tests never spawn a real process.
pub struct FakeWorkerBackend {
    alive: bool,
    responses: std::collections::VecDeque<FakeResponse>,
    /// Requests received, in order, for test assertions.
    pub received: Vec<ExecutionRequest>,
}

enum FakeResponse {
    Result(ExecutionResult),
    Crash,
    Hang,
}

impl FakeWorkerBackend {
    /// A worker that will hand back `result` to its next `execute` call.
    pub fn with_result(result: ExecutionResult) -> Self {
        Self {
            alive: true,
            responses: std::collections::VecDeque::from([FakeResponse::Result(result)]),
            received: Vec::new(),
        }
    }

    /// A worker whose next `execute` call reports a crash.
    pub fn crashing() -> Self {
        Self { alive: true, responses: std::collections::VecDeque::from([FakeResponse::Crash]), received: Vec::new() }
    }

    /// A worker whose next `execute` call never returns within the
    /// caller's timeout, to exercise the timeout path.
    pub fn hanging() -> Self {
        Self { alive: true, responses: std::collections::VecDeque::from([FakeResponse::Hang]), received: Vec::new() }
    }
}

impl WorkerBackend for FakeWorkerBackend {
    fn execute(
        &mut self,
        request: &ExecutionRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, DaemonError> {
        self.received.push(request.clone());
        match self.responses.pop_front() {
            Some(FakeResponse::Result(result)) => Ok(result),
            Some(FakeResponse::Crash) => {
                self.alive = false;
                Err(DaemonError::WorkerCrashed(request.target_interpreter.to_string()))
            }
            Some(FakeResponse::Hang) => {
                if cancel.is_cancelled() {
                    return Err(DaemonError::Cancelled);
                }
                Err(DaemonError::Timeout {
                    interpreter: request.target_interpreter.to_string(),
                    timeout,
                })
            }
            None => Ok(ExecutionResult { exit_code: Some(0), stdout: String::new(), stderr: String::new() }),
        }
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn shutdown(&mut self) {
        self.alive = false;
    }
}
