//! Worker Daemon error taxonomy (spec §4.6, §7).

use std::time::Duration;

/// Errors raised while dispatching work through the Worker Daemon.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// No worker could be spawned for the requested interpreter within
    /// the pool's bound, and eviction of a less-recently-used worker
    /// still left no room (e.g. every resident worker is mid-request).
    #[error("no worker available for interpreter '{0}'")]
    PoolExhausted(String),

    /// Spawning or re-spawning a worker process failed.
    #[error("failed to spawn worker for interpreter '{interpreter}': {detail}")]
    SpawnFailed {
        /// Target interpreter's registry id.
        interpreter: String,
        /// Underlying failure detail.
        detail: String,
    },

    /// A worker exited or became unresponsive mid-request; the caller's
    /// request failed, but the pool transparently respawns the worker
    /// for the next call (spec §4.6: "a worker restart is transparent
    /// to callers except via a latency spike").
    #[error("worker for interpreter '{0}' crashed mid-request")]
    WorkerCrashed(String),

    /// The request did not complete within its configured timeout.
    #[error("request to interpreter '{interpreter}' timed out after {timeout:?}")]
    Timeout {
        /// Target interpreter's registry id.
        interpreter: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The request's cancellation token was triggered before a result
    /// was produced.
    #[error("request cancelled")]
    Cancelled,

    /// `await` was called with a handle that does not correspond to any
    /// outstanding `execute_async` call (already awaited, or foreign).
    #[error("unknown or already-consumed execution handle")]
    UnknownHandle,

    /// An underlying filesystem or process I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
