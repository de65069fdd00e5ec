#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_daemon
//!
//! The Worker Daemon (spec §4.6): a pool of persistent, per-interpreter
//! worker processes, pre-warmed and holding a specified set of
//! activations, that `run-script` and similar long-lived callers dispatch
//! requests through instead of paying interpreter startup cost per call.
//!
//! ## What
//!
//! [`WorkerDaemon::execute`] is the blocking contract; [`WorkerDaemon::execute_async`]
//! returns an [`ExecutionHandle`] that [`ExecutionHandle::await_result`]
//! resolves and [`ExecutionHandle::cancel`] cooperatively cancels.
//! [`WorkerPool`] enforces `daemon_max_workers` with least-recently-used
//! eviction and reaps workers idle past `daemon_idle_timeout_secs`
//! (`sheaf_core::config::Config`'s fields of the same name). The actual
//! process boundary is the [`WorkerBackend`]/[`WorkerSpawner`] seam —
//! [`ProcessWorkerSpawner`] in production, spawning a real interpreter
//! subprocess per resident worker and exchanging line-delimited JSON
//! requests/responses over its stdin/stdout, and [`FakeWorkerBackend`]
//! in tests, so every lifecycle rule is exercised without spawning a
//! real interpreter.
//!
//! ## How
//!
//! Mirrors `sheaf_installer`'s process-backend seam: a trait the
//! production code implements over `std::process::Command`, and a
//! scripted fake the test suite implements over an in-memory queue.
//! `execute_async` is a thread plus a [`sheaf_core::CancellationToken`]
//! rather than an async runtime (spec §9: "model as a task-channel
//! system with explicit cancellation tokens; no coroutine-style hidden
//! suspension points").
//!
//! ## Why
//!
//! Isolation (spec §4.6) — scrubbing a worker's inherited
//! dynamic-library and language-path environment variables before it
//! activates its configured bubble — only has to be implemented once,
//! at the point workers are actually spawned, rather than by every
//! caller remembering to do it.

mod daemon;
mod error;
mod handle;
mod pool;
mod process;
mod protocol;
mod worker;

pub use daemon::WorkerDaemon;
pub use error::DaemonError;
pub use handle::ExecutionHandle;
pub use pool::WorkerPool;
pub use process::{ProcessWorkerBackend, ProcessWorkerSpawner};
pub use protocol::{BubbleSpec, ExecutionRequest, ExecutionResult};
pub use worker::{
    FakeWorkerBackend, WorkerBackend, WorkerSpawner, DEFAULT_SCRUBBED_ENV_VARS,
    ENV_ACTIVE_BUBBLE, ENV_SUBPROCESS_MODE, ENV_TARGET_INTERPRETER,
};
