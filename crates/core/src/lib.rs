#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_core
//!
//! Shared data model, configuration layering and interpreter registry used
//! by every other `sheaf_*` crate.
//!
//! ## What
//!
//! This crate has no orchestration logic of its own. It defines:
//!
//! - The entity types shared across subsystems (`Interpreter`, `Package`,
//!   `Bubble`, `Manifest`, `Snapshot` id/key helpers).
//! - `Config`, the layered per-interpreter configuration document.
//! - `InterpreterRegistry`, the adopt/remove/rescan mapping from interpreter
//!   identity to executable path.
//! - `CancellationToken`, the cooperative-cancellation primitive shared by
//!   every long-running operation (installer subprocesses, KB I/O, worker
//!   daemon round-trips, bubble materialization copies).
//!
//! ## How
//!
//! Every other crate in the workspace depends on `sheaf_core` and never
//! redefines these types; this keeps the Knowledge Base, Installer Driver,
//! Bubble Builder, Snapshot Engine and Runtime Loader speaking the same
//! vocabulary without a cyclic dependency between them.
//!
//! ## Why
//!
//! Centralizing the data model is what lets the KB↔filesystem invariant
//! (every bubble manifest entry resolves to bytes that exist) be checked
//! the same way from the Bubble Builder, the Health/Reconciliation sweep
//! and the CLI's `doctor` command, instead of three divergent definitions
//! of a "manifest entry" drifting apart over time.

mod cancel;
pub mod config;
mod error;
pub mod registry;
pub mod types;

pub use cancel::CancellationToken;
pub use error::CoreError;
pub use types::{
    Bubble, DedupMode, DependencySnapshot, Interpreter, InterpreterId, Manifest, ManifestEntry,
    ManifestEntryKind, Package, PackageName, SchemaVersion, Snapshot, SnapshotId,
};
