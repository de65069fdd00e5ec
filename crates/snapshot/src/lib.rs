#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_snapshot
//!
//! Captures atomic environment state and computes/executes the
//! minimal reverse plan back to an earlier snapshot (spec §4.4).
//!
//! ## What
//!
//! [`capture::capture`] records `(package -> version)` for every
//! package visible in the main environment, plus a dependency-lock
//! content hash if present. [`store::SnapshotStore`] persists these as
//! one JSON file per snapshot, append-only (spec §6). [`revert::diff_against`]
//! computes a [`revert::RevertPlan`] by symmetric difference;
//! [`revert::execute`] runs it sequentially through the Installer
//! Driver.
//!
//! ## How
//!
//! Snapshots are immutable once written: `SnapshotStore::save` never
//! overwrites an existing file. A revert always produces a *new*
//! snapshot recording the post-revert state, rather than mutating the
//! target snapshot — this is what spec §3 means by "revert creates
//! forward operations that reach an older state, it never rewrites
//! history".
//!
//! ## Why
//!
//! Keeping revert as pure diff-then-execute (rather than, say,
//! replaying the original install log) is what lets a mid-plan failure
//! leave a well-defined intermediate snapshot: every step already knows
//! how to re-diff from wherever it actually ended up.

pub mod capture;
pub mod error;
pub mod revert;
pub mod store;

pub use capture::capture;
pub use error::SnapshotError;
pub use revert::{diff_against, execute, RevertPlan};
pub use store::SnapshotStore;
