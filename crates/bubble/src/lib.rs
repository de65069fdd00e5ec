#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_bubble
//!
//! The Bubble Builder and Health/Reconciliation sweep (spec §4.3, §4.7):
//! materializes per-version isolated package directories and keeps the
//! KB's bubble records honest against what is actually on disk.
//!
//! ## What
//!
//! [`builder::BubbleBuilder`] runs the seven-step build protocol
//! (snapshot, stage, diff, materialize, verify, restore, commit) and
//! enforces the build-lock coalescing rule. [`health`] detects and
//! repairs KB↔filesystem drift (`scan_bubbles`, `verify_bubble`,
//! `rebuild_kb`). [`prune`] removes bubbles nothing depends on anymore.
//! [`lock::InstallRootLock`] is the cross-process advisory lock guarding
//! the filesystem-mutation phase (spec §5). [`interpreter_kb`] persists
//! the Interpreter Registry (spec §4.8) against the KB, since
//! `sheaf_core::registry::InterpreterRegistry` itself cannot depend on
//! `sheaf_kb` without a cycle.
//!
//! ## How
//!
//! Diffing ([`diff`]) and materializing ([`materialize`]) both work off
//! SHA-256 content hashes ([`hash`]) so that identical-byte files across
//! the staged and main roots are dedup-eligible without needing any
//! installer-reported metadata. Import verification ([`verify`]) treats
//! the target interpreter as an opaque oracle reached through the
//! [`verify::ImportVerifier`] seam — [`process_verify::ProcessImportVerifier`]
//! in production, a scripted double in tests — so the repair loop and
//! its tests never depend on a real interpreter being present.
//!
//! ## Why
//!
//! Splitting build into small, independently-testable steps (diff,
//! materialize, verify, lock, builder) mirrors how the teacher's own
//! `cli` crate decomposes its multi-phase commands into one module per
//! phase rather than one large function — it is what keeps the repair
//! loop and the coalescing rule each testable without the rest of the
//! protocol running for real.

pub mod builder;
pub mod diff;
pub mod error;
pub mod hash;
pub mod health;
pub mod interpreter_kb;
pub mod lock;
pub mod materialize;
pub mod process_verify;
pub mod prune;
pub mod verify;

pub use builder::{BubbleBuildPolicy, BubbleBuilder, BubbleHandle};
pub use error::BubbleError;
pub use health::{rebuild_kb, scan_bubbles, verify_bubble, Drift, GhostBubble, OrphanBubble, ScanReport};
pub use interpreter_kb::{load_registry, remove_interpreter, save_interpreter};
pub use lock::InstallRootLock;
pub use process_verify::ProcessImportVerifier;
pub use prune::{prune, PrunedBubble};
pub use verify::{plan_repairs, verify_with_repair, ImportVerifier, Repair, VerifyFailure, VerifyOutcome};
