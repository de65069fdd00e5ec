#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_installer
//!
//! Owns the subprocess relationship with the ecosystem's native
//! installer (spec §4.2): `preflight`, `stage`, and `version_reorder`.
//!
//! ## What
//!
//! [`InstallerDriver`] drives whichever tool in `installer_priority`
//! responds first, via the swappable [`InstallerBackend`] seam — a real
//! [`ProcessInstallerBackend`] in production, a scripted
//! [`fake::FakeInstallerBackend`] in tests. [`reorder::version_reorder`]
//! is the pure Reorder-and-Diff algorithm, exercised directly by the
//! property-test suite.
//!
//! ## How
//!
//! `stage` always reorders its requirements first, so every subsequent
//! install of an already-newer-seen package name is unambiguously a
//! downgrade for the Bubble Builder to act on (spec §4.3).
//!
//! ## Why
//!
//! None of this crate's retry or timeout logic belongs in
//! `sheaf_bubble`: the Bubble Builder should only ever see a classified
//! [`types::StagedResult`], never a raw subprocess exit code.

pub mod backend;
pub mod driver;
pub mod error;
pub mod fake;
pub mod process;
pub mod reorder;
pub mod types;

pub use backend::InstallerBackend;
pub use driver::InstallerDriver;
pub use error::InstallerError;
pub use process::ProcessInstallerBackend;
pub use reorder::version_reorder;
pub use types::{
    ChangeKind, EnvironmentView, PackageChange, PreflightOutcome, Requirement, StagedResult,
};
