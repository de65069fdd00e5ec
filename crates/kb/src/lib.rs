#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_kb
//!
//! The indexed, transactional metadata store backing every other
//! subsystem: package/version records, bubble manifests, and snapshots
//! (spec §4.1).
//!
//! ## What
//!
//! `KbBackend` is the single contract (`get`/`set`/`transaction`/`scan`)
//! implemented identically by [`FastBackend`] (in-memory, write-ahead
//! logged) and [`EmbeddedBackend`] (`rusqlite`-backed). [`select`]
//! resolves the configured backend at startup.
//!
//! ## How
//!
//! Keys are built through [`key::KbKey`]'s named constructors so every
//! caller agrees on the hierarchy from spec §3 (`pkg:<name>:versions`,
//! `bubble:<name>:<version>`, `snapshot:<id>`, ...). Multi-key writes go
//! through `transaction`, which detects a conflicting concurrent commit
//! by comparing per-key version counters read at the transaction's
//! start against their value at commit time.
//!
//! ## Why
//!
//! Every other crate needs the same at-most-one-writer-per-key-group
//! guarantee (the bubble build lock, the KB commit step, snapshot
//! writes); putting it here once means `sheaf_bubble` and
//! `sheaf_snapshot` only need to pick the right key group, not
//! reimplement conflict detection.

pub mod backend;
pub mod embedded;
pub mod error;
pub mod fast;
pub mod key;
pub mod select;

pub use backend::{KbBackend, KbScanIter, TransactionView};
pub use embedded::EmbeddedBackend;
pub use error::KbError;
pub use fast::FastBackend;
pub use key::KbKey;
pub use select::{select, SelectedBackend};
