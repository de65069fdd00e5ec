#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_loader
//!
//! The Runtime Loader Protocol (spec §4.5): the contract by which a
//! running process activates a bubble, rewrites its module search
//! paths, purges stale modules, and restores state on exit.
//!
//! ## What
//!
//! [`HostEnvironment`] abstracts whatever a real embedding exposes for
//! its module search path, loaded-module cache, and environment
//! variables; [`FakeHostEnvironment`] is the in-memory double used by
//! this crate's own tests and by `sheaf_daemon`. [`Loader::activate`]
//! runs the five activation steps and returns an [`ActivationScope`]
//! whose `Drop` runs the three deactivation steps, so ending a scope —
//! by falling out of it, by `?`, or by a panic unwind — always restores
//! state.
//!
//! ## How
//!
//! [`LoaderState`] owns the in-process activation stack and the
//! process-wide mutex that serializes activations (spec §5); the mutex
//! is held only for the duration of each transition; it is released
//! before `activate` returns its scope, which is what lets activations
//! nest (spec §4.5) without an inner activation's transition deadlocking
//! against its still-alive outer scope. Nesting follows strict LIFO
//! because `ActivationScope::drop` always pops the top of the stack,
//! and the stack is only ever pushed to by the most recent `activate`.
//!
//! ## Why
//!
//! Framing activation as a guard rather than a pair of explicit
//! `activate`/`deactivate` calls is what gives spec §8's testable
//! property 3 ("activating any bubble and then deactivating restores
//! the search path and module cache to byte-for-byte the
//! pre-activation state") for free on every exit path, instead of only
//! the happy path a caller remembered to clean up after.

mod error;
mod host;
mod lookup;
mod scope;
mod state;

pub use error::LoaderError;
pub use host::{FakeHostEnvironment, HostEnvironment};
pub use lookup::find_bubble;
pub use scope::{ActivationScope, Loader, DYNAMIC_LIBRARY_PATH_VAR};
pub use state::LoaderState;
