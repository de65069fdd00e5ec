#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::panic)]

//! # sheaf_heal
//!
//! Auto-heal (spec §4.3's repair path, §7's `VerificationFailed`/
//! `InstallFailed` handling, §8 scenario 2): turns a script's failure
//! text into a [`plan::HealingPlan`] and realizes that plan by building
//! the bubbles it names.
//!
//! ## What
//!
//! [`patterns::analyze`] is the first-class, testable error-pattern
//! table spec §9's Open Question #3 asks for: each entry recognizes one
//! shape of failure text (a version-assertion message, a mismatch
//! report, a requirement pin surfacing verbatim) and extracts the
//! [`sheaf_installer::Requirement`] it implies. [`healer::Healer`]
//! drives the resulting state machine — `analyze` the first failure,
//! `retry`/widen against a further one, `realize` by handing each
//! requirement to [`sheaf_bubble::BubbleBuilder::build`].
//!
//! ## How
//!
//! A [`plan::HealingPlan`] is never written to the Knowledge Base or
//! disk: it is rebuilt from scratch on every `run-script` retry from
//! whatever failure the most recent attempt produced, and it widens
//! (rather than replaces) across attempts so a requirement discovered
//! on attempt 2 doesn't drop one discovered on attempt 1.
//!
//! ## Why
//!
//! Spec §7 calls for auto-heal to be "an explicit state machine keyed
//! by error variant" rather than exception-driven recovery; splitting
//! pattern recognition (a pure function over text) from plan state
//! (attempt/max_attempts bookkeeping) from realization (bubble
//! construction) keeps each of those independently testable, the same
//! decomposition `sheaf_bubble`'s own seven-step protocol uses.

pub mod error;
pub mod healer;
pub mod patterns;
pub mod plan;

pub use error::HealError;
pub use healer::Healer;
pub use plan::HealingPlan;
