//! Bubble Builder error taxonomy (spec §4.3, §7).

use sheaf_installer::InstallerError;
use sheaf_kb::KbError;

/// Errors raised while building, verifying, or reconciling a bubble.
#[derive(Debug, thiserror::Error)]
pub enum BubbleError {
    /// The requested `(name, version)` is not a downgrade and no bubble
    /// is needed; building one anyway would violate spec §3's "a bubble
    /// must never contain the currently-active version" invariant.
    #[error("{name}=={version} is not a downgrade; no bubble is needed")]
    NotADowngrade {
        /// Package name.
        name: String,
        /// Requested version.
        version: semver::Version,
    },

    /// Staging the requested version failed.
    #[error(transparent)]
    Install(#[from] InstallerError),

    /// Import verification failed after exhausting repair attempts.
    #[error("import verification failed for {name}=={version} after {attempts} attempt(s): {detail}")]
    VerificationFailed {
        /// Package name.
        name: String,
        /// Bubbled version.
        version: semver::Version,
        /// Number of repair attempts made.
        attempts: u32,
        /// The final, unrepaired failure.
        detail: String,
    },

    /// The bubble's manifest and its on-disk files have drifted apart.
    #[error("bubble {name}=={version} is corrupted: {detail}")]
    Corrupted {
        /// Package name.
        name: String,
        /// Bubbled version.
        version: semver::Version,
        /// What was found to be inconsistent.
        detail: String,
    },

    /// The cross-process advisory lock is held by another process.
    #[error("installation root is locked by another process (held since {0})")]
    Locked(String),

    /// The KB transaction backing the commit step conflicted or failed.
    #[error(transparent)]
    Kb(#[from] KbError),

    /// The operation's `CancellationToken` was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// An underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A KB value could not be (de)serialized to/from its stored form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
