//! Auto-heal error taxonomy (spec §4.3, §7).

use sheaf_bubble::BubbleError;

/// Errors raised while applying a [`crate::plan::HealingPlan`].
#[derive(Debug, thiserror::Error)]
pub enum HealError {
    /// The plan's `attempt` counter reached `max_attempts` without the
    /// underlying script succeeding (spec §7: "`VerificationFailed` ...
    /// triggers at most N repair attempts ... then surfaced").
    #[error("giving up after {attempts} heal attempt(s) for {requirement}")]
    AttemptsExhausted {
        /// Requirement the healer was last trying to satisfy.
        requirement: String,
        /// Attempts made.
        attempts: u32,
    },

    /// No registered pattern recognized the failure text; nothing to
    /// heal.
    #[error("no healing pattern matched the failure output")]
    NoPatternMatched,

    /// Building a bubble for an identified requirement failed.
    #[error(transparent)]
    Bubble(#[from] BubbleError),
}
