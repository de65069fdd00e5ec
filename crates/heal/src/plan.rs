//! `HealingPlan`: the transient, not-persisted entity of spec §3,
//! derived by error-pattern analysis and used to drive automatic bubble
//! creation and re-execution.

use sheaf_installer::Requirement;

/// A derived, transient plan to satisfy one or more requirements an
/// observed failure implied were missing (spec §3, §8 scenario 2).
///
/// Never written to the KB or disk: a fresh `HealingPlan` is built from
/// scratch on every `run-script` retry, from whatever failure the most
/// recent attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealingPlan {
    /// Requirements the analyzer believes would resolve the failure.
    pub requirements: Vec<Requirement>,
    /// Which retry attempt this plan belongs to, starting at 1.
    pub attempt: u32,
    /// Maximum attempts before the plan is abandoned and the original
    /// failure is surfaced (spec §7's "default small" bound).
    pub max_attempts: u32,
}

impl HealingPlan {
    /// Construct the first attempt's plan.
    pub fn first(requirements: Vec<Requirement>, max_attempts: u32) -> Self {
        Self { requirements, attempt: 1, max_attempts: max_attempts.max(1) }
    }

    /// Whether another attempt is permitted after this one.
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Build the next attempt's plan, widening to a superset of
    /// requirements if the next failure implies more than this attempt
    /// already covers (spec §7: "then surfaced" implies widening
    /// attempts, not identical repeats).
    pub fn widen(&self, newly_identified: Vec<Requirement>) -> Self {
        let mut requirements = self.requirements.clone();
        for req in newly_identified {
            if !requirements.contains(&req) {
                requirements.push(req);
            }
        }
        Self { requirements, attempt: self.attempt + 1, max_attempts: self.max_attempts }
    }
}
