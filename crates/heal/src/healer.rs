//! `Healer`: the explicit state machine spec §7 asks for — "Auto-heal
//! logic becomes an explicit state machine keyed by error variant" —
//! wiring pattern analysis ([`crate::patterns::analyze`]) to bubble
//! construction ([`sheaf_bubble::BubbleBuilder::build`]).

use crate::error::HealError;
use crate::patterns;
use crate::plan::HealingPlan;
use sheaf_bubble::{BubbleBuilder, BubbleHandle};
use sheaf_core::types::PackageName;
use sheaf_core::CancellationToken;
use sheaf_installer::EnvironmentView;
use std::path::Path;

/// Drives one `run-script` retry cycle: turn failure text into a plan,
/// widen an existing plan against a further failure, and realize a
/// plan's requirements as committed bubbles.
pub struct Healer<'a> {
    builder: &'a BubbleBuilder<'a>,
}

impl<'a> Healer<'a> {
    /// Construct a healer over the same collaborators the caller's
    /// bubble builds already use.
    pub fn new(builder: &'a BubbleBuilder<'a>) -> Self {
        Self { builder }
    }

    /// Build the first healing plan from a script's failure output
    /// (spec §8 scenario 2). Fails with [`HealError::NoPatternMatched`]
    /// if nothing in the table recognized the text — the original
    /// failure is then surfaced unchanged, never retried blindly.
    pub fn analyze(&self, failure_text: &str, max_attempts: u32) -> Result<HealingPlan, HealError> {
        let requirements = patterns::analyze(failure_text);
        if requirements.is_empty() {
            return Err(HealError::NoPatternMatched);
        }
        Ok(HealingPlan::first(requirements, max_attempts))
    }

    /// Widen `plan` against a further failure observed after realizing
    /// it once (spec §7: "triggers at most N repair attempts ... with
    /// widening healing plans; then surfaced").
    ///
    /// Returns [`HealError::AttemptsExhausted`] once `plan.max_attempts`
    /// is reached, rather than widening forever.
    pub fn retry(&self, plan: &HealingPlan, failure_text: &str) -> Result<HealingPlan, HealError> {
        if !plan.can_retry() {
            let requirement = plan
                .requirements
                .first()
                .map(|r| r.name.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            return Err(HealError::AttemptsExhausted { requirement, attempts: plan.attempt });
        }
        let newly_identified = patterns::analyze(failure_text);
        Ok(plan.widen(newly_identified))
    }

    /// Build (or reuse, via the builder's own coalescing rule) a bubble
    /// for every requirement `plan` names that is not already satisfied
    /// by `active_versions` — the version that is already active needs
    /// no bubble at all (spec §3's never-bubble-the-active-version
    /// invariant, restated for the healer: a requirement whose version
    /// is at or above what's active is not something healing can fix by
    /// bubbling).
    #[allow(clippy::too_many_arguments)]
    pub fn realize(
        &self,
        plan: &HealingPlan,
        active_versions: &EnvironmentView,
        provided_modules: impl Fn(&PackageName) -> Vec<String>,
        main_root: &Path,
        bubble_root_base: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<BubbleHandle>, HealError> {
        let mut handles = Vec::new();
        for requirement in &plan.requirements {
            let Some(active) = active_versions.get(&requirement.name) else {
                continue;
            };
            if requirement.version >= *active {
                continue;
            }
            let modules = provided_modules(&requirement.name);
            let handle = self.builder.build(
                &requirement.name,
                &requirement.version,
                active,
                &modules,
                main_root,
                bubble_root_base,
                cancel,
            )?;
            handles.push(handle);
        }
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_bubble::verify::{ImportVerifier, VerifyOutcome};
    use sheaf_bubble::BubbleBuildPolicy;
    use sheaf_core::config::DedupPolicy;
    use sheaf_core::types::DedupMode;
    use sheaf_installer::fake::{ok_output, FakeInstallerBackend};
    use sheaf_installer::InstallerDriver;
    use sheaf_kb::FastBackend;
    use std::time::Duration;

    struct AlwaysOkVerifier;
    impl ImportVerifier for AlwaysOkVerifier {
        fn verify(
            &self,
            modules: &[String],
            _bubble_root: &Path,
            _main_root: &Path,
        ) -> std::io::Result<VerifyOutcome> {
            Ok(VerifyOutcome { succeeded: modules.to_vec(), failed: vec![] })
        }
    }

    fn installer_with_downgrade_report(name: &str, before: &str, after: &str) -> InstallerDriver {
        let stdout = format!(r#"{{"name":"{name}","before":"{before}","after":"{after}"}}"#);
        let backend = FakeInstallerBackend::new("fake", vec![ok_output(stdout)]);
        InstallerDriver::new(vec![Box::new(backend)], Duration::from_secs(5))
    }

    #[test]
    fn analyze_then_realize_builds_the_requirement_from_scenario_2() {
        let kb = FastBackend::in_memory();
        let installer = installer_with_downgrade_report("y", "1.7.1", "1.4.2");
        let verifier = AlwaysOkVerifier;
        let builder = BubbleBuilder::new(
            &kb,
            &installer,
            &verifier,
            BubbleBuildPolicy {
                dedup_policy: DedupPolicy::Conservative,
                dedup_mode: DedupMode::ManifestRef,
                native_package_list: vec![],
                max_repair_attempts: 3,
            },
        );
        let healer = Healer::new(&builder);
        let cancel = CancellationToken::new();
        let main = tempfile::tempdir().expect("main");
        let bubbles = tempfile::tempdir().expect("bubbles");

        let plan = healer.analyze("AssertionError: expected y==1.4.2, got 1.7.1", 3).expect("plan");
        assert_eq!(plan.attempt, 1);

        let mut active = EnvironmentView::new();
        active.insert(PackageName::new("y"), semver::Version::new(1, 7, 1));

        let handles = healer
            .realize(&plan, &active, |_| Vec::new(), main.path(), bubbles.path(), &cancel)
            .expect("realize");
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].bubble.version, semver::Version::new(1, 4, 2));
    }

    #[test]
    fn realize_skips_requirements_already_at_or_above_active() {
        let kb = FastBackend::in_memory();
        let installer = InstallerDriver::new(vec![], Duration::from_secs(5));
        let verifier = AlwaysOkVerifier;
        let builder = BubbleBuilder::new(
            &kb,
            &installer,
            &verifier,
            BubbleBuildPolicy {
                dedup_policy: DedupPolicy::Conservative,
                dedup_mode: DedupMode::ManifestRef,
                native_package_list: vec![],
                max_repair_attempts: 3,
            },
        );
        let healer = Healer::new(&builder);
        let cancel = CancellationToken::new();
        let main = tempfile::tempdir().expect("main");
        let bubbles = tempfile::tempdir().expect("bubbles");

        let plan = HealingPlan::first(
            vec![sheaf_installer::Requirement::new(PackageName::new("y"), semver::Version::new(2, 0, 0))],
            3,
        );
        let mut active = EnvironmentView::new();
        active.insert(PackageName::new("y"), semver::Version::new(1, 0, 0));

        let handles = healer
            .realize(&plan, &active, |_| Vec::new(), main.path(), bubbles.path(), &cancel)
            .expect("realize");
        assert!(handles.is_empty());
    }

    #[test]
    fn analyze_rejects_unrecognized_failure_text() {
        let kb = FastBackend::in_memory();
        let installer = InstallerDriver::new(vec![], Duration::from_secs(5));
        let verifier = AlwaysOkVerifier;
        let builder = BubbleBuilder::new(
            &kb,
            &installer,
            &verifier,
            BubbleBuildPolicy {
                dedup_policy: DedupPolicy::Conservative,
                dedup_mode: DedupMode::ManifestRef,
                native_package_list: vec![],
                max_repair_attempts: 3,
            },
        );
        let healer = Healer::new(&builder);
        let err = healer.analyze("segmentation fault", 3).unwrap_err();
        assert!(matches!(err, HealError::NoPatternMatched));
    }

    #[test]
    fn retry_past_max_attempts_is_exhausted() {
        let plan = HealingPlan { requirements: vec![sheaf_installer::Requirement::new(PackageName::new("y"), semver::Version::new(1, 4, 2))], attempt: 3, max_attempts: 3 };
        let kb = FastBackend::in_memory();
        let installer = InstallerDriver::new(vec![], Duration::from_secs(5));
        let verifier = AlwaysOkVerifier;
        let builder = BubbleBuilder::new(
            &kb,
            &installer,
            &verifier,
            BubbleBuildPolicy {
                dedup_policy: DedupPolicy::Conservative,
                dedup_mode: DedupMode::ManifestRef,
                native_package_list: vec![],
                max_repair_attempts: 3,
            },
        );
        let healer = Healer::new(&builder);
        let err = healer.retry(&plan, "expected y==1.4.2, got 1.7.1").unwrap_err();
        assert!(matches!(err, HealError::AttemptsExhausted { attempts: 3, .. }));
    }
}
