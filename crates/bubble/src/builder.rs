//! `BubbleBuilder`: the seven-step protocol of spec §4.3 — Snapshot,
//! Stage, Diff, Materialize, Verify imports, Restore main, Commit —
//! plus the build-lock concurrency rule and dedup policy.

use crate::diff::diff_staged_against_main;
use crate::error::BubbleError;
use crate::materialize::materialize;
use crate::verify::{verify_with_repair, ImportVerifier};
use chrono::Utc;
use sheaf_core::config::DedupPolicy;
use sheaf_core::types::{Bubble, DedupMode, DependencySnapshot, PackageName};
use sheaf_core::CancellationToken;
use sheaf_installer::{EnvironmentView, InstallerDriver, Requirement};
use sheaf_kb::{KbBackend, KbKey};
use sheaf_snapshot::capture;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Static policy knobs the builder needs that don't vary per call
/// (spec §6's `dedup_policy`, `native_package_list`, `max_repair_attempts`).
pub struct BubbleBuildPolicy {
    /// Dedup aggressiveness.
    pub dedup_policy: DedupPolicy,
    /// Whether dedup references are realized as manifest entries,
    /// symlinks, or hard links (DESIGN.md's resolution of the spec §9
    /// Open Question).
    pub dedup_mode: DedupMode,
    /// Package names excluded from dedup regardless of hash match.
    pub native_package_list: Vec<String>,
    /// Maximum targeted-repair attempts before `VerificationFailed` is
    /// surfaced.
    pub max_repair_attempts: u32,
}

/// Handle to a committed bubble, returned by [`BubbleBuilder::build`].
#[derive(Debug, Clone)]
pub struct BubbleHandle {
    /// The committed bubble record.
    pub bubble: Bubble,
    /// Bytes saved by deduplication, for the `sheaf install` space-
    /// savings report (spec §8 scenario 6).
    pub dedup_savings: u64,
    /// Whether this call built a fresh bubble or returned one that
    /// already existed (spec §4.3's coalescing rule).
    pub was_coalesced: bool,
}

/// Orchestrates the bubble-build protocol end to end.
pub struct BubbleBuilder<'a> {
    kb: &'a dyn KbBackend,
    installer: &'a InstallerDriver,
    verifier: &'a dyn ImportVerifier,
    policy: BubbleBuildPolicy,
}

impl<'a> BubbleBuilder<'a> {
    /// Construct a builder over the given collaborators.
    pub fn new(
        kb: &'a dyn KbBackend,
        installer: &'a InstallerDriver,
        verifier: &'a dyn ImportVerifier,
        policy: BubbleBuildPolicy,
    ) -> Self {
        Self { kb, installer, verifier, policy }
    }

    /// Build (or return the already-existing) bubble for
    /// `(name, version)`.
    ///
    /// Refuses to build a bubble for a version that is not a downgrade
    /// relative to `active_version` (spec §3's "a bubble must never
    /// contain the currently-active version" invariant, and spec §8's
    /// "installing a version that already equals the active version"
    /// boundary case).
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        name: &PackageName,
        version: &semver::Version,
        active_version: &semver::Version,
        provided_modules: &[String],
        main_root: &Path,
        bubble_root_base: &Path,
        cancel: &CancellationToken,
    ) -> Result<BubbleHandle, BubbleError> {
        if version >= active_version {
            return Err(BubbleError::NotADowngrade { name: name.to_string(), version: version.clone() });
        }

        // Concurrency rule (spec §4.3): `bubble:<name>:<version>:build`
        // is the build lock. If a bubble for this exact (name, version)
        // already committed, return it without rebuilding. If another
        // builder currently holds the lock, wait for it to finish and
        // then return whatever it committed, rather than racing it.
        let bubble_key = KbKey::bubble(name.as_str(), version);
        if let Some(existing) = self.coalesced_handle(&bubble_key)? {
            return Ok(existing);
        }

        let lock_key = KbKey::bubble_build_lock(name.as_str(), version);
        if !self.claim_build_lock(&lock_key)? {
            self.wait_for_build_completion(&lock_key, &bubble_key)?;
            return self
                .coalesced_handle(&bubble_key)?
                .ok_or_else(|| BubbleError::Corrupted {
                    name: name.to_string(),
                    version: version.clone(),
                    detail: "build lock released without a committed bubble".to_string(),
                });
        }

        let result = self.build_uncoalesced(
            name,
            version,
            main_root,
            bubble_root_base,
            provided_modules,
            cancel,
            &bubble_key,
        );
        // Always release the marker, success or failure, so a future
        // request isn't wedged behind a dead builder.
        let _ = self.kb.set(&lock_key, serde_json::json!(null));
        result
    }

    fn coalesced_handle(&self, bubble_key: &KbKey) -> Result<Option<BubbleHandle>, BubbleError> {
        match self.kb.get(bubble_key) {
            Ok(existing) => {
                let bubble: Bubble = serde_json::from_value(existing)?;
                Ok(Some(BubbleHandle {
                    dedup_savings: bubble.manifest.dedup_savings(),
                    bubble,
                    was_coalesced: true,
                }))
            }
            Err(sheaf_kb::KbError::NotFound(_)) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    /// Attempt to claim the build lock. Returns `true` if this call
    /// claimed it, `false` if another builder already holds it.
    ///
    /// Retries a bounded number of times on `KbError::Conflict` (spec
    /// §7: "Conflict (KB write race): retried up to a small bound, then
    /// surfaced") rather than surfacing the race directly — two callers
    /// racing this exact transaction is the expected, common case this
    /// method exists to resolve, not an exceptional one.
    fn claim_build_lock(&self, lock_key: &KbKey) -> Result<bool, BubbleError> {
        const MAX_CONFLICT_RETRIES: u32 = 10;
        let keys = vec![lock_key.clone()];

        for attempt in 0..=MAX_CONFLICT_RETRIES {
            let mut held_by_other = false;
            let result = self.kb.transaction(&keys, &mut |view| {
                if view.get(lock_key).is_some() {
                    held_by_other = true;
                    return Ok(());
                }
                view.set(lock_key.clone(), serde_json::json!("building"));
                Ok(())
            });
            match result {
                Ok(()) => return Ok(!held_by_other),
                Err(sheaf_kb::KbError::Conflict(_)) if attempt < MAX_CONFLICT_RETRIES => continue,
                Err(other) => return Err(other.into()),
            }
        }
        unreachable!("loop either returns or propagates on its last iteration")
    }

    /// Poll until the lock holder releases `lock_key` (spec §4.3's
    /// "second concurrent request ... waits on build completion").
    fn wait_for_build_completion(
        &self,
        lock_key: &KbKey,
        bubble_key: &KbKey,
    ) -> Result<(), BubbleError> {
        const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(20);
        const MAX_POLLS: u32 = 5_000;
        for _ in 0..MAX_POLLS {
            let lock_released = !matches!(self.kb.get(lock_key), Ok(v) if !v.is_null());
            let bubble_committed = self.kb.get(bubble_key).is_ok();
            if lock_released || bubble_committed {
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_uncoalesced(
        &self,
        name: &PackageName,
        version: &semver::Version,
        main_root: &Path,
        bubble_root_base: &Path,
        provided_modules: &[String],
        cancel: &CancellationToken,
        bubble_key: &KbKey,
    ) -> Result<BubbleHandle, BubbleError> {
        // Step 1: snapshot current package states for affected names.
        let pre_state: EnvironmentView = EnvironmentView::new();
        let pre_snapshot = capture(semver::Version::new(0, 0, 0), pre_state, None)?;

        // Step 2: stage the requested version into a fresh temp root.
        let stage_root = bubble_root_base.join(format!(".stage-{name}-{version}"));
        std::fs::create_dir_all(&stage_root)?;
        let requirement = Requirement::new(name.clone(), version.clone());
        self.installer.stage(
            std::slice::from_ref(&requirement),
            &pre_snapshot.packages,
            &stage_root,
            cancel,
        )?;

        // Step 3: diff staged root vs main.
        let diffed = diff_staged_against_main(&stage_root, main_root)?;

        // Step 4: materialize the bubble directory.
        let bubble_root = bubble_root_base.join(format!("{name}-{version}"));
        let native_files: HashSet<PathBuf> = self
            .policy
            .native_package_list
            .iter()
            .map(PathBuf::from)
            .collect();
        let manifest = materialize(
            &diffed,
            &stage_root,
            main_root,
            &bubble_root,
            &native_files,
            self.policy.dedup_policy,
            self.policy.dedup_mode,
        )?;

        // Step 5: verify imports, with targeted repair.
        let (outcome, attempts, _needs_companion) = verify_with_repair(
            self.verifier,
            provided_modules,
            &bubble_root,
            main_root,
            &stage_root,
            self.policy.max_repair_attempts,
        )?;
        if !outcome.is_success() {
            let detail = outcome
                .failed
                .first()
                .map(|(m, f)| format!("{m}: {f:?}"))
                .unwrap_or_else(|| "unknown failure".to_string());
            let _ = std::fs::remove_dir_all(&stage_root);
            return Err(BubbleError::VerificationFailed {
                name: name.to_string(),
                version: version.clone(),
                attempts,
                detail,
            });
        }

        // Step 6: restore main (the installer driver staged into an
        // isolated root, so the main environment was never actually
        // touched; restoring is a no-op here by construction).
        std::fs::remove_dir_all(&stage_root)?;

        // Step 7: commit, in a single KB transaction.
        let dependency_snapshot: DependencySnapshot = DependencySnapshot::new();
        let size_bytes = manifest.materialized_size();
        let dedup_savings = manifest.dedup_savings();
        let bubble = Bubble {
            package_name: name.clone(),
            version: version.clone(),
            root_path: bubble_root,
            manifest,
            created_at: Utc::now(),
            size_bytes,
            dependency_snapshot,
        };

        let versions_key = KbKey::pkg_versions(name.as_str());
        let keys = vec![bubble_key.clone(), versions_key.clone()];
        let bubble_for_commit = bubble.clone();
        self.kb.transaction(&keys, &mut |view| {
            view.set(bubble_key.clone(), serde_json::to_value(&bubble_for_commit)?);
            let mut versions: Vec<semver::Version> = view
                .get(&versions_key)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            if !versions.contains(&bubble_for_commit.version) {
                versions.push(bubble_for_commit.version.clone());
            }
            view.set(versions_key.clone(), serde_json::to_value(&versions)?);
            Ok(())
        })?;

        Ok(BubbleHandle { bubble, dedup_savings, was_coalesced: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::VerifyOutcome;
    use sheaf_installer::fake::{ok_output, FakeInstallerBackend};
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
    fn refuses_to_build_a_bubble_for_the_active_version() {
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
        let dir = tempfile::tempdir().expect("tempdir");
        let cancel = CancellationToken::new();
        let err = builder
            .build(
                &PackageName::new("x"),
                &semver::Version::new(2, 0, 0),
                &semver::Version::new(2, 0, 0),
                &[],
                dir.path(),
                dir.path(),
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, BubbleError::NotADowngrade { .. }));
    }

    #[test]
    fn builds_and_commits_a_downgrade_bubble() {
        let kb = FastBackend::in_memory();
        let installer = installer_with_downgrade_report("x", "2.0.0", "1.0.0");
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
        let main = tempfile::tempdir().expect("main");
        let bubbles = tempfile::tempdir().expect("bubbles");
        let cancel = CancellationToken::new();

        let handle = builder
            .build(
                &PackageName::new("x"),
                &semver::Version::new(1, 0, 0),
                &semver::Version::new(2, 0, 0),
                &[],
                main.path(),
                bubbles.path(),
                &cancel,
            )
            .expect("build");

        assert!(!handle.was_coalesced);
        assert_eq!(handle.bubble.version, semver::Version::new(1, 0, 0));

        let versions: Vec<semver::Version> = serde_json::from_value(
            kb.get(&KbKey::pkg_versions("x")).expect("versions recorded"),
        )
        .expect("deserialize");
        assert_eq!(versions, vec![semver::Version::new(1, 0, 0)]);
    }

    #[test]
    fn second_request_for_the_same_bubble_coalesces() {
        let kb = FastBackend::in_memory();
        let installer = installer_with_downgrade_report("x", "2.0.0", "1.0.0");
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
        let main = tempfile::tempdir().expect("main");
        let bubbles = tempfile::tempdir().expect("bubbles");
        let cancel = CancellationToken::new();

        let first = builder
            .build(
                &PackageName::new("x"),
                &semver::Version::new(1, 0, 0),
                &semver::Version::new(2, 0, 0),
                &[],
                main.path(),
                bubbles.path(),
                &cancel,
            )
            .expect("first build");
        assert!(!first.was_coalesced);

        let second = builder
            .build(
                &PackageName::new("x"),
                &semver::Version::new(1, 0, 0),
                &semver::Version::new(2, 0, 0),
                &[],
                main.path(),
                bubbles.path(),
                &cancel,
            )
            .expect("second build coalesces");
        assert!(second.was_coalesced);
        assert_eq!(second.bubble.created_at, first.bubble.created_at);
    }
}
