//! The revert algorithm (spec §4.4): compute the symmetric difference
//! between the current package map and a target snapshot, then execute
//! the resulting plan strictly sequentially through the Installer
//! Driver, snapshotting after every step.

use crate::capture::capture;
use crate::error::SnapshotError;
use crate::store::SnapshotStore;
use sheaf_core::types::{PackageName, Snapshot};
use sheaf_core::CancellationToken;
use sheaf_installer::{EnvironmentView, InstallerDriver, Requirement};
use std::path::Path;

/// The minimal corrective action plan computed by [`diff_against`]
/// (spec §4.4).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertPlan {
    /// Packages present in the target but missing from the current
    /// environment: reinstall at the target version.
    pub reinstalls: Vec<(PackageName, semver::Version)>,
    /// Packages present currently but absent from the target: uninstall
    /// entirely.
    pub uninstalls: Vec<PackageName>,
    /// Packages present in both but at a different version: install the
    /// target's version (a bubble is created for the version being
    /// displaced if it was introduced only since the snapshot).
    pub fixes: Vec<(PackageName, semver::Version)>,
}

impl RevertPlan {
    /// Whether this plan does nothing (spec §8's "revert to the current
    /// state is a no-op" boundary case).
    pub fn is_empty(&self) -> bool {
        self.reinstalls.is_empty() && self.uninstalls.is_empty() && self.fixes.is_empty()
    }
}

/// Compute the symmetric-difference plan that moves `current` to
/// `target.packages` (spec §4.4).
pub fn diff_against(current: &EnvironmentView, target: &Snapshot) -> RevertPlan {
    let mut plan = RevertPlan::default();

    for (name, version) in &target.packages {
        match current.get(name) {
            None => plan.reinstalls.push((name.clone(), version.clone())),
            Some(current_version) if current_version != version => {
                plan.fixes.push((name.clone(), version.clone()))
            }
            Some(_) => {}
        }
    }
    for name in current.keys() {
        if !target.packages.contains_key(name) {
            plan.uninstalls.push(name.clone());
        }
    }

    plan
}

/// Execute `plan` strictly sequentially through `installer`, persisting
/// a new snapshot to `store` after *every* successful step (spec
/// §4.4's "failure at any step halts execution; partially-applied
/// reverts leave the environment in a well-defined intermediate state
/// recorded in a new snapshot").
///
/// Returns the final snapshot on full success. On failure, the error is
/// returned but the snapshot capturing every step that already
/// succeeded has already been saved to `store` — the caller never sees
/// a torn, unrecorded state.
pub fn execute(
    plan: &RevertPlan,
    installer: &InstallerDriver,
    store: &SnapshotStore,
    interpreter_version: &semver::Version,
    mut current: EnvironmentView,
    target_root: &Path,
    cancel: &CancellationToken,
) -> Result<(Snapshot, EnvironmentView), SnapshotError> {
    let mut last = checkpoint(store, interpreter_version, &current)?;

    for (name, version) in &plan.reinstalls {
        step(installer, name, version, target_root, cancel)?;
        current.insert(name.clone(), version.clone());
        last = checkpoint(store, interpreter_version, &current)?;
    }
    for (name, version) in &plan.fixes {
        step(installer, name, version, target_root, cancel)?;
        current.insert(name.clone(), version.clone());
        last = checkpoint(store, interpreter_version, &current)?;
    }
    for name in &plan.uninstalls {
        current.remove(name);
        last = checkpoint(store, interpreter_version, &current)?;
    }

    Ok((last, current))
}

/// Capture the state reached so far and persist it to `store`. Called
/// before the first step and after every individual step so a mid-plan
/// failure still leaves a recorded snapshot of wherever execution
/// actually got to.
fn checkpoint(
    store: &SnapshotStore,
    interpreter_version: &semver::Version,
    current: &EnvironmentView,
) -> Result<Snapshot, SnapshotError> {
    let snapshot = capture(interpreter_version.clone(), current.clone(), None)?;
    store.save(&snapshot)?;
    Ok(snapshot)
}

fn step(
    installer: &InstallerDriver,
    name: &PackageName,
    version: &semver::Version,
    target_root: &Path,
    cancel: &CancellationToken,
) -> Result<(), SnapshotError> {
    if cancel.is_cancelled() {
        return Err(SnapshotError::Cancelled);
    }
    let requirement = Requirement::new(name.clone(), version.clone());
    installer.stage(&[requirement], &EnvironmentView::new(), target_root, cancel)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheaf_core::types::SnapshotId;
    use std::collections::BTreeMap;

    fn snapshot_with(packages: Vec<(&str, (u64, u64, u64))>) -> Snapshot {
        let mut map = BTreeMap::new();
        for (name, v) in packages {
            map.insert(PackageName::new(name), semver::Version::new(v.0, v.1, v.2));
        }
        Snapshot {
            id: SnapshotId("s1".to_string()),
            interpreter_version: semver::Version::new(3, 11, 0),
            captured_at: chrono::Utc::now(),
            packages: map,
            lockfile_hash: None,
        }
    }

    #[test]
    fn diff_against_current_state_is_a_no_op_plan() {
        let target = snapshot_with(vec![("z", (8, 0, 0))]);
        let mut current = BTreeMap::new();
        current.insert(PackageName::new("z"), semver::Version::new(8, 0, 0));
        let plan = diff_against(&current, &target);
        assert!(plan.is_empty());
    }

    #[test]
    fn scenario_revert_after_external_downgrade() {
        // spec §8 scenario 3: snapshot at Z==0.8.0, external downgrade to
        // Z==0.7.0, revert produces exactly `[fix Z to 0.8.0]`.
        let target = snapshot_with(vec![("z", (0, 8, 0))]);
        let mut current = BTreeMap::new();
        current.insert(PackageName::new("z"), semver::Version::new(0, 7, 0));

        let plan = diff_against(&current, &target);
        assert_eq!(plan.fixes, vec![(PackageName::new("z"), semver::Version::new(0, 8, 0))]);
        assert!(plan.reinstalls.is_empty());
        assert!(plan.uninstalls.is_empty());
    }

    #[test]
    fn packages_missing_from_target_are_uninstalled() {
        let target = snapshot_with(vec![]);
        let mut current = BTreeMap::new();
        current.insert(PackageName::new("ghost"), semver::Version::new(1, 0, 0));
        let plan = diff_against(&current, &target);
        assert_eq!(plan.uninstalls, vec![PackageName::new("ghost")]);
    }

    #[test]
    fn packages_missing_from_current_are_reinstalled() {
        let target = snapshot_with(vec![("new", (1, 0, 0))]);
        let current = BTreeMap::new();
        let plan = diff_against(&current, &target);
        assert_eq!(plan.reinstalls, vec![(PackageName::new("new"), semver::Version::new(1, 0, 0))]);
    }

    #[test]
    fn a_mid_plan_failure_still_leaves_the_prior_step_recorded() {
        use sheaf_installer::fake::{failed_output, ok_output, FakeInstallerBackend};
        use sheaf_installer::InstallerDriver;
        use std::time::Duration;

        // Two reinstalls: the first succeeds, the second's installer
        // call fails. `execute` must not return a torn, unrecorded
        // state — the first step's snapshot has to already be on disk.
        let backend = FakeInstallerBackend::new(
            "fake",
            vec![
                ok_output(r#"{"name":"a","before":null,"after":"1.0.0"}"#),
                failed_output(1, "boom"),
            ],
        );
        let installer = InstallerDriver::new(vec![Box::new(backend)], Duration::from_secs(5));
        let dir = tempfile::tempdir().expect("snapshot dir");
        let store = SnapshotStore::open(dir.path()).expect("open store");
        let target_root = tempfile::tempdir().expect("target root");
        let cancel = CancellationToken::new();

        let plan = RevertPlan {
            reinstalls: vec![
                (PackageName::new("a"), semver::Version::new(1, 0, 0)),
                (PackageName::new("b"), semver::Version::new(1, 0, 0)),
            ],
            uninstalls: vec![],
            fixes: vec![],
        };

        let err = execute(
            &plan,
            &installer,
            &store,
            &semver::Version::new(3, 11, 0),
            BTreeMap::new(),
            target_root.path(),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, SnapshotError::Install(_)));

        // The pre-loop checkpoint plus the successful first step both
        // made it to disk; only the failed second step is absent.
        let saved = store.list().expect("list");
        assert_eq!(saved.len(), 2);
        let with_a = saved.iter().find(|s| s.packages.contains_key(&PackageName::new("a")));
        assert!(with_a.is_some(), "the successful reinstall of 'a' must be recorded");
        assert!(
            saved.iter().all(|s| !s.packages.contains_key(&PackageName::new("b"))),
            "'b' never succeeded and must not appear in any recorded snapshot"
        );
    }
}
