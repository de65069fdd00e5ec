//! # Revert integration
//!
//! **What**: exercises `revert::execute` end to end through a scripted
//! [`InstallerDriver`], reproducing spec §8 scenario 3 ("revert after
//! external downgrade") as a full capture → diff → execute cycle rather
//! than only the `diff_against` unit already covered in-crate.
//!
//! **How**: captures a snapshot with `Z==0.8.0`, simulates an external
//! downgrade to `Z==0.7.0` by mutating the in-memory environment view
//! directly (the installer driver is never the one that performed that
//! downgrade — spec §4.4 says revert reacts to drift, it doesn't cause
//! it), then drives `diff_against` + `execute` through a
//! [`FakeInstallerBackend`] scripted to report the fix-up install.
//!
//! **Why**: `execute` is the one piece of the revert engine with no
//! direct test in `crates/snapshot/src/revert.rs` — every existing test
//! there only exercises `diff_against`.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use sheaf_core::types::{PackageName, SnapshotId};
use sheaf_core::CancellationToken;
use sheaf_installer::fake::{ok_output, FakeInstallerBackend};
use sheaf_installer::InstallerDriver;
use sheaf_snapshot::{capture, diff_against, execute, SnapshotStore};
use std::collections::BTreeMap;
use std::time::Duration;

#[test]
fn scenario_3_revert_after_external_downgrade_executes_a_single_fix() {
    // Snapshot taken while Z==0.8.0 was active.
    let mut at_capture = BTreeMap::new();
    at_capture.insert(PackageName::new("z"), semver::Version::new(0, 8, 0));
    let target = capture(semver::Version::new(3, 11, 0), at_capture, None).expect("capture target");

    // External installer downgraded Z to 0.7.0 behind Sheaf's back.
    let mut current = BTreeMap::new();
    current.insert(PackageName::new("z"), semver::Version::new(0, 7, 0));

    let plan = diff_against(&current, &target);
    assert!(plan.reinstalls.is_empty());
    assert!(plan.uninstalls.is_empty());
    assert_eq!(plan.fixes, vec![(PackageName::new("z"), semver::Version::new(0, 8, 0))]);

    // The driver reports the fix-up install succeeding.
    let stdout = r#"{"name":"z","before":"0.7.0","after":"0.8.0"}"#;
    let backend = FakeInstallerBackend::new("fake", vec![ok_output(stdout)]);
    let installer = InstallerDriver::new(vec![Box::new(backend)], Duration::from_secs(5));
    let cancel = CancellationToken::new();
    let target_root = tempfile::tempdir().expect("target root");
    let snapshot_dir = tempfile::tempdir().expect("snapshot dir");
    let store = SnapshotStore::open(snapshot_dir.path()).expect("open store");

    let (new_snapshot, final_state) = execute(
        &plan,
        &installer,
        &store,
        &semver::Version::new(3, 11, 0),
        current,
        target_root.path(),
        &cancel,
    )
    .expect("execute revert plan");

    assert_eq!(final_state.get(&PackageName::new("z")), Some(&semver::Version::new(0, 8, 0)));
    assert_eq!(new_snapshot.packages, target.packages);
    assert_ne!(new_snapshot.id, target.id);

    // The committed fix-up step was itself persisted, not only the
    // value returned in-memory — a mid-plan crash would still have
    // left this on disk (spec §4.4).
    assert!(store.load(&new_snapshot.id).is_ok());

    // Reverting again from the now-current state is a no-op plan
    // (spec §8's "revert to the current state" boundary case).
    let noop_plan = diff_against(&final_state, &target);
    assert!(noop_plan.is_empty());
}

#[test]
fn capture_then_mutate_then_revert_round_trips_the_package_map() {
    // snapshot -> mutate -> revert -> snapshot yields two snapshots
    // whose package maps are identical (spec §8 round-trip property).
    let mut initial = BTreeMap::new();
    initial.insert(PackageName::new("w"), semver::Version::new(3, 2, 1));
    let first = capture(semver::Version::new(3, 11, 0), initial.clone(), None).expect("first capture");

    let mut mutated = initial.clone();
    mutated.insert(PackageName::new("w"), semver::Version::new(4, 0, 0));

    let plan = diff_against(&mutated, &first);
    assert_eq!(plan.fixes, vec![(PackageName::new("w"), semver::Version::new(3, 2, 1))]);

    let stdout = r#"{"name":"w","before":"4.0.0","after":"3.2.1"}"#;
    let backend = FakeInstallerBackend::new("fake", vec![ok_output(stdout)]);
    let installer = InstallerDriver::new(vec![Box::new(backend)], Duration::from_secs(5));
    let cancel = CancellationToken::new();
    let target_root = tempfile::tempdir().expect("target root");
    let snapshot_dir = tempfile::tempdir().expect("snapshot dir");
    let store = SnapshotStore::open(snapshot_dir.path()).expect("open store");

    let (second, final_state) = execute(
        &plan,
        &installer,
        &store,
        &semver::Version::new(3, 11, 0),
        mutated,
        target_root.path(),
        &cancel,
    )
    .expect("execute revert");

    assert_eq!(final_state, initial);
    assert_eq!(second.packages, first.packages);
    assert_ne!(second.id, SnapshotId(String::new()));
}
