//! # Dedup correctness and concurrent-build coalescing
//!
//! **What**: drives `BubbleBuilder::build` through a real filesystem
//! (not the empty stage roots the in-crate unit tests use), reproducing
//! spec §8 scenarios 5 and 6 end to end.
//!
//! **How**: [`RealFileInstallerBackend`] is a scripted
//! [`InstallerBackend`] that, unlike [`sheaf_installer::fake::FakeInstallerBackend`],
//! actually writes the staged package's files into `cwd` before
//! returning its canned JSON-lines report — standing in for what a real
//! installer subprocess does as a side effect, which a purely-scripted
//! double has no reason to do. This lets `diff`/`materialize` see real
//! bytes to compare against the main environment.
//!
//! **Why**: neither `builder.rs`'s own unit tests nor `diff.rs`'s or
//! `materialize.rs`'s exercise dedup through the public `build()` entry
//! point with a byte-identical main-environment file in place, and none
//! exercise two *concurrently running threads* racing the same
//! `(name, version)` bubble build — both are literal scenarios in
//! spec §8.

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use sheaf_bubble::verify::{ImportVerifier, VerifyOutcome};
use sheaf_bubble::{BubbleBuildPolicy, BubbleBuilder};
use sheaf_core::config::DedupPolicy;
use sheaf_core::types::{DedupMode, ManifestEntryKind, PackageName};
use sheaf_core::CancellationToken;
use sheaf_installer::backend::InstallerBackend;
use sheaf_installer::error::InstallerError;
use sheaf_installer::types::InstallerOutput;
use sheaf_installer::InstallerDriver;
use sheaf_kb::FastBackend;
use std::path::Path;
use std::sync::Barrier;
use std::time::Duration;

struct RealFileInstallerBackend {
    report: String,
    files: Vec<(&'static str, &'static [u8])>,
}

impl InstallerBackend for RealFileInstallerBackend {
    fn name(&self) -> &str {
        "real-file-fake"
    }

    fn probe(&self) -> Result<(), InstallerError> {
        Ok(())
    }

    fn run(
        &self,
        _args: &[String],
        cwd: &Path,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> Result<InstallerOutput, InstallerError> {
        for (relative_path, contents) in &self.files {
            let dest = cwd.join(relative_path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InstallerError::InstallerProtocolError(e.to_string()))?;
            }
            std::fs::write(&dest, contents)
                .map_err(|e| InstallerError::InstallerProtocolError(e.to_string()))?;
        }
        Ok(InstallerOutput { status_code: Some(0), stdout: self.report.clone(), stderr: String::new() })
    }
}

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

fn policy() -> BubbleBuildPolicy {
    BubbleBuildPolicy {
        dedup_policy: DedupPolicy::Conservative,
        dedup_mode: DedupMode::ManifestRef,
        native_package_list: vec![],
        max_repair_attempts: 3,
    }
}

#[test]
fn scenario_6_dedup_correctness_against_a_real_main_environment_file() {
    let main = tempfile::tempdir().expect("main");
    let bubbles = tempfile::tempdir().expect("bubbles");

    // `p`'s 5.0.0 body is byte-identical to what 5.1.0 already has on
    // disk in the main environment for `helpers.py`, but carries its
    // own distinct `p/__init__.py`.
    std::fs::write(main.path().join("helpers.py"), b"def helper(): pass\n").expect("main helpers.py");

    let backend = RealFileInstallerBackend {
        report: r#"{"name":"p","before":"5.1.0","after":"5.0.0"}"#.to_string(),
        files: vec![
            ("helpers.py", b"def helper(): pass\n"),
            ("p/__init__.py", b"__version__ = '5.0.0'\n"),
        ],
    };
    let installer = InstallerDriver::new(vec![Box::new(backend)], Duration::from_secs(5));
    let kb = FastBackend::in_memory();
    let verifier = AlwaysOkVerifier;
    let builder = BubbleBuilder::new(&kb, &installer, &verifier, policy());
    let cancel = CancellationToken::new();

    let handle = builder
        .build(
            &PackageName::new("p"),
            &semver::Version::new(5, 0, 0),
            &semver::Version::new(5, 1, 0),
            &["p".to_string()],
            main.path(),
            bubbles.path(),
            &cancel,
        )
        .expect("build p==5.0.0 over p==5.1.0");

    assert!(!handle.was_coalesced);
    assert_eq!(handle.bubble.version, semver::Version::new(5, 0, 0));

    let shared_entry = handle
        .bubble
        .manifest
        .entries
        .iter()
        .find(|e| e.relative_path == Path::new("helpers.py"))
        .expect("helpers.py entry present in manifest");
    assert_eq!(shared_entry.kind, ManifestEntryKind::DedupRef);
    assert!(
        !handle.bubble.root_path.join("helpers.py").exists(),
        "a dedup-ref entry must not copy bytes into the bubble root"
    );
    assert!(handle.dedup_savings > 0, "scenario 6 expects reported space savings > 0");

    let own_entry = handle
        .bubble
        .manifest
        .entries
        .iter()
        .find(|e| e.relative_path == Path::new("p/__init__.py"))
        .expect("p/__init__.py entry present in manifest");
    assert_eq!(own_entry.kind, ManifestEntryKind::File);
    assert!(handle.bubble.root_path.join("p/__init__.py").exists());
}

#[test]
fn scenario_5_concurrent_build_requests_coalesce_to_one_commit() {
    let main = tempfile::tempdir().expect("main");
    let bubbles = tempfile::tempdir().expect("bubbles");

    let backend = RealFileInstallerBackend {
        report: r#"{"name":"w","before":"4.0.0","after":"3.2.1"}"#.to_string(),
        files: vec![("w/__init__.py", b"__version__ = '3.2.1'\n")],
    };
    let installer = InstallerDriver::new(vec![Box::new(backend)], Duration::from_secs(5));
    let kb = FastBackend::in_memory();
    let verifier = AlwaysOkVerifier;
    let builder = BubbleBuilder::new(&kb, &installer, &verifier, policy());

    let barrier = Barrier::new(2);
    let main_path = main.path();
    let bubbles_path = bubbles.path();

    // `thread::scope` rather than `thread::spawn`: the builder borrows
    // `kb`/`installer`/`verifier` with a non-`'static` lifetime, which
    // only a scoped thread (guaranteed to join before this block ends)
    // can soundly capture by reference.
    let (first, second) = std::thread::scope(|scope| {
        let run = || {
            barrier.wait();
            let cancel = CancellationToken::new();
            builder.build(
                &PackageName::new("w"),
                &semver::Version::new(3, 2, 1),
                &semver::Version::new(4, 0, 0),
                &["w".to_string()],
                main_path,
                bubbles_path,
                &cancel,
            )
        };
        let t1 = scope.spawn(run);
        let t2 = scope.spawn(run);
        (
            t1.join().expect("thread 1 joined").expect("thread 1 build"),
            t2.join().expect("thread 2 joined").expect("thread 2 build"),
        )
    });

    // Exactly one of the two requests actually built; the other
    // coalesced onto the same committed bubble (spec §8 scenario 5).
    assert_ne!(first.was_coalesced, second.was_coalesced);
    assert_eq!(first.bubble.created_at, second.bubble.created_at);
    assert_eq!(first.bubble.version, semver::Version::new(3, 2, 1));

    let versions: Vec<semver::Version> = serde_json::from_value(
        kb.get(&sheaf_kb::KbKey::pkg_versions("w")).expect("versions recorded"),
    )
    .expect("deserialize versions");
    assert_eq!(versions, vec![semver::Version::new(3, 2, 1)], "no duplicate commit from the race");
}
