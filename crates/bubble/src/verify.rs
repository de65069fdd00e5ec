//! Step 5 of the Bubble Builder protocol: smoke-import every declared
//! top-level module inside an isolated sub-process, classify failures,
//! and apply targeted repairs (spec §4.3).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How a smoke-import attempt failed, classified from the harness
/// process's output (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    /// The top-level module itself could not be found.
    ModuleNotFound(String),
    /// The module imported but a declared symbol was missing.
    SymbolNotFound { module: String, symbol: String },
    /// A native extension's ABI did not match the running interpreter.
    AbiMismatch(String),
    /// An error that doesn't fit the above classes; treated as
    /// unrepairable and surfaced immediately.
    Other(String),
}

/// Result of attempting to import every declared top-level module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Modules that imported successfully.
    pub succeeded: Vec<String>,
    /// Modules that failed, with their classified failure.
    pub failed: Vec<(String, VerifyFailure)>,
}

impl VerifyOutcome {
    /// Whether every declared module imported cleanly.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the smoke-import harness inside a subprocess configured to see
/// only the bubble root plus the main environment. A real
/// implementation shells out to the target interpreter with a small
/// harness script; tests substitute a scripted double.
pub trait ImportVerifier: Send + Sync {
    /// Attempt to import every module in `modules`, with `bubble_root`
    /// and `main_root` on the search path.
    fn verify(
        &self,
        modules: &[String],
        bubble_root: &Path,
        main_root: &Path,
    ) -> std::io::Result<VerifyOutcome>;
}

/// One targeted repair action, derived from a classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// Copy `relative_path` from the stage root into the bubble, since
    /// it was wrongly classified as dedup-eligible or skipped.
    CopyFromStage { relative_path: PathBuf },
    /// Mark the bubble as needing a companion bubble for `dependency`,
    /// because the missing symbol/module actually lives in a
    /// dependency whose version was assumed compatible.
    NeedsCompanionBubble { dependency: String },
}

/// Derive a repair plan from a verify outcome. Each failed module maps
/// to exactly one repair attempt; `ModuleNotFound`/`AbiMismatch`
/// failures are repaired by copying the missing file from the stage
/// root, while `SymbolNotFound` implies the dependency providing that
/// symbol needs its own bubble.
pub fn plan_repairs(outcome: &VerifyOutcome) -> Vec<Repair> {
    outcome
        .failed
        .iter()
        .map(|(module, failure)| match failure {
            VerifyFailure::ModuleNotFound(_) | VerifyFailure::AbiMismatch(_) => {
                Repair::CopyFromStage { relative_path: module_to_relative_path(module) }
            }
            VerifyFailure::SymbolNotFound { module: dep, .. } => {
                Repair::NeedsCompanionBubble { dependency: dep.clone() }
            }
            VerifyFailure::Other(_) => {
                Repair::CopyFromStage { relative_path: module_to_relative_path(module) }
            }
        })
        .collect()
}

fn module_to_relative_path(module: &str) -> PathBuf {
    PathBuf::from(module.replace('.', "/"))
}

/// Run verification, applying up to `max_attempts` rounds of targeted
/// repair, copying missing files from `stage_root` back into
/// `bubble_root` between attempts (spec §4.3 step 5).
pub fn verify_with_repair(
    verifier: &dyn ImportVerifier,
    modules: &[String],
    bubble_root: &Path,
    main_root: &Path,
    stage_root: &Path,
    max_attempts: u32,
) -> std::io::Result<(VerifyOutcome, u32, HashSet<String>)> {
    let mut needs_companion = HashSet::new();
    let mut attempt = 0;

    loop {
        let outcome = verifier.verify(modules, bubble_root, main_root)?;
        if outcome.is_success() {
            return Ok((outcome, attempt, needs_companion));
        }

        attempt += 1;
        if attempt >= max_attempts {
            return Ok((outcome, attempt, needs_companion));
        }

        for repair in plan_repairs(&outcome) {
            match repair {
                Repair::CopyFromStage { relative_path } => {
                    let source = stage_root.join(&relative_path);
                    let dest = bubble_root.join(&relative_path);
                    if source.exists() {
                        if let Some(parent) = dest.parent() {
                            std::fs::create_dir_all(parent)?;
                        }
                        copy_recursive(&source, &dest)?;
                    }
                }
                Repair::NeedsCompanionBubble { dependency } => {
                    needs_companion.insert(dependency);
                }
            }
        }
    }
}

fn copy_recursive(source: &Path, dest: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        std::fs::create_dir_all(dest)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(source, dest).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedVerifier {
        outcomes: Mutex<Vec<VerifyOutcome>>,
    }

    impl ImportVerifier for ScriptedVerifier {
        fn verify(
            &self,
            _modules: &[String],
            _bubble_root: &Path,
            _main_root: &Path,
        ) -> std::io::Result<VerifyOutcome> {
            Ok(self.outcomes.lock().unwrap_or_else(|p| p.into_inner()).remove(0))
        }
    }

    #[test]
    fn success_on_first_attempt_needs_no_repair() {
        let verifier = ScriptedVerifier {
            outcomes: Mutex::new(vec![VerifyOutcome {
                succeeded: vec!["pkg".into()],
                failed: vec![],
            }]),
        };
        let (outcome, attempts, companions) = verify_with_repair(
            &verifier,
            &["pkg".into()],
            Path::new("/bubble"),
            Path::new("/main"),
            Path::new("/stage"),
            3,
        )
        .expect("verify");
        assert!(outcome.is_success());
        assert_eq!(attempts, 0);
        assert!(companions.is_empty());
    }

    #[test]
    fn module_not_found_is_repaired_by_copying_from_stage() {
        let stage = tempfile::tempdir().expect("stage");
        let bubble = tempfile::tempdir().expect("bubble");
        std::fs::write(stage.path().join("pkg"), b"module bytes").expect("write stage file");

        let verifier = ScriptedVerifier {
            outcomes: Mutex::new(vec![
                VerifyOutcome {
                    succeeded: vec![],
                    failed: vec![("pkg".into(), VerifyFailure::ModuleNotFound("pkg".into()))],
                },
                VerifyOutcome { succeeded: vec!["pkg".into()], failed: vec![] },
            ]),
        };

        let (outcome, attempts, _) = verify_with_repair(
            &verifier,
            &["pkg".into()],
            bubble.path(),
            Path::new("/main"),
            stage.path(),
            3,
        )
        .expect("verify");

        assert!(outcome.is_success());
        assert_eq!(attempts, 1);
        assert!(bubble.path().join("pkg").exists());
    }

    #[test]
    fn symbol_not_found_requests_a_companion_bubble_without_exhausting_attempts() {
        let verifier = ScriptedVerifier {
            outcomes: Mutex::new(vec![VerifyOutcome {
                succeeded: vec![],
                failed: vec![(
                    "pkg".into(),
                    VerifyFailure::SymbolNotFound { module: "dep".into(), symbol: "frobnicate".into() },
                )],
            }]),
        };
        let repairs = plan_repairs(&verifier.outcomes.lock().unwrap_or_else(|p| p.into_inner())[0]);
        assert_eq!(repairs, vec![Repair::NeedsCompanionBubble { dependency: "dep".into() }]);
    }

    #[test]
    fn exhausting_attempts_surfaces_the_last_outcome() {
        let verifier = ScriptedVerifier {
            outcomes: Mutex::new(vec![
                VerifyOutcome {
                    succeeded: vec![],
                    failed: vec![("pkg".into(), VerifyFailure::Other("boom".into()))],
                },
                VerifyOutcome {
                    succeeded: vec![],
                    failed: vec![("pkg".into(), VerifyFailure::Other("boom again".into()))],
                },
            ]),
        };
        let (outcome, attempts, _) = verify_with_repair(
            &verifier,
            &["pkg".into()],
            Path::new("/bubble"),
            Path::new("/main"),
            Path::new("/stage"),
            2,
        )
        .expect("verify");
        assert!(!outcome.is_success());
        assert_eq!(attempts, 2);
    }
}
