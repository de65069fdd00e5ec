//! `InstallerDriver`: owns the subprocess relationship with the
//! ecosystem's native installer (spec §4.2).

use crate::backend::InstallerBackend;
use crate::error::InstallerError;
use crate::reorder::version_reorder;
use crate::types::{
    ChangeKind, EnvironmentView, PackageChange, PreflightOutcome, Requirement, StagedResult,
};
use sheaf_core::CancellationToken;
use std::path::Path;
use std::time::Duration;

/// One line of the installer's machine-readable JSON-lines report, as
/// the process backend parses it out of captured stdout.
#[derive(Debug, Clone, serde::Deserialize)]
struct ReportLine {
    name: String,
    before: Option<String>,
    after: Option<String>,
}

/// Drives the configured installer through preflight, staging, and
/// version reordering (spec §4.2).
pub struct InstallerDriver {
    /// Backends tried in `installer_priority` order; the first whose
    /// `probe()` succeeds is used for the remainder of this driver's
    /// lifetime.
    candidates: Vec<Box<dyn InstallerBackend>>,
    default_timeout: Duration,
}

impl InstallerDriver {
    /// Construct a driver over `candidates`, tried in order.
    pub fn new(candidates: Vec<Box<dyn InstallerBackend>>, default_timeout: Duration) -> Self {
        Self { candidates, default_timeout }
    }

    /// Probe each candidate in priority order, returning the first that
    /// responds. Cached by callers that want to avoid re-probing within
    /// a TTL window (spec §4.2); this method itself always re-probes.
    pub fn select_backend(&self) -> Result<&dyn InstallerBackend, InstallerError> {
        for candidate in &self.candidates {
            if candidate.probe().is_ok() {
                log::debug!("installer driver selected backend '{}'", candidate.name());
                return Ok(candidate.as_ref());
            }
        }
        Err(InstallerError::NoInstallerAvailable)
    }

    /// Cheap check against current environment metadata (spec §4.2).
    /// Must complete without invoking the installer subprocess at all;
    /// it only compares `requirements` against `current`.
    pub fn preflight(
        &self,
        requirements: &[Requirement],
        current: &EnvironmentView,
    ) -> PreflightOutcome {
        let delta: Vec<Requirement> = requirements
            .iter()
            .filter(|req| current.get(&req.name) != Some(&req.version))
            .cloned()
            .collect();

        if delta.is_empty() {
            PreflightOutcome::Satisfied
        } else {
            PreflightOutcome::NeedsWork { delta }
        }
    }

    /// Sort `requirements` newest-first per package name, preserving
    /// first-seen group order (spec §4.2's Reorder-and-Diff algorithm).
    pub fn version_reorder(&self, requirements: &[Requirement]) -> Vec<Requirement> {
        version_reorder(requirements)
    }

    /// Stage `requirements` into `target_root` using the selected
    /// backend, then diff against `current` to classify every changed
    /// package (spec §4.2).
    pub fn stage(
        &self,
        requirements: &[Requirement],
        current: &EnvironmentView,
        target_root: &Path,
        cancel: &CancellationToken,
    ) -> Result<StagedResult, InstallerError> {
        let backend = self.select_backend()?;
        let reordered = self.version_reorder(requirements);

        let args: Vec<String> = std::iter::once("install".to_string())
            .chain(reordered.iter().map(|r| format!("{}=={}", r.name, r.version)))
            .chain(std::iter::once(format!("--target={}", target_root.display())))
            .collect();

        let output = backend.run(&args, target_root, self.default_timeout, cancel)?;
        if !output.succeeded() {
            return Err(InstallerError::InstallFailed {
                phase: "stage".to_string(),
                stderr_tail: output.stderr_tail(4096),
            });
        }

        self.parse_staged_result(&output.stdout, current)
    }

    fn parse_staged_result(
        &self,
        stdout: &str,
        current: &EnvironmentView,
    ) -> Result<StagedResult, InstallerError> {
        let mut result = StagedResult::default();

        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            let report: ReportLine = serde_json::from_str(line)
                .map_err(|e| InstallerError::InstallerProtocolError(e.to_string()))?;

            let name = sheaf_core::types::PackageName::new(&report.name);
            let before = report
                .before
                .as_deref()
                .map(semver::Version::parse)
                .transpose()
                .map_err(|e| InstallerError::InstallerProtocolError(e.to_string()))?
                .or_else(|| current.get(&name).cloned());
            let after = report
                .after
                .as_deref()
                .map(semver::Version::parse)
                .transpose()
                .map_err(|e| InstallerError::InstallerProtocolError(e.to_string()))?;

            let kind = classify(before.as_ref(), after.as_ref());
            let change = PackageChange { name, before, after, kind };

            if matches!(kind, ChangeKind::Added | ChangeKind::Downgraded | ChangeKind::Upgraded) {
                result.installed.push(change.clone());
            }
            match kind {
                ChangeKind::Added => result.added.push(change),
                ChangeKind::Upgraded => result.upgraded.push(change),
                ChangeKind::Downgraded => result.downgraded.push(change),
                ChangeKind::Removed => result.removed.push(change),
                ChangeKind::Unchanged => {}
            }
        }
        Ok(result)
    }
}

fn classify(before: Option<&semver::Version>, after: Option<&semver::Version>) -> ChangeKind {
    match (before, after) {
        (None, Some(_)) => ChangeKind::Added,
        (Some(_), None) => ChangeKind::Removed,
        (Some(b), Some(a)) if a > b => ChangeKind::Upgraded,
        (Some(b), Some(a)) if a < b => ChangeKind::Downgraded,
        _ => ChangeKind::Unchanged,
    }
}
