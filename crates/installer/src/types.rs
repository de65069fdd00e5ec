//! Data types shared by `preflight`, `stage`, and `version_reorder`
//! (spec §4.2).

use serde::{Deserialize, Serialize};
use sheaf_core::types::PackageName;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A single `(name, version)` install requirement, as parsed from a CLI
/// spec like `X==2.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// The package this requirement targets.
    pub name: PackageName,
    /// The exact version requested. Sheaf always resolves to an exact
    /// pin before it reaches the Installer Driver; range resolution is
    /// delegated to the ecosystem installer during `stage` (spec §1
    /// Non-goals).
    pub version: semver::Version,
}

impl Requirement {
    /// Construct a requirement.
    pub fn new(name: impl Into<PackageName>, version: semver::Version) -> Self {
        Self { name: name.into(), version }
    }
}

/// Outcome of a cheap `preflight` check against current environment
/// metadata (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreflightOutcome {
    /// Every requirement is already met by the current environment
    /// (main or an existing bubble); `stage` need not run.
    Satisfied,
    /// At least one requirement is unmet; `delta` lists exactly which.
    NeedsWork {
        /// The requirements not already satisfied.
        delta: Vec<Requirement>,
    },
}

/// How `stage` classified one package's before/after state (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Not previously present; now present.
    Added,
    /// Present before and after, but moved to a newer version.
    Upgraded,
    /// Present before and after, but moved to an older version — the
    /// trigger condition for bubble creation (spec §4.3).
    Downgraded,
    /// Present before, absent after.
    Removed,
    /// Present before and after at the same version; installed as a
    /// dependency side effect but otherwise unchanged.
    Unchanged,
}

/// One package's before/after versions and classification, as reported
/// by a `stage` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageChange {
    /// Which package changed.
    pub name: PackageName,
    /// Version before staging, if any.
    pub before: Option<semver::Version>,
    /// Version after staging, if any.
    pub after: Option<semver::Version>,
    /// How the installer driver classified the change.
    pub kind: ChangeKind,
}

/// The result of staging a set of requirements into a target root
/// (spec §4.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedResult {
    /// Packages newly installed into the target root.
    pub installed: Vec<PackageChange>,
    /// Packages whose version moved backward.
    pub downgraded: Vec<PackageChange>,
    /// Packages whose version moved forward.
    pub upgraded: Vec<PackageChange>,
    /// Packages present for the first time as a side effect of
    /// resolving the requested requirements.
    pub added: Vec<PackageChange>,
    /// Packages that were removed entirely.
    pub removed: Vec<PackageChange>,
}

impl StagedResult {
    /// Every change this stage call produced, regardless of kind.
    pub fn all_changes(&self) -> impl Iterator<Item = &PackageChange> {
        self.installed
            .iter()
            .chain(&self.downgraded)
            .chain(&self.upgraded)
            .chain(&self.added)
            .chain(&self.removed)
    }
}

/// Raw captured output from one installer subprocess invocation.
#[derive(Debug, Clone)]
pub struct InstallerOutput {
    /// Process exit status code, if the process ran to completion.
    pub status_code: Option<i32>,
    /// Captured stdout, expected to be the installer's machine-readable
    /// report format (JSON-lines).
    pub stdout: String,
    /// Captured stderr, used to build `InstallFailed::stderr_tail`.
    pub stderr: String,
}

impl InstallerOutput {
    /// Whether the process exited successfully.
    pub fn succeeded(&self) -> bool {
        self.status_code == Some(0)
    }

    /// The last `n` bytes of stderr, on a UTF-8 boundary.
    pub fn stderr_tail(&self, n: usize) -> String {
        if self.stderr.len() <= n {
            return self.stderr.clone();
        }
        let start = self.stderr.len() - n;
        let boundary = (start..self.stderr.len())
            .find(|&i| self.stderr.is_char_boundary(i))
            .unwrap_or(self.stderr.len());
        self.stderr[boundary..].to_string()
    }
}

/// The name of a configured installer tool (e.g. `"pip"`, `"uv"`),
/// tried in `installer_priority` order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstallerName(pub String);

/// A target root for `stage`, isolated from the main environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRoot(pub PathBuf);

/// Snapshot of `(name -> version)` used by `preflight` to decide
/// satisfaction without invoking a subprocess.
pub type EnvironmentView = BTreeMap<PackageName, semver::Version>;
