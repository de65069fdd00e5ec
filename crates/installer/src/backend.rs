//! The subprocess seam: `InstallerBackend` abstracts over actually
//! spawning the ecosystem's native installer, so tests substitute a
//! fake that returns canned output without spawning a real process —
//! the same seam the teacher uses driving `cargo`/`git` through
//! swappable `std::process::Command` wrappers.

use crate::error::InstallerError;
use crate::types::InstallerOutput;
use sheaf_core::CancellationToken;
use std::path::Path;
use std::time::Duration;

/// A runnable installer tool, real or fake.
pub trait InstallerBackend: Send + Sync {
    /// Name as it appears in `installer_priority` (e.g. `"pip"`).
    fn name(&self) -> &str;

    /// Cheap liveness probe (e.g. `pip --version`), used to pick the
    /// first responsive tool from the priority list.
    fn probe(&self) -> Result<(), InstallerError>;

    /// Run the installer with `args` in `cwd`, honoring `timeout` and
    /// `cancel`. Returns the captured output regardless of exit code;
    /// callers inspect `InstallerOutput::succeeded`.
    fn run(
        &self,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<InstallerOutput, InstallerError>;
}
