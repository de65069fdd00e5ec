//! A scripted [`InstallerBackend`] double for tests: returns canned
//! [`InstallerOutput`] without spawning a real process, the seam the
//! Bubble Builder and Snapshot/Revert test suites build their
//! end-to-end scenarios on (spec §8).

use crate::backend::InstallerBackend;
use crate::error::InstallerError;
use crate::types::InstallerOutput;
use parking_lot::Mutex;
use sheaf_core::CancellationToken;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

/// Replays a fixed queue of [`InstallerOutput`]s, one per `run` call, so
/// a test can script an exact installer conversation.
pub struct FakeInstallerBackend {
    name: String,
    probe_ok: bool,
    scripted: Mutex<VecDeque<InstallerOutput>>,
}

impl FakeInstallerBackend {
    /// A fake that answers `probe` successfully and serves `scripted`
    /// outputs to successive `run` calls in order.
    pub fn new(name: impl Into<String>, scripted: Vec<InstallerOutput>) -> Self {
        Self { name: name.into(), probe_ok: true, scripted: Mutex::new(scripted.into()) }
    }

    /// A fake whose `probe` always fails, for testing installer
    /// fallback through `installer_priority`.
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self { name: name.into(), probe_ok: false, scripted: Mutex::new(VecDeque::new()) }
    }
}

impl InstallerBackend for FakeInstallerBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Result<(), InstallerError> {
        if self.probe_ok {
            Ok(())
        } else {
            Err(InstallerError::NoInstallerAvailable)
        }
    }

    fn run(
        &self,
        _args: &[String],
        _cwd: &Path,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<InstallerOutput, InstallerError> {
        if cancel.is_cancelled() {
            return Err(InstallerError::Cancelled);
        }
        self.scripted.lock().pop_front().ok_or_else(|| {
            InstallerError::InstallerProtocolError("fake installer exhausted its script".into())
        })
    }
}

/// Build a successful [`InstallerOutput`] with a JSON-lines body, the
/// shape the Installer Driver expects to parse.
pub fn ok_output(stdout: impl Into<String>) -> InstallerOutput {
    InstallerOutput { status_code: Some(0), stdout: stdout.into(), stderr: String::new() }
}

/// Build a failing [`InstallerOutput`] with the given stderr.
pub fn failed_output(code: i32, stderr: impl Into<String>) -> InstallerOutput {
    InstallerOutput { status_code: Some(code), stdout: String::new(), stderr: stderr.into() }
}
