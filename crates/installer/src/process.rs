//! `ProcessInstallerBackend`: drives a real installer executable via
//! `std::process::Command`, polling for completion so that cancellation
//! and timeouts can take effect between polls rather than blocking
//! forever on `wait()` (spec §5's suspension-point cancellation).

use crate::backend::InstallerBackend;
use crate::error::InstallerError;
use crate::types::InstallerOutput;
use sheaf_core::CancellationToken;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives a real installer executable on `$PATH`.
pub struct ProcessInstallerBackend {
    name: String,
}

impl ProcessInstallerBackend {
    /// Construct a backend for the installer named `name` (must resolve
    /// on `$PATH`).
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl InstallerBackend for ProcessInstallerBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Result<(), InstallerError> {
        let output = Command::new(&self.name)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if output.success() {
            Ok(())
        } else {
            Err(InstallerError::NoInstallerAvailable)
        }
    }

    fn run(
        &self,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<InstallerOutput, InstallerError> {
        let mut child = Command::new(&self.name)
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InstallerError::Cancelled);
            }
            if start.elapsed() > timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(InstallerError::Timeout(timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)?;
        }
        if let Some(mut err) = child.stderr.take() {
            err.read_to_string(&mut stderr)?;
        }

        Ok(InstallerOutput { status_code: status.code(), stdout, stderr })
    }
}
