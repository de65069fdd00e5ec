//! The cross-process advisory filesystem lock (spec §5): serializes
//! operations that mutate the main environment. Held only during the
//! stage/materialize/restore phases, never during network or resolve
//! phases.

use crate::error::BubbleError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A held exclusive lock on `<install_root>/.sheaf.lock` (spec §6). Its
/// `Drop` releases the OS-level advisory lock unconditionally.
pub struct InstallRootLock {
    file: File,
    path: PathBuf,
}

impl InstallRootLock {
    /// Block (polling `timeout`) until the lock at `install_root` is
    /// acquired, or return `Locked` once `timeout` elapses.
    pub fn acquire(install_root: &Path, timeout: Duration) -> Result<Self, BubbleError> {
        let path = install_root.join(".sheaf.lock");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).write(true).open(&path)?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(_) if start.elapsed() < timeout => std::thread::sleep(POLL_INTERVAL),
                Err(_) => {
                    let held_since = std::fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .map(|t| format!("{t:?}"))
                        .unwrap_or_else(|_| "unknown".to_string());
                    return Err(BubbleError::Locked(held_since));
                }
            }
        }
    }

    /// Path of the lock file this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallRootLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_times_out_while_first_is_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let _first = InstallRootLock::acquire(dir.path(), Duration::from_secs(5)).expect("first lock");
        let second = InstallRootLock::acquire(dir.path(), Duration::from_millis(250));
        assert!(matches!(second, Err(BubbleError::Locked(_))));
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let _lock = InstallRootLock::acquire(dir.path(), Duration::from_secs(5)).expect("lock");
        }
        let reacquired = InstallRootLock::acquire(dir.path(), Duration::from_secs(1));
        assert!(reacquired.is_ok());
    }
}
