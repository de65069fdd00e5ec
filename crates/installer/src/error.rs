//! Installer Driver error taxonomy (spec §4.2, §7).

/// Errors raised while driving the ecosystem's native installer.
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    /// The requirement spec itself was malformed or named an unknown
    /// package; no retry is attempted.
    #[error("invalid requirement: {0}")]
    UserError(String),

    /// The installer exited nonzero and its stderr was parseable into a
    /// structured message; surfaced with the installer's own message.
    #[error("install failed during {phase}: {stderr_tail}")]
    InstallFailed {
        /// Which phase of the install the failure occurred in
        /// (`"preflight"`, `"stage"`, ...).
        phase: String,
        /// The last 4 KiB of the installer's stderr.
        stderr_tail: String,
    },

    /// The installer exited nonzero but its output could not be parsed
    /// into a structured error at all.
    #[error("installer produced unparseable output: {0}")]
    InstallerProtocolError(String),

    /// No configured installer in `installer_priority` responded to a
    /// `--version` probe within the configured TTL.
    #[error("no installer from the configured priority list is available")]
    NoInstallerAvailable,

    /// The operation's deadline elapsed before the installer finished.
    #[error("installer operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The operation's `CancellationToken` was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// An underlying filesystem or process-spawn operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
