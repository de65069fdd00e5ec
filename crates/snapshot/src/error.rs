//! Snapshot/Revert Engine error taxonomy (spec §4.4, §7).

use sheaf_installer::InstallerError;

/// Errors raised capturing, storing, or reverting to a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// No snapshot file exists for the requested id.
    #[error("no snapshot found with id '{0}'")]
    NotFound(String),

    /// A revert step's install/uninstall failed; execution halts and
    /// the partially-applied state is recorded in a new snapshot
    /// (spec §4.4).
    #[error(transparent)]
    Install(#[from] InstallerError),

    /// A snapshot file failed to (de)serialize.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation's `CancellationToken` was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// An underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
