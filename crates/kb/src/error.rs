//! The KB's error taxonomy (spec §4.1, §7).

/// Errors raised by a [`crate::KbBackend`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum KbError {
    /// No value is recorded for the requested key.
    #[error("no value recorded for key '{0}'")]
    NotFound(String),

    /// Another writer committed against this key group between this
    /// transaction's read and write phase. Callers retry a bounded
    /// number of times (spec §7) before surfacing the error.
    #[error("write conflict on key group {0:?}")]
    Conflict(Vec<String>),

    /// The selected backend could not be reached at startup. Fatal;
    /// triggers fallback to the embedded backend (spec §4.1).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The on-disk schema version does not match this build's expected
    /// version. Triggers `rebuild_kb` (spec §4.7).
    #[error("schema mismatch: found {found}, expected {expected}")]
    SchemaMismatch {
        /// Schema version found on disk.
        found: u32,
        /// Schema version this build expects.
        expected: u32,
    },

    /// A value could not be (de)serialized to/from its stored form.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The embedded backend's underlying SQLite store reported an error.
    #[error("embedded backend error: {0}")]
    Embedded(#[from] rusqlite::Error),

    /// An underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
