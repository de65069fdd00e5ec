//! Runtime Loader Protocol error taxonomy (spec §4.5, §7).

/// Errors raised while activating or deactivating a bubble.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// No bubble manifest exists for the requested `(name, version)`.
    /// Returned before any stack mutation (spec §8's boundary case:
    /// lookup happens before push).
    #[error("no bubble found for {name}=={version}")]
    BubbleNotFound {
        /// Requested package name.
        name: String,
        /// Requested version.
        version: semver::Version,
    },

    /// The activation stack was empty when a deactivation was attempted
    /// (should be unreachable via the public API, since `ActivationScope`
    /// owns exactly one frame, but guarded defensively).
    #[error("activation stack is empty")]
    StackUnderflow,

    /// An underlying filesystem or environment operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
