//! Shared error type for configuration and registry failures.

/// Errors raised while loading configuration or mutating the interpreter
/// registry.
///
/// Other crates define their own, more specific, error enums; this one
/// only covers the concerns that live in `sheaf_core` itself.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The configuration file could not be found at any of the searched
    /// locations.
    #[error("no configuration file found (searched {0})")]
    ConfigNotFound(String),

    /// The configuration file exists but failed to parse as TOML.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A required configuration key was missing or had an invalid value.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// An interpreter with the given registry id is already adopted.
    #[error("interpreter '{0}' is already registered")]
    InterpreterAlreadyRegistered(String),

    /// No interpreter with the given registry id is known.
    #[error("interpreter '{0}' is not registered")]
    InterpreterNotFound(String),

    /// Removal was refused because the interpreter still has active bubbles.
    #[error("interpreter '{0}' still has {1} bubble(s); remove them first")]
    InterpreterInUse(String, usize),

    /// An underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
