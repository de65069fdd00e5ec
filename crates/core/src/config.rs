//! Layered, per-interpreter configuration.
//!
//! Discovery order: explicit path → `$SHEAF_CONFIG` →
//! `<install_root>/.sheaf/config.toml` → built-in defaults. Each layer
//! only overrides keys it actually sets; later layers win.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Knowledge Base backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KbBackendKind {
    /// Prefer the fast in-memory backend if reachable at startup, else
    /// fall back to the embedded backend.
    #[default]
    Auto,
    /// Always use the fast in-memory backend.
    Fast,
    /// Always use the embedded relational backend.
    Embedded,
}

/// Dedup aggressiveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Dedup every byte-identical file, even across loosely-compatible
    /// configurations.
    Aggressive,
    /// Only dedup when the main-environment file is known to be exactly
    /// the file the bubble would otherwise install. Default.
    #[default]
    Conservative,
    /// Never dedup; every bubble is fully self-contained.
    Off,
}

/// The structured configuration document recognized by spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Absolute path to the interpreter's package directory.
    pub install_root: PathBuf,
    /// Absolute path where bubbles are materialized.
    pub bubble_root: PathBuf,
    /// Absolute path where snapshots are written, one file per snapshot.
    pub snapshot_root: PathBuf,
    /// KB backend selection.
    pub kb_backend: KbBackendKind,
    /// Endpoint string for the fast backend (e.g. a local socket path).
    pub kb_endpoint: Option<String>,
    /// Ordered list of installer tool names the driver will try.
    pub installer_priority: Vec<String>,
    /// Locale for user-facing messages.
    pub language_code: String,
    /// Dedup aggressiveness.
    pub dedup_policy: DedupPolicy,
    /// Package names excluded from dedup regardless of hash match
    /// (typically packages with platform-specific compiled objects).
    pub native_package_list: Vec<String>,
    /// Maximum targeted-repair attempts before `VerificationFailed` is
    /// surfaced.
    pub max_repair_attempts: u32,
    /// `log` level filter, e.g. `"warn"`, `"debug"`.
    pub log_level: String,
    /// Idle timeout, in seconds, before a worker daemon process exits.
    pub daemon_idle_timeout_secs: u64,
    /// Maximum number of concurrently-resident worker processes.
    pub daemon_max_workers: usize,
    /// Seconds to wait on the cross-process advisory filesystem lock
    /// before returning `Locked`.
    pub lock_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("sheaf");
        Self {
            install_root: base.join("main"),
            bubble_root: base.join("bubbles"),
            snapshot_root: base.join("snapshots"),
            kb_backend: KbBackendKind::Auto,
            kb_endpoint: None,
            installer_priority: vec!["pip".to_string(), "uv".to_string()],
            language_code: "en".to_string(),
            dedup_policy: DedupPolicy::Conservative,
            native_package_list: Vec::new(),
            max_repair_attempts: 3,
            log_level: "warn".to_string(),
            daemon_idle_timeout_secs: 300,
            daemon_max_workers: 8,
            lock_timeout_secs: 30,
        }
    }
}

/// Layered configuration loader.
///
/// Mirrors the teacher's `cli/src/config` discovery-and-merge pattern:
/// defaults are constructed first, then each available layer is merged on
/// top in increasing precedence.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    explicit_path: Option<PathBuf>,
    overrides: Vec<(String, String)>,
}

impl ConfigBuilder {
    /// Start a fresh builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this path instead of searching `$SHEAF_CONFIG` or the default
    /// install-root location.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Apply a `KEY=value`-style override, as parsed from the environment
    /// or command-line flags. Keys match the `Config` field names.
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Resolve the final configuration, honoring discovery order.
    pub fn build(self) -> Result<Config, CoreError> {
        let mut config = Config::default();

        let candidate = self
            .explicit_path
            .clone()
            .or_else(|| std::env::var_os("SHEAF_CONFIG").map(PathBuf::from))
            .or_else(|| Some(config.install_root.join(".sheaf").join("config.toml")));

        if let Some(path) = candidate {
            if path.exists() {
                config = Self::merge_file(config, &path)?;
            } else if self.explicit_path.is_some() {
                return Err(CoreError::ConfigNotFound(path.display().to_string()));
            }
        }

        for (key, value) in &self.overrides {
            apply_override(&mut config, key, value)?;
        }

        Ok(config)
    }

    fn merge_file(mut config: Config, path: &Path) -> Result<Config, CoreError> {
        let contents = std::fs::read_to_string(path)?;
        let from_file: TomlConfig = toml::from_str(&contents)?;
        from_file.merge_into(&mut config);
        Ok(config)
    }
}

/// A config document as written to disk: every field optional, so a
/// partial file only overrides the keys it sets.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
struct TomlConfig {
    install_root: Option<PathBuf>,
    bubble_root: Option<PathBuf>,
    snapshot_root: Option<PathBuf>,
    kb_backend: Option<KbBackendKind>,
    kb_endpoint: Option<String>,
    installer_priority: Option<Vec<String>>,
    language_code: Option<String>,
    dedup_policy: Option<DedupPolicy>,
    native_package_list: Option<Vec<String>>,
    max_repair_attempts: Option<u32>,
    log_level: Option<String>,
    daemon_idle_timeout_secs: Option<u64>,
    daemon_max_workers: Option<usize>,
    lock_timeout_secs: Option<u64>,
}

impl TomlConfig {
    fn merge_into(self, config: &mut Config) {
        if let Some(v) = self.install_root {
            config.install_root = v;
        }
        if let Some(v) = self.bubble_root {
            config.bubble_root = v;
        }
        if let Some(v) = self.snapshot_root {
            config.snapshot_root = v;
        }
        if let Some(v) = self.kb_backend {
            config.kb_backend = v;
        }
        if self.kb_endpoint.is_some() {
            config.kb_endpoint = self.kb_endpoint;
        }
        if let Some(v) = self.installer_priority {
            config.installer_priority = v;
        }
        if let Some(v) = self.language_code {
            config.language_code = v;
        }
        if let Some(v) = self.dedup_policy {
            config.dedup_policy = v;
        }
        if let Some(v) = self.native_package_list {
            config.native_package_list = v;
        }
        if let Some(v) = self.max_repair_attempts {
            config.max_repair_attempts = v;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
        if let Some(v) = self.daemon_idle_timeout_secs {
            config.daemon_idle_timeout_secs = v;
        }
        if let Some(v) = self.daemon_max_workers {
            config.daemon_max_workers = v;
        }
        if let Some(v) = self.lock_timeout_secs {
            config.lock_timeout_secs = v;
        }
    }
}

fn apply_override(config: &mut Config, key: &str, value: &str) -> Result<(), CoreError> {
    match key {
        "install_root" => config.install_root = PathBuf::from(value),
        "bubble_root" => config.bubble_root = PathBuf::from(value),
        "snapshot_root" => config.snapshot_root = PathBuf::from(value),
        "kb_endpoint" => config.kb_endpoint = Some(value.to_string()),
        "language_code" => config.language_code = value.to_string(),
        "log_level" => config.log_level = value.to_string(),
        "kb_backend" => {
            config.kb_backend = match value {
                "auto" => KbBackendKind::Auto,
                "fast" => KbBackendKind::Fast,
                "embedded" => KbBackendKind::Embedded,
                other => {
                    return Err(CoreError::ConfigInvalid(format!(
                        "unknown kb_backend override '{other}'"
                    )))
                }
            }
        }
        "dedup_policy" => {
            config.dedup_policy = match value {
                "aggressive" => DedupPolicy::Aggressive,
                "conservative" => DedupPolicy::Conservative,
                "off" => DedupPolicy::Off,
                other => {
                    return Err(CoreError::ConfigInvalid(format!(
                        "unknown dedup_policy override '{other}'"
                    )))
                }
            }
        }
        other => {
            return Err(CoreError::ConfigInvalid(format!("unknown configuration key '{other}'")))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config::default();
        assert_eq!(config.kb_backend, KbBackendKind::Auto);
        assert_eq!(config.dedup_policy, DedupPolicy::Conservative);
        assert!(config.max_repair_attempts > 0);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = ConfigBuilder::new().with_path("/nonexistent/sheaf.toml").build().unwrap_err();
        assert!(matches!(err, CoreError::ConfigNotFound(_)));
    }

    #[test]
    fn overrides_apply_after_file_layer() {
        let config = ConfigBuilder::new()
            .with_override("log_level", "debug")
            .with_override("dedup_policy", "off")
            .build()
            .expect("build with only overrides should succeed");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.dedup_policy, DedupPolicy::Off);
    }

    #[test]
    fn partial_file_only_overrides_set_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").expect("write config");

        let config = ConfigBuilder::new().with_path(&path).build().expect("build");
        assert_eq!(config.log_level, "debug");
        // Untouched keys keep their defaults.
        assert_eq!(config.dedup_policy, DedupPolicy::Conservative);
    }
}
