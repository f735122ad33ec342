//! Daemon-side configuration for the lock-replicator.
//!
//! The core itself owns no configuration (§6: "No CLI, env vars, or
//! on-disk state is owned by the core") — this crate exists for the
//! embedding daemon, which loads [`LockRepConfig`] once at startup and
//! feeds its values into a `TmContext` implementation and the replicator
//! registry.

mod error;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for overrides (`LOCKREP_RESEND_INTERVAL_MS`,
/// and so on).
pub const ENV_PREFIX: &str = "LOCKREP";

/// Minimum resend interval allowed by §4.3: "implementers may add jitter
/// but must not go below 10 ms."
pub const MIN_RESEND_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockRepConfig {
    /// Minimum time between resends to a disagreeing stub, in monotonic ms.
    pub resend_interval_ms: u64,
    /// Worst-case round-trip time used to derive the GC grace period.
    pub worst_case_rtt_ms: u64,
    /// Process-wide verbose logging flag (§9 "Global debug flag").
    pub debug: bool,
    /// Replication factor the oracle aims for, absent per-key overrides.
    pub desired_replication: usize,
}

impl Default for LockRepConfig {
    fn default() -> Self {
        Self {
            resend_interval_ms: 250,
            worst_case_rtt_ms: 500,
            debug: false,
            desired_replication: 3,
        }
    }
}

impl LockRepConfig {
    /// `>= 2 * worst_case_rtt_ms + resend_interval_ms` (§4.4).
    #[must_use]
    pub const fn gc_grace_period_ms(&self) -> u64 {
        2 * self.worst_case_rtt_ms + self.resend_interval_ms
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.resend_interval_ms < MIN_RESEND_INTERVAL_MS {
            return Err(ConfigError::ValidationError(format!(
                "resend_interval_ms must be >= {MIN_RESEND_INTERVAL_MS}, got {}",
                self.resend_interval_ms
            )));
        }
        if self.desired_replication == 0 {
            return Err(ConfigError::ValidationError(
                "desired_replication must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from an optional TOML file, layered with
    /// `LOCKREP_*` environment variable overrides, on top of
    /// [`LockRepConfig::default`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        let defaults = Self::default();
        builder = builder
            .add_source(config::Config::try_from(&defaults).map_err(|e| ConfigError::BuildError(e.to_string()))?);

        if let Some(path) = path {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::ReadError { path: path.to_path_buf(), source })?;
                builder = builder.add_source(config::File::from_str(&content, config::FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).separator("_").try_parsing(true),
        );

        let built = builder.build().map_err(|e| ConfigError::BuildError(e.to_string()))?;
        let parsed: Self = built.try_deserialize().map_err(|e| ConfigError::DeserializeError(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = LockRepConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gc_grace_period_ms(), 1250);
    }

    #[test]
    fn load_without_file_returns_defaults() {
        let config = LockRepConfig::load(None).unwrap();
        assert_eq!(config, LockRepConfig::default());
    }

    #[test]
    fn load_from_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lockrep.toml");
        fs::write(&path, "resend_interval_ms = 500\ndesired_replication = 5\n").unwrap();

        let config = LockRepConfig::load(Some(&path)).unwrap();
        assert_eq!(config.resend_interval_ms, 500);
        assert_eq!(config.desired_replication, 5);
        assert_eq!(config.worst_case_rtt_ms, 500); // untouched default
    }

    #[test]
    fn rejects_resend_interval_below_floor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lockrep.toml");
        fs::write(&path, "resend_interval_ms = 1\n").unwrap();

        let err = LockRepConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn rejects_zero_desired_replication() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lockrep.toml");
        fs::write(&path, "desired_replication = 0\n").unwrap();

        let err = LockRepConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_a_read_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("lockrep.toml");
        fs::write(&path, "resend_interval_ms = 500\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits, so this assertion only holds when the
        // test itself cannot read the file back.
        if fs::read_to_string(&path).is_ok() {
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
            return;
        }

        let err = LockRepConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    }
}
