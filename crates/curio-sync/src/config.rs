//! # Sync Engine Configuration
//!
//! TOML-backed configuration for the engine: device identity plus sync
//! cadence knobs.
//!
//! ## File Location
//! `~/.config/curio/engine.toml` on Linux (per the `directories` crate's
//! platform conventions). A missing file yields defaults with a freshly
//! generated device id; the file is written back so the id is stable across
//! restarts.
//!
//! ## Example File
//! ```toml
//! [device]
//! id = "dev-9f2c81aa"
//! name = "workshop-laptop"
//!
//! [sync]
//! auto_sync_interval_secs = 30
//! connectivity_poll_secs = 5
//! retry_ceiling = 3
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Configuration Types
// =============================================================================

/// Device identity section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Stable device identifier, written into `last_modified_by` on every
    /// local mutation.
    pub id: String,

    /// Human-readable device name for logs and diagnostics.
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let short = Uuid::new_v4().simple().to_string();
        DeviceConfig {
            id: format!("dev-{}", &short[..8]),
            name: "curio-device".to_string(),
        }
    }
}

/// Sync cadence section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Seconds between automatic full syncs while online.
    pub auto_sync_interval_secs: u64,

    /// Seconds between connectivity probe polls.
    pub connectivity_poll_secs: u64,

    /// Replay attempts before a mutation parks as Failed.
    pub retry_ceiling: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            auto_sync_interval_secs: 30,
            connectivity_poll_secs: 5,
            retry_ceiling: curio_core::DEFAULT_RETRY_CEILING,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EngineConfig {
    pub device: DeviceConfig,
    pub sync: SyncConfig,
}

impl EngineConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }
        if self.sync.auto_sync_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.auto_sync_interval_secs must be at least 1".into(),
            ));
        }
        if self.sync.connectivity_poll_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.connectivity_poll_secs must be at least 1".into(),
            ));
        }
        if self.sync.retry_ceiling == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.retry_ceiling must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path for this platform.
    pub fn default_path() -> SyncResult<PathBuf> {
        let dirs = ProjectDirs::from("app", "curio", "curio").ok_or_else(|| {
            SyncError::ConfigLoadFailed("could not determine config directory".into())
        })?;
        Ok(dirs.config_dir().join("engine.toml"))
    }

    /// Loads configuration from a file, falling back to defaults.
    ///
    /// A missing file is not an error: defaults (with a fresh device id) are
    /// generated and saved so the id stays stable. A file that exists but
    /// fails to parse IS an error, so a typo can't silently regenerate the
    /// device identity.
    pub fn load_or_default(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "No config file found, generating defaults");
            let config = EngineConfig::default();
            config.save(path)?;
            return Ok(config);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
        let config: EngineConfig =
            toml::from_str(&raw).map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
        config.validate()?;

        info!(
            device_id = %config.device.id,
            path = %path.display(),
            "Loaded engine configuration"
        );
        Ok(config)
    }

    /// Saves configuration to a file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let raw =
            toml::to_string_pretty(self).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(path = %path.display(), "Saved engine configuration");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert!(config.device.id.starts_with("dev-"));
        assert_eq!(config.sync.retry_ceiling, 3);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = EngineConfig::default();
        config.sync.auto_sync_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(SyncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let raw = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_generates_and_persists_defaults() {
        let dir = std::env::temp_dir().join(format!("curio-test-{}", Uuid::new_v4()));
        let path = dir.join("engine.toml");

        let first = EngineConfig::load_or_default(&path).unwrap();
        let second = EngineConfig::load_or_default(&path).unwrap();

        // Device id must survive restarts
        assert_eq!(first.device.id, second.device.id);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("curio-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        assert!(matches!(
            EngineConfig::load_or_default(&path),
            Err(SyncError::ConfigLoadFailed(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
