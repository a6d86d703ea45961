//! Configuration management for crablapse
//!
//! Loads and saves the capture and storage settings from a TOML file.

use crate::errors::LapseError;
use crate::paths::MAX_SESSIONS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default spacing between frames.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 5000;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LapseConfig {
    pub capture: CaptureSettings,
    pub storage: StorageSettings,
}

/// Timelapse capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Target spacing between frames in milliseconds
    pub frame_interval_ms: u64,
    /// Exclusive upper bound for session directory indices
    pub max_sessions: u32,
}

/// Storage medium settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Host directory the card is mounted at
    pub root: String,
    /// Create the root on mount instead of reporting a missing card
    pub create_root: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            max_sessions: MAX_SESSIONS,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: "./sdcard".to_string(),
            create_root: false,
        }
    }
}

impl Default for LapseConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl CaptureSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl LapseConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, LapseError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| LapseError::config(format!("Failed to read config file: {}", e)))?;

        let config: LapseConfig = toml::from_str(&contents)
            .map_err(|e| LapseError::config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(LapseError::config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), LapseError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LapseError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| LapseError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| LapseError::config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crablapse.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.capture.frame_interval_ms == 0 {
            return Err("Frame interval must be greater than zero".to_string());
        }
        if self.capture.max_sessions == 0 || self.capture.max_sessions > MAX_SESSIONS {
            return Err(format!("max_sessions must be between 1 and {}", MAX_SESSIONS));
        }
        if self.storage.root.trim().is_empty() {
            return Err("Storage root cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LapseErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = LapseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capture.frame_interval(), Duration::from_secs(5));
        assert_eq!(config.capture.max_sessions, 10_000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = LapseConfig::load_from_file(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, LapseConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("crablapse.toml");

        let mut config = LapseConfig::default();
        config.capture.frame_interval_ms = 250;
        config.storage.root = "/mnt/sdcard".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = LapseConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crablapse.toml");
        fs::write(&path, "[capture]\nframe_interval_ms = 1000\n").unwrap();

        let loaded = LapseConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.capture.frame_interval_ms, 1000);
        assert_eq!(loaded.capture.max_sessions, MAX_SESSIONS);
        assert_eq!(loaded.storage, StorageSettings::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = LapseConfig::default();
        config.capture.frame_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = LapseConfig::default();
        config.capture.max_sessions = MAX_SESSIONS + 1;
        assert!(config.validate().is_err());

        let mut config = LapseConfig::default();
        config.storage.root = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparseable_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crablapse.toml");
        fs::write(&path, "capture = [not toml").unwrap();

        let err = LapseConfig::load_from_file(&path).unwrap_err();
        assert_eq!(err.kind, LapseErrorKind::Config);
        assert!(err.message.contains("Failed to parse"));
    }
}
