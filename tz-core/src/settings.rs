//! Zone Settings
//!
//! Persistent settings stored as JSON in ~/.config/thermzone/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{limits, logging, paths, sensor};
use crate::{Result, ThermalError};

/// Configuration for one zone and the daemon hosting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSettings {
    /// Reading at power-up and after the camera turns off, in tenths of a kelvin
    #[serde(default = "default_reset_temperature")]
    pub reset_temperature: u32,

    /// Upper bound on queued watch requests
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Daemon socket; `None` picks the platform default
    #[serde(default)]
    pub socket_path: Option<String>,

    /// Tracing filter used when the environment does not set one
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_reset_temperature() -> u32 { sensor::RESET_TEMPERATURE }
fn default_max_pending() -> usize { limits::MAX_PENDING }
fn default_log_level() -> String { logging::DEFAULT_LEVEL.to_string() }

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            reset_temperature: default_reset_temperature(),
            max_pending: default_max_pending(),
            socket_path: None,
            log_level: default_log_level(),
        }
    }
}

impl ZoneSettings {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_pending < limits::MIN_PENDING {
            return Err(ThermalError::InvalidConfig {
                field: "max_pending".to_string(),
                reason: format!("must be at least {}", limits::MIN_PENDING),
            });
        }
        if self.log_level.trim().is_empty() {
            return Err(ThermalError::InvalidConfig {
                field: "log_level".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(ref socket) = self.socket_path {
            if socket.is_empty() {
                return Err(ThermalError::InvalidConfig {
                    field: "socket_path".to_string(),
                    reason: "must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Socket the daemon should listen on
    pub fn resolved_socket_path(&self) -> String {
        self.socket_path
            .clone()
            .unwrap_or_else(paths::default_socket_path)
    }
}

/// Get the settings file path, creating its directory if needed
pub fn get_settings_path() -> Result<PathBuf> {
    let dir = paths::user_config_dir()
        .ok_or_else(|| ThermalError::config("Could not determine config directory"))?;

    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            ThermalError::config(format!("Failed to create config directory: {}", e))
        })?;
    }

    Ok(dir.join(paths::SETTINGS_FILE))
}

/// Load settings from the user config directory
pub fn load_settings() -> Result<ZoneSettings> {
    let path = get_settings_path()?;
    load_settings_from(&path)
}

/// Load settings from an explicit file.
///
/// A missing file yields defaults. A present but invalid one is an error.
pub fn load_settings_from(path: &Path) -> Result<ZoneSettings> {
    if !path.exists() {
        debug!("No settings at {}, using defaults", path.display());
        return Ok(ZoneSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ThermalError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let settings: ZoneSettings = serde_json::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

/// Save settings to the user config directory
pub fn save_settings(settings: &ZoneSettings) -> Result<()> {
    let path = get_settings_path()?;
    save_settings_to(settings, &path)
}

/// Save settings to an explicit file.
///
/// Writes a temp file and renames it over the target.
pub fn save_settings_to(settings: &ZoneSettings, path: &Path) -> Result<()> {
    settings.validate()?;

    let json = serde_json::to_string_pretty(settings)?;
    let temp_path = path.with_extension("json.tmp");

    let write_err = |source| ThermalError::FileWrite {
        path: temp_path.clone(),
        source,
    };

    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(json.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|source| ThermalError::FileWrite {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Saved settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = ZoneSettings::default();
        assert_eq!(settings.reset_temperature, 2940);
        assert_eq!(settings.max_pending, 1024);
        assert_eq!(settings.socket_path, None);
        assert_eq!(settings.log_level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: ZoneSettings = serde_json::from_str(r#"{"max_pending": 8}"#).unwrap();
        assert_eq!(settings.max_pending, 8);
        assert_eq!(settings.reset_temperature, 2940);
    }

    #[test]
    fn test_validate_rejects_zero_pending() {
        let settings = ZoneSettings {
            max_pending: 0,
            ..ZoneSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ThermalError::InvalidConfig { ref field, .. }) if field == "max_pending"
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load_settings_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, ZoneSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = ZoneSettings {
            reset_temperature: 3000,
            max_pending: 16,
            socket_path: Some("/tmp/tz.sock".to_string()),
            log_level: "debug".to_string(),
        };

        save_settings_to(&settings, &path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_settings_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_settings_from(&path), Err(ThermalError::JsonParse(_))));

        fs::write(&path, r#"{"max_pending": 0}"#).unwrap();
        assert!(matches!(load_settings_from(&path), Err(ThermalError::InvalidConfig { .. })));
    }

    #[test]
    #[serial]
    fn test_settings_path_follows_xdg() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::var("XDG_CONFIG_HOME").ok();
        std::env::set_var("XDG_CONFIG_HOME", dir.path());

        let path = get_settings_path().unwrap();
        assert_eq!(path, dir.path().join("thermzone").join("settings.json"));
        assert!(dir.path().join("thermzone").is_dir());

        match previous {
            Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }
    }
}
