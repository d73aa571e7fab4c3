use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::exif::DEFAULT_USER_COMMENT;
use crate::session::SessionOptions;
use crate::settings::SettingList;

/// Length of the device id prefix taken from a fresh UUID.
const DEVICE_ID_LEN: usize = 8;

/// Top-level configuration for bracket-raw.
///
/// Holds where captures go, how the device is driven, and the saved bracket
/// list.
///
/// # Loading
///
/// ```rust,no_run
/// use bracket_raw::config::Config;
///
/// // From a JSON file
/// let mut config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Assign a device id on first use and keep it
/// if config.ensure_device_id() {
///     config.save(Some("config.json".as_ref())).unwrap();
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where and how captures are written.
    pub output: OutputConfig,
    /// Device identity and timeouts.
    pub device: DeviceConfig,
    /// Saved bracket list, in capture order.
    pub brackets: SettingList,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory that receives the scene directories.
    pub root: PathBuf,
    /// Quality of the re-encoded JPEG, 1-100.
    pub jpeg_quality: u8,
    /// Comment stamped into every capture's EXIF.
    pub user_comment: String,
}

/// Device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Prefix of every file name. Generated once, then persisted.
    pub device_id: String,
    /// Bound on each focus/exposure change, in milliseconds.
    pub operation_timeout_ms: u64,
    /// Bound on one capture, in milliseconds.
    pub capture_timeout_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("captures"),
            jpeg_quality: 92,
            user_comment: DEFAULT_USER_COMMENT.to_string(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            operation_timeout_ms: 5_000,
            capture_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// Resolve the config file path — same directory as the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Assign a device id if none is set. Returns `true` if one was generated.
    pub fn ensure_device_id(&mut self) -> bool {
        if !self.device.device_id.trim().is_empty() {
            return false;
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.device.device_id = id[..DEVICE_ID_LEN].to_string();
        log::info!("Assigned device id {}", self.device.device_id);
        true
    }

    /// Session tunables derived from this config.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            jpeg_quality: self.output.jpeg_quality,
            operation_timeout: Duration::from_millis(self.device.operation_timeout_ms),
            capture_timeout: Duration::from_millis(self.device.capture_timeout_ms),
            user_comment: self.output.user_comment.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.output.jpeg_quality) {
            anyhow::bail!(
                "output.jpeg_quality must be between 1 and 100, got {}",
                self.output.jpeg_quality
            );
        }
        if self.device.operation_timeout_ms == 0 || self.device.capture_timeout_ms == 0 {
            anyhow::bail!("device timeouts must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingEntry;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("config.json"))).unwrap();
        assert_eq!(config.output.jpeg_quality, 92);
        assert!(config.brackets.is_empty());
        assert!(config.device.device_id.is_empty());
    }

    #[test]
    fn save_then_load_keeps_brackets_and_id() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        assert!(config.ensure_device_id());
        config.brackets.push(SettingEntry::auto(1).unwrap());
        config
            .brackets
            .push(SettingEntry::manual(100.0, 0.1, 2).unwrap());
        config.save(Some(&path)).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.device.device_id, config.device.device_id);
        assert_eq!(loaded.brackets, config.brackets);
    }

    #[test]
    fn device_id_is_generated_once() {
        let mut config = Config::default();
        assert!(config.ensure_device_id());
        let id = config.device.device_id.clone();
        assert_eq!(id.len(), DEVICE_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        assert!(!config.ensure_device_id());
        assert_eq!(config.device.device_id, id);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "output": { "root": "/tmp/shots" } }"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.output.root, PathBuf::from("/tmp/shots"));
        assert_eq!(config.output.jpeg_quality, 92);
        assert_eq!(config.device.capture_timeout_ms, 10_000);
    }

    #[test]
    fn invalid_bracket_entry_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "brackets": [ { "iso": 100, "exposure_seconds": 0.1, "repeat_count": 0, "is_auto": false } ] }"#,
        )
        .unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "output": { "jpeg_quality": 0 } }"#).unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn session_options_follow_config() {
        let mut config = Config::default();
        config.device.operation_timeout_ms = 250;
        config.output.user_comment = "rig A".into();
        let options = config.session_options();
        assert_eq!(options.operation_timeout, Duration::from_millis(250));
        assert_eq!(options.user_comment, "rig A");
    }
}
