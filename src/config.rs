//! Configuration for the metadata engine and adapters.
//!
//! There is no global configuration state: a [`Config`] value is built (from
//! defaults or a JSON file) and passed to
//! [`MetadataEngine::with_config`](crate::engine::MetadataEngine::with_config)
//! at construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MetadataError, Result};

/// Top-level configuration.
///
/// # Loading
///
/// ```rust,no_run
/// use exif_sweep::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("sweep.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.backup.enabled = false;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backup creation policy.
    pub backup: BackupConfig,
    /// Post-write integrity verification.
    pub integrity: IntegrityConfig,
    /// Privacy warnings for destructive operations.
    pub privacy: PrivacyConfig,
    /// Batch processing behavior.
    pub batch: BatchConfig,
}

/// Backup policy for in-place operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Create a timestamped backup before overwriting an original.
    pub enabled: bool,
    /// Directory for backups. `None` places them next to the original.
    pub directory: Option<PathBuf>,
    /// How many backups per file `cleanup_backups` keeps.
    pub keep_count: usize,
}

/// Which integrity check runs after a write, and its thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Strategy selected once at startup, not per call.
    pub strategy: IntegrityStrategy,
    /// Maximum acceptable mean squared error between original and rewritten
    /// JPEG pixel buffers. Recompression noise stays well under this;
    /// real corruption does not.
    pub jpeg_mse_threshold: f64,
    /// File-size delta ratio above which the coarse check warns.
    pub size_delta_tolerance: f64,
}

/// Integrity verification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStrategy {
    /// Full pixel comparison: hash equality for lossless formats, MSE for JPEG.
    Precise,
    /// Dimensions and color type only.
    Basic,
}

/// Privacy-related behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Surface privacy-sensitive keys before destructive operations.
    pub warn_before_strip: bool,
}

/// Batch processing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Collect per-file errors instead of aborting the batch.
    pub continue_on_error: bool,
    /// Recurse into subdirectories when collecting batch inputs.
    pub recursive: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            keep_count: 5,
        }
    }
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            strategy: IntegrityStrategy::Precise,
            jpeg_mse_threshold: 2.0,
            size_delta_tolerance: 0.10,
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            warn_before_strip: true,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            recursive: false,
        }
    }
}

impl Config {
    /// Load config from the given path, or fall back to defaults when no path
    /// is given or the file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            log::warn!("Config file not found at {}. Using defaults.", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)
            .map_err(|e| MetadataError::Validation(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| MetadataError::Validation(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Reject out-of-range thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.integrity.jpeg_mse_threshold < 0.0 {
            return Err(MetadataError::Validation(
                "integrity.jpeg_mse_threshold must be non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.integrity.size_delta_tolerance) {
            return Err(MetadataError::Validation(
                "integrity.size_delta_tolerance must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(config.backup.enabled);
        assert_eq!(config.backup.keep_count, 5);
        assert_eq!(config.integrity.strategy, IntegrityStrategy::Precise);
        assert_eq!(config.integrity.jpeg_mse_threshold, 2.0);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sweep.json");

        let mut config = Config::default();
        config.backup.enabled = false;
        config.integrity.strategy = IntegrityStrategy::Basic;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert!(!loaded.backup.enabled);
        assert_eq!(loaded.integrity.strategy, IntegrityStrategy::Basic);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded = Config::load(Some(Path::new("/nonexistent/sweep.json"))).unwrap();
        assert!(loaded.backup.enabled);
    }

    #[test]
    fn malformed_file_is_a_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"backup": {"enabled": false}}"#).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert!(!loaded.backup.enabled);
        assert_eq!(loaded.backup.keep_count, 5);
        assert_eq!(loaded.integrity.jpeg_mse_threshold, 2.0);
    }

    #[test]
    fn negative_mse_threshold_rejected() {
        let mut config = Config::default();
        config.integrity.jpeg_mse_threshold = -1.0;
        assert!(config.validate().is_err());
    }
}
