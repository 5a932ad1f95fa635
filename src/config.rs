use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::FilterSettings;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub schema_version: u32,

    /// Serial port of the respiration belt; `None` means it must come from
    /// the command line.
    pub port: Option<String>,

    /// Breath amplitude level sent to the belt before each capture.
    pub amplitude_level: u8,

    pub filter: FilterSettings,

    // Analysis tuning
    pub sample_rate_hz: f64,
    pub window_size: usize,
    pub step_size: usize,
    pub n_bins: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            port: None,
            amplitude_level: 5,
            filter: FilterSettings::default(),
            sample_rate_hz: 50.0,
            window_size: 1500,
            step_size: 100,
            n_bins: 100,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".respmon"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.amplitude_level == 0 {
            anyhow::bail!("Amplitude level must be at least 1");
        }
        if self.sample_rate_hz <= 0.0 {
            anyhow::bail!("Sample rate must be positive");
        }
        if self.window_size == 0 || self.step_size == 0 {
            anyhow::bail!("Window and step sizes must be positive");
        }
        if self.step_size > self.window_size {
            anyhow::bail!(
                "Step size {} cannot exceed window size {}",
                self.step_size,
                self.window_size
            );
        }
        if self.n_bins < 10 {
            anyhow::bail!("Histogram needs at least 10 bins, got {}", self.n_bins);
        }
        if let FilterSettings::LowPass {
            cutoff_hz,
            sample_rate_hz,
            ..
        } = self.filter
        {
            if cutoff_hz <= 0.0 || cutoff_hz >= sample_rate_hz / 2.0 {
                anyhow::bail!(
                    "Filter cutoff {} Hz must lie below the Nyquist rate of {} Hz",
                    cutoff_hz,
                    sample_rate_hz / 2.0
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.amplitude_level, 5);
        assert_eq!(config.window_size, 1500);
        assert_eq!(config.step_size, 100);
        assert_eq!(config.filter, FilterSettings::Passthrough);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.amplitude_level, 5);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.port = Some("/dev/ttyUSB0".to_string());
        config.amplitude_level = 7;
        config.filter = FilterSettings::LowPass {
            cutoff_hz: 0.5,
            sample_rate_hz: 50.0,
            order: 5,
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(loaded.amplitude_level, 7);
        assert_eq!(loaded.filter, config.filter);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.step_size = 2000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.amplitude_level = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.filter = FilterSettings::LowPass {
            cutoff_hz: 30.0,
            sample_rate_hz: 50.0,
            order: 5,
        };
        assert!(config.validate().is_err());
    }
}
