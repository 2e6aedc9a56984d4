//! Configuration for the volume loader

use crate::error::{Result, VolumeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the loader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Maximum number of concurrent frame fetches (default: 4)
    /// Valid range: 1 to 64
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Percentage of total frames between re-render requests during a
    /// progressive load (default: 2.0)
    #[serde(default = "default_refresh_step")]
    pub refresh_step_percent: f64,

    /// Priority stamped on requests when the caller does not pass one
    /// (default: 0)
    #[serde(default)]
    pub default_priority: i32,

    /// Whether to consult the image-level cache before fetching
    /// (default: true)
    #[serde(default = "default_true")]
    pub enable_frame_reuse: bool,

    /// Byte capacity of the image-level frame cache (default: 256MB)
    #[serde(default = "default_cache_capacity")]
    pub frame_cache_capacity_bytes: usize,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_refresh_step() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    256 * 1024 * 1024
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            max_concurrent_fetches: default_max_concurrent(),
            refresh_step_percent: default_refresh_step(),
            default_priority: 0,
            enable_frame_reuse: default_true(),
            frame_cache_capacity_bytes: default_cache_capacity(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Returns
    /// * `Ok(LoaderConfig)` if the file parses and validates
    /// * `Err(VolumeError::ConfigError)` otherwise
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            VolumeError::ConfigError(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: LoaderConfig = serde_yaml::from_str(&contents)
            .map_err(|e| VolumeError::ConfigError(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 || self.max_concurrent_fetches > 64 {
            return Err(VolumeError::ConfigError(format!(
                "max_concurrent_fetches must be between 1 and 64, got {}",
                self.max_concurrent_fetches
            )));
        }
        if self.refresh_step_percent <= 0.0 || self.refresh_step_percent > 100.0 {
            return Err(VolumeError::ConfigError(format!(
                "refresh_step_percent must be in (0, 100], got {}",
                self.refresh_step_percent
            )));
        }
        Ok(())
    }

    /// Re-render threshold step for a volume of `total_frames`, in frames
    ///
    /// Never smaller than one frame so tiny volumes do not refresh on every
    /// completion.
    pub fn refresh_step_frames(&self, total_frames: usize) -> f64 {
        (total_frames as f64 * self.refresh_step_percent / 100.0).max(1.0)
    }
}
