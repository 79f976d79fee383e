// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{self, app_info};
use crate::errors::{AppError, AppResult};
use crate::pipelines::photo::OutputMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Phase correlation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSettings {
    /// Longer image side above which correlation runs on a downsampled copy
    pub max_correlation_dim: u32,
    /// Correlation peaks below this are treated as "no match"
    pub min_peak_value: f32,
    /// Apply a Hann window before the FFT
    pub windowing: bool,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            max_correlation_dim: constants::alignment::MAX_CORRELATION_DIM,
            min_peak_value: constants::alignment::MIN_PEAK_VALUE,
            windowing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where fused photos are written (defaults to the pictures directory)
    pub output_dir: Option<PathBuf>,
    /// Used when the output directory cannot be written
    pub fallback_dir: Option<PathBuf>,
    /// Number of frames per burst
    pub burst_size: usize,
    /// Whether a representative raw frame is kept next to the photo
    pub output_mode: OutputMode,
    /// Lossy encoding quality in (0, 1]
    pub encoding_quality: f32,
    /// Shadow lift strength in [0, 1]
    pub shadow_lift: f32,
    pub alignment: AlignmentSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: None,
            fallback_dir: None,
            burst_size: constants::DEFAULT_BURST_SIZE,
            output_mode: OutputMode::default(), // Encoded only
            encoding_quality: constants::DEFAULT_ENCODING_QUALITY,
            shadow_lift: constants::SHADOW_LIFT,
            alignment: AlignmentSettings::default(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_DIR_NAME).join("config.json"))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load the config from its default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Ignoring invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Write the config as pretty-printed JSON
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Config(e.to_string()))?;
        }
        let text =
            serde_json::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| AppError::Config(e.to_string()))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.burst_size == 0 || self.burst_size > constants::MAX_BURST_SIZE {
            return Err(AppError::Config(format!(
                "burst_size {} outside 1..={}",
                self.burst_size,
                constants::MAX_BURST_SIZE
            )));
        }
        if !(self.encoding_quality > 0.0 && self.encoding_quality <= 1.0) {
            return Err(AppError::Config(format!(
                "encoding_quality {} outside (0, 1]",
                self.encoding_quality
            )));
        }
        if !(0.0..=1.0).contains(&self.shadow_lift) {
            return Err(AppError::Config(format!(
                "shadow_lift {} outside [0, 1]",
                self.shadow_lift
            )));
        }
        if self.alignment.max_correlation_dim < constants::alignment::MIN_IMAGE_DIM {
            return Err(AppError::Config(format!(
                "alignment.max_correlation_dim must be at least {}",
                constants::alignment::MIN_IMAGE_DIM
            )));
        }
        Ok(())
    }

    /// Directory fused photos are written to
    pub fn photo_directory(&self) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.clone();
        }
        dirs::picture_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(app_info::APP_DIR_NAME)
    }

    /// Local directory used when the photo directory is unavailable
    pub fn fallback_directory(&self) -> PathBuf {
        if let Some(dir) = &self.fallback_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(app_info::APP_DIR_NAME)
            .join("unsaved")
    }
}
