// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Persisted as pretty JSON under the platform config directory. Every field
//! has a default, so a partial file only overrides what it names.

use crate::backends::engine::VolumeConfig;
use crate::backends::sensor::DepthResolution;
use crate::constants::{app_info, timing, tracking};
use crate::errors::{FusionError, FusionResult};
use crate::pipelines::mesh::MeshFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Where depth frames come from
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum SensorSource {
    /// Rendered test scene
    #[default]
    Synthetic,
    /// Directory of 16-bit PNG depth images in millimeters
    Playback { directory: PathBuf },
}

/// Tracking-loss and discontinuity recovery policy
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TrackingPolicy {
    /// Timestamp jump that counts as a discontinuity (ms)
    pub skip_threshold_ms: i64,
    /// Consecutive lost frames before the loss policy resets the volume
    pub lost_frame_reset_threshold: u32,
    /// Alignment iterations passed to the engine per frame
    pub align_iterations: u16,
    /// How long a tick waits for a depth frame (ms)
    pub acquire_timeout_ms: u64,
    /// Reset when the frame timestamp jumps (looping playback)
    pub auto_reset_on_timeout: bool,
    /// Reset after `lost_frame_reset_threshold` lost frames in a row
    pub auto_reset_on_tracking_loss: bool,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self {
            skip_threshold_ms: tracking::RESET_ON_TIMESTAMP_SKIPPED_MS,
            lost_frame_reset_threshold: tracking::RESET_ON_NUMBER_OF_LOST_FRAMES,
            align_iterations: tracking::DEFAULT_ALIGN_ITERATIONS,
            acquire_timeout_ms: timing::ACQUIRE_TIMEOUT.as_millis() as u64,
            auto_reset_on_timeout: true,
            auto_reset_on_tracking_loss: false,
        }
    }
}

impl TrackingPolicy {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Mesh export settings
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Directory for saved meshes; `None` uses the documents directory
    pub output_dir: Option<PathBuf>,
    /// Format used when a save path has no extension
    pub format: MeshFormat,
    /// Negate Y and Z on export (camera space to a Y-up file)
    pub flip_yz: bool,
    /// Voxel step used for extraction (1 = full resolution)
    pub voxel_step: u32,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            format: MeshFormat::Stl,
            flip_yz: true,
            voxel_step: 1,
        }
    }
}

impl MeshSettings {
    /// Effective output directory
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::document_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(app_info::APP_DIR)
        })
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Depth frame source
    pub sensor: SensorSource,
    /// Depth stream resolution
    pub resolution: DepthResolution,
    /// Reconstruction volume parameters
    pub volume: VolumeConfig,
    /// Recovery policy
    pub tracking: TrackingPolicy,
    /// Shift the volume by the near clip distance on reset so close
    /// surfaces stay inside it
    pub translate_reset_pose_by_min_depth: bool,
    /// Capture loop cadence (ms)
    pub tick_interval_ms: u64,
    /// Mesh export settings
    pub mesh: MeshSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor: SensorSource::default(),
            resolution: DepthResolution::default(),
            volume: VolumeConfig::default(),
            tracking: TrackingPolicy::default(),
            translate_reset_pose_by_min_depth: true,
            tick_interval_ms: timing::TICK_INTERVAL.as_millis() as u64,
            mesh: MeshSettings::default(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::APP_DIR).join(app_info::CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults if there is no file
    pub fn load() -> FusionResult<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> FusionResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FusionError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            FusionError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Write to the default location
    pub fn save(&self) -> FusionResult<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| FusionError::Config("No config directory on this platform".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> FusionResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FusionError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FusionError::Config(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, json).map_err(|e| {
            FusionError::Config(format!("Failed to write {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> FusionResult<()> {
        self.volume.validate().map_err(FusionError::Config)?;

        let policy = &self.tracking;
        if policy.skip_threshold_ms <= 0 {
            return Err(FusionError::Config(
                "skip threshold must be positive".to_string(),
            ));
        }
        if policy.lost_frame_reset_threshold == 0 {
            return Err(FusionError::Config(
                "lost frame reset threshold must be positive".to_string(),
            ));
        }
        if policy.acquire_timeout_ms == 0 {
            return Err(FusionError::Config(
                "acquire timeout must be positive".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(FusionError::Config(
                "tick interval must be positive".to_string(),
            ));
        }
        if self.mesh.voxel_step == 0 {
            return Err(FusionError::Config(
                "mesh voxel step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
