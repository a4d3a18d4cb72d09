// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Reconstruction volume defaults
///
/// The CPU engine keeps the whole grid in host memory, so the default volume
/// is coarser than a GPU fusion engine would use: 128 x 96 x 128 voxels at
/// 64 voxels per meter covers 2m x 1.5m x 2m at ~1.6cm per voxel.
pub mod volume {
    /// Voxels per meter
    pub const VOXELS_PER_METER: f32 = 64.0;
    /// Voxel count along X
    pub const VOXEL_COUNT_X: u32 = 128;
    /// Voxel count along Y
    pub const VOXEL_COUNT_Y: u32 = 96;
    /// Voxel count along Z
    pub const VOXEL_COUNT_Z: u32 = 128;

    /// Default temporal averaging cap, reasonable for static scenes
    pub const DEFAULT_INTEGRATION_WEIGHT: u16 = 200;
    /// Largest accepted integration weight
    pub const MAX_INTEGRATION_WEIGHT: u16 = 1000;

    /// Default near clip in meters (the sensor returns nothing closer than ~0.35m)
    pub const DEFAULT_MIN_DEPTH_M: f32 = 0.35;
    /// Default far clip in meters
    pub const DEFAULT_MAX_DEPTH_M: f32 = 8.0;

    /// Truncation band of the signed distance, in voxels
    pub const TRUNCATION_VOXELS: f32 = 4.0;
}

/// Tracking and recovery policy defaults
pub mod tracking {
    /// Timestamp jump between consecutive frames that forces a volume reset
    pub const RESET_ON_TIMESTAMP_SKIPPED_MS: i64 = 1000;
    /// Consecutive lost frames before the auto-reset policy fires
    pub const RESET_ON_NUMBER_OF_LOST_FRAMES: u32 = 100;
    /// Alignment iterations per frame
    pub const DEFAULT_ALIGN_ITERATIONS: u16 = 7;
    /// Pixel stride used when sampling correspondences for alignment
    pub const ALIGN_PIXEL_STRIDE: usize = 4;
    /// Correspondences farther apart than this are rejected (meters)
    pub const ALIGN_MAX_POINT_DISTANCE_M: f32 = 0.1;
    /// Mean residual above which alignment is declared failed (meters)
    pub const ALIGN_MAX_RESIDUAL_M: f32 = 0.02;
    /// Minimum fraction of sampled pixels that must find a correspondence
    pub const ALIGN_MIN_OVERLAP: f32 = 0.2;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// How long a tick waits for the next depth frame
    pub const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(500);
    /// Tick cadence of the capture loop
    pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
    /// Nominal sensor frame interval (30 fps)
    pub const FRAME_INTERVAL_MS: i64 = 33;
    /// Input poll interval of the terminal viewer
    pub const UI_POLL_INTERVAL: Duration = Duration::from_millis(16);
}

/// Depth sensor constants
pub mod sensor {
    /// Nominal depth focal length in pixels at 640x480
    pub const NOMINAL_FOCAL_LENGTH_640: f32 = 571.26;
    /// Reference width for the nominal focal length
    pub const BASE_WIDTH: f32 = 640.0;
    /// Largest depth value the sensor reports (mm)
    pub const MAX_DEPTH_MM: u16 = 4000;
}

/// Display constants
pub mod display {
    /// Shaded images are RGBA
    pub const BYTES_PER_PIXEL: u32 = 4;
}

/// Mesh file constants
pub mod mesh {
    /// Binary STL header length
    pub const STL_HEADER_LEN: usize = 80;
    /// Bytes per binary STL triangle record
    pub const STL_TRIANGLE_LEN: usize = 50;
    /// Header comment written at the top of OBJ files
    pub const OBJ_HEADER: &str = "#\n# OBJ file created by depth-fusion\n#\n";
}

/// Application info
pub mod app_info {
    /// Application directory name under the config/documents directories
    pub const APP_DIR: &str = "depth-fusion";
    /// Config file name
    pub const CONFIG_FILE: &str = "config.json";

    /// Version string stamped by build.rs
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
