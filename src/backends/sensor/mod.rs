// SPDX-License-Identifier: GPL-3.0-only

//! Depth sensor abstraction
//!
//! ```text
//! ┌─────────────────────┐
//! │ReconstructionSession│
//! └──────────┬──────────┘
//!            │ acquire(timeout)
//!            ▼
//! ┌─────────────────────┐
//! │     FrameSource     │  ← owns the stream + single depth buffer
//! └──────────┬──────────┘
//!            │ pull
//!            ▼
//! ┌─────────────────────┐
//! │  DepthSensor trait  │  ← device, playback file, synthetic scene
//! └─────────────────────┘
//! ```
//!
//! The core always pulls: it waits on the sensor's frame-ready signal, takes
//! the frame, copies the pixels out and hands the frame back.

mod frame_source;
mod playback;
mod synthetic;

pub use frame_source::{Acquisition, FrameSource};
pub use playback::PlaybackSensor;
pub use synthetic::{SyntheticScene, SyntheticSensor};

use crate::config::SensorSource;
use crate::constants::sensor as sensor_consts;
use crate::errors::SensorError;
use crate::math::Vector3;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result type for sensor operations
pub type SensorResult<T> = Result<T, SensorError>;

/// Extended depth pixel: millimeter depth plus a per-pixel player index
///
/// Laid out exactly as the sensor delivers it so raw frame bytes can be
/// copied straight into a `[DepthPixel]` buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DepthPixel {
    /// Player segmentation index (0 = no player)
    pub player_index: u16,
    /// Depth in millimeters (0 = no reading)
    pub depth: u16,
}

impl DepthPixel {
    pub const fn new(depth: u16, player_index: u16) -> Self {
        Self {
            player_index,
            depth,
        }
    }

    /// The sensor produced a reading for this pixel
    pub fn is_valid(&self) -> bool {
        self.depth != 0
    }
}

/// Depth stream resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepthResolution {
    R80x60,
    R320x240,
    #[default]
    R640x480,
}

impl DepthResolution {
    pub const ALL: [DepthResolution; 3] = [
        DepthResolution::R80x60,
        DepthResolution::R320x240,
        DepthResolution::R640x480,
    ];

    /// Frame size in pixels (width, height)
    pub fn size(&self) -> (u32, u32) {
        match self {
            DepthResolution::R80x60 => (80, 60),
            DepthResolution::R320x240 => (320, 240),
            DepthResolution::R640x480 => (640, 480),
        }
    }

    pub fn pixel_count(&self) -> usize {
        let (w, h) = self.size();
        (w * h) as usize
    }

    /// Byte length of one extended depth frame at this resolution
    pub fn frame_bytes(&self) -> usize {
        self.pixel_count() * std::mem::size_of::<DepthPixel>()
    }
}

impl fmt::Display for DepthResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.size();
        write!(f, "{}x{}", w, h)
    }
}

/// Pinhole intrinsics of the depth camera, in pixels
///
/// Camera space is +X right, +Y down, +Z forward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl CameraIntrinsics {
    /// Nominal depth camera intrinsics scaled to a stream resolution
    pub fn for_resolution(resolution: DepthResolution) -> Self {
        let (w, h) = resolution.size();
        let focal = sensor_consts::NOMINAL_FOCAL_LENGTH_640 * w as f32
            / sensor_consts::BASE_WIDTH;
        Self {
            fx: focal,
            fy: focal,
            cx: w as f32 / 2.0,
            cy: h as f32 / 2.0,
        }
    }

    /// Unit-depth ray through pixel center (x, y)
    pub fn ray(&self, x: f32, y: f32) -> Vector3 {
        Vector3::new((x - self.cx) / self.fx, (y - self.cy) / self.fy, 1.0)
    }

    /// Project a camera-space point to pixel coordinates
    pub fn project(&self, p: Vector3) -> Option<(f32, f32)> {
        if p.z <= f32::EPSILON {
            return None;
        }
        Some((self.fx * p.x / p.z + self.cx, self.fy * p.y / p.z + self.cy))
    }
}

/// Opaque handle for an open depth stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(pub u32);

/// Frame as handed out by the sensor, valid until released
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Sensor frame number
    pub frame_number: u32,
    /// Sensor timestamp in milliseconds
    pub timestamp_ms: i64,
    /// Extended depth pixel bytes (`DepthPixel` layout, row-major)
    pub data: Vec<u8>,
}

/// Result of waiting on the frame-ready signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameWait {
    Ready,
    TimedOut,
}

/// Depth sensor collaborator
///
/// Implementations own the device (or file, or generator) and its stream.
pub trait DepthSensor: Send {
    /// Human readable sensor name for logging
    fn name(&self) -> &str;

    /// Open the depth stream at the given resolution
    fn open_depth_stream(&mut self, resolution: DepthResolution) -> SensorResult<StreamHandle>;

    /// Block until the next frame is signaled or the timeout elapses
    fn wait_for_frame(&mut self, timeout: Duration) -> SensorResult<FrameWait>;

    /// Take the next frame; `None` when no frame arrived within the timeout
    fn next_frame(
        &mut self,
        handle: StreamHandle,
        timeout: Duration,
    ) -> SensorResult<Option<RawFrame>>;

    /// Hand a frame back to the sensor
    fn release_frame(&mut self, handle: StreamHandle, frame: RawFrame) -> SensorResult<()>;

    /// Stop streaming and release the device
    fn close(&mut self);
}

/// Create the sensor a config names
///
/// Recordings loop with a timestamp gap of `skip_threshold_ms` so each loop
/// resets the volume.
pub fn open_sensor(source: &SensorSource, skip_threshold_ms: i64) -> SensorResult<Box<dyn DepthSensor>> {
    match source {
        SensorSource::Synthetic => Ok(Box::new(SyntheticSensor::default())),
        SensorSource::Playback { directory } => Ok(Box::new(
            PlaybackSensor::open(directory)?.with_loop_gap(skip_threshold_ms),
        )),
    }
}

/// Serialize a depth image into the raw extended-depth byte layout
pub fn encode_depth_pixels(pixels: &[DepthPixel]) -> Vec<u8> {
    bytemuck::cast_slice(pixels).to_vec()
}
