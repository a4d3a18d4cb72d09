// SPDX-License-Identifier: GPL-3.0-only

//! Volumetric reconstruction engine abstraction
//!
//! ```text
//!  depth pixels ──► depth_to_float ──► integrate ──► raycast ──► shade
//!                                         │             │          │
//!                                   ┌─────▼─────────────▼──┐       ▼
//!                                   │  TSDF volume + pose  │   RGBA image
//!                                   └─────────┬────────────┘
//!                                             │ extract_mesh
//!                                             ▼
//!                                           Mesh
//! ```
//!
//! The session owns the camera pose and passes it in on every call; the
//! engine owns the volume and reports the refined pose back from
//! [`ReconstructionEngine::integrate`]. A failure to align a frame is an
//! ordinary [`IntegrateOutcome`], never an error.

mod cpu;
mod tetra;
mod types;

pub use cpu::CpuReconstruction;
pub use types::{FloatDepthFrame, Mesh, NO_DEPTH, PointCloud, ShadedImage, VolumeConfig};

use crate::backends::sensor::{DepthPixel, DepthResolution};
use crate::errors::EngineError;
use crate::math::{Matrix4, Vector3};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result of integrating one depth frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntegrateOutcome {
    /// The frame was aligned and fused; carries the refined world-to-camera pose
    Tracked(Matrix4),
    /// The frame could not be aligned and was not fused; the pose is unchanged
    TrackingLost,
}

/// Fusion engine collaborator
pub trait ReconstructionEngine: Send {
    /// Convert extended depth pixels to meters, clipping to `[min, max]`
    fn depth_to_float(
        &mut self,
        depth: &[DepthPixel],
        out: &mut FloatDepthFrame,
        min_depth: f32,
        max_depth: f32,
        mirror: bool,
    ) -> EngineResult<()>;

    /// Align the frame against the volume and fuse it
    fn integrate(
        &mut self,
        depth: &FloatDepthFrame,
        max_align_iterations: u16,
        max_integration_weight: u16,
        world_to_camera: &Matrix4,
    ) -> EngineResult<IntegrateOutcome>;

    /// Ray-cast the volume from `world_to_camera`
    fn raycast(&mut self, world_to_camera: &Matrix4, out: &mut PointCloud) -> EngineResult<()>;

    /// Shade a ray-cast point cloud into a displayable image
    fn shade(
        &self,
        cloud: &PointCloud,
        world_to_camera: &Matrix4,
        out: &mut ShadedImage,
    ) -> EngineResult<()> {
        shade_point_cloud(cloud, world_to_camera, out)
    }

    /// Extract a triangle mesh of the zero-crossing surface
    ///
    /// `voxel_step` of 1 samples every voxel; larger steps produce coarser meshes.
    fn extract_mesh(&mut self, voxel_step: u32) -> EngineResult<Mesh>;

    /// Clear the volume and restart tracking at `world_to_camera`
    ///
    /// `world_to_volume` of `None` restores the engine default.
    fn reset(
        &mut self,
        world_to_camera: &Matrix4,
        world_to_volume: Option<&Matrix4>,
    ) -> EngineResult<()>;

    /// World-to-volume transform the engine was created with
    fn default_world_to_volume(&self) -> Matrix4;

    /// Volume geometry the engine was created with
    fn volume_config(&self) -> VolumeConfig;

    /// Depth resolution the engine's frame buffers are sized for
    fn resolution(&self) -> DepthResolution;

    /// Counter bumped by every mutation of the volume (integrate and reset)
    fn volume_version(&self) -> u64;
}

/// Convert extended depth pixels to a float depth image in meters
///
/// Pixels outside `[min_depth, max_depth]` (in meters) or without a reading
/// become [`NO_DEPTH`]. With `mirror`, rows are flipped horizontally.
pub fn convert_depth(
    depth: &[DepthPixel],
    out: &mut FloatDepthFrame,
    min_depth: f32,
    max_depth: f32,
    mirror: bool,
) -> EngineResult<()> {
    let width = out.width as usize;
    if depth.len() != out.data.len() || width == 0 {
        return Err(EngineError::Conversion(format!(
            "depth image has {} pixels, float frame holds {}",
            depth.len(),
            out.data.len()
        )));
    }

    let (near, far) = (min_depth.min(max_depth), min_depth.max(max_depth));
    for (src_row, dst_row) in depth.chunks_exact(width).zip(out.data.chunks_exact_mut(width)) {
        for (x, dst) in dst_row.iter_mut().enumerate() {
            let src = if mirror { width - 1 - x } else { x };
            let meters = src_row[src].depth as f32 / 1000.0;
            *dst = if src_row[src].is_valid() && meters >= near && meters <= far {
                meters
            } else {
                NO_DEPTH
            };
        }
    }
    Ok(())
}

/// Lambert-shade a point cloud as seen from the camera at `world_to_camera`
///
/// Missed pixels are black; hits are gray scaled by the angle between the
/// surface normal and the direction to the camera.
pub fn shade_point_cloud(
    cloud: &PointCloud,
    world_to_camera: &Matrix4,
    out: &mut ShadedImage,
) -> EngineResult<()> {
    if cloud.width != out.width || cloud.height != out.height {
        return Err(EngineError::Shade(format!(
            "point cloud is {}x{}, image is {}x{}",
            cloud.width, cloud.height, out.width, out.height
        )));
    }
    let camera_to_world = world_to_camera
        .inverse_affine()
        .ok_or_else(|| EngineError::Shade("camera pose is singular".to_string()))?;
    let eye = camera_to_world.translation();

    for (i, px) in out.data.chunks_exact_mut(4).enumerate() {
        if !cloud.is_hit(i) {
            px.copy_from_slice(&[0, 0, 0, 255]);
            continue;
        }
        let to_eye: Vector3 = (eye - cloud.points[i]).normalized();
        let lambert = cloud.normals[i].dot(to_eye).max(0.0);
        let level = (40.0 + 215.0 * lambert).round() as u8;
        px.copy_from_slice(&[level, level, level, 255]);
    }
    Ok(())
}
