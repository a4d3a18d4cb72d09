// SPDX-License-Identifier: GPL-3.0-only

//! Buffers and configuration exchanged with a reconstruction engine

use crate::backends::sensor::DepthResolution;
use crate::constants::{display, volume};
use crate::errors::MeshError;
use crate::math::Vector3;
use serde::{Deserialize, Serialize};

/// Depth value marking a pixel with no usable reading
pub const NO_DEPTH: f32 = 0.0;

/// Reconstruction volume configuration, fixed for the lifetime of an engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    /// Voxel density (voxels per meter)
    pub voxels_per_meter: f32,
    /// Voxel count along X
    pub voxel_count_x: u32,
    /// Voxel count along Y
    pub voxel_count_y: u32,
    /// Voxel count along Z
    pub voxel_count_z: u32,
    /// Cap on the per-voxel integration weight (temporal averaging window)
    pub max_integration_weight: u16,
    /// Near clip distance in meters
    pub min_depth_threshold: f32,
    /// Far clip distance in meters
    pub max_depth_threshold: f32,
    /// Mirror depth frames horizontally before integration
    pub mirror_depth_frame: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            voxels_per_meter: volume::VOXELS_PER_METER,
            voxel_count_x: volume::VOXEL_COUNT_X,
            voxel_count_y: volume::VOXEL_COUNT_Y,
            voxel_count_z: volume::VOXEL_COUNT_Z,
            max_integration_weight: volume::DEFAULT_INTEGRATION_WEIGHT,
            min_depth_threshold: volume::DEFAULT_MIN_DEPTH_M,
            max_depth_threshold: volume::DEFAULT_MAX_DEPTH_M,
            mirror_depth_frame: false,
        }
    }
}

impl VolumeConfig {
    /// Total number of voxels in the grid
    pub fn voxel_count(&self) -> usize {
        self.voxel_count_x as usize * self.voxel_count_y as usize * self.voxel_count_z as usize
    }

    /// The nearer of the two clip thresholds
    pub fn nearest_clip(&self) -> f32 {
        self.min_depth_threshold.min(self.max_depth_threshold)
    }

    /// Volume extent in meters (x, y, z)
    pub fn extent_meters(&self) -> Vector3 {
        Vector3::new(
            self.voxel_count_x as f32,
            self.voxel_count_y as f32,
            self.voxel_count_z as f32,
        ) * (1.0 / self.voxels_per_meter)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.voxel_count_x == 0 || self.voxel_count_y == 0 || self.voxel_count_z == 0 {
            return Err("voxel counts must be non-zero".to_string());
        }
        if self.voxels_per_meter <= 0.0 || !self.voxels_per_meter.is_finite() {
            return Err(format!(
                "voxels per meter must be positive, got {}",
                self.voxels_per_meter
            ));
        }
        if self.max_integration_weight == 0
            || self.max_integration_weight > volume::MAX_INTEGRATION_WEIGHT
        {
            return Err(format!(
                "max integration weight must be within 1..={}, got {}",
                volume::MAX_INTEGRATION_WEIGHT,
                self.max_integration_weight
            ));
        }
        if self.min_depth_threshold < 0.0 || self.max_depth_threshold < 0.0 {
            return Err("depth thresholds must not be negative".to_string());
        }
        Ok(())
    }
}

/// Depth image in meters, [`NO_DEPTH`] where there is no reading
#[derive(Debug, Clone, PartialEq)]
pub struct FloatDepthFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl FloatDepthFrame {
    pub fn new(resolution: DepthResolution) -> Self {
        let (width, height) = resolution.size();
        Self {
            width,
            height,
            data: vec![NO_DEPTH; resolution.pixel_count()],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Number of pixels with a depth reading
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| d != NO_DEPTH).count()
    }
}

/// Ray-cast surface samples in world space, one per pixel
///
/// Pixels whose ray missed the surface hold a zero point and zero normal.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: u32,
    pub height: u32,
    pub points: Vec<Vector3>,
    pub normals: Vec<Vector3>,
}

impl PointCloud {
    pub fn new(resolution: DepthResolution) -> Self {
        let (width, height) = resolution.size();
        let n = resolution.pixel_count();
        Self {
            width,
            height,
            points: vec![Vector3::ZERO; n],
            normals: vec![Vector3::ZERO; n],
        }
    }

    /// Mark every pixel as a miss
    pub fn clear(&mut self) {
        self.points.fill(Vector3::ZERO);
        self.normals.fill(Vector3::ZERO);
    }

    pub fn is_hit(&self, index: usize) -> bool {
        !self.normals[index].is_zero()
    }

    pub fn valid_count(&self) -> usize {
        (0..self.normals.len()).filter(|&i| self.is_hit(i)).count()
    }

    /// No pixel hit the surface
    pub fn is_empty(&self) -> bool {
        self.valid_count() == 0
    }
}

/// Displayable RGBA image
#[derive(Debug, Clone, PartialEq)]
pub struct ShadedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ShadedImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * display::BYTES_PER_PIXEL) as usize],
        }
    }

    pub fn for_resolution(resolution: DepthResolution) -> Self {
        let (w, h) = resolution.size();
        Self::new(w, h)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        display::BYTES_PER_PIXEL
    }

    /// RGBA at (x, y), clamped to the image
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let x = x.min(self.width.saturating_sub(1));
        let y = y.min(self.height.saturating_sub(1));
        let idx = ((y * self.width + x) * display::BYTES_PER_PIXEL) as usize;
        match self.data.get(idx..idx + 4) {
            Some(px) => [px[0], px[1], px[2], px[3]],
            None => [0, 0, 0, 255],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let idx = ((y * self.width + x) * display::BYTES_PER_PIXEL) as usize;
        if let Some(px) = self.data.get_mut(idx..idx + 4) {
            px.copy_from_slice(&rgba);
        }
    }
}

/// Triangle mesh snapshot of the volume
///
/// Triangles are stored unshared: vertices `3t..3t+3` form triangle `t`,
/// `normals[3t]` is its face normal, and `triangle_indices` is the identity
/// sequence over the vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vector3>,
    pub normals: Vec<Vector3>,
    pub triangle_indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a triangle with its face normal
    pub fn push_triangle(&mut self, corners: [Vector3; 3], normal: Vector3) {
        for corner in corners {
            self.triangle_indices.push(self.vertices.len() as u32);
            self.vertices.push(corner);
            self.normals.push(normal);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_index_count(&self) -> usize {
        self.triangle_indices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Check the layout the mesh writers rely on
    pub fn validate(&self) -> Result<(), MeshError> {
        let vertices = self.vertex_count();
        let indices = self.triangle_index_count();
        if vertices == 0 || indices == 0 {
            return Err(MeshError::InvalidMesh("mesh has no vertices".to_string()));
        }
        if vertices % 3 != 0 {
            return Err(MeshError::InvalidMesh(format!(
                "vertex count {} is not a multiple of 3",
                vertices
            )));
        }
        if vertices != indices {
            return Err(MeshError::InvalidMesh(format!(
                "vertex count {} does not match triangle index count {}",
                vertices, indices
            )));
        }
        if self.normals.len() != vertices {
            return Err(MeshError::InvalidMesh(format!(
                "normal count {} does not match vertex count {}",
                self.normals.len(),
                vertices
            )));
        }
        Ok(())
    }

    /// Iterate triangles as (corners, face normal)
    pub fn triangles(&self) -> impl Iterator<Item = ([Vector3; 3], Vector3)> + '_ {
        (0..self.triangle_count()).map(move |t| {
            let base = t * 3;
            (
                [
                    self.vertices[base],
                    self.vertices[base + 1],
                    self.vertices[base + 2],
                ],
                self.normals[base],
            )
        })
    }

    /// Axis-aligned bounds (min, max)
    pub fn bounds(&self) -> Option<(Vector3, Vector3)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            (
                Vector3::new(lo.x.min(v.x), lo.y.min(v.y), lo.z.min(v.z)),
                Vector3::new(hi.x.max(v.x), hi.y.max(v.y), hi.z.max(v.z)),
            )
        }))
    }
}
