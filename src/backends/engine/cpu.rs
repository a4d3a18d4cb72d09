// SPDX-License-Identifier: GPL-3.0-only

//! CPU truncated signed distance fusion
//!
//! A dense voxel grid of truncated signed distances with per-voxel weights.
//! Frames are aligned with projective point-to-point ICP restricted to
//! translation, fused with a capped running average, and ray-cast by
//! marching each pixel ray to the first positive-to-negative crossing.

use super::tetra::{self, CUBE_CORNERS};
use super::{
    EngineResult, FloatDepthFrame, IntegrateOutcome, Mesh, NO_DEPTH, PointCloud,
    ReconstructionEngine, VolumeConfig, convert_depth,
};
use crate::backends::sensor::{CameraIntrinsics, DepthPixel, DepthResolution};
use crate::constants::{tracking, volume};
use crate::errors::EngineError;
use crate::math::{Matrix4, Vector3};
use tracing::{debug, info};

/// Upper bound on the grid size the CPU engine will allocate
const MAX_VOXELS: usize = 512 * 512 * 256;

/// Ray march step as a fraction of the truncation distance
const RAY_STEP_FRACTION: f32 = 0.75;

/// Bisection steps applied to a bracketed surface crossing
const RAY_REFINE_STEPS: usize = 6;

/// Alignment stops once the per-iteration update is smaller than this (meters)
const ALIGN_CONVERGED_M: f32 = 1e-4;

/// Host-memory TSDF reconstruction
pub struct CpuReconstruction {
    config: VolumeConfig,
    resolution: DepthResolution,
    intrinsics: CameraIntrinsics,
    dims: [usize; 3],
    tsdf: Vec<f32>,
    weights: Vec<u16>,
    world_to_volume: Matrix4,
    volume_to_world: Matrix4,
    default_world_to_volume: Matrix4,
    truncation: f32,
    /// Surface predicted at `reference_pose`, the target for the next alignment
    reference: PointCloud,
    reference_pose: Matrix4,
    integrated_frames: u64,
    version: u64,
}

impl CpuReconstruction {
    /// Allocate an empty volume for frames of `resolution`
    pub fn new(config: VolumeConfig, resolution: DepthResolution) -> EngineResult<Self> {
        config.validate().map_err(EngineError::Creation)?;

        let voxels = config.voxel_count();
        if voxels > MAX_VOXELS {
            return Err(EngineError::Creation(format!(
                "{} voxels exceeds the limit of {}",
                voxels, MAX_VOXELS
            )));
        }

        let dims = [
            config.voxel_count_x as usize,
            config.voxel_count_y as usize,
            config.voxel_count_z as usize,
        ];
        let default_world_to_volume = Matrix4::from_scale_translation(
            config.voxels_per_meter,
            Vector3::new(dims[0] as f32 / 2.0, dims[1] as f32 / 2.0, 0.0),
        );
        let volume_to_world = default_world_to_volume
            .inverse_affine()
            .ok_or_else(|| EngineError::Creation("volume transform is singular".to_string()))?;

        info!(
            voxels_per_meter = config.voxels_per_meter,
            x = dims[0],
            y = dims[1],
            z = dims[2],
            resolution = %resolution,
            "Created CPU reconstruction volume"
        );

        Ok(Self {
            config,
            resolution,
            intrinsics: CameraIntrinsics::for_resolution(resolution),
            dims,
            tsdf: vec![1.0; voxels],
            weights: vec![0; voxels],
            world_to_volume: default_world_to_volume,
            volume_to_world,
            default_world_to_volume,
            truncation: volume::TRUNCATION_VOXELS / config.voxels_per_meter,
            reference: PointCloud::new(resolution),
            reference_pose: Matrix4::identity(),
            integrated_frames: 0,
            version: 0,
        })
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// World-to-volume transform currently in effect
    pub fn world_to_volume(&self) -> Matrix4 {
        self.world_to_volume
    }

    /// Frames fused since the last reset
    pub fn integrated_frames(&self) -> u64 {
        self.integrated_frames
    }

    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    fn voxel_center(x: usize, y: usize, z: usize) -> Vector3 {
        Vector3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5)
    }

    fn check_frame(&self, width: u32, height: u32) -> Result<(), String> {
        let (w, h) = self.resolution.size();
        if (width, height) != (w, h) {
            return Err(format!(
                "frame is {}x{}, reconstruction expects {}",
                width, height, self.resolution
            ));
        }
        Ok(())
    }

    /// Trilinear TSDF sample at a volume-space position
    ///
    /// `None` if any of the eight neighbors lies outside the grid or has
    /// never been observed.
    fn sample(&self, p: Vector3) -> Option<f32> {
        let g = [p.x - 0.5, p.y - 0.5, p.z - 0.5];
        let mut base = [0usize; 3];
        let mut frac = [0f32; 3];
        for axis in 0..3 {
            if g[axis] < 0.0 {
                return None;
            }
            let cell = g[axis].floor() as usize;
            if cell + 1 >= self.dims[axis] {
                return None;
            }
            base[axis] = cell;
            frac[axis] = g[axis] - cell as f32;
        }

        let mut value = 0.0;
        for [dx, dy, dz] in CUBE_CORNERS {
            let i = self.index(base[0] + dx, base[1] + dy, base[2] + dz);
            if self.weights[i] == 0 {
                return None;
            }
            let w = |axis: usize, d: usize| if d == 1 { frac[axis] } else { 1.0 - frac[axis] };
            value += self.tsdf[i] * w(0, dx) * w(1, dy) * w(2, dz);
        }
        Some(value)
    }

    /// Central-difference TSDF gradient in volume space
    fn gradient(&self, p: Vector3) -> Option<Vector3> {
        let dx = Vector3::new(1.0, 0.0, 0.0);
        let dy = Vector3::new(0.0, 1.0, 0.0);
        let dz = Vector3::new(0.0, 0.0, 1.0);
        Some(Vector3::new(
            self.sample(p + dx)? - self.sample(p - dx)?,
            self.sample(p + dy)? - self.sample(p - dy)?,
            self.sample(p + dz)? - self.sample(p - dz)?,
        ))
    }

    /// Map a volume-space gradient to a unit world-space normal
    fn world_normal(&self, g: Vector3) -> Vector3 {
        let m = &self.world_to_volume.m;
        Vector3::new(
            m[0][0] * g.x + m[0][1] * g.y + m[0][2] * g.z,
            m[1][0] * g.x + m[1][1] * g.y + m[1][2] * g.z,
            m[2][0] * g.x + m[2][1] * g.y + m[2][2] * g.z,
        )
        .normalized()
    }

    /// Parametric range where a ray lies inside the grid box
    fn clip_to_grid(&self, origin: Vector3, dir: Vector3) -> Option<(f32, f32)> {
        let o = [origin.x, origin.y, origin.z];
        let d = [dir.x, dir.y, dir.z];
        let (mut t_near, mut t_far) = (0.0f32, f32::INFINITY);
        for axis in 0..3 {
            let extent = self.dims[axis] as f32;
            if d[axis].abs() < 1e-9 {
                if o[axis] < 0.0 || o[axis] > extent {
                    return None;
                }
                continue;
            }
            let (mut t0, mut t1) = (-o[axis] / d[axis], (extent - o[axis]) / d[axis]);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_near = t_near.max(t0);
            t_far = t_far.min(t1);
        }
        (t_far > t_near).then_some((t_near, t_far))
    }

    fn raycast_into(&self, world_to_camera: &Matrix4, out: &mut PointCloud) -> EngineResult<()> {
        self.check_frame(out.width, out.height)
            .map_err(EngineError::Raycast)?;
        let camera_to_world = world_to_camera
            .inverse_affine()
            .ok_or_else(|| EngineError::Raycast("camera pose is singular".to_string()))?;

        out.clear();
        if self.integrated_frames == 0 {
            return Ok(());
        }

        let eye = camera_to_world.translation();
        let eye_volume = self.world_to_volume.transform_point(eye);
        let step = self.truncation * RAY_STEP_FRACTION;
        let width = out.width as usize;

        for (i, (point, normal)) in out.points.iter_mut().zip(out.normals.iter_mut()).enumerate() {
            let (x, y) = ((i % width) as f32 + 0.5, (i / width) as f32 + 0.5);
            let dir = camera_to_world
                .transform_vector(self.intrinsics.ray(x, y))
                .normalized();
            let dir_volume = self.world_to_volume.transform_vector(dir);
            let Some((t_start, t_end)) = self.clip_to_grid(eye_volume, dir_volume) else {
                continue;
            };

            let mut previous: Option<(f32, f32)> = None;
            let mut t = t_start;
            while t <= t_end {
                let current = self.sample(eye_volume + dir_volume * t);
                match (previous, current) {
                    (Some((tp, fp)), Some(fc)) if fp > 0.0 && fc <= 0.0 => {
                        let t_hit = self.refine_crossing(eye_volume, dir_volume, (tp, fp), (t, fc));
                        if let Some(g) = self.gradient(eye_volume + dir_volume * t_hit) {
                            let n = self.world_normal(g);
                            if !n.is_zero() {
                                *point = eye + dir * t_hit;
                                *normal = n;
                            }
                        }
                        break;
                    }
                    // Leaving a surface from behind
                    (Some((_, fp)), Some(fc)) if fp < 0.0 && fc > 0.0 => break,
                    _ => {}
                }
                previous = current.map(|fc| (t, fc));
                t += step;
            }
        }
        Ok(())
    }

    /// Narrow a sign change between two ray samples and interpolate the root
    ///
    /// The outer sample may sit in the clamped part of the field, so the
    /// bracket is bisected before interpolating linearly.
    fn refine_crossing(
        &self,
        origin: Vector3,
        dir: Vector3,
        outside: (f32, f32),
        inside: (f32, f32),
    ) -> f32 {
        let ((mut t_out, mut f_out), (mut t_in, mut f_in)) = (outside, inside);
        for _ in 0..RAY_REFINE_STEPS {
            let mid = 0.5 * (t_out + t_in);
            match self.sample(origin + dir * mid) {
                Some(f) if f > 0.0 => (t_out, f_out) = (mid, f),
                Some(f) => (t_in, f_in) = (mid, f),
                None => break,
            }
        }
        t_out + (t_in - t_out) * f_out / (f_out - f_in)
    }

    /// Translation-only projective ICP against the reference surface
    ///
    /// Returns the refined world-to-camera pose, or `None` if the frame does
    /// not overlap the reference well enough or the residual stays too high.
    fn align(
        &self,
        depth: &FloatDepthFrame,
        world_to_camera: &Matrix4,
        max_iterations: u16,
    ) -> Option<Matrix4> {
        let mut camera_to_world = world_to_camera.inverse_affine()?;
        let (width, height) = (depth.width as usize, depth.height as usize);
        let stride = tracking::ALIGN_PIXEL_STRIDE;

        let mut offset = Vector3::ZERO;
        let mut residual = f32::INFINITY;
        for iteration in 0..max_iterations.max(1) {
            let mut correction = Vector3::ZERO;
            let (mut matched, mut sampled, mut error) = (0usize, 0usize, 0.0f32);

            for y in (0..height).step_by(stride) {
                for x in (0..width).step_by(stride) {
                    let d = depth.data[y * width + x];
                    if d == NO_DEPTH {
                        continue;
                    }
                    sampled += 1;

                    let ray = self.intrinsics.ray(x as f32 + 0.5, y as f32 + 0.5);
                    let p = camera_to_world.transform_point(ray * d) + offset;
                    let Some((u, v)) = self
                        .intrinsics
                        .project(self.reference_pose.transform_point(p))
                    else {
                        continue;
                    };
                    if u < 0.0 || v < 0.0 || u as usize >= width || v as usize >= height {
                        continue;
                    }
                    let j = v as usize * width + u as usize;
                    if !self.reference.is_hit(j) {
                        continue;
                    }
                    let diff = self.reference.points[j] - p;
                    let distance = diff.length();
                    if distance > tracking::ALIGN_MAX_POINT_DISTANCE_M {
                        continue;
                    }
                    correction = correction + diff;
                    error += distance;
                    matched += 1;
                }
            }

            if sampled == 0 || (matched as f32) < sampled as f32 * tracking::ALIGN_MIN_OVERLAP {
                debug!(iteration, matched, sampled, "Alignment overlap too small");
                return None;
            }

            let step = correction * (1.0 / matched as f32);
            offset = offset + step;
            residual = error / matched as f32;
            if step.length() < ALIGN_CONVERGED_M {
                break;
            }
        }

        if residual > tracking::ALIGN_MAX_RESIDUAL_M {
            debug!(residual, "Alignment residual too high");
            return None;
        }

        camera_to_world.set_translation(camera_to_world.translation() + offset);
        camera_to_world.inverse_affine()
    }

    /// Fuse a depth frame observed from `world_to_camera`
    fn fuse(&mut self, depth: &FloatDepthFrame, world_to_camera: &Matrix4, max_weight: u16) {
        let volume_to_camera = self.volume_to_world.then(world_to_camera);
        let step_x = volume_to_camera.transform_vector(Vector3::new(1.0, 0.0, 0.0));
        let (width, height) = (depth.width as usize, depth.height as usize);
        let max_weight = max_weight.clamp(1, volume::MAX_INTEGRATION_WEIGHT);
        let truncation = self.truncation;
        let [nx, ny, nz] = self.dims;

        for z in 0..nz {
            for y in 0..ny {
                let mut c = volume_to_camera.transform_point(Self::voxel_center(0, y, z));
                let row = self.index(0, y, z);
                for x in 0..nx {
                    let camera = c;
                    c = c + step_x;

                    let Some((u, v)) = self.intrinsics.project(camera) else {
                        continue;
                    };
                    if u < 0.0 || v < 0.0 || u as usize >= width || v as usize >= height {
                        continue;
                    }
                    let d = depth.data[v as usize * width + u as usize];
                    if d == NO_DEPTH {
                        continue;
                    }
                    let sdf = d - camera.z;
                    if sdf < -truncation {
                        continue;
                    }

                    let i = row + x;
                    let observed = (sdf / truncation).min(1.0);
                    let weight = self.weights[i] as f32;
                    self.tsdf[i] = (self.tsdf[i] * weight + observed) / (weight + 1.0);
                    self.weights[i] = (self.weights[i] + 1).min(max_weight);
                }
            }
        }
    }
}

impl ReconstructionEngine for CpuReconstruction {
    fn depth_to_float(
        &mut self,
        depth: &[DepthPixel],
        out: &mut FloatDepthFrame,
        min_depth: f32,
        max_depth: f32,
        mirror: bool,
    ) -> EngineResult<()> {
        self.check_frame(out.width, out.height)
            .map_err(EngineError::Conversion)?;
        convert_depth(depth, out, min_depth, max_depth, mirror)
    }

    fn integrate(
        &mut self,
        depth: &FloatDepthFrame,
        max_align_iterations: u16,
        max_integration_weight: u16,
        world_to_camera: &Matrix4,
    ) -> EngineResult<IntegrateOutcome> {
        self.check_frame(depth.width, depth.height)
            .map_err(EngineError::Integration)?;

        let pose = if self.integrated_frames == 0 {
            *world_to_camera
        } else {
            match self.align(depth, world_to_camera, max_align_iterations) {
                Some(pose) => pose,
                None => return Ok(IntegrateOutcome::TrackingLost),
            }
        };

        self.fuse(depth, &pose, max_integration_weight);
        self.integrated_frames += 1;
        self.version += 1;

        let mut reference = PointCloud::new(self.resolution);
        self.raycast_into(&pose, &mut reference)
            .map_err(|e| EngineError::Integration(e.to_string()))?;
        self.reference = reference;
        self.reference_pose = pose;

        Ok(IntegrateOutcome::Tracked(pose))
    }

    fn raycast(&mut self, world_to_camera: &Matrix4, out: &mut PointCloud) -> EngineResult<()> {
        self.raycast_into(world_to_camera, out)
    }

    fn extract_mesh(&mut self, voxel_step: u32) -> EngineResult<Mesh> {
        let step = voxel_step.max(1) as usize;
        let [nx, ny, nz] = self.dims;
        let mut mesh = Mesh::new();

        let starts = |n: usize| (0..n).step_by(step).take_while(move |&i| i + step < n);
        for z in starts(nz) {
            for y in starts(ny) {
                'cube: for x in starts(nx) {
                    let mut positions = [Vector3::ZERO; 8];
                    let mut values = [0f32; 8];
                    for (corner, [dx, dy, dz]) in CUBE_CORNERS.iter().enumerate() {
                        let (cx, cy, cz) = (x + dx * step, y + dy * step, z + dz * step);
                        let i = self.index(cx, cy, cz);
                        if self.weights[i] == 0 {
                            continue 'cube;
                        }
                        values[corner] = self.tsdf[i];
                        positions[corner] = self
                            .volume_to_world
                            .transform_point(Self::voxel_center(cx, cy, cz));
                    }
                    tetra::polygonize_cube(&positions, &values, &mut mesh);
                }
            }
        }

        info!(
            triangles = mesh.triangle_count(),
            voxel_step = step,
            "Extracted mesh from volume"
        );
        Ok(mesh)
    }

    fn reset(
        &mut self,
        world_to_camera: &Matrix4,
        world_to_volume: Option<&Matrix4>,
    ) -> EngineResult<()> {
        let world_to_volume = world_to_volume
            .copied()
            .unwrap_or(self.default_world_to_volume);
        let volume_to_world = world_to_volume
            .inverse_affine()
            .ok_or_else(|| EngineError::Reset("world-to-volume transform is singular".to_string()))?;

        self.tsdf.fill(1.0);
        self.weights.fill(0);
        self.world_to_volume = world_to_volume;
        self.volume_to_world = volume_to_world;
        self.reference.clear();
        self.reference_pose = *world_to_camera;
        self.integrated_frames = 0;
        self.version += 1;

        debug!(version = self.version, "Reconstruction volume cleared");
        Ok(())
    }

    fn default_world_to_volume(&self) -> Matrix4 {
        self.default_world_to_volume
    }

    fn volume_config(&self) -> VolumeConfig {
        self.config
    }

    fn resolution(&self) -> DepthResolution {
        self.resolution
    }

    fn volume_version(&self) -> u64 {
        self.version
    }
}
