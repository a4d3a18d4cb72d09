// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic depth sensor
//!
//! Renders a fixed analytic scene (a sphere in front of a back wall) from a
//! static camera. Useful for running the full pipeline without hardware and
//! for deterministic tests.

use super::{
    CameraIntrinsics, DepthPixel, DepthResolution, DepthSensor, FrameWait, RawFrame,
    SensorResult, StreamHandle, encode_depth_pixels,
};
use crate::constants::{sensor as sensor_consts, timing};
use crate::errors::SensorError;
use crate::math::Vector3;
use std::time::{Duration, Instant};
use tracing::debug;

/// Analytic scene rendered by [`SyntheticSensor`], in camera space (meters)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticScene {
    /// Distance of the back wall plane
    pub wall_distance: f32,
    /// Sphere center
    pub sphere_center: Vector3,
    /// Sphere radius
    pub sphere_radius: f32,
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            wall_distance: 1.6,
            sphere_center: Vector3::new(0.0, 0.05, 1.1),
            sphere_radius: 0.25,
        }
    }
}

impl SyntheticScene {
    /// Depth (z) along a unit-depth camera ray, if anything is hit
    fn depth_along(&self, ray: Vector3) -> Option<f32> {
        let mut nearest = (self.wall_distance > 0.0).then_some(self.wall_distance);

        // |t*ray - c|^2 = r^2, ray.z == 1 so t is the depth
        let a = ray.dot(ray);
        let b = -2.0 * ray.dot(self.sphere_center);
        let c = self.sphere_center.dot(self.sphere_center) - self.sphere_radius * self.sphere_radius;
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let t = (-b - disc.sqrt()) / (2.0 * a);
            if t > 0.0 && nearest.is_none_or(|n| t < n) {
                nearest = Some(t);
            }
        }
        nearest
    }

    /// Render the scene into extended depth pixels
    pub fn render(&self, resolution: DepthResolution) -> Vec<DepthPixel> {
        let (width, height) = resolution.size();
        let intrinsics = CameraIntrinsics::for_resolution(resolution);
        let mut pixels = Vec::with_capacity(resolution.pixel_count());

        for y in 0..height {
            for x in 0..width {
                let ray = intrinsics.ray(x as f32 + 0.5, y as f32 + 0.5);
                let depth_mm = self
                    .depth_along(ray)
                    .map(|z| (z * 1000.0).round())
                    .filter(|&mm| mm > 0.0 && mm <= sensor_consts::MAX_DEPTH_MM as f32)
                    .map(|mm| mm as u16)
                    .unwrap_or(0);
                pixels.push(DepthPixel::new(depth_mm, 0));
            }
        }
        pixels
    }
}

/// Depth sensor that streams a rendered [`SyntheticScene`]
pub struct SyntheticSensor {
    scene: SyntheticScene,
    paced: bool,
    loop_after: Option<u32>,
    frame_data: Option<Vec<u8>>,
    frame_number: u32,
    next_due: Option<Instant>,
}

impl SyntheticSensor {
    pub fn new(scene: SyntheticScene) -> Self {
        Self {
            scene,
            paced: true,
            loop_after: None,
            frame_data: None,
            frame_number: 0,
            next_due: None,
        }
    }

    /// Deliver frames immediately instead of at the nominal frame rate
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Restart timestamps every `frames` frames, like a looping recording
    pub fn looping_every(mut self, frames: u32) -> Self {
        self.loop_after = Some(frames.max(1));
        self
    }

    fn timestamp_ms(&self) -> i64 {
        let index = match self.loop_after {
            Some(period) => self.frame_number % period,
            None => self.frame_number,
        };
        index as i64 * timing::FRAME_INTERVAL_MS
    }
}

impl Default for SyntheticSensor {
    fn default() -> Self {
        Self::new(SyntheticScene::default())
    }
}

impl DepthSensor for SyntheticSensor {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open_depth_stream(&mut self, resolution: DepthResolution) -> SensorResult<StreamHandle> {
        let pixels = self.scene.render(resolution);
        self.frame_data = Some(encode_depth_pixels(&pixels));
        self.frame_number = 0;
        self.next_due = None;
        debug!(resolution = %resolution, "Synthetic depth scene rendered");
        Ok(StreamHandle(0))
    }

    fn wait_for_frame(&mut self, timeout: Duration) -> SensorResult<FrameWait> {
        if self.frame_data.is_none() {
            return Err(SensorError::StreamNotOpen);
        }
        if !self.paced {
            return Ok(FrameWait::Ready);
        }

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            let wait = due - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(FrameWait::TimedOut);
            }
            std::thread::sleep(wait);
        }
        Ok(FrameWait::Ready)
    }

    fn next_frame(
        &mut self,
        _handle: StreamHandle,
        _timeout: Duration,
    ) -> SensorResult<Option<RawFrame>> {
        let data = self.frame_data.as_ref().ok_or(SensorError::StreamNotOpen)?;
        let frame = RawFrame {
            frame_number: self.frame_number,
            timestamp_ms: self.timestamp_ms(),
            data: data.clone(),
        };
        self.frame_number = self.frame_number.wrapping_add(1);
        self.next_due =
            Some(Instant::now() + Duration::from_millis(timing::FRAME_INTERVAL_MS as u64));
        Ok(Some(frame))
    }

    fn release_frame(&mut self, _handle: StreamHandle, _frame: RawFrame) -> SensorResult<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.frame_data = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_center_hits_sphere() {
        let scene = SyntheticScene::default();
        let res = DepthResolution::R80x60;
        let pixels = scene.render(res);
        let (w, h) = res.size();
        let center = pixels[((h / 2) * w + w / 2) as usize];
        // Sphere front surface is ~0.85m away
        assert!(center.depth > 800 && center.depth < 900, "{}", center.depth);
        let corner = pixels[0];
        assert_eq!(corner.depth, 1600);
    }

    #[test]
    fn test_looping_timestamps() {
        let mut sensor = SyntheticSensor::default().unpaced().looping_every(3);
        let handle = sensor.open_depth_stream(DepthResolution::R80x60).unwrap();
        let stamps: Vec<i64> = (0..5)
            .map(|_| {
                sensor
                    .next_frame(handle, Duration::ZERO)
                    .unwrap()
                    .unwrap()
                    .timestamp_ms
            })
            .collect();
        assert_eq!(stamps, vec![0, 33, 66, 0, 33]);
    }

    #[test]
    fn test_wait_before_open() {
        let mut sensor = SyntheticSensor::default();
        assert_eq!(
            sensor.wait_for_frame(Duration::ZERO).unwrap_err(),
            SensorError::StreamNotOpen
        );
    }
}
