// SPDX-License-Identifier: GPL-3.0-only

//! Software mesh preview
//!
//! Rasterizes a reloaded mesh with a z-buffer into a [`ShadedImage`] so the
//! viewer can display it the same way it displays the live reconstruction.

use crate::backends::engine::{Mesh, ShadedImage};
use crate::math::Vector3;
use std::path::Path;
use tracing::debug;

/// Vertical field of view of the preview camera
const PREVIEW_FOV_DEG: f32 = 50.0;

/// Camera distance in multiples of the mesh bounding radius
const PREVIEW_DISTANCE: f32 = 2.5;

/// Orbit camera around the mesh center
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orbit {
    /// Rotation about the vertical axis (radians)
    pub yaw: f32,
    /// Rotation about the horizontal axis (radians)
    pub pitch: f32,
    /// Distance multiplier, smaller is closer
    pub zoom: f32,
}

impl Default for Orbit {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            zoom: 1.0,
        }
    }
}

impl Orbit {
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        self.yaw = (self.yaw + yaw) % std::f32::consts::TAU;
        let limit = std::f32::consts::FRAC_PI_2 - 0.01;
        self.pitch = (self.pitch + pitch).clamp(-limit, limit);
    }

    pub fn zoom_by(&mut self, factor: f32) {
        self.zoom = (self.zoom * factor).clamp(0.2, 5.0);
    }

    fn apply(&self, v: Vector3) -> Vector3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        let x = v.x * cy + v.z * sy;
        let z = -v.x * sy + v.z * cy;
        Vector3::new(x, v.y * cp - z * sp, v.y * sp + z * cp)
    }
}

/// Render `mesh` into a `width` x `height` RGBA image
pub fn render_mesh_preview(mesh: &Mesh, width: u32, height: u32, orbit: &Orbit) -> ShadedImage {
    let mut image = ShadedImage::new(width, height);
    for px in image.data.chunks_exact_mut(4) {
        px[3] = 255;
    }
    let Some((lo, hi)) = mesh.bounds() else {
        return image;
    };
    if width == 0 || height == 0 {
        return image;
    }

    let center = (lo + hi) * 0.5;
    let radius = ((hi - lo).length() * 0.5).max(1e-3);
    let distance = radius * PREVIEW_DISTANCE * orbit.zoom;
    let focal = 0.5 * height as f32 / (PREVIEW_FOV_DEG.to_radians() * 0.5).tan();
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);

    let mut depth = vec![f32::INFINITY; (width * height) as usize];
    let mut drawn = 0usize;

    for (corners, normal) in mesh.triangles() {
        let cam = corners.map(|c| orbit.apply(c - center) + Vector3::new(0.0, 0.0, distance));
        if cam.iter().any(|c| c.z <= 1e-4) {
            continue;
        }
        let screen = cam.map(|c| (focal * c.x / c.z + cx, focal * c.y / c.z + cy, c.z));

        let area = edge(screen[0], screen[1], screen[2].0, screen[2].1);
        if area.abs() < 1e-9 {
            continue;
        }

        let lambert = orbit.apply(normal).z.abs();
        let level = 40.0 + 215.0 * lambert;
        let rgba = [(level * 0.85) as u8, (level * 0.92) as u8, level as u8, 255];

        let min_x = screen.iter().map(|s| s.0).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let max_x = screen.iter().map(|s| s.0).fold(f32::NEG_INFINITY, f32::max).ceil().min(width as f32 - 1.0);
        let min_y = screen.iter().map(|s| s.1).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
        let max_y = screen.iter().map(|s| s.1).fold(f32::NEG_INFINITY, f32::max).ceil().min(height as f32 - 1.0);
        if max_x < 0.0 || max_y < 0.0 {
            continue;
        }

        for y in min_y..=max_y as u32 {
            for x in min_x..=max_x as u32 {
                let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(screen[1], screen[2], px, py) / area;
                let w1 = edge(screen[2], screen[0], px, py) / area;
                let w2 = 1.0 - w0 - w1;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let z = w0 * screen[0].2 + w1 * screen[1].2 + w2 * screen[2].2;
                let i = (y * width + x) as usize;
                if z < depth[i] {
                    depth[i] = z;
                    image.set_pixel(x, y, rgba);
                    drawn += 1;
                }
            }
        }
    }

    debug!(triangles = mesh.triangle_count(), fragments = drawn, "Rendered mesh preview");
    image
}

fn edge(a: (f32, f32, f32), b: (f32, f32, f32), px: f32, py: f32) -> f32 {
    (b.0 - a.0) * (py - a.1) - (b.1 - a.1) * (px - a.0)
}

/// Save an RGBA image as PNG
pub fn save_image_png(image: &ShadedImage, path: &Path) -> Result<(), String> {
    let buffer = image::RgbaImage::from_raw(image.width, image.height, image.data.clone())
        .ok_or_else(|| "Image buffer does not match its dimensions".to_string())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    buffer
        .save(path)
        .map_err(|e| format!("Failed to save {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facing_triangle() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.push_triangle(
            [
                Vector3::new(-1.0, -1.0, 0.0),
                Vector3::new(1.0, -1.0, 0.0),
                Vector3::new(0.0, 1.0, 0.0),
            ],
            Vector3::new(0.0, 0.0, 1.0),
        );
        mesh
    }

    #[test]
    fn test_empty_mesh_is_black() {
        let image = render_mesh_preview(&Mesh::new(), 16, 8, &Orbit::default());
        assert!(image.data.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn test_triangle_covers_center() {
        let image = render_mesh_preview(&facing_triangle(), 64, 48, &Orbit::default());
        assert_eq!(image.pixel(32, 24), [216, 234, 255, 255]);
        assert_eq!(image.pixel(0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_edge_on_triangle_draws_nothing() {
        let mut orbit = Orbit::default();
        orbit.rotate(std::f32::consts::FRAC_PI_2, 0.0);
        let image = render_mesh_preview(&facing_triangle(), 64, 48, &orbit);
        assert!(image.data.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn test_orbit_limits() {
        let mut orbit = Orbit::default();
        orbit.rotate(0.0, 10.0);
        assert!(orbit.pitch < std::f32::consts::FRAC_PI_2);
        orbit.zoom_by(100.0);
        assert_eq!(orbit.zoom, 5.0);
    }

    #[test]
    fn test_save_png() {
        let path = std::env::temp_dir().join(format!("depth-fusion-preview-{}.png", uuid::Uuid::new_v4()));
        let image = render_mesh_preview(&facing_triangle(), 32, 24, &Orbit::default());
        save_image_png(&image, &path).unwrap();
        let loaded = image::open(&path).unwrap().into_rgba8();
        assert_eq!(loaded.dimensions(), (32, 24));
        std::fs::remove_file(&path).ok();
    }
}
