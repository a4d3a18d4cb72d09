// SPDX-License-Identifier: GPL-3.0-only

//! Mesh export, reload and preview
//!
//! Meshes are written as binary STL or Wavefront OBJ. The format follows the
//! file extension; a path without one gets the configured default format's
//! extension appended.

pub mod obj;
mod preview;
pub mod stl;

pub use preview::{Orbit, render_mesh_preview, save_image_png};

use crate::backends::engine::Mesh;
use crate::errors::MeshError;
use crate::math::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk mesh format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshFormat {
    /// Binary STL
    #[default]
    Stl,
    /// ASCII Wavefront OBJ
    Obj,
}

impl MeshFormat {
    pub const ALL: [MeshFormat; 2] = [MeshFormat::Stl, MeshFormat::Obj];

    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
        }
    }

    /// Format named by a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self, MeshError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| MeshError::UnsupportedFormat(format!("{} has no extension", path.display())))?;
        MeshFormat::ALL
            .into_iter()
            .find(|f| ext.eq_ignore_ascii_case(f.extension()))
            .ok_or_else(|| MeshError::UnsupportedFormat(ext.to_string()))
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshFormat::Stl => write!(f, "STL"),
            MeshFormat::Obj => write!(f, "OBJ"),
        }
    }
}

/// Append the default format's extension when `path` has no mesh extension
///
/// Returns the path to write and the format it selects.
pub fn resolve_output_path(path: PathBuf, default_format: MeshFormat) -> (PathBuf, MeshFormat) {
    if let Ok(format) = MeshFormat::from_path(&path) {
        return (path, format);
    }

    let mut name = path.into_os_string();
    name.push(".");
    name.push(default_format.extension());
    (PathBuf::from(name), default_format)
}

/// Timestamped mesh path inside `output_dir`
pub fn default_mesh_path(output_dir: &Path, format: MeshFormat) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    output_dir.join(format!("mesh_{}.{}", timestamp, format.extension()))
}

/// Write `mesh` to `path` in `format`
///
/// The mesh is validated before anything touches the filesystem, so an
/// invalid mesh never leaves a partial file behind.
pub fn export_mesh(mesh: &Mesh, path: &Path, format: MeshFormat, flip_yz: bool) -> Result<(), MeshError> {
    let bytes = match format {
        MeshFormat::Stl => stl::encode(mesh, flip_yz)?,
        MeshFormat::Obj => obj::encode(mesh, flip_yz)?.into_bytes(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| MeshError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, &bytes)
        .map_err(|e| MeshError::Io(format!("Failed to write {}: {}", path.display(), e)))?;

    info!(
        path = %path.display(),
        format = %format,
        vertices = mesh.vertex_count(),
        triangles = mesh.triangle_count(),
        "Mesh saved"
    );
    Ok(())
}

/// Read a mesh file written by [`export_mesh`]; the format follows the extension
pub fn import_mesh(path: &Path, flip_yz: bool) -> Result<Mesh, MeshError> {
    let format = MeshFormat::from_path(path)?;
    let bytes = std::fs::read(path)
        .map_err(|e| MeshError::Io(format!("Failed to read {}: {}", path.display(), e)))?;

    let mesh = match format {
        MeshFormat::Stl => stl::decode(&bytes, flip_yz)?,
        MeshFormat::Obj => {
            let text = String::from_utf8(bytes)
                .map_err(|e| MeshError::Parse(format!("{} is not UTF-8: {}", path.display(), e)))?;
            obj::decode(&text, flip_yz)?
        }
    };

    debug!(
        path = %path.display(),
        triangles = mesh.triangle_count(),
        "Mesh loaded"
    );
    Ok(mesh)
}

/// Summary of a mesh for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshStats {
    pub vertices: usize,
    pub triangles: usize,
    /// Axis-aligned bounds (min, max), `None` for an empty mesh
    pub bounds: Option<(Vector3, Vector3)>,
}

impl MeshStats {
    pub fn of(mesh: &Mesh) -> Self {
        Self {
            vertices: mesh.vertex_count(),
            triangles: mesh.triangle_count(),
            bounds: mesh.bounds(),
        }
    }

    /// Bounding box edge lengths
    pub fn extent(&self) -> Option<Vector3> {
        self.bounds.map(|(lo, hi)| hi - lo)
    }
}

impl fmt::Display for MeshStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vertices, {} triangles", self.vertices, self.triangles)?;
        if let Some(e) = self.extent() {
            write!(f, ", extent {:.3} x {:.3} x {:.3} m", e.x, e.y, e.z)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(MeshFormat::from_path(Path::new("a/b.STL")).unwrap(), MeshFormat::Stl);
        assert_eq!(MeshFormat::from_path(Path::new("scan.obj")).unwrap(), MeshFormat::Obj);
        assert!(matches!(
            MeshFormat::from_path(Path::new("scan.ply")),
            Err(MeshError::UnsupportedFormat(_))
        ));
        assert!(MeshFormat::from_path(Path::new("scan")).is_err());
    }

    #[test]
    fn test_resolve_appends_default_extension() {
        let (path, format) = resolve_output_path(PathBuf::from("out/scan"), MeshFormat::Stl);
        assert_eq!(path, PathBuf::from("out/scan.stl"));
        assert_eq!(format, MeshFormat::Stl);

        let (path, format) = resolve_output_path(PathBuf::from("scan.OBJ"), MeshFormat::Stl);
        assert_eq!(path, PathBuf::from("scan.OBJ"));
        assert_eq!(format, MeshFormat::Obj);

        let (path, _) = resolve_output_path(PathBuf::from("scan.v2"), MeshFormat::Obj);
        assert_eq!(path, PathBuf::from("scan.v2.obj"));
    }

    #[test]
    fn test_default_mesh_path() {
        let path = default_mesh_path(Path::new("/tmp/meshes"), MeshFormat::Obj);
        assert!(path.starts_with("/tmp/meshes"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("mesh_") && name.ends_with(".obj"));
    }

    #[test]
    fn test_stats_display() {
        let mut mesh = Mesh::new();
        mesh.push_triangle(
            [
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(0.0, 2.0, 0.0),
            ],
            Vector3::new(0.0, 0.0, 1.0),
        );
        let stats = MeshStats::of(&mesh);
        assert_eq!(stats.extent(), Some(Vector3::new(1.0, 2.0, 0.0)));
        assert_eq!(
            stats.to_string(),
            "3 vertices, 1 triangles, extent 1.000 x 2.000 x 0.000 m"
        );
    }
}
