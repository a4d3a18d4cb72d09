// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for mesh export and reload

mod common;

use depth_fusion::backends::engine::{CpuReconstruction, Mesh};
use depth_fusion::backends::sensor::{FrameSource, SyntheticSensor};
use depth_fusion::errors::MeshError;
use depth_fusion::math::Vector3;
use depth_fusion::pipelines::mesh::{self, MeshFormat, MeshStats};
use depth_fusion::pipelines::reconstruction::ReconstructionSession;

fn wedge() -> Mesh {
    let mut mesh = Mesh::new();
    mesh.push_triangle(
        [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.5, 0.0, 1.0),
            Vector3::new(0.0, 0.5, 1.0),
        ],
        Vector3::new(0.0, 0.0, -1.0),
    );
    mesh.push_triangle(
        [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.5, 1.0),
            Vector3::new(0.0, 0.0, 1.5),
        ],
        Vector3::new(-1.0, 0.0, 0.0),
    );
    mesh
}

#[test]
fn test_stl_file_reloads_in_camera_space() {
    let dir = common::scratch_dir("stl");
    let path = dir.join("wedge.stl");
    let source = wedge();

    mesh::export_mesh(&source, &path, MeshFormat::Stl, true).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 80 + 4 + 2 * 50);

    // On disk Y and Z are negated
    let raw = mesh::import_mesh(&path, false).unwrap();
    assert_eq!(raw.vertices[2], Vector3::new(0.0, -0.5, -1.0));

    assert_eq!(mesh::import_mesh(&path, true).unwrap(), source);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_obj_file_reloads_geometry() {
    let dir = common::scratch_dir("obj");
    let path = dir.join("wedge.obj");
    let source = wedge();

    mesh::export_mesh(&source, &path, MeshFormat::Obj, false).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with('#'));
    assert_eq!(text.lines().filter(|l| l.starts_with("v ")).count(), 6);
    assert_eq!(text.lines().filter(|l| l.starts_with("f ")).count(), 2);

    let reloaded = mesh::import_mesh(&path, false).unwrap();
    assert_eq!(reloaded.triangle_count(), 2);
    assert_eq!(MeshStats::of(&reloaded).bounds, MeshStats::of(&source).bounds);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_invalid_mesh_writes_nothing() {
    let dir = common::scratch_dir("invalid");
    let path = dir.join("broken.stl");

    let mut mesh = wedge();
    mesh.normals.pop();
    assert!(matches!(
        mesh::export_mesh(&mesh, &path, MeshFormat::Stl, true),
        Err(MeshError::InvalidMesh(_))
    ));
    assert!(!path.exists());
}

#[test]
fn test_import_rejects_bad_files() {
    let dir = common::scratch_dir("bad");
    std::fs::create_dir_all(&dir).unwrap();

    let truncated = dir.join("short.stl");
    std::fs::write(&truncated, [0u8; 90]).unwrap();
    assert!(matches!(
        mesh::import_mesh(&truncated, true),
        Err(MeshError::Parse(_))
    ));

    let ply = dir.join("scan.ply");
    std::fs::write(&ply, b"ply").unwrap();
    assert!(matches!(
        mesh::import_mesh(&ply, true),
        Err(MeshError::UnsupportedFormat(_))
    ));

    assert!(matches!(
        mesh::import_mesh(&dir.join("missing.obj"), true),
        Err(MeshError::Io(_))
    ));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_scanned_scene_exports_closed_surface() {
    let dir = common::scratch_dir("scan");
    let mut config = common::test_config();
    config.mesh.voxel_step = 2;
    let sensor = SyntheticSensor::default().unpaced();
    let source = FrameSource::open(Box::new(sensor), config.resolution).unwrap();
    let engine = CpuReconstruction::new(config.volume, config.resolution).unwrap();
    let mut session = ReconstructionSession::new(source, engine, &config).unwrap();
    session.start().unwrap();
    for _ in 0..4 {
        session.tick().unwrap();
    }

    let saved = session.save_mesh(Some(dir.join("scene.obj"))).unwrap();
    assert!(saved.triangles > 0);

    let reloaded = session.reload_last_mesh().unwrap().mesh;
    assert_eq!(reloaded.triangle_count(), saved.triangles);
    let (lo, hi) = reloaded.bounds().unwrap();
    // Sphere at 1.1 m in front of the wall at 1.6 m
    assert!(lo.z > 0.3 && hi.z < 1.8, "surface depth {} .. {}", lo.z, hi.z);

    std::fs::remove_dir_all(&dir).ok();
}
