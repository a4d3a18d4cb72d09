// SPDX-License-Identifier: GPL-3.0-only

//! Wavefront OBJ text encoding
//!
//! Every triangle gets three fresh `v` lines and one `f` line with 1-based
//! sequential indices; vertices are never shared.

use crate::backends::engine::Mesh;
use crate::constants::mesh::OBJ_HEADER;
use crate::errors::MeshError;
use crate::math::Vector3;
use std::fmt::Write;

/// Encode a validated mesh as OBJ text
pub fn encode(mesh: &Mesh, flip_yz: bool) -> Result<String, MeshError> {
    mesh.validate()?;

    // ~40 bytes per vertex line, ~20 per face line
    let mut out = String::with_capacity(OBJ_HEADER.len() + mesh.vertex_count() * 40 + mesh.triangle_count() * 20);
    out.push_str(OBJ_HEADER);

    for &v in &mesh.vertices {
        let v = if flip_yz { v.flip_yz() } else { v };
        // Writing into a String cannot fail
        let _ = writeln!(out, "v {:.6} {:.6} {:.6}", v.x, v.y, v.z);
    }
    for t in 0..mesh.triangle_count() {
        let base = t * 3 + 1;
        let _ = writeln!(out, "f {} {} {}", base, base + 1, base + 2);
    }
    Ok(out)
}

/// Resolve a face index token (`7`, `7/1`, `7//3`, `-1`) against `vertex_count`
fn face_index(token: &str, vertex_count: usize, line: usize) -> Result<usize, MeshError> {
    let raw = token.split('/').next().unwrap_or(token);
    let index: i64 = raw
        .parse()
        .map_err(|_| MeshError::Parse(format!("line {}: bad face index '{}'", line, token)))?;

    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => vertex_count as i64 + i,
        _ => -1,
    };
    if resolved < 0 || resolved as usize >= vertex_count {
        return Err(MeshError::Parse(format!(
            "line {}: face index {} out of range (have {} vertices)",
            line, index, vertex_count
        )));
    }
    Ok(resolved as usize)
}

/// Parse OBJ text into an unshared triangle mesh
///
/// Polygons are fan-triangulated. Face normals are recomputed from the
/// winding since OBJ normals are optional.
pub fn decode(text: &str, flip_yz: bool) -> Result<Mesh, MeshError> {
    let mut positions: Vec<Vector3> = Vec::new();
    let mut mesh = Mesh::new();

    for (number, line) in text.lines().enumerate() {
        let number = number + 1;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let coords: Vec<f32> = tokens
                    .take(3)
                    .map(|t| t.parse::<f32>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| MeshError::Parse(format!("line {}: {}", number, e)))?;
                if coords.len() != 3 {
                    return Err(MeshError::Parse(format!(
                        "line {}: vertex needs 3 coordinates",
                        number
                    )));
                }
                let v = Vector3::new(coords[0], coords[1], coords[2]);
                positions.push(if flip_yz { v.flip_yz() } else { v });
            }
            Some("f") => {
                let indices: Vec<usize> = tokens
                    .map(|t| face_index(t, positions.len(), number))
                    .collect::<Result<_, _>>()?;
                if indices.len() < 3 {
                    return Err(MeshError::Parse(format!(
                        "line {}: face needs at least 3 vertices",
                        number
                    )));
                }
                for k in 1..indices.len() - 1 {
                    let corners = [
                        positions[indices[0]],
                        positions[indices[k]],
                        positions[indices[k + 1]],
                    ];
                    let normal = (corners[1] - corners[0])
                        .cross(corners[2] - corners[0])
                        .normalized();
                    mesh.push_triangle(corners, normal);
                }
            }
            _ => {}
        }
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> Mesh {
        let mut mesh = Mesh::new();
        let n = Vector3::new(0.0, 0.0, 1.0);
        mesh.push_triangle(
            [
                Vector3::new(0.0, 0.0, 1.0),
                Vector3::new(1.0, 0.0, 1.0),
                Vector3::new(0.0, 1.0, 1.0),
            ],
            n,
        );
        mesh.push_triangle(
            [
                Vector3::new(1.0, 0.0, 1.0),
                Vector3::new(1.0, 1.0, 1.0),
                Vector3::new(0.0, 1.0, 1.0),
            ],
            n,
        );
        mesh
    }

    #[test]
    fn test_text_shape() {
        let text = encode(&two_triangles(), true).unwrap();
        assert!(text.starts_with(OBJ_HEADER));
        let v_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("v ")).collect();
        let f_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("f ")).collect();
        assert_eq!(v_lines.len(), 6);
        assert_eq!(f_lines, vec!["f 1 2 3", "f 4 5 6"]);
        assert!(v_lines[0].starts_with("v 0.000000 "));
        assert!(v_lines[0].ends_with(" -1.000000"));
    }

    #[test]
    fn test_decode_recomputes_normals() {
        let mesh = two_triangles();
        let decoded = decode(&encode(&mesh, false).unwrap(), false).unwrap();
        assert_eq!(decoded.vertices, mesh.vertices);
        assert_eq!(decoded.normals, mesh.normals);
    }

    #[test]
    fn test_decode_quad_and_slashes() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1/1/1 2/2/1 3//1 -1\n";
        let mesh = decode(text, false).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_decode_rejects_bad_index() {
        assert!(matches!(
            decode("v 0 0 0\nf 1 2 3\n", false),
            Err(MeshError::Parse(_))
        ));
    }
}
