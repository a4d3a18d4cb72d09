// SPDX-License-Identifier: GPL-3.0-only

//! Binary STL encoding
//!
//! Layout: 80-byte zero header, little-endian `u32` triangle count, then per
//! triangle a face normal and three vertices (12 `f32`s) followed by a zero
//! `u16` attribute.

use crate::backends::engine::Mesh;
use crate::constants::mesh::{STL_HEADER_LEN, STL_TRIANGLE_LEN};
use crate::errors::MeshError;
use crate::math::Vector3;

fn put_vector(out: &mut Vec<u8>, v: Vector3) {
    for c in [v.x, v.y, v.z] {
        out.extend_from_slice(&c.to_le_bytes());
    }
}

/// Encode a validated mesh as binary STL
pub fn encode(mesh: &Mesh, flip_yz: bool) -> Result<Vec<u8>, MeshError> {
    mesh.validate()?;
    let triangles = mesh.triangle_count();
    let count = u32::try_from(triangles)
        .map_err(|_| MeshError::InvalidMesh(format!("{} triangles is too many for STL", triangles)))?;

    let mut out = Vec::with_capacity(STL_HEADER_LEN + 4 + triangles * STL_TRIANGLE_LEN);
    out.resize(STL_HEADER_LEN, 0);
    out.extend_from_slice(&count.to_le_bytes());

    let orient = |v: Vector3| if flip_yz { v.flip_yz() } else { v };
    for (corners, normal) in mesh.triangles() {
        put_vector(&mut out, orient(normal));
        for corner in corners {
            put_vector(&mut out, orient(corner));
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }
    Ok(out)
}

/// Triangle count from a binary STL header, checked against the data length
pub fn triangle_count(bytes: &[u8]) -> Result<usize, MeshError> {
    let count_bytes = bytes
        .get(STL_HEADER_LEN..STL_HEADER_LEN + 4)
        .ok_or_else(|| MeshError::Parse(format!("STL data is only {} bytes", bytes.len())))?;
    let count = u32::from_le_bytes([count_bytes[0], count_bytes[1], count_bytes[2], count_bytes[3]])
        as usize;

    let expected = STL_HEADER_LEN + 4 + count * STL_TRIANGLE_LEN;
    if bytes.len() != expected {
        return Err(MeshError::Parse(format!(
            "STL header declares {} triangles ({} bytes) but data is {} bytes",
            count,
            expected,
            bytes.len()
        )));
    }
    Ok(count)
}

/// Decode binary STL back into a mesh, undoing the Y/Z flip if it was applied
pub fn decode(bytes: &[u8], flip_yz: bool) -> Result<Mesh, MeshError> {
    let count = triangle_count(bytes)?;
    let body = &bytes[STL_HEADER_LEN + 4..];

    let read_vector = |record: &[u8], offset: usize| {
        let f = |i: usize| {
            let at = offset + i * 4;
            f32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]])
        };
        let v = Vector3::new(f(0), f(1), f(2));
        if flip_yz { v.flip_yz() } else { v }
    };

    let mut mesh = Mesh::new();
    for record in body.chunks_exact(STL_TRIANGLE_LEN).take(count) {
        let normal = read_vector(record, 0);
        let corners = [
            read_vector(record, 12),
            read_vector(record, 24),
            read_vector(record, 36),
        ];
        mesh.push_triangle(corners, normal);
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_triangle() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.push_triangle(
            [
                Vector3::new(0.0, 1.0, 2.0),
                Vector3::new(1.0, 1.0, 2.0),
                Vector3::new(0.0, 2.0, 2.0),
            ],
            Vector3::new(0.0, 0.0, 1.0),
        );
        mesh
    }

    #[test]
    fn test_byte_layout() {
        let bytes = encode(&one_triangle(), true).unwrap();
        assert_eq!(bytes.len(), 80 + 4 + 50);
        assert!(bytes[..80].iter().all(|&b| b == 0));
        assert_eq!(&bytes[80..84], &1u32.to_le_bytes());
        // Normal z flipped
        assert_eq!(&bytes[92..96], &(-1.0f32).to_le_bytes());
        // First vertex y flipped
        assert_eq!(&bytes[100..104], &(-1.0f32).to_le_bytes());
        assert_eq!(&bytes[132..134], &[0, 0]);
    }

    #[test]
    fn test_decode_restores_orientation() {
        let mesh = one_triangle();
        let bytes = encode(&mesh, true).unwrap();
        assert_eq!(decode(&bytes, true).unwrap(), mesh);
    }

    #[test]
    fn test_truncated_data() {
        let mut bytes = encode(&one_triangle(), false).unwrap();
        bytes.pop();
        assert!(matches!(decode(&bytes, false), Err(MeshError::Parse(_))));
        assert!(triangle_count(&bytes[..40]).is_err());
    }

    #[test]
    fn test_rejects_empty_mesh() {
        assert!(matches!(
            encode(&Mesh::new(), true),
            Err(MeshError::InvalidMesh(_))
        ));
    }
}
