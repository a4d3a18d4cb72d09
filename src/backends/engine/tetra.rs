// SPDX-License-Identifier: GPL-3.0-only

//! Marching tetrahedra polygonizer
//!
//! Each grid cube is split into six tetrahedra sharing the 0-7 diagonal, which
//! avoids the ambiguous cases of marching cubes at the price of more triangles.
//! Cube corners are numbered by bits: x = 1, y = 2, z = 4.

use super::Mesh;
use crate::math::Vector3;

/// Corner offsets of a cube, indexed by corner number
pub(super) const CUBE_CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

const CUBE_TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 1, 3, 7],
    [0, 3, 2, 7],
    [0, 2, 6, 7],
    [0, 6, 4, 7],
    [0, 4, 5, 7],
    [0, 5, 1, 7],
];

/// Emit the zero-crossing triangles of one cube
///
/// Negative values are inside the surface. Triangles face the positive side.
pub(super) fn polygonize_cube(positions: &[Vector3; 8], values: &[f32; 8], mesh: &mut Mesh) {
    let negative = values.iter().filter(|&&v| v < 0.0).count();
    if negative == 0 || negative == 8 {
        return;
    }
    for tet in CUBE_TETRAHEDRA {
        polygonize_tetrahedron(tet.map(|i| positions[i]), tet.map(|i| values[i]), mesh);
    }
}

fn polygonize_tetrahedron(p: [Vector3; 4], f: [f32; 4], mesh: &mut Mesh) {
    let mut inside = [0usize; 4];
    let mut outside = [0usize; 4];
    let (mut n_in, mut n_out) = (0, 0);
    for i in 0..4 {
        if f[i] < 0.0 {
            inside[n_in] = i;
            n_in += 1;
        } else {
            outside[n_out] = i;
            n_out += 1;
        }
    }

    let centroid = |idx: &[usize]| {
        idx.iter().fold(Vector3::ZERO, |acc, &i| acc + p[i]) * (1.0 / idx.len() as f32)
    };
    let crossing = |a: usize, b: usize| {
        let t = f[a] / (f[a] - f[b]);
        p[a] + (p[b] - p[a]) * t
    };

    match n_in {
        1 => {
            let outward = centroid(&outside[..3]) - p[inside[0]];
            let i = inside[0];
            emit(
                mesh,
                [
                    crossing(i, outside[0]),
                    crossing(i, outside[1]),
                    crossing(i, outside[2]),
                ],
                outward,
            );
        }
        3 => {
            let o = outside[0];
            let outward = p[o] - centroid(&inside[..3]);
            emit(
                mesh,
                [
                    crossing(o, inside[0]),
                    crossing(o, inside[1]),
                    crossing(o, inside[2]),
                ],
                outward,
            );
        }
        2 => {
            let outward = centroid(&outside[..2]) - centroid(&inside[..2]);
            let (a, b) = (inside[0], inside[1]);
            let (c, d) = (outside[0], outside[1]);
            let quad = [crossing(a, c), crossing(a, d), crossing(b, d), crossing(b, c)];
            emit(mesh, [quad[0], quad[1], quad[2]], outward);
            emit(mesh, [quad[0], quad[2], quad[3]], outward);
        }
        _ => {}
    }
}

fn emit(mesh: &mut Mesh, corners: [Vector3; 3], outward: Vector3) {
    let [a, mut b, mut c] = corners;
    let mut normal = (b - a).cross(c - a);
    if normal.length() <= 1e-12 {
        return;
    }
    if normal.dot(outward) < 0.0 {
        std::mem::swap(&mut b, &mut c);
        normal = -normal;
    }
    mesh.push_triangle([a, b, c], normal.normalized());
}
