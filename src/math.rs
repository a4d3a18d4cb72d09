// SPDX-License-Identifier: GPL-3.0-only

//! Small fixed-size linear algebra for pose bookkeeping
//!
//! Matrices use the row-vector convention: a point is transformed as
//! `p' = p * M`, so the translation lives in the fourth row
//! (`m[3][0..3]`). Both the world-to-camera pose and the world-to-volume
//! transform are stored this way.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// 3-component float vector
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vector3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vector3) -> Vector3 {
        Vector3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or zero for a degenerate input
    pub fn normalized(self) -> Vector3 {
        let len = self.length();
        if len > f32::EPSILON {
            self * (1.0 / len)
        } else {
            Vector3::ZERO
        }
    }

    pub fn is_zero(self) -> bool {
        self == Vector3::ZERO
    }

    /// Mirror the Y and Z axes (camera space to right-handed file space)
    pub fn flip_yz(self) -> Vector3 {
        Vector3::new(self.x, -self.y, -self.z)
    }
}

impl Add for Vector3 {
    type Output = Vector3;
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;
    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

/// 4x4 affine transform, row-vector convention
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Matrix4 {
    pub m: [[f32; 4]; 4],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix4 {
    pub const fn identity() -> Self {
        Self {
            m: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Set this matrix to identity in place
    pub fn set_identity(&mut self) {
        *self = Self::identity();
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn from_translation(t: Vector3) -> Self {
        let mut mat = Self::identity();
        mat.set_translation(t);
        mat
    }

    /// Uniform scale followed by a translation
    pub fn from_scale_translation(scale: f32, t: Vector3) -> Self {
        let mut mat = Self::identity();
        mat.m[0][0] = scale;
        mat.m[1][1] = scale;
        mat.m[2][2] = scale;
        mat.set_translation(t);
        mat
    }

    pub fn translation(&self) -> Vector3 {
        Vector3::new(self.m[3][0], self.m[3][1], self.m[3][2])
    }

    pub fn set_translation(&mut self, t: Vector3) {
        self.m[3][0] = t.x;
        self.m[3][1] = t.y;
        self.m[3][2] = t.z;
    }

    /// Transform a point (applies translation)
    pub fn transform_point(&self, p: Vector3) -> Vector3 {
        self.transform_vector(p) + self.translation()
    }

    /// Transform a direction (ignores translation)
    pub fn transform_vector(&self, v: Vector3) -> Vector3 {
        let m = &self.m;
        Vector3::new(
            v.x * m[0][0] + v.y * m[1][0] + v.z * m[2][0],
            v.x * m[0][1] + v.y * m[1][1] + v.z * m[2][1],
            v.x * m[0][2] + v.y * m[1][2] + v.z * m[2][2],
        )
    }

    /// Compose transforms: `a.then(&b)` maps `p` to `(p * a) * b`
    pub fn then(&self, next: &Matrix4) -> Matrix4 {
        let mut out = [[0.0f32; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[r][k] * next.m[k][c]).sum();
            }
        }
        Matrix4 { m: out }
    }

    /// Inverse of an affine transform (general 3x3 part plus translation)
    ///
    /// Returns `None` when the linear part is singular.
    pub fn inverse_affine(&self) -> Option<Matrix4> {
        let a = &self.m;
        let det = a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
            - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
            + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0]);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv_det = 1.0 / det;

        let mut inv = Matrix4::identity();
        inv.m[0][0] = (a[1][1] * a[2][2] - a[1][2] * a[2][1]) * inv_det;
        inv.m[0][1] = (a[0][2] * a[2][1] - a[0][1] * a[2][2]) * inv_det;
        inv.m[0][2] = (a[0][1] * a[1][2] - a[0][2] * a[1][1]) * inv_det;
        inv.m[1][0] = (a[1][2] * a[2][0] - a[1][0] * a[2][2]) * inv_det;
        inv.m[1][1] = (a[0][0] * a[2][2] - a[0][2] * a[2][0]) * inv_det;
        inv.m[1][2] = (a[0][2] * a[1][0] - a[0][0] * a[1][2]) * inv_det;
        inv.m[2][0] = (a[1][0] * a[2][1] - a[1][1] * a[2][0]) * inv_det;
        inv.m[2][1] = (a[0][1] * a[2][0] - a[0][0] * a[2][1]) * inv_det;
        inv.m[2][2] = (a[0][0] * a[1][1] - a[0][1] * a[1][0]) * inv_det;

        let t = inv.transform_vector(self.translation());
        inv.set_translation(-t);
        Some(inv)
    }

    /// Whether the linear part is orthonormal with determinant +1 and the
    /// last column is (0, 0, 0, 1)
    pub fn is_rigid(&self, tolerance: f32) -> bool {
        let m = &self.m;
        if m[0][3].abs() > tolerance
            || m[1][3].abs() > tolerance
            || m[2][3].abs() > tolerance
            || (m[3][3] - 1.0).abs() > tolerance
        {
            return false;
        }
        let rows = [
            Vector3::new(m[0][0], m[0][1], m[0][2]),
            Vector3::new(m[1][0], m[1][1], m[1][2]),
            Vector3::new(m[2][0], m[2][1], m[2][2]),
        ];
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                if (rows[i].dot(rows[j]) - expected).abs() > tolerance {
                    return false;
                }
            }
        }
        (rows[0].cross(rows[1]).dot(rows[2]) - 1.0).abs() <= tolerance
    }
}
