//! Math primitives shared by the window manager and both backends.
//!
//! Core types:
//! - `Vec2` / `Vec3`: plain vectors (meters or pixels, by context)
//! - `Quat`: unit quaternion rotations
//! - `Mat4`: 4x4 matrix, column-major, column-vector convention
//!
//! Composition reads right-to-left: `a.mul(&b)` applies `b` first.

use std::ops::{Add, Mul, Neg, Sub};

// ── Vec2 ─────────────────────────────────────────────────────

/// 2D vector for window-local points and pixel positions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y)
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s)
    }
}

// ── Vec3 ─────────────────────────────────────────────────────

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const ONE: Self = Self {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };
    /// Forward direction of a pose (OpenXR/OpenVR convention).
    pub const FORWARD: Self = Self {
        x: 0.0,
        y: 0.0,
        z: -1.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, o: Self) -> f32 {
        self.x * o.x + self.y * o.y + self.z * o.z
    }

    pub fn cross(self, o: Self) -> Self {
        Self::new(
            self.y * o.z - self.z * o.y,
            self.z * o.x - self.x * o.z,
            self.x * o.y - self.y * o.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, o: Self) -> f32 {
        (self - o).length()
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// Unit vector, or `None` for (near) zero length.
    pub fn try_normalize(self) -> Option<Self> {
        let len = self.length();
        if len < 1e-10 {
            return None;
        }
        Some(self * (1.0 / len))
    }

    pub fn normalize(self) -> Self {
        self.try_normalize().unwrap_or(Self::ZERO)
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, o: Self) -> Self {
        Self::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, o: Self) -> Self {
        Self::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

// ── Quat ─────────────────────────────────────────────────────

/// Quaternion for rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Create quaternion from Euler angles (yaw, pitch, roll) in radians.
    pub fn from_euler(yaw: f32, pitch: f32, roll: f32) -> Self {
        let (sy, cy) = (yaw * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sr, cr) = (roll * 0.5).sin_cos();

        Self {
            x: cr * sp * cy + sr * cp * sy,
            y: cr * cp * sy - sr * sp * cy,
            z: sr * cp * cy - cr * sp * sy,
            w: cr * cp * cy + sr * sp * sy,
        }
    }

    /// Rotation of `angle` radians around `axis`. Zero axis yields identity.
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let Some(axis) = axis.try_normalize() else {
            return Self::IDENTITY;
        };
        let (s, c) = (angle * 0.5).sin_cos();
        Self {
            x: axis.x * s,
            y: axis.y * s,
            z: axis.z * s,
            w: c,
        }
    }

    pub fn dot(self, o: Self) -> f32 {
        self.x * o.x + self.y * o.y + self.z * o.z + self.w * o.w
    }

    pub fn conjugate(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
            w: self.w,
        }
    }

    pub fn normalize(self) -> Self {
        let len = self.dot(self).sqrt();
        if len < 1e-10 {
            return Self::IDENTITY;
        }
        Self {
            x: self.x / len,
            y: self.y / len,
            z: self.z / len,
            w: self.w / len,
        }
    }

    /// Hamilton product: `self.mul(o)` rotates by `o` first, then `self`.
    pub fn mul(self, o: Self) -> Self {
        Self {
            x: self.w * o.x + self.x * o.w + self.y * o.z - self.z * o.y,
            y: self.w * o.y - self.x * o.z + self.y * o.w + self.z * o.x,
            z: self.w * o.z + self.x * o.y - self.y * o.x + self.z * o.w,
            w: self.w * o.w - self.x * o.x - self.y * o.y - self.z * o.z,
        }
    }

    /// Rotate a vector by this quaternion.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        // result = v + 2 * (q.w * cross(q.xyz, v) + cross(q.xyz, cross(q.xyz, v)))
        let qv = Vec3::new(self.x, self.y, self.z);
        let uv = qv.cross(v);
        let uuv = qv.cross(uv);
        v + (uv * self.w + uuv) * 2.0
    }

    /// Angle between two rotations in radians.
    pub fn angle_to(self, o: Self) -> f32 {
        let d = self.dot(o).abs().clamp(0.0, 1.0);
        2.0 * d.acos()
    }

    /// Spherical linear interpolation.
    pub fn slerp(self, other: Self, t: f32) -> Self {
        let mut dot = self.dot(other);

        let other = if dot < 0.0 {
            dot = -dot;
            Self {
                x: -other.x,
                y: -other.y,
                z: -other.z,
                w: -other.w,
            }
        } else {
            other
        };

        if dot > 0.9995 {
            // Linear interpolation for very close quaternions
            return Self {
                x: self.x + (other.x - self.x) * t,
                y: self.y + (other.y - self.y) * t,
                z: self.z + (other.z - self.z) * t,
                w: self.w + (other.w - self.w) * t,
            }
            .normalize();
        }

        let theta = dot.acos();
        let sin_theta = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin_theta;
        let b = (t * theta).sin() / sin_theta;

        Self {
            x: self.x * a + other.x * b,
            y: self.y * a + other.y * b,
            z: self.z * a + other.z * b,
            w: self.w * a + other.w * b,
        }
    }
}

// ── Mat4 ─────────────────────────────────────────────────────

/// 4x4 matrix (column-major, OpenGL convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    pub data: [f32; 16],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        data: [
            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Create translation matrix.
    pub fn translation(t: Vec3) -> Self {
        let mut m = Self::IDENTITY;
        m.data[12] = t.x;
        m.data[13] = t.y;
        m.data[14] = t.z;
        m
    }

    /// Create scale matrix.
    pub fn scale(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.data[0] = x;
        m.data[5] = y;
        m.data[10] = z;
        m
    }

    /// Create rotation matrix from quaternion.
    pub fn from_quat(q: &Quat) -> Self {
        let (x, y, z, w) = (q.x, q.y, q.z, q.w);
        let x2 = x + x;
        let y2 = y + y;
        let z2 = z + z;
        let xx = x * x2;
        let xy = x * y2;
        let xz = x * z2;
        let yy = y * y2;
        let yz = y * z2;
        let zz = z * z2;
        let wx = w * x2;
        let wy = w * y2;
        let wz = w * z2;

        Self {
            data: [
                1.0 - (yy + zz),
                xy + wz,
                xz - wy,
                0.0,
                xy - wz,
                1.0 - (xx + zz),
                yz + wx,
                0.0,
                xz + wy,
                yz - wx,
                1.0 - (xx + yy),
                0.0,
                0.0,
                0.0,
                0.0,
                1.0,
            ],
        }
    }

    /// Rigid pose: rotate, then translate.
    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self::translation(translation).mul(&Self::from_quat(&rotation))
    }

    /// Multiply two matrices.
    pub fn mul(&self, other: &Self) -> Self {
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += self.data[k * 4 + row] * other.data[col * 4 + k];
                }
                out[col * 4 + row] = sum;
            }
        }
        Self { data: out }
    }

    /// Full inverse. `None` when the matrix is singular (e.g. zero scale).
    pub fn inverse(&self) -> Option<Self> {
        let m = &self.data;
        let mut inv = [0.0f32; 16];

        inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
            + m[9] * m[7] * m[14]
            + m[13] * m[6] * m[11]
            - m[13] * m[7] * m[10];
        inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
            - m[8] * m[7] * m[14]
            - m[12] * m[6] * m[11]
            + m[12] * m[7] * m[10];
        inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
            + m[8] * m[7] * m[13]
            + m[12] * m[5] * m[11]
            - m[12] * m[7] * m[9];
        inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
            - m[8] * m[6] * m[13]
            - m[12] * m[5] * m[10]
            + m[12] * m[6] * m[9];
        inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
            - m[9] * m[3] * m[14]
            - m[13] * m[2] * m[11]
            + m[13] * m[3] * m[10];
        inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
            + m[8] * m[3] * m[14]
            + m[12] * m[2] * m[11]
            - m[12] * m[3] * m[10];
        inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
            - m[8] * m[3] * m[13]
            - m[12] * m[1] * m[11]
            + m[12] * m[3] * m[9];
        inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
            + m[8] * m[2] * m[13]
            + m[12] * m[1] * m[10]
            - m[12] * m[2] * m[9];
        inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
            + m[5] * m[3] * m[14]
            + m[13] * m[2] * m[7]
            - m[13] * m[3] * m[6];
        inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
            - m[4] * m[3] * m[14]
            - m[12] * m[2] * m[7]
            + m[12] * m[3] * m[6];
        inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
            + m[4] * m[3] * m[13]
            + m[12] * m[1] * m[7]
            - m[12] * m[3] * m[5];
        inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
            - m[4] * m[2] * m[13]
            - m[12] * m[1] * m[6]
            + m[12] * m[2] * m[5];
        inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
            - m[5] * m[3] * m[10]
            - m[9] * m[2] * m[7]
            + m[9] * m[3] * m[6];
        inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
            + m[4] * m[3] * m[10]
            + m[8] * m[2] * m[7]
            - m[8] * m[3] * m[6];
        inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
            - m[4] * m[3] * m[9]
            - m[8] * m[1] * m[7]
            + m[8] * m[3] * m[5];
        inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
            + m[4] * m[2] * m[9]
            + m[8] * m[1] * m[6]
            - m[8] * m[2] * m[5];

        let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }

        let inv_det = 1.0 / det;
        for v in inv.iter_mut() {
            *v *= inv_det;
        }
        Some(Self { data: inv })
    }

    /// Transform a point (w = 1).
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let d = &self.data;
        Vec3::new(
            d[0] * p.x + d[4] * p.y + d[8] * p.z + d[12],
            d[1] * p.x + d[5] * p.y + d[9] * p.z + d[13],
            d[2] * p.x + d[6] * p.y + d[10] * p.z + d[14],
        )
    }

    /// Transform a direction (w = 0).
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        let d = &self.data;
        Vec3::new(
            d[0] * v.x + d[4] * v.y + d[8] * v.z,
            d[1] * v.x + d[5] * v.y + d[9] * v.z,
            d[2] * v.x + d[6] * v.y + d[10] * v.z,
        )
    }

    pub fn get_translation(&self) -> Vec3 {
        Vec3::new(self.data[12], self.data[13], self.data[14])
    }

    pub fn set_translation(&mut self, t: Vec3) {
        self.data[12] = t.x;
        self.data[13] = t.y;
        self.data[14] = t.z;
    }

    /// Per-axis scale (column lengths of the upper 3x3 block).
    pub fn get_scale(&self) -> Vec3 {
        let d = &self.data;
        Vec3::new(
            Vec3::new(d[0], d[1], d[2]).length(),
            Vec3::new(d[4], d[5], d[6]).length(),
            Vec3::new(d[8], d[9], d[10]).length(),
        )
    }

    /// Rotation part with scale removed.
    pub fn get_rotation(&self) -> Quat {
        let s = self.get_scale();
        let d = &self.data;
        let sx = if s.x > 1e-10 { s.x } else { 1.0 };
        let sy = if s.y > 1e-10 { s.y } else { 1.0 };
        let sz = if s.z > 1e-10 { s.z } else { 1.0 };
        let (m00, m10, m20) = (d[0] / sx, d[1] / sx, d[2] / sx);
        let (m01, m11, m21) = (d[4] / sy, d[5] / sy, d[6] / sy);
        let (m02, m12, m22) = (d[8] / sz, d[9] / sz, d[10] / sz);

        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Quat {
                w: 0.25 * s,
                x: (m21 - m12) / s,
                y: (m02 - m20) / s,
                z: (m10 - m01) / s,
            }
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Quat {
                w: (m21 - m12) / s,
                x: 0.25 * s,
                y: (m01 + m10) / s,
                z: (m02 + m20) / s,
            }
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Quat {
                w: (m02 - m20) / s,
                x: (m01 + m10) / s,
                y: 0.25 * s,
                z: (m12 + m21) / s,
            }
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Quat {
                w: (m10 - m01) / s,
                x: (m02 + m20) / s,
                y: (m12 + m21) / s,
                z: 0.25 * s,
            }
        };
        q.normalize()
    }

    /// Same pose with scale stripped.
    pub fn without_scale(&self) -> Self {
        Self::from_rotation_translation(self.get_rotation(), self.get_translation())
    }

    /// Pose at `eye` whose -Z axis points at `target`. `None` if they coincide.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Option<Self> {
        let forward = (target - eye).try_normalize()?;
        let z = -forward;
        let x = up.cross(z).try_normalize()?;
        let y = z.cross(x);
        Some(Self {
            data: [
                x.x, x.y, x.z, 0.0, y.x, y.y, y.z, 0.0, z.x, z.y, z.z, 0.0, eye.x, eye.y, eye.z,
                1.0,
            ],
        })
    }

    /// Element-wise comparison within `eps`.
    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        self.data
            .iter()
            .zip(other.data.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_quat_rotate_90_yaw() {
        // 90 degrees around Y axis: +X -> -Z
        let q = Quat::from_euler(FRAC_PI_2, 0.0, 0.0);
        let r = q.rotate(Vec3::new(1.0, 0.0, 0.0));
        assert!(r.x.abs() < 1e-4, "x={}", r.x);
        assert!(r.y.abs() < 1e-4, "y={}", r.y);
        assert!((r.z + 1.0).abs() < 1e-4, "z={}", r.z);
    }

    #[test]
    fn test_quat_mul_matches_sequential_rotation() {
        let a = Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 0.7);
        let b = Quat::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), -0.4);
        let v = Vec3::new(0.3, -1.2, 2.0);
        let sequential = a.rotate(b.rotate(v));
        let combined = a.mul(b).rotate(v);
        assert!(sequential.distance(combined) < 1e-5);
    }

    #[test]
    fn test_mat4_mul_identity() {
        let a = Mat4::translation(Vec3::new(1.0, 2.0, 3.0));
        let result = a.mul(&Mat4::IDENTITY);
        assert!((result.data[12] - 1.0).abs() < 1e-6);
        assert!((result.data[13] - 2.0).abs() < 1e-6);
        assert!((result.data[14] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_inverse_with_scale() {
        let m = Mat4::from_rotation_translation(
            Quat::from_euler(0.3, -0.2, 0.1),
            Vec3::new(1.0, -2.0, 0.5),
        )
        .mul(&Mat4::scale(2.0, 0.5, 1.0));
        let inv = m.inverse().expect("invertible");
        assert!(m.mul(&inv).approx_eq(&Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn test_inverse_singular() {
        assert!(Mat4::scale(0.0, 1.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_decomposition() {
        // translation, scale and rotation survive a round trip through the matrix
        let q = Quat::from_euler(1.0, 0.5, -0.25);
        let m = Mat4::from_rotation_translation(q, Vec3::new(1.0, 2.0, 3.0))
            .mul(&Mat4::scale(1.0, 2.0, 3.0));

        let t = m.get_translation();
        assert!(t.distance(Vec3::new(1.0, 2.0, 3.0)) < 1e-5);

        let s = m.get_scale();
        assert!(s.distance(Vec3::new(1.0, 2.0, 3.0)) < 1e-4);

        let r = m.get_rotation();
        assert!(r.angle_to(q) < 1e-3, "angle={}", r.angle_to(q));
    }

    #[test]
    fn test_slerp_endpoints() {
        let a = Quat::IDENTITY;
        let b = Quat::from_euler(FRAC_PI_2, 0.0, 0.0);
        assert!(a.slerp(b, 0.0).angle_to(a) < 1e-4);
        assert!(a.slerp(b, 1.0).angle_to(b) < 1e-4);
        let mid = a.slerp(b, 0.5);
        assert!((mid.angle_to(a) - FRAC_PI_2 / 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_look_at_faces_target() {
        let m = Mat4::look_at(Vec3::new(0.0, 0.0, -3.0), Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0))
            .expect("valid look-at");
        let fwd = m.transform_vector(Vec3::FORWARD);
        assert!(fwd.distance(Vec3::new(0.0, 0.0, 1.0)) < 1e-5);
        assert!(Mat4::look_at(Vec3::ZERO, Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)).is_none());
    }

    #[test]
    fn test_try_normalize_zero() {
        assert!(Vec3::ZERO.try_normalize().is_none());
        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }
}
