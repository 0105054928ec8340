//! Ray casting and closed-form geometry helpers.
//!
//! Everything here is stateless. Degenerate input (parallel rays, zero-length
//! directions, coincident lines) yields `None` instead of NaN.

use crate::math::{Mat4, Vec2, Vec3};

// ── Ray / Plane ──────────────────────────────────────────────

/// A ray in 3D space for pointer intersection testing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Normalized direction.
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing the direction. `None` for a zero direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        Some(Self {
            origin,
            direction: direction.try_normalize()?,
        })
    }

    /// Ray along the pose's -Z axis, starting at the pose's position.
    pub fn from_pose(pose: &Mat4) -> Option<Self> {
        Self::new(pose.get_translation(), pose.transform_vector(Vec3::FORWARD))
    }

    /// Point at parameter `t` along the ray.
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Plane `normal . p + constant = 0` with unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub constant: f32,
}

impl Plane {
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Option<Self> {
        let normal = normal.try_normalize()?;
        Some(Self {
            normal,
            constant: -normal.dot(point),
        })
    }

    /// The XY plane of `transform` (the plane a window quad lies in).
    pub fn from_transform(transform: &Mat4) -> Option<Self> {
        Self::from_point_normal(
            transform.get_translation(),
            transform.transform_vector(Vec3::new(0.0, 0.0, 1.0)),
        )
    }
}

/// Distance along `ray` to `plane`. `None` when parallel or behind the origin.
pub fn ray_plane_intersect(ray: &Ray, plane: &Plane) -> Option<f32> {
    let denom = plane.normal.dot(ray.direction);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = -(plane.normal.dot(ray.origin) + plane.constant) / denom;
    if t < 0.0 || !t.is_finite() {
        return None;
    }
    Some(t)
}

/// Signed distance from `point` to `plane`.
pub fn point_plane_distance(point: Vec3, plane: &Plane) -> f32 {
    plane.normal.dot(point) + plane.constant
}

/// True iff both coordinates lie in [0, 1], bounds inclusive.
pub fn point_in_unit_square(local: Vec2) -> bool {
    (0.0..=1.0).contains(&local.x) && (0.0..=1.0).contains(&local.y)
}

/// Distance from the translation component of `matrix` to `point`.
pub fn point_matrix_distance(point: Vec3, matrix: &Mat4) -> f32 {
    matrix.get_translation().distance(point)
}

/// Distance between the HMD and a window position.
pub fn hmd_window_distance(hmd: &Mat4, window: &Mat4) -> f32 {
    point_matrix_distance(hmd.get_translation(), window)
}

// ── Angles ───────────────────────────────────────────────────

/// Projection tangents of the view frustum, as reported by the runtime.
/// `left` and `bottom` are negative for a symmetric frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumTangents {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Default for FrustumTangents {
    /// Roughly a 100 degree symmetric field of view.
    fn default() -> Self {
        Self {
            left: -1.2,
            right: 1.2,
            top: 1.2,
            bottom: -1.2,
        }
    }
}

/// Frustum half-angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrustumAngles {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl FrustumAngles {
    /// Whether a head-space direction given as (azimuth, inclination) is in view.
    pub fn contains(&self, azimuth: f32, inclination: f32) -> bool {
        azimuth >= self.left
            && azimuth <= self.right
            && inclination >= self.bottom
            && inclination <= self.top
    }
}

pub fn frustum_angles(t: &FrustumTangents) -> FrustumAngles {
    FrustumAngles {
        left: t.left.atan().to_degrees(),
        right: t.right.atan().to_degrees(),
        top: t.top.atan().to_degrees(),
        bottom: t.bottom.atan().to_degrees(),
    }
}

/// Azimuth (around +Y, 0 = straight ahead along -Z, positive to the right)
/// and inclination (positive up), both in degrees.
pub fn rotation_angles(direction: Vec3) -> Option<(f32, f32)> {
    let len = direction.length();
    if len < 1e-10 {
        return None;
    }
    let azimuth = direction.x.atan2(-direction.z).to_degrees();
    let inclination = (direction.y / len).clamp(-1.0, 1.0).asin().to_degrees();
    Some((azimuth, inclination))
}

/// Inverse of [`rotation_angles`]: a point at `distance` from the origin.
pub fn sphere_to_3d_coords(azimuth: f32, inclination: f32, distance: f32) -> Vec3 {
    let (sa, ca) = azimuth.to_radians().sin_cos();
    let (si, ci) = inclination.to_radians().sin_cos();
    let dist_2d = distance * ci;
    Vec3::new(dist_2d * sa, distance * si, -dist_2d * ca)
}

// ── 2D helpers ───────────────────────────────────────────────

/// Intersection of segments p0-p1 and p2-p3.
/// `None` for parallel or coincident segments and for segments that miss.
pub fn intersect_lines_2d(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2) -> Option<Vec2> {
    let s1 = p1 - p0;
    let s2 = p3 - p2;

    let denom = -s2.x * s1.y + s1.x * s2.y;
    if denom.abs() < 1e-10 {
        return None;
    }

    let s = (-s1.y * (p0.x - p2.x) + s1.x * (p0.y - p2.y)) / denom;
    let t = (s2.x * (p0.y - p2.y) - s2.y * (p0.x - p2.x)) / denom;

    if (0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&t) {
        Some(p0 + s1 * t)
    } else {
        None
    }
}

/// Clamp `point` into the box [min, max] by moving it towards the origin.
///
/// Points already inside are returned unchanged. Otherwise the result is
/// where the segment from the origin to `point` leaves the box. `None` when
/// the origin itself is outside the box.
pub fn clamp_towards_zero_2d(min: Vec2, max: Vec2, point: Vec2) -> Option<Vec2> {
    let origin_inside = min.x <= 0.0 && max.x >= 0.0 && min.y <= 0.0 && max.y >= 0.0;
    if !origin_inside {
        return None;
    }

    if point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y {
        return Some(point);
    }

    let corners = [
        Vec2::new(min.x, min.y),
        Vec2::new(max.x, min.y),
        Vec2::new(max.x, max.y),
        Vec2::new(min.x, max.y),
    ];
    (0..4).find_map(|i| {
        intersect_lines_2d(Vec2::ZERO, point, corners[i], corners[(i + 1) % 4])
    })
}

// ── Tests ────────────────────────────────────────────────────
