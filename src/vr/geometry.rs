//! Ray geometry: closest points between two gaze rays and frame helpers.
//!
//! Pure functions only; identical inputs always give identical outputs.

use super::scene::{Mat4, Vec3};

/// Below this, `1 - dot(a, b)^2` is treated as zero (parallel rays).
pub const PARALLEL_EPSILON: f32 = 1e-6;

// ── Ray ──────────────────────────────────────────────────────

/// A ray in 3D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Evaluate the point at parameter t along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

// ── Closest points ───────────────────────────────────────────

/// Result of `closest_point_between_rays`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoints {
    pub valid: bool,
    pub point_on_a: Vec3,
    pub point_on_b: Vec3,
    /// Midpoint of the two closest points (the fixation estimate).
    pub midpoint: Vec3,
}

impl ClosestPoints {
    pub const INVALID: Self = Self {
        valid: false,
        point_on_a: Vec3::ZERO,
        point_on_b: Vec3::ZERO,
        midpoint: Vec3::ZERO,
    };

    /// Gap between the two rays at their closest approach.
    pub fn gap(&self) -> f32 {
        self.point_on_a.distance(self.point_on_b)
    }
}

/// Least-squares closest points between the lines through two rays.
///
/// Directions are expected to be unit length. Near-parallel rays (zero
/// vergence) yield `ClosestPoints::INVALID`.
pub fn closest_point_between_rays(a: &Ray, b: &Ray) -> ClosestPoints {
    let dot_ab = a.direction.dot(b.direction);
    let d = 1.0 - dot_ab * dot_ab;
    if !d.is_finite() || d.abs() < PARALLEL_EPSILON {
        return ClosestPoints::INVALID;
    }

    let w = a.origin - b.origin;
    let t_a = (b.direction * dot_ab - a.direction).dot(w) / d;
    let t_b = (b.direction - a.direction * dot_ab).dot(w) / d;

    let point_on_a = a.at(t_a);
    let point_on_b = b.at(t_b);
    let midpoint = (point_on_a + point_on_b) / 2.0;
    if !midpoint.is_finite() {
        return ClosestPoints::INVALID;
    }

    ClosestPoints {
        valid: true,
        point_on_a,
        point_on_b,
        midpoint,
    }
}

// ── Frame helpers ────────────────────────────────────────────

/// Apply a linear/rigid transform to a ray (direction renormalized).
pub fn transform_ray(m: &Mat4, ray: &Ray) -> Ray {
    Ray::new(m.transform_point(ray.origin), m.transform_vector(ray.direction))
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr::scene::Quat;

    fn assert_close(a: Vec3, b: Vec3, tol: f32) {
        assert!(a.distance(b) < tol, "expected {:?}, got {:?}", b, a);
    }

    #[test]
    fn test_intersecting_rays() {
        let a = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let b = Ray::new(Vec3::new(1.0, 0.0, 5.0), Vec3::new(-1.0, 0.0, 0.0));
        let r = closest_point_between_rays(&a, &b);
        assert!(r.valid);
        assert_close(r.midpoint, Vec3::new(0.0, 0.0, 5.0), 1e-4);
        assert!(r.gap() < 1e-4);
    }

    #[test]
    fn test_converging_eyes() {
        // Eyes 64 mm apart fixating a point 0.5 m ahead.
        let target = Vec3::new(0.0, 0.0, 0.5);
        let left_eye = Vec3::new(-0.032, 0.0, 0.0);
        let right_eye = Vec3::new(0.032, 0.0, 0.0);
        let left = Ray::new(left_eye, target - left_eye);
        let right = Ray::new(right_eye, target - right_eye);
        let r = closest_point_between_rays(&left, &right);
        assert!(r.valid);
        assert_close(r.midpoint, target, 1e-4);
    }

    #[test]
    fn test_skew_rays_midpoint() {
        // x axis at y=0 and z axis at y=1: closest points (0,0,0) and (0,1,0).
        let a = Ray::new(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let b = Ray::new(Vec3::new(0.0, 1.0, -2.0), Vec3::new(0.0, 0.0, 1.0));
        let r = closest_point_between_rays(&a, &b);
        assert!(r.valid);
        assert_close(r.point_on_a, Vec3::ZERO, 1e-5);
        assert_close(r.point_on_b, Vec3::new(0.0, 1.0, 0.0), 1e-5);
        assert_close(r.midpoint, Vec3::new(0.0, 0.5, 0.0), 1e-5);
        assert!((r.gap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_parallel_rays_invalid() {
        let dir = Vec3::new(0.0, 0.0, 1.0);
        let a = Ray::new(Vec3::new(-0.03, 0.0, 0.0), dir);
        let b = Ray::new(Vec3::new(0.03, 0.0, 0.0), dir);
        let r = closest_point_between_rays(&a, &b);
        assert!(!r.valid);
        assert_eq!(r, ClosestPoints::INVALID);
    }

    #[test]
    fn test_antiparallel_rays_invalid() {
        let a = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let b = Ray::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(!closest_point_between_rays(&a, &b).valid);
    }

    #[test]
    fn test_deterministic() {
        let a = Ray::new(Vec3::new(0.1, 0.2, 0.3), Vec3::new(0.2, 0.1, 1.0));
        let b = Ray::new(Vec3::new(-0.1, 0.2, 0.3), Vec3::new(-0.2, 0.05, 1.0));
        assert_eq!(
            closest_point_between_rays(&a, &b),
            closest_point_between_rays(&a, &b)
        );
    }

    #[test]
    fn test_transform_ray_translation_and_rotation() {
        let m = Mat4::from_pose(
            Vec3::new(1.0, 0.0, 0.0),
            &Quat::from_euler(std::f32::consts::FRAC_PI_2, 0.0, 0.0),
        );
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 1.0));
        let t = transform_ray(&m, &ray);
        assert_close(t.origin, Vec3::new(1.0, 0.0, 0.0), 1e-6);
        assert!((t.direction.length() - 1.0).abs() < 1e-5);
        assert!(t.direction.z.abs() < 1e-5);
    }
}
