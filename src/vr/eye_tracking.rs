//! Eye tracking: per-eye gaze rays, binocular vergence estimation,
//! tracking health, and a simulated binocular tracker.
//!
//! The device driver and its permission flow live outside this crate;
//! they reach us through the `GazeTracker` and `SpatialReference` traits.

use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::geometry::{closest_point_between_rays, transform_ray, Ray};
use super::scene::{Mat4, Vec3};

// ── Eye selector ────────────────────────────────────────────

/// Which gaze stream to read from the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
    /// Device-fused gaze.
    Combined,
}

impl Eye {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Combined => "combined",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "combined" => Some(Self::Combined),
            _ => None,
        }
    }
}

// ── Gaze ray ────────────────────────────────────────────────

/// One eye's gaze for one frame, in tracker space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeRay {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
    pub valid_at: Instant,
}

impl GazeRay {
    /// Build a gaze ray; `None` if the direction cannot be normalized.
    pub fn new(origin: Vec3, direction: Vec3, valid_at: Instant) -> Option<Self> {
        if !origin.is_finite() || !direction.is_finite() {
            return None;
        }
        let direction = direction.normalize();
        if direction == Vec3::ZERO {
            return None;
        }
        Some(Self {
            origin,
            direction,
            valid_at,
        })
    }

    pub fn as_ray(&self) -> Ray {
        Ray::new(self.origin, self.direction)
    }
}

/// Source of raw per-eye gaze rays (the device tracker).
pub trait GazeTracker {
    /// Gaze for `eye` at `at`; `None` when the tracker has no valid reading.
    fn gaze_ray(&mut self, eye: Eye, at: Instant) -> Option<GazeRay>;
}

/// Source of the tracker-space → working-frame transform, refreshed per frame.
pub trait SpatialReference {
    fn tracker_to_world(&self) -> Mat4;
}

impl SpatialReference for Mat4 {
    fn tracker_to_world(&self) -> Mat4 {
        *self
    }
}

// ── Vergence estimate ───────────────────────────────────────

/// Binocular fixation estimate for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VergenceEstimate {
    pub valid: bool,
    /// Cyclopean eye position (midpoint of the two eye origins).
    pub origin: Vec3,
    /// Cyclopean gaze direction (normalized sum of both eye directions).
    pub direction: Vec3,
    /// Where the two gaze rays converge.
    pub focus_point: Vec3,
}

impl VergenceEstimate {
    pub const INVALID: Self = Self {
        valid: false,
        origin: Vec3::ZERO,
        direction: Vec3::ZERO,
        focus_point: Vec3::ZERO,
    };

    /// Distance from the cyclopean eye to the fixation point.
    pub fn distance(&self) -> Option<f32> {
        self.valid
            .then(|| self.focus_point.distance(self.origin))
    }

    /// Same estimate expressed relative to a camera/head pose.
    pub fn in_camera_space(&self, camera: &Mat4) -> Self {
        if !self.valid {
            return Self::INVALID;
        }
        match camera.inverse() {
            Some(inv) => Self {
                valid: true,
                origin: inv.transform_point(self.origin),
                direction: inv.transform_vector(self.direction).normalize(),
                focus_point: inv.transform_point(self.focus_point),
            },
            None => Self::INVALID,
        }
    }
}

impl Default for VergenceEstimate {
    fn default() -> Self {
        Self::INVALID
    }
}

// ── Estimator ───────────────────────────────────────────────

/// Turns two per-eye gaze rays into a single fixation point.
#[derive(Debug, Clone, Default)]
pub struct VergenceEstimator {
    /// Tracker → working frame, supplied by the spatial reference each frame.
    tracker_to_world: Mat4,
}

impl VergenceEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reference(&mut self, tracker_to_world: Mat4) {
        self.tracker_to_world = tracker_to_world;
    }

    pub fn reference(&self) -> &Mat4 {
        &self.tracker_to_world
    }

    /// Estimate the binocular fixation point. Never fails: missing eyes or
    /// parallel rays give `VergenceEstimate::INVALID`.
    pub fn estimate(&self, left: Option<&GazeRay>, right: Option<&GazeRay>) -> VergenceEstimate {
        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                trace!("Vergence skipped: eye ray missing");
                return VergenceEstimate::INVALID;
            }
        };

        let left = transform_ray(&self.tracker_to_world, &left.as_ray());
        let right = transform_ray(&self.tracker_to_world, &right.as_ray());

        let closest = closest_point_between_rays(&left, &right);
        if !closest.valid {
            trace!("Vergence skipped: gaze rays parallel");
            return VergenceEstimate::INVALID;
        }

        let direction = (left.direction + right.direction).normalize();
        if direction == Vec3::ZERO {
            return VergenceEstimate::INVALID;
        }

        VergenceEstimate {
            valid: true,
            origin: (left.origin + right.origin) / 2.0,
            direction,
            focus_point: closest.midpoint,
        }
    }

    /// Query both eyes from a tracker and estimate.
    pub fn estimate_from(&self, tracker: &mut dyn GazeTracker, at: Instant) -> VergenceEstimate {
        let left = tracker.gaze_ray(Eye::Left, at);
        let right = tracker.gaze_ray(Eye::Right, at);
        self.estimate(left.as_ref(), right.as_ref())
    }
}

// ── Tracking health ─────────────────────────────────────────

/// Health metrics for the vergence pipeline.
#[derive(Debug, Clone)]
pub struct GazeHealth {
    /// Valid estimates over the last full second.
    pub valid_rate_hz: f32,
    /// Consecutive frames with no valid estimate.
    pub consecutive_lost_frames: u32,
    /// Whether tracking is considered lost (>30 consecutive invalid frames).
    pub tracking_lost: bool,
    pub last_valid: Option<Instant>,

    valid_this_window: u32,
    window_start: Option<Instant>,
}

impl Default for GazeHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl GazeHealth {
    pub const LOST_AFTER_FRAMES: u32 = 30;

    pub fn new() -> Self {
        Self {
            valid_rate_hz: 0.0,
            consecutive_lost_frames: 0,
            tracking_lost: false,
            last_valid: None,
            valid_this_window: 0,
            window_start: None,
        }
    }

    /// Record whether this frame produced a valid estimate.
    pub fn update(&mut self, valid: bool, now: Instant) {
        if valid {
            if self.tracking_lost {
                info!(
                    lost_frames = self.consecutive_lost_frames,
                    "Vergence tracking recovered"
                );
            }
            self.consecutive_lost_frames = 0;
            self.tracking_lost = false;
            self.last_valid = Some(now);
            self.valid_this_window += 1;
        } else {
            self.consecutive_lost_frames += 1;
            if self.consecutive_lost_frames > Self::LOST_AFTER_FRAMES && !self.tracking_lost {
                self.tracking_lost = true;
                warn!(
                    frames = self.consecutive_lost_frames,
                    "Vergence tracking lost"
                );
            }
        }

        let start = *self.window_start.get_or_insert(now);
        let window = now.saturating_duration_since(start);
        if window >= Duration::from_secs(1) {
            self.valid_rate_hz = self.valid_this_window as f32 / window.as_secs_f32();
            self.valid_this_window = 0;
            self.window_start = Some(now);
            debug!(rate_hz = self.valid_rate_hz, "Vergence rate updated");
        }
    }
}

// ── Simulated tracker ───────────────────────────────────────

/// Binocular tracker stand-in: both eyes look at `fixation`.
#[derive(Debug, Clone)]
pub struct SimulatedGaze {
    /// Cyclopean eye position (tracker space).
    pub head: Vec3,
    /// Inter-pupillary distance in meters.
    pub ipd_m: f32,
    /// Point both eyes converge on; `None` simulates tracking loss.
    pub fixation: Option<Vec3>,
}

impl Default for SimulatedGaze {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedGaze {
    pub const DEFAULT_IPD_M: f32 = 0.064;

    pub fn new() -> Self {
        Self {
            head: Vec3::ZERO,
            ipd_m: Self::DEFAULT_IPD_M,
            fixation: None,
        }
    }

    pub fn fixate(&mut self, point: Vec3) {
        self.fixation = Some(point);
    }

    pub fn lose_tracking(&mut self) {
        self.fixation = None;
    }

    fn eye_origin(&self, eye: Eye) -> Vec3 {
        let half = self.ipd_m * 0.5;
        match eye {
            Eye::Left => self.head - Vec3::new(half, 0.0, 0.0),
            Eye::Right => self.head + Vec3::new(half, 0.0, 0.0),
            Eye::Combined => self.head,
        }
    }
}

impl GazeTracker for SimulatedGaze {
    fn gaze_ray(&mut self, eye: Eye, at: Instant) -> Option<GazeRay> {
        let fixation = self.fixation?;
        let origin = self.eye_origin(eye);
        GazeRay::new(origin, fixation - origin, at)
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr::scene::Quat;

    fn eye_rays(target: Vec3, now: Instant) -> (GazeRay, GazeRay) {
        let mut sim = SimulatedGaze::new();
        sim.fixate(target);
        (
            sim.gaze_ray(Eye::Left, now).unwrap(),
            sim.gaze_ray(Eye::Right, now).unwrap(),
        )
    }

    #[test]
    fn test_eye_roundtrip() {
        assert_eq!(Eye::from_str("left"), Some(Eye::Left));
        assert_eq!(Eye::from_str("right"), Some(Eye::Right));
        assert_eq!(Eye::from_str("combined"), Some(Eye::Combined));
        assert_eq!(Eye::from_str("cyclops"), None);
        assert_eq!(Eye::Combined.as_str(), "combined");
    }

    #[test]
    fn test_gaze_ray_rejects_zero_direction() {
        let now = Instant::now();
        assert!(GazeRay::new(Vec3::ZERO, Vec3::ZERO, now).is_none());
        assert!(GazeRay::new(Vec3::ZERO, Vec3::new(f32::NAN, 0.0, 1.0), now).is_none());
        let ray = GazeRay::new(Vec3::ZERO, Vec3::new(0.0, 0.0, 4.0), now).unwrap();
        assert!((ray.direction.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_converging_eyes() {
        let now = Instant::now();
        let target = Vec3::new(0.1, -0.05, 0.6);
        let (l, r) = eye_rays(target, now);
        let est = VergenceEstimator::new().estimate(Some(&l), Some(&r));

        assert!(est.valid);
        assert!(est.focus_point.distance(target) < 1e-4);
        assert!(est.origin.distance(Vec3::ZERO) < 1e-6);
        assert!((est.direction.length() - 1.0).abs() < 1e-5);
        assert!((est.distance().unwrap() - target.length()).abs() < 1e-4);
    }

    #[test]
    fn test_estimate_missing_eye_is_invalid() {
        let now = Instant::now();
        let (l, _) = eye_rays(Vec3::new(0.0, 0.0, 1.0), now);
        let est = VergenceEstimator::new().estimate(Some(&l), None);
        assert!(!est.valid);
        assert!(est.distance().is_none());
        assert!(!VergenceEstimator::new().estimate(None, None).valid);
    }

    #[test]
    fn test_estimate_parallel_is_invalid() {
        let now = Instant::now();
        let dir = Vec3::new(0.0, 0.0, 1.0);
        let l = GazeRay::new(Vec3::new(-0.032, 0.0, 0.0), dir, now).unwrap();
        let r = GazeRay::new(Vec3::new(0.032, 0.0, 0.0), dir, now).unwrap();
        assert_eq!(
            VergenceEstimator::new().estimate(Some(&l), Some(&r)),
            VergenceEstimate::INVALID
        );
    }

    #[test]
    fn test_estimate_applies_reference_transform() {
        let now = Instant::now();
        let target = Vec3::new(0.0, 0.0, 0.5);
        let (l, r) = eye_rays(target, now);

        let mut estimator = VergenceEstimator::new();
        estimator.set_reference(Mat4::translation(0.0, 1.6, 0.0));
        let est = estimator.estimate(Some(&l), Some(&r));

        assert!(est.valid);
        assert!(est.focus_point.distance(Vec3::new(0.0, 1.6, 0.5)) < 1e-4);
        assert!(est.origin.distance(Vec3::new(0.0, 1.6, 0.0)) < 1e-5);
        // Distance is frame-invariant under a rigid transform
        assert!((est.distance().unwrap() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_estimate_with_handedness_flip() {
        let now = Instant::now();
        let (l, r) = eye_rays(Vec3::new(0.0, 0.0, 0.5), now);
        let mut estimator = VergenceEstimator::new();
        estimator.set_reference(Mat4::flip_z());
        let est = estimator.estimate(Some(&l), Some(&r));
        assert!(est.focus_point.distance(Vec3::new(0.0, 0.0, -0.5)) < 1e-4);
    }

    #[test]
    fn test_estimate_from_tracker() {
        let mut sim = SimulatedGaze::new();
        let estimator = VergenceEstimator::new();
        let now = Instant::now();
        assert!(!estimator.estimate_from(&mut sim, now).valid);

        sim.fixate(Vec3::new(0.0, 0.0, 0.4));
        let est = estimator.estimate_from(&mut sim, now);
        assert!(est.valid);
        assert!((est.distance().unwrap() - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_in_camera_space() {
        let now = Instant::now();
        let (l, r) = eye_rays(Vec3::new(0.0, 0.0, 0.5), now);
        let est = VergenceEstimator::new().estimate(Some(&l), Some(&r));
        let camera = Mat4::from_pose(Vec3::new(0.0, 0.0, 0.1), &Quat::IDENTITY);
        let local = est.in_camera_space(&camera);
        assert!(local.focus_point.distance(Vec3::new(0.0, 0.0, 0.4)) < 1e-4);
        assert!(!VergenceEstimate::INVALID.in_camera_space(&camera).valid);
    }

    #[test]
    fn test_health_tracking_lost_and_recovered() {
        let mut health = GazeHealth::new();
        let t0 = Instant::now();
        for i in 0..35 {
            health.update(false, t0 + Duration::from_millis(i * 11));
        }
        assert!(health.tracking_lost);
        assert!(health.consecutive_lost_frames >= 30);

        health.update(true, t0 + Duration::from_millis(400));
        assert!(!health.tracking_lost);
        assert_eq!(health.consecutive_lost_frames, 0);
    }

    #[test]
    fn test_health_rate() {
        let mut health = GazeHealth::new();
        let t0 = Instant::now();
        for i in 0..=60 {
            health.update(true, t0 + Duration::from_micros(i * 16_667));
        }
        assert!(health.valid_rate_hz > 55.0 && health.valid_rate_hz < 65.0);
    }
}
