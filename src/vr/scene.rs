//! Scene-side types: 3D math and the target scene collaborator.
//!
//! Core types:
//! - `Vec3`, `Quat`, `Mat4`, `Transform3D`: small f32 math kit
//! - `TargetScene`: what the core needs from the host scene
//!   (object size, highlight, active flag, layout reset)
//! - `TargetLayout`: in-memory scene built from the experiment config

use std::ops::{Add, Div, Mul, Neg, Sub};
use tracing::{debug, info};

use crate::config::{ExperimentConfig, LayoutPreset};

// ── Math types ───────────────────────────────────────────────

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

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Unit vector in the same direction, or `ZERO` for a (near-)zero vector.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len < 1e-10 {
            return Self::ZERO;
        }
        self / len
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;
    fn mul(self, v: Vec3) -> Vec3 {
        v * self
    }
}

impl Div<f32> for Vec3 {
    type Output = Self;
    fn div(self, s: f32) -> Self {
        Self::new(self.x / s, self.y / s, self.z / s)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Quaternion for rotations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
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
}

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
    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.data[12] = x;
        m.data[13] = y;
        m.data[14] = z;
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

    /// Mirror the Z axis (right-handed tracker space to left-handed engine space).
    pub fn flip_z() -> Self {
        Self::scale(1.0, 1.0, -1.0)
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

    /// Rigid transform from a tracked pose (position + orientation).
    pub fn from_pose(position: Vec3, rotation: &Quat) -> Self {
        Self::translation(position.x, position.y, position.z).mul(&Self::from_quat(rotation))
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

    /// Inverse of a rigid transform (rotation + translation only).
    pub fn inverse(&self) -> Option<Self> {
        let d = &self.data;
        let mut inv = [0.0f32; 16];

        // Transpose 3x3 rotation block
        inv[0] = d[0];
        inv[1] = d[4];
        inv[2] = d[8];
        inv[4] = d[1];
        inv[5] = d[5];
        inv[6] = d[9];
        inv[8] = d[2];
        inv[9] = d[6];
        inv[10] = d[10];

        let (tx, ty, tz) = (d[12], d[13], d[14]);
        inv[12] = -(inv[0] * tx + inv[4] * ty + inv[8] * tz);
        inv[13] = -(inv[1] * tx + inv[5] * ty + inv[9] * tz);
        inv[14] = -(inv[2] * tx + inv[6] * ty + inv[10] * tz);
        inv[15] = 1.0;

        if inv.iter().all(|v| v.is_finite()) {
            Some(Self { data: inv })
        } else {
            None
        }
    }

    /// Transform a point (applies translation).
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let d = &self.data;
        Vec3::new(
            d[0] * p.x + d[4] * p.y + d[8] * p.z + d[12],
            d[1] * p.x + d[5] * p.y + d[9] * p.z + d[13],
            d[2] * p.x + d[6] * p.y + d[10] * p.z + d[14],
        )
    }

    /// Transform a direction (ignores translation).
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        let d = &self.data;
        Vec3::new(
            d[0] * v.x + d[4] * v.y + d[8] * v.z,
            d[1] * v.x + d[5] * v.y + d[9] * v.z,
            d[2] * v.x + d[6] * v.y + d[10] * v.z,
        )
    }
}

// ── Transform ────────────────────────────────────────────────

/// 3D transform: position, rotation, scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

// ── Target scene collaborator ───────────────────────────────

/// Scene handle for a selectable object.
pub type TargetId = u64;

/// Visual state of a target as driven by the dwell selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Highlight {
    /// Neutral (white).
    #[default]
    Idle,
    /// Contact held, dwell accumulating (blue).
    Tracking,
    /// Dwell completed (red).
    Selected,
    /// Trace probe ready to start a run.
    Armed,
}

impl Highlight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Tracking => "tracking",
            Self::Selected => "selected",
            Self::Armed => "armed",
        }
    }
}

/// Everything the core needs from the host scene graph.
///
/// Targets are referenced by id only; the scene owns their geometry.
pub trait TargetScene {
    /// Scalar size used for the index of difficulty (X scale of the object).
    fn object_size(&self, target: TargetId) -> Option<f32>;
    fn set_highlight(&mut self, target: TargetId, highlight: Highlight);
    fn highlight(&self, target: TargetId) -> Highlight;
    fn set_active(&mut self, target: TargetId, active: bool);
    fn set_position(&mut self, target: TargetId, position: Vec3);
    /// Restore every target to its initial transform, highlight and active flag.
    fn reset_layout(&mut self);
    /// Target whose bounding volume contains `point`, if any.
    fn hit_test(&self, _point: Vec3) -> Option<TargetId> {
        None
    }
}

/// A target tracked by `TargetLayout`.
#[derive(Debug, Clone)]
pub struct SceneTarget {
    pub id: TargetId,
    pub name: String,
    pub transform: Transform3D,
    pub initial: Transform3D,
    pub highlight: Highlight,
    pub initial_highlight: Highlight,
    pub active: bool,
}

impl SceneTarget {
    pub fn new(id: TargetId, name: impl Into<String>, transform: Transform3D) -> Self {
        Self {
            id,
            name: name.into(),
            transform,
            initial: transform,
            highlight: Highlight::Idle,
            initial_highlight: Highlight::Idle,
            active: true,
        }
    }

    /// Radius of the bounding sphere.
    pub fn bounding_radius(&self) -> f32 {
        self.transform.scale.x.abs() * 0.5
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.transform.position.distance(point) <= self.bounding_radius()
    }
}

/// In-memory target scene.
#[derive(Debug, Clone, Default)]
pub struct TargetLayout {
    pub targets: Vec<SceneTarget>,
    probe: Option<TargetId>,
}

impl TargetLayout {
    pub fn new(targets: Vec<SceneTarget>) -> Self {
        Self {
            targets,
            probe: None,
        }
    }

    /// Build the layout described by the config: targets get ids `0..n`,
    /// the probe (if configured) gets id `n` and starts armed.
    pub fn from_config(config: &ExperimentConfig) -> Self {
        let targets = config
            .target_positions
            .iter()
            .zip(&config.target_scales)
            .enumerate()
            .map(|(i, (pos, scale))| {
                let transform = Transform3D {
                    position: Vec3::from(*pos),
                    scale: Vec3::from(*scale),
                    ..Default::default()
                };
                SceneTarget::new(i as TargetId, format!("target-{}", i), transform)
            })
            .collect::<Vec<_>>();

        let mut layout = Self::new(targets);
        if let Some(probe) = &config.probe {
            let id = layout.targets.len() as TargetId;
            let transform = Transform3D {
                position: Vec3::from(probe.start),
                scale: Vec3::from(probe.scale),
                ..Default::default()
            };
            let mut target = SceneTarget::new(id, "probe", transform);
            target.highlight = Highlight::Armed;
            target.initial_highlight = Highlight::Armed;
            layout.targets.push(target);
            layout.probe = Some(id);
        }
        info!(
            targets = layout.target_ids().len(),
            probe = layout.probe.is_some(),
            "Target layout built"
        );
        layout
    }

    /// Id of the trace probe, if the layout has one.
    pub fn probe_id(&self) -> Option<TargetId> {
        self.probe
    }

    /// Ids of the experiment targets in layout order (probe excluded).
    pub fn target_ids(&self) -> Vec<TargetId> {
        self.targets
            .iter()
            .map(|t| t.id)
            .filter(|id| Some(*id) != self.probe)
            .collect()
    }

    pub fn get(&self, target: TargetId) -> Option<&SceneTarget> {
        self.targets.iter().find(|t| t.id == target)
    }

    fn get_mut(&mut self, target: TargetId) -> Option<&mut SceneTarget> {
        self.targets.iter_mut().find(|t| t.id == target)
    }

    /// Swap the experiment targets' initial transforms for a preset and reset.
    pub fn apply_preset(&mut self, preset: LayoutPreset) {
        let (positions, scales) = preset.layout();
        let probe = self.probe;
        for (target, (pos, scale)) in self
            .targets
            .iter_mut()
            .filter(|t| Some(t.id) != probe)
            .zip(positions.iter().zip(scales.iter()))
        {
            target.initial.position = Vec3::from(*pos);
            target.initial.scale = Vec3::from(*scale);
        }
        info!(preset = preset.as_str(), "Layout preset applied");
        self.reset_layout();
    }
}

impl TargetScene for TargetLayout {
    fn object_size(&self, target: TargetId) -> Option<f32> {
        self.get(target).map(|t| t.transform.scale.x)
    }

    fn set_highlight(&mut self, target: TargetId, highlight: Highlight) {
        if let Some(t) = self.get_mut(target) {
            t.highlight = highlight;
        }
    }

    fn highlight(&self, target: TargetId) -> Highlight {
        self.get(target).map(|t| t.highlight).unwrap_or_default()
    }

    fn set_active(&mut self, target: TargetId, active: bool) {
        if let Some(t) = self.get_mut(target) {
            t.active = active;
        }
    }

    fn set_position(&mut self, target: TargetId, position: Vec3) {
        if let Some(t) = self.get_mut(target) {
            t.transform.position = position;
        }
    }

    fn reset_layout(&mut self) {
        for t in &mut self.targets {
            t.transform = t.initial;
            t.highlight = t.initial_highlight;
            t.active = true;
        }
        debug!(count = self.targets.len(), "Layout reset");
    }

    fn hit_test(&self, point: Vec3) -> Option<TargetId> {
        self.targets
            .iter()
            .filter(|t| t.active && t.contains(point))
            .min_by(|a, b| {
                let da = a.transform.position.distance(point);
                let db = b.transform.position.distance(point);
                da.total_cmp(&db)
            })
            .map(|t| t.id)
    }
}

// ── Tests ───────────────────────────────────────────────────
