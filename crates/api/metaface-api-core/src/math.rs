//! Small fixed-size math used by the curve blending, eye and look-at code.
//! - f32 lerp and eased alphas
//! - Vec2/Vec3 helpers on plain arrays
//! - quaternion (x,y,z,w) product, rotation, slerp (shortest-arc)
//! - rigid transforms (rotation + translation, unit scale)

use serde::{Deserialize, Serialize};

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];
/// Quaternion stored as [x, y, z, w].
pub type Quat = [f32; 4];

pub const QUAT_IDENTITY: Quat = [0.0, 0.0, 0.0, 1.0];

/// Linear interpolation for f32
#[inline]
pub fn lerp_f(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Lerp for fixed-size arrays
pub fn lerp_array<const N: usize>(a: &[f32; N], b: &[f32; N], t: f32) -> [f32; N] {
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = lerp_f(a[i], b[i], t);
    }
    out
}

/// Quadratic ease-in/ease-out of an alpha in [0,1].
#[inline]
pub fn ease_in_out(alpha: f32) -> f32 {
    let a = alpha.clamp(0.0, 1.0);
    let eased = if a < 0.5 {
        0.5 * (2.0 * a).powi(2)
    } else {
        1.0 - 0.5 * (2.0 * (1.0 - a)).powi(2)
    };
    eased.clamp(0.0, 1.0)
}

/// Move `current` toward `target` at a constant `speed` (units per second).
pub fn interp_constant_to_vec2(current: Vec2, target: Vec2, dt: f32, speed: f32) -> Vec2 {
    let delta = [target[0] - current[0], target[1] - current[1]];
    let dist = (delta[0] * delta[0] + delta[1] * delta[1]).sqrt();
    let max_step = speed * dt;
    if dist > max_step {
        if max_step > 0.0 {
            let k = max_step / dist;
            return [current[0] + delta[0] * k, current[1] + delta[1] * k];
        }
        return current;
    }
    target
}

#[inline]
pub fn add3(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn sub3(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn scale3(a: Vec3, s: f32) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

#[inline]
pub fn dot3(a: Vec3, b: Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross3(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn length3(a: Vec3) -> f32 {
    dot3(a, a).sqrt()
}

#[inline]
pub fn length_squared3(a: Vec3) -> f32 {
    dot3(a, a)
}

/// Normalize, returning zero for degenerate input.
pub fn normalize3(a: Vec3) -> Vec3 {
    let len = length3(a);
    if len <= f32::EPSILON {
        [0.0, 0.0, 0.0]
    } else {
        scale3(a, 1.0 / len)
    }
}

#[inline]
pub fn is_zero3(a: Vec3) -> bool {
    a[0] == 0.0 && a[1] == 0.0 && a[2] == 0.0
}

/// Normalize a quaternion represented as [x,y,z,w]
pub fn normalize_quat(q: Quat) -> Quat {
    let mag = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if mag == 0.0 {
        QUAT_IDENTITY
    } else {
        [q[0] / mag, q[1] / mag, q[2] / mag, q[3] / mag]
    }
}

/// Hamilton product `a * b` (apply `b` first, then `a`).
pub fn quat_mul(a: Quat, b: Quat) -> Quat {
    [
        a[3] * b[0] + a[0] * b[3] + a[1] * b[2] - a[2] * b[1],
        a[3] * b[1] - a[0] * b[2] + a[1] * b[3] + a[2] * b[0],
        a[3] * b[2] + a[0] * b[1] - a[1] * b[0] + a[2] * b[3],
        a[3] * b[3] - a[0] * b[0] - a[1] * b[1] - a[2] * b[2],
    ]
}

/// Inverse of a unit quaternion.
#[inline]
pub fn quat_conjugate(q: Quat) -> Quat {
    [-q[0], -q[1], -q[2], q[3]]
}

/// Rotate a vector by a unit quaternion.
pub fn quat_rotate(q: Quat, v: Vec3) -> Vec3 {
    let u = [q[0], q[1], q[2]];
    let t = scale3(cross3(u, v), 2.0);
    add3(add3(v, scale3(t, q[3])), cross3(u, t))
}

pub fn quat_from_axis_angle(axis: Vec3, angle: f32) -> Quat {
    let n = normalize3(axis);
    let (s, c) = (angle * 0.5).sin_cos();
    [n[0] * s, n[1] * s, n[2] * s, c]
}

/// Minimal rotation taking unit vector `from` onto unit vector `to`.
pub fn quat_between_normals(from: Vec3, to: Vec3) -> Quat {
    let w = 1.0 + dot3(from, to);
    if w < 1e-6 {
        // opposite vectors: rotate 180 degrees about any perpendicular axis
        let axis = if from[0].abs() > from[2].abs() {
            [-from[1], from[0], 0.0]
        } else {
            [0.0, -from[2], from[1]]
        };
        let axis = normalize3(axis);
        return [axis[0], axis[1], axis[2], 0.0];
    }
    let c = cross3(from, to);
    normalize_quat([c[0], c[1], c[2], w])
}

/// Slerp between two unit quaternions q1, q2
pub fn slerp(q1: Quat, q2: Quat, t: f32) -> Quat {
    let qa = normalize_quat(q1);
    let mut qb = normalize_quat(q2);

    let mut dot = qa[0] * qb[0] + qa[1] * qb[1] + qa[2] * qb[2] + qa[3] * qb[3];

    // take the short path
    if dot < 0.0 {
        qb = [-qb[0], -qb[1], -qb[2], -qb[3]];
        dot = -dot;
    }

    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return normalize_quat(lerp_array(&qa, &qb, t));
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();

    let s0 = ((theta_0 - theta).sin()) / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    [
        s0 * qa[0] + s1 * qb[0],
        s0 * qa[1] + s1 * qb[1],
        s0 * qa[2] + s1 * qb[2],
        s0 * qa[3] + s1 * qb[3],
    ]
}

/// Angle in radians between two unit quaternions.
pub fn quat_angle_between(a: Quat, b: Quat) -> f32 {
    let d = (a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]).abs();
    2.0 * d.clamp(-1.0, 1.0).acos()
}

/// Rigid transform with unit scale.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            rotation: QUAT_IDENTITY,
            translation: [0.0, 0.0, 0.0],
        }
    }
}

impl Transform {
    pub fn new(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation: normalize_quat(rotation),
            translation,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            rotation: QUAT_IDENTITY,
            translation,
        }
    }

    /// Transform a direction (rotation only).
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        quat_rotate(self.rotation, v)
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        add3(quat_rotate(self.rotation, p), self.translation)
    }

    /// `self` expressed in `parent`'s space composed into parent space
    /// (local-to-component composition).
    pub fn compose(&self, parent: &Transform) -> Transform {
        Transform {
            rotation: normalize_quat(quat_mul(parent.rotation, self.rotation)),
            translation: parent.transform_point(self.translation),
        }
    }

    /// Rotation slerp + translation lerp.
    pub fn blend(&self, other: &Transform, t: f32) -> Transform {
        Transform {
            rotation: slerp(self.rotation, other.rotation, t),
            translation: lerp_array(&self.translation, &other.translation, t),
        }
    }
}
