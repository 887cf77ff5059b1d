#![allow(dead_code)]
//! Head look-at solver with eased target interpolation and neck propagation.
//!
//! Engine-agnostic: callers pass component-space transforms of the head and its
//! neck chain (nearest parent first) and receive the solved transforms.

use serde::{Deserialize, Serialize};

use metaface_api_core::math::{
    add3, dot3, ease_in_out, is_zero3, lerp_array, length_squared3, normalize3, quat_between_normals,
    quat_mul, quat_rotate, scale3, slerp, sub3, Quat, Vec3, QUAT_IDENTITY,
};
use metaface_api_core::Transform;

pub const DEFAULT_AIM_AXIS: Vec3 = [0.0, 1.0, 0.0];
pub const DEFAULT_UP_AXIS: Vec3 = [1.0, 0.0, 0.0];
const REFERENCE_UP: Vec3 = [0.0, 0.0, 1.0];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadIkSettings {
    /// Bone-local axis that should point at the target.
    pub aim_axis: Vec3,
    /// Bone-local axis kept close to component up when `use_up_axis` is set.
    pub up_axis: Vec3,
    pub use_up_axis: bool,
    /// Share of the head rotation given to each neck bone, nearest first.
    pub neck_alphas: Vec<f32>,
    /// Max aim deviation in degrees; 0 disables the clamp.
    pub clamp_degrees: f32,
    /// Seconds to ease from the previous target to a new one; 0 snaps.
    pub interpolation_time: f32,
    /// Minimum target move that restarts interpolation.
    pub trigger_threshold: f32,
    /// Seconds to blend the solve in after enabling.
    pub speed_in: f32,
    /// Seconds to blend the solve out after disabling.
    pub speed_out: f32,
}

impl Default for HeadIkSettings {
    fn default() -> Self {
        Self {
            aim_axis: DEFAULT_AIM_AXIS,
            up_axis: DEFAULT_UP_AXIS,
            use_up_axis: false,
            neck_alphas: vec![0.5, 0.2],
            clamp_degrees: 0.0,
            interpolation_time: 0.0,
            trigger_threshold: 0.0,
            speed_in: 0.5,
            speed_out: 2.0,
        }
    }
}

impl HeadIkSettings {
    /// Normalized copy; zero axes fall back to their defaults.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        if is_zero3(out.aim_axis) {
            log::warn!("head IK aim axis is zero, using {:?}", DEFAULT_AIM_AXIS);
            out.aim_axis = DEFAULT_AIM_AXIS;
        }
        if is_zero3(out.up_axis) {
            log::warn!("head IK up axis is zero, using {:?}", DEFAULT_UP_AXIS);
            out.up_axis = DEFAULT_UP_AXIS;
        }
        out.aim_axis = normalize3(out.aim_axis);
        out.up_axis = normalize3(out.up_axis);
        out
    }
}

/// One neck bone: component-space and parent-local transforms.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NeckBone {
    pub component: Transform,
    pub local: Transform,
}

/// Input pose for one evaluation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadPose {
    pub head: Transform,
    /// Head relative to its parent (`neck[0]`).
    pub head_local: Transform,
    /// Ancestors of the head, nearest first.
    pub neck: Vec<NeckBone>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeadIkOutput {
    pub head: Transform,
    /// Same order as `HeadPose::neck`.
    pub neck: Vec<Transform>,
}

/// Rotation turning `aim` (already in component space) toward `target` as seen
/// from `origin`, limited to `clamp_degrees` when positive. With `use_up`, the
/// result is twisted about the aim direction so `up` stays near component up.
pub fn solve_aim(
    origin: Vec3,
    target: Vec3,
    aim: Vec3,
    use_up: bool,
    up: Vec3,
    clamp_degrees: f32,
) -> Quat {
    let mut to_target = normalize3(sub3(target, origin));
    if is_zero3(to_target) {
        return QUAT_IDENTITY;
    }

    if clamp_degrees > 0.0 {
        let clamp = clamp_degrees.min(180.0).to_radians();
        let diff = dot3(aim, to_target).clamp(-1.0, 1.0).acos();
        if diff > clamp {
            let delta = scale3(sub3(to_target, aim), clamp / diff);
            to_target = normalize3(add3(aim, delta));
        }
    }

    let base = quat_between_normals(aim, to_target);
    if !use_up {
        return base;
    }

    // project both ups onto the plane orthogonal to the aim direction
    let rotated_up = quat_rotate(base, up);
    let project = |v: Vec3| normalize3(sub3(v, scale3(to_target, dot3(v, to_target))));
    let from = project(rotated_up);
    let to = project(REFERENCE_UP);
    if is_zero3(from) || is_zero3(to) {
        return base;
    }
    quat_mul(quat_between_normals(from, to), base)
}

#[derive(Clone, Debug)]
pub struct HeadIkSolver {
    settings: HeadIkSettings,
    pub enabled: bool,
    apply_alpha: f32,
    actual_alpha: f32,
    accumulated: f32,
    current_target: Vec3,
    previous_target: Vec3,
    location: Vec3,
}

impl Default for HeadIkSolver {
    fn default() -> Self {
        Self::new(HeadIkSettings::default())
    }
}

impl HeadIkSolver {
    pub fn new(settings: HeadIkSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            enabled: false,
            apply_alpha: 0.0,
            actual_alpha: 0.0,
            accumulated: 0.0,
            current_target: [0.0; 3],
            previous_target: [0.0; 3],
            location: [0.0; 3],
        }
    }

    pub fn settings(&self) -> &HeadIkSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: HeadIkSettings) {
        self.settings = settings.sanitized();
    }

    /// Eased blend weight of the solve.
    pub fn alpha(&self) -> f32 {
        self.actual_alpha
    }

    /// Interpolated look-at location used by the last evaluation.
    pub fn location(&self) -> Vec3 {
        self.location
    }

    /// Advance interpolation time and the enable/disable ramp.
    pub fn update(&mut self, dt: f32) {
        let s = &self.settings;
        self.accumulated = (self.accumulated + dt).clamp(0.0, s.interpolation_time.max(0.0));

        if self.enabled && self.apply_alpha < 1.0 {
            self.apply_alpha += dt / s.speed_in.max(f32::EPSILON);
            if self.apply_alpha > 0.995 {
                self.apply_alpha = 1.0;
            }
        } else if !self.enabled && self.apply_alpha > 0.0 {
            self.apply_alpha -= dt / s.speed_out.max(f32::EPSILON);
            if self.apply_alpha < 0.005 {
                self.apply_alpha = 0.0;
            }
        }
        self.actual_alpha = ease_in_out(self.apply_alpha);
    }

    fn track_target(&mut self, target: Vec3) {
        let threshold = self.settings.trigger_threshold;
        if length_squared3(sub3(target, self.current_target)) > threshold * threshold {
            if self.accumulated >= self.settings.interpolation_time {
                self.accumulated = 0.0;
            }
            self.previous_target = self.current_target;
            self.current_target = target;
        } else if threshold == 0.0 {
            self.current_target = target;
        }

        let time = self.settings.interpolation_time;
        if time > 0.0 {
            let alpha = self.accumulated / time;
            if alpha < 1.0 {
                self.location =
                    lerp_array(&self.previous_target, &self.current_target, ease_in_out(alpha));
            }
        } else {
            self.location = self.current_target;
        }
    }

    /// Solve for `target` (component space) and blend with `pose` by the current alpha.
    pub fn evaluate(&mut self, pose: &HeadPose, target: Vec3) -> HeadIkOutput {
        self.track_target(target);
        let s = &self.settings;

        let mut head = pose.head;
        let aim = normalize3(head.transform_vector(s.aim_axis));
        let up = normalize3(head.transform_vector(s.up_axis));
        let delta = solve_aim(
            head.translation,
            self.location,
            aim,
            s.use_up_axis,
            up,
            s.clamp_degrees,
        );
        head.rotation = quat_mul(delta, head.rotation);

        let count = s.neck_alphas.len().min(pose.neck.len());
        let mut neck: Vec<Transform> = pose.neck.iter().map(|b| b.component).collect();
        for i in (0..count).rev() {
            neck[i].rotation = slerp(neck[i].rotation, head.rotation, s.neck_alphas[i]);
            if i + 1 < count {
                neck[i].translation = pose.neck[i].local.compose(&neck[i + 1]).translation;
            }
        }
        if count > 0 {
            head.translation = pose.head_local.compose(&neck[0]).translation;
        }

        let alpha = self.actual_alpha;
        HeadIkOutput {
            head: pose.head.blend(&head, alpha),
            neck: pose
                .neck
                .iter()
                .zip(&neck)
                .map(|(orig, solved)| orig.component.blend(solved, alpha))
                .collect(),
        }
    }
}
