#![allow(dead_code)]
//! Eye look controller: 2D eye rotations (yaw, pitch in degrees) mapped to look curves.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use metaface_api_core::math::{
    interp_constant_to_vec2, quat_conjugate, quat_rotate, sub3, Vec2, Vec3,
};
use metaface_api_core::{set_curve_value, Frame, Transform};

const LIVE_TARGET_YAW: f32 = 50.0;
const LIVE_TARGET_PITCH: f32 = 30.0;
const LIVE_INTERVAL_MIN: f32 = 0.4;
const LIVE_INTERVAL_MAX: f32 = 3.5;
/// Beyond this yaw the eyes give up on the target and recenter.
const FOCUS_MAX_YAW: f32 = 50.0;
const FOCUS_ALPHA_RATE: f32 = 4.0;
const REST_SNAP: f32 = 0.01;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EyeMode {
    #[default]
    Disabled,
    LiveMovement,
    FocusAtTarget,
}

/// Bone and look channels of one eye.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyeSetup {
    pub bone: String,
    pub look_down: String,
    pub look_left: String,
    pub look_right: String,
    pub look_up: String,
    /// Also write the ARKit EyeLook* curves for this eye.
    #[serde(default)]
    pub propagate_to_arkit: bool,
}

impl EyeSetup {
    pub fn new(bone: &str, down: &str, left: &str, right: &str, up: &str) -> Self {
        Self {
            bone: bone.into(),
            look_down: down.into(),
            look_left: left.into(),
            look_right: right.into(),
            look_up: up.into(),
            propagate_to_arkit: false,
        }
    }

    pub fn default_right() -> Self {
        Self::new(
            "FACIAL_R_Eye",
            "CTRL_Expressions_eyeLookDownR",
            "CTRL_Expressions_eyeLookLeftR",
            "CTRL_Expressions_eyeLookRightR",
            "CTRL_Expressions_eyeLookUpR",
        )
    }

    pub fn default_left() -> Self {
        Self::new(
            "FACIAL_L_Eye",
            "CTRL_Expressions_eyeLookDownL",
            "CTRL_Expressions_eyeLookLeftL",
            "CTRL_Expressions_eyeLookRightL",
            "CTRL_Expressions_eyeLookUpL",
        )
    }
}

/// Rotation limits in degrees. Rotations are clamped to `allowed_*` and
/// normalized by `max_*`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeLimits {
    pub max_horizontal: f32,
    pub max_vertical: f32,
    pub allowed_horizontal: f32,
    pub allowed_vertical: f32,
}

impl Default for EyeLimits {
    fn default() -> Self {
        Self {
            max_horizontal: 60.0,
            max_vertical: 40.0,
            allowed_horizontal: 60.0,
            allowed_vertical: 40.0,
        }
    }
}

/// Desired (yaw, pitch) of each eye relative to the head, in degrees.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FocusAngles {
    pub right: Vec2,
    pub left: Vec2,
}

/// Yaw/pitch in degrees from `eye` to `target`, in the head frame
/// (+X forward, +Y right, +Z up).
pub fn look_angles(eye: Vec3, head: &Transform, target: Vec3) -> Vec2 {
    let local = quat_rotate(quat_conjugate(head.rotation), sub3(target, eye));
    let yaw = local[1].atan2(local[0]).to_degrees();
    let horizontal = (local[0] * local[0] + local[1] * local[1]).sqrt();
    let pitch = local[2].atan2(horizontal).to_degrees();
    [yaw, pitch]
}

#[derive(Debug)]
pub struct EyeController {
    pub mode: EyeMode,
    pub speed: f32,
    pub limits: EyeLimits,
    pub right_setup: EyeSetup,
    pub left_setup: EyeSetup,
    right: Vec2,
    left: Vec2,
    live_target: Vec2,
    clock: f32,
    next_live_update: f32,
    focus_alpha: f32,
    rng: StdRng,
    curves: Frame,
}

impl Default for EyeController {
    fn default() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl EyeController {
    /// Deterministic live movement for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            mode: EyeMode::Disabled,
            speed: 280.0,
            limits: EyeLimits::default(),
            right_setup: EyeSetup::default_right(),
            left_setup: EyeSetup::default_left(),
            right: [0.0, 0.0],
            left: [0.0, 0.0],
            live_target: [0.0, 0.0],
            clock: 0.0,
            next_live_update: 0.0,
            focus_alpha: 0.0,
            rng,
            curves: Frame::new(),
        }
    }

    pub fn set_movement_enabled(&mut self, enabled: bool) {
        self.mode = if enabled {
            EyeMode::LiveMovement
        } else {
            EyeMode::Disabled
        };
    }

    /// Switch to target focus; convergence restarts from slow.
    pub fn focus_at_target(&mut self) {
        self.mode = EyeMode::FocusAtTarget;
        self.focus_alpha = 0.0;
    }

    pub fn rotations(&self) -> (Vec2, Vec2) {
        (self.right, self.left)
    }

    pub fn is_at_rest(&self) -> bool {
        self.right == [0.0, 0.0] && self.left == [0.0, 0.0]
    }

    /// Advance eye rotations. `focus` is only read in FocusAtTarget mode.
    pub fn update(&mut self, dt: f32, focus: Option<FocusAngles>) {
        self.clock += dt;
        match self.mode {
            EyeMode::LiveMovement => {
                if self.clock > self.next_live_update {
                    self.next_live_update =
                        self.clock + self.rng.random_range(LIVE_INTERVAL_MIN..LIVE_INTERVAL_MAX);
                    self.live_target = [
                        self.rng.random_range(-LIVE_TARGET_YAW..LIVE_TARGET_YAW),
                        self.rng.random_range(-LIVE_TARGET_PITCH..LIVE_TARGET_PITCH),
                    ];
                }
                self.right = interp_constant_to_vec2(self.right, self.live_target, dt, self.speed);
                self.left = interp_constant_to_vec2(self.left, self.live_target, dt, self.speed);
            }
            EyeMode::FocusAtTarget => {
                if self.focus_alpha < 1.0 {
                    self.focus_alpha = (self.focus_alpha + dt * FOCUS_ALPHA_RATE).min(1.0);
                }
                if let Some(focus) = focus {
                    self.update_focus(dt, focus);
                }
            }
            EyeMode::Disabled => {
                self.right = interp_constant_to_vec2(self.right, [0.0, 0.0], dt, self.speed);
                self.left = interp_constant_to_vec2(self.left, [0.0, 0.0], dt, self.speed);
                for eye in [&mut self.right, &mut self.left] {
                    if eye[0].abs() < REST_SNAP && eye[1].abs() < REST_SNAP {
                        *eye = [0.0, 0.0];
                    }
                }
            }
        }
    }

    fn update_focus(&mut self, dt: f32, focus: FocusAngles) {
        if focus.right[0].abs() > FOCUS_MAX_YAW || focus.left[0].abs() > FOCUS_MAX_YAW {
            let speed = self.speed * 1.5;
            self.right = interp_constant_to_vec2(self.right, [0.0, 0.0], dt, speed);
            self.left = interp_constant_to_vec2(self.left, [0.0, 0.0], dt, speed);
            self.focus_alpha = 0.0;
        } else if self.focus_alpha < 1.0 {
            let speed = self.speed * (self.focus_alpha * 50.0 + 1.0);
            self.right = interp_constant_to_vec2(self.right, focus.right, dt, speed);
            self.left = interp_constant_to_vec2(self.left, focus.left, dt, speed);
        } else {
            self.right = focus.right;
            self.left = focus.left;
        }
    }

    /// Write the current rotations into look curves and return them.
    pub fn fill_curves(&mut self) -> &Frame {
        let right = split_look(self.right, &self.limits);
        let left = split_look(self.left, &self.limits);

        for (setup, look) in [(&self.right_setup, right), (&self.left_setup, left)] {
            set_named(&mut self.curves, &setup.look_left, look.left);
            set_named(&mut self.curves, &setup.look_right, look.right);
            set_named(&mut self.curves, &setup.look_down, look.down);
            set_named(&mut self.curves, &setup.look_up, look.up);
        }

        // ARKit naming is in terms of in/out per eye
        if self.left_setup.propagate_to_arkit {
            set_curve_value(&mut self.curves, "EyeLookOutLeft", left.left);
            set_curve_value(&mut self.curves, "EyeLookInLeft", left.right);
            set_curve_value(&mut self.curves, "EyeLookDownLeft", left.down);
            set_curve_value(&mut self.curves, "EyeLookUpLeft", left.up);
        }
        if self.right_setup.propagate_to_arkit {
            set_curve_value(&mut self.curves, "EyeLookInRight", right.left);
            set_curve_value(&mut self.curves, "EyeLookOutRight", right.right);
            set_curve_value(&mut self.curves, "EyeLookDownRight", right.down);
            set_curve_value(&mut self.curves, "EyeLookUpRight", right.up);
        }
        &self.curves
    }

    pub fn curves(&self) -> &Frame {
        &self.curves
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct LookValues {
    left: f32,
    right: f32,
    down: f32,
    up: f32,
}

fn split_look(rotation: Vec2, limits: &EyeLimits) -> LookValues {
    let hor = rotation[0].clamp(-limits.allowed_horizontal, limits.allowed_horizontal)
        / limits.max_horizontal;
    let vert =
        rotation[1].clamp(-limits.allowed_vertical, limits.allowed_vertical) / limits.max_vertical;
    let mut out = LookValues::default();
    if hor > 0.0 {
        out.right = hor;
    } else {
        out.left = -hor;
    }
    if vert > 0.0 {
        out.up = vert;
    } else {
        out.down = -vert;
    }
    out
}

fn set_named(frame: &mut Frame, name: &str, value: f32) {
    if !name.is_empty() {
        set_curve_value(frame, name, value);
    }
}
