//! metaface-api-core: channel names, named-float frames, math helpers and
//! raw inference data shared by the animation and orchestrator crates.

pub mod channels;
pub mod frame;
pub mod json;
pub mod math;

pub use channels::{
    curve_set, is_arkit_curve_set, is_lipsync_channel, CurveSetKind, FACIAL_CHANNELS,
    LIPSYNC_CHANNELS,
};
pub use frame::{format_frame, make_head_rotator, set_curve_value, Frame, HeadRotator};
pub use json::{
    command_targets, parse_remote_payload, CommandTargets, RawAnimData, RawDataError, RemotePayload,
};
pub use math::{Quat, Transform, Vec2, Vec3};
