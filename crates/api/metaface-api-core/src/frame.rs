//! Named-float frames: the per-tick output handed to the pose evaluator.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Channel name -> value for one evaluated tick.
pub type Frame = HashMap<String, f32>;

/// Insert or overwrite a channel value.
#[inline]
pub fn set_curve_value(frame: &mut Frame, name: &str, value: f32) {
    match frame.get_mut(name) {
        Some(v) => *v = value,
        None => {
            frame.insert(name.to_string(), value);
        }
    }
}

/// Head rotation in degrees derived from the HeadRoll/HeadPitch/HeadYaw channels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadRotator {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

const HEAD_CHANNEL_DEGREES: f32 = 50.0;

/// Build a head rotator from an animation frame. Pitch is inverted.
/// Returns zero rotation unless all three head channels are present.
pub fn make_head_rotator(frame: &Frame, offset: HeadRotator) -> HeadRotator {
    match (
        frame.get("HeadRoll"),
        frame.get("HeadPitch"),
        frame.get("HeadYaw"),
    ) {
        (Some(roll), Some(pitch), Some(yaw)) => HeadRotator {
            roll: roll * HEAD_CHANNEL_DEGREES + offset.roll,
            pitch: pitch * -HEAD_CHANNEL_DEGREES + offset.pitch,
            yaw: yaw * HEAD_CHANNEL_DEGREES + offset.yaw,
        },
        _ => HeadRotator::default(),
    }
}

/// Text dump of a frame as `((Name,value),(Name,value))`.
///
/// With a non-empty `filter` only those channels are written, in filter order;
/// otherwise channels are written sorted by name.
pub fn format_frame(frame: &Frame, filter: &[&str]) -> String {
    let mut parts: Vec<String> = Vec::new();
    if filter.is_empty() {
        let mut keys: Vec<&String> = frame.keys().collect();
        keys.sort();
        for k in keys {
            parts.push(format!("({},{})", k, frame[k]));
        }
    } else {
        for name in filter {
            if let Some(v) = frame.get(*name) {
                parts.push(format!("({},{})", name, v));
            }
        }
    }
    format!("({})", parts.join(","))
}
