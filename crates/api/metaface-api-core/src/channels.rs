//! Canonical ARKit-style channel lists produced by the two inference models.

use serde::{Deserialize, Serialize};

/// Output channels of the lip-sync model, in model output order.
pub const LIPSYNC_CHANNELS: [&str; 24] = [
    "JawOpen",
    "MouthClose",
    "MouthFunnel",
    "MouthPucker",
    "MouthLeft",
    "MouthRight",
    "MouthSmileLeft",
    "MouthSmileRight",
    "MouthFrownLeft",
    "MouthFrownRight",
    "MouthDimpleLeft",
    "MouthDimpleRight",
    "MouthStretchLeft",
    "MouthStretchRight",
    "MouthRollLower",
    "MouthRollUpper",
    "MouthShrugLower",
    "MouthShrugUpper",
    "MouthPressLeft",
    "MouthPressRight",
    "MouthLowerDownLeft",
    "MouthLowerDownRight",
    "MouthUpperUpLeft",
    "MouthUpperUpRight",
];

/// Output channels of the emotion model, in model output order.
pub const FACIAL_CHANNELS: [&str; 20] = [
    "BrowDownLeft",
    "BrowDownRight",
    "BrowInnerUp",
    "BrowOuterUpLeft",
    "BrowOuterUpRight",
    "CheekPuff",
    "CheekSquintLeft",
    "CheekSquintRight",
    "NoseSneerLeft",
    "NoseSneerRight",
    "HeadYaw",
    "HeadPitch",
    "HeadRoll",
    "EyeBlinkLeft",
    "EyeSquintLeft",
    "EyeWideLeft",
    "EyeSquintRight",
    "EyeWideRight",
    "MouthSmileLeft",
    "MouthSmileRight",
];

/// Which of the two model "intents" a channel list belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CurveSetKind {
    Lipsync,
    Facial,
}

pub fn curve_set(kind: CurveSetKind) -> &'static [&'static str] {
    match kind {
        CurveSetKind::Lipsync => &LIPSYNC_CHANNELS,
        CurveSetKind::Facial => &FACIAL_CHANNELS,
    }
}

/// True if `name` is one of the lip-sync model channels.
pub fn is_lipsync_channel(name: &str) -> bool {
    LIPSYNC_CHANNELS.contains(&name)
}

/// Heuristic check that a set of channel names is still the raw ARKit set
/// (i.e. it has not been expanded into rig-specific curves).
///
/// Sets with more than `len - 3` entries count as expanded. A raw set may miss
/// up to 8 canonical channels.
pub fn is_arkit_curve_set<'a, I>(names: I, kind: CurveSetKind) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    let canonical = curve_set(kind);
    if names.len() + 3 > canonical.len() {
        return false;
    }
    let missing = canonical.iter().filter(|c| !names.contains(c)).count();
    missing <= 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_have_model_sizes() {
        assert_eq!(curve_set(CurveSetKind::Lipsync).len(), 24);
        assert_eq!(curve_set(CurveSetKind::Facial).len(), 20);
        assert!(is_lipsync_channel("JawOpen"));
        assert!(!is_lipsync_channel("BrowInnerUp"));
    }

    #[test]
    fn arkit_set_detection() {
        let partial: Vec<&str> = FACIAL_CHANNELS[..15].to_vec();
        assert!(is_arkit_curve_set(partial.iter().copied(), CurveSetKind::Facial));

        // too few canonical names left
        let sparse: Vec<&str> = FACIAL_CHANNELS[..5].to_vec();
        assert!(!is_arkit_curve_set(sparse.iter().copied(), CurveSetKind::Facial));

        // full list is treated as already expanded
        assert!(!is_arkit_curve_set(
            FACIAL_CHANNELS.iter().copied(),
            CurveSetKind::Facial
        ));
    }
}
