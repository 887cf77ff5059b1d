//! Viseme classes and the preset table mapping each class to fixed channel values.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Mouth-shape class of a phoneme symbol.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Viseme {
    Aa,
    E,
    I,
    Oh,
    Wu,
    /// Bilabial: b, m, p.
    Bmp,
    /// Labiodental: f, v.
    Fv,
    L,
    R,
    ChJ,
    Consonant,
}

impl Viseme {
    /// Closed mapping from a phoneme symbol. Digits and anything outside
    /// [a-z] have no class.
    pub fn from_symbol(c: char) -> Option<Viseme> {
        let v = match c {
            'a' => Viseme::Aa,
            'e' => Viseme::E,
            'i' => Viseme::I,
            'o' => Viseme::Oh,
            'u' | 'w' => Viseme::Wu,
            'b' | 'm' | 'p' => Viseme::Bmp,
            'f' | 'v' => Viseme::Fv,
            'l' => Viseme::L,
            'r' => Viseme::R,
            'j' => Viseme::ChJ,
            'd' | 't' | 's' | 'z' | 'n' | 'k' | 'g' | 'x' | 'y' | 'h' | 'c' | 'q' => {
                Viseme::Consonant
            }
            _ => return None,
        };
        Some(v)
    }

    /// Lip-rounding/closing group whose presets bleed into neighbouring phonemes.
    #[inline]
    pub fn is_rounding(self) -> bool {
        matches!(self, Viseme::Bmp | Viseme::Fv | Viseme::Oh | Viseme::Wu)
    }
}

/// Channel name -> preset value for one viseme.
pub type VisemePose = HashMap<String, f32>;

/// Static viseme -> pose configuration, read-only during synthesis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VisemePresetTable {
    pub poses: HashMap<Viseme, VisemePose>,
}

impl VisemePresetTable {
    pub fn empty() -> Self {
        Self {
            poses: HashMap::new(),
        }
    }

    /// Builder-style insert of a whole pose.
    pub fn with_pose(mut self, viseme: Viseme, values: &[(&str, f32)]) -> Self {
        self.insert_pose(viseme, values);
        self
    }

    pub fn insert_pose(&mut self, viseme: Viseme, values: &[(&str, f32)]) {
        let pose = values
            .iter()
            .map(|(name, v)| ((*name).to_string(), *v))
            .collect();
        self.poses.insert(viseme, pose);
    }

    #[inline]
    pub fn pose(&self, viseme: Viseme) -> Option<&VisemePose> {
        self.poses.get(&viseme)
    }

    /// Preset value of `channel` for `viseme`, if both exist.
    #[inline]
    pub fn value(&self, viseme: Viseme, channel: &str) -> Option<f32> {
        self.poses.get(&viseme).and_then(|p| p.get(channel).copied())
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }
}

impl Default for VisemePresetTable {
    fn default() -> Self {
        Self::empty()
            .with_pose(
                Viseme::Bmp,
                &[
                    ("JawOpen", 0.05),
                    ("MouthClose", 0.3),
                    ("MouthPressLeft", 0.45),
                    ("MouthPressRight", 0.45),
                    ("MouthRollLower", 0.25),
                    ("MouthRollUpper", 0.2),
                ],
            )
            .with_pose(
                Viseme::Fv,
                &[
                    ("JawOpen", 0.08),
                    ("MouthRollLower", 0.55),
                    ("MouthUpperUpLeft", 0.2),
                    ("MouthUpperUpRight", 0.2),
                ],
            )
            .with_pose(
                Viseme::Oh,
                &[
                    ("JawOpen", 0.35),
                    ("MouthFunnel", 0.55),
                    ("MouthPucker", 0.2),
                ],
            )
            .with_pose(
                Viseme::Wu,
                &[
                    ("JawOpen", 0.1),
                    ("MouthFunnel", 0.3),
                    ("MouthPucker", 0.75),
                ],
            )
            .with_pose(
                Viseme::Aa,
                &[
                    ("JawOpen", 0.55),
                    ("MouthLowerDownLeft", 0.2),
                    ("MouthLowerDownRight", 0.2),
                ],
            )
            .with_pose(
                Viseme::E,
                &[
                    ("JawOpen", 0.25),
                    ("MouthStretchLeft", 0.3),
                    ("MouthStretchRight", 0.3),
                ],
            )
            .with_pose(
                Viseme::I,
                &[
                    ("JawOpen", 0.15),
                    ("MouthStretchLeft", 0.4),
                    ("MouthStretchRight", 0.4),
                ],
            )
            .with_pose(
                Viseme::ChJ,
                &[
                    ("JawOpen", 0.12),
                    ("MouthFunnel", 0.35),
                    ("MouthShrugUpper", 0.2),
                ],
            )
    }
}
