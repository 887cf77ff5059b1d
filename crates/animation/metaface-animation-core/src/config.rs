#![allow(dead_code)]
//! Generation settings consumed read-only by curve synthesis.

use serde::{Deserialize, Serialize};

use crate::errors::{MetaFaceError, Result};
use crate::viseme::VisemePresetTable;

/// Global scalars and the viseme preset table.
/// Missing JSON fields fall back to their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Intensity of the facial-emotion layer.
    pub emotions_intensity: f32,
    /// Scale applied to preset viseme values before blending with the network output.
    pub viseme_apply_alpha: f32,
    /// Blend weight of the network output against the preset (1 = network only).
    pub lipsync_neural_intensity: f32,
    pub lipsync_smoothness: f32,
    pub facial_smoothness: f32,
    /// Merge simultaneous smile/frown on the lip-sync track and drop smiles from the facial track.
    pub balance_smile_frown: bool,
    pub viseme_presets: VisemePresetTable,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            emotions_intensity: 1.0,
            viseme_apply_alpha: 1.0,
            lipsync_neural_intensity: 1.0,
            lipsync_smoothness: 0.3,
            facial_smoothness: 1.0,
            balance_smile_frown: false,
            viseme_presets: VisemePresetTable::default(),
        }
    }
}

impl GenerationSettings {
    /// Parse and validate.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(text).map_err(|e| MetaFaceError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// All scalars must lie in [0, 1].
    pub fn validate(&self) -> Result<()> {
        let scalars = [
            ("emotions_intensity", self.emotions_intensity),
            ("viseme_apply_alpha", self.viseme_apply_alpha),
            ("lipsync_neural_intensity", self.lipsync_neural_intensity),
            ("lipsync_smoothness", self.lipsync_smoothness),
            ("facial_smoothness", self.facial_smoothness),
        ];
        for (name, v) in scalars {
            if !(0.0..=1.0).contains(&v) {
                return Err(MetaFaceError::InvalidSettings(format!(
                    "{name} = {v} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}
