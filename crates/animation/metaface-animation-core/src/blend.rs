//! Per-tick combination of the baseline frame, lip-sync layer and facial layer.
//!
//! For each baked channel:
//! - baseline contributes `value * ratio * lipsync_intensity` and claims `ratio`;
//! - an active lip-sync layer adds `value * (1 - claimed) * lipsync_intensity`;
//! - an active facial layer adds `value * facial_intensity`;
//! - lip-sync channels get an extra `* lipsync_intensity` when it is not 1;
//! - the sum is clamped to [-1, 1].

use serde::{Deserialize, Serialize};

use metaface_api_core::{is_lipsync_channel, Frame};

use crate::layer::AnimationLayer;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendSettings {
    /// Share of the baseline source on channels it drives.
    pub baseline_ratio: f32,
    pub lipsync_intensity: f32,
    pub facial_intensity: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            baseline_ratio: 0.25,
            lipsync_intensity: 1.0,
            facial_intensity: 1.0,
        }
    }
}

/// Inputs for one tick. Inactive layers are ignored.
#[derive(Copy, Clone, Default)]
pub struct BlendSources<'a> {
    pub baseline: Option<&'a Frame>,
    pub lipsync: Option<&'a AnimationLayer>,
    pub facial: Option<&'a AnimationLayer>,
}

impl<'a> BlendSources<'a> {
    fn active_lipsync(&self) -> Option<&'a Frame> {
        self.lipsync.filter(|l| l.is_active()).map(AnimationLayer::frame)
    }

    fn active_facial(&self) -> Option<&'a Frame> {
        self.facial.filter(|l| l.is_active()).map(AnimationLayer::frame)
    }
}

/// Owns the baked output frame and its key set.
#[derive(Clone, Debug, Default)]
pub struct BlendController {
    pub settings: BlendSettings,
    baked: Frame,
}

impl BlendController {
    pub fn new(settings: BlendSettings) -> Self {
        Self {
            settings,
            baked: Frame::new(),
        }
    }

    /// Reset the baked key set to the union of all source channels.
    pub fn capture_keys(&mut self, sources: BlendSources<'_>) {
        self.baked.clear();
        if let Some(baseline) = sources.baseline {
            for name in baseline.keys() {
                self.baked.insert(name.clone(), 0.0);
            }
        }
        for layer in [sources.lipsync, sources.facial].into_iter().flatten() {
            if layer.is_valid() {
                for name in layer.curves().keys() {
                    self.baked.insert(name.clone(), 0.0);
                }
            }
        }
    }

    /// Recompute every baked channel from the current sources.
    pub fn blend(&mut self, sources: BlendSources<'_>) -> &Frame {
        let BlendSettings {
            baseline_ratio,
            lipsync_intensity,
            facial_intensity,
        } = self.settings;
        let lipsync = sources.active_lipsync();
        let facial = sources.active_facial();

        for (name, out) in self.baked.iter_mut() {
            let mut value = 0.0;
            let mut claimed = 0.0;

            if let Some(v) = sources.baseline.and_then(|f| f.get(name.as_str())) {
                value = v * baseline_ratio * lipsync_intensity;
                claimed = baseline_ratio;
            }
            if let Some(v) = lipsync.and_then(|f| f.get(name.as_str())) {
                value += v * (1.0 - claimed) * lipsync_intensity;
            }
            if let Some(v) = facial.and_then(|f| f.get(name.as_str())) {
                value += v * facial_intensity;
            }
            if lipsync_intensity != 1.0 && is_lipsync_channel(name) {
                value *= lipsync_intensity;
            }
            *out = value.clamp(-1.0, 1.0);
        }
        &self.baked
    }

    pub fn frame(&self) -> &Frame {
        &self.baked
    }

    pub fn clear(&mut self) {
        self.baked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::{NamedCurveSet, TimeCurve};
    use crate::layer::LayerOptions;

    fn approx(a: f32, b: f32, eps: f32) {
        assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
    }

    fn playing_layer(values: &[(&str, f32)]) -> AnimationLayer {
        let mut set = NamedCurveSet::new();
        for (name, v) in values {
            let mut c = TimeCurve::new();
            c.add_sample(0.0, *v, 0);
            c.add_sample(10.0, *v, 0);
            set.insert(name.to_string(), c);
        }
        let mut layer = AnimationLayer::new(
            set,
            LayerOptions {
                pause_duration: 100.0,
                ..LayerOptions::lipsync()
            },
        );
        layer.play();
        layer.process_frame(1.0, 0.016, None);
        layer
    }

    fn frame(values: &[(&str, f32)]) -> Frame {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn baseline_claims_share_of_lipsync() {
        let baseline = frame(&[("JawOpen", 0.8)]);
        let lipsync = playing_layer(&[("JawOpen", 0.4)]);
        let facial = playing_layer(&[("BrowInnerUp", 0.5), ("JawOpen", 0.1)]);
        let sources = BlendSources {
            baseline: Some(&baseline),
            lipsync: Some(&lipsync),
            facial: Some(&facial),
        };
        let mut blend = BlendController::default();
        blend.capture_keys(sources);
        let out = blend.blend(sources);
        // 0.8 * 0.25 + 0.4 * 0.75 + 0.1
        approx(out["JawOpen"], 0.6, 1e-6);
        approx(out["BrowInnerUp"], 0.5, 1e-6);
    }

    #[test]
    fn lipsync_intensity_applies_twice_to_lipsync_channels() {
        let lipsync = playing_layer(&[("JawOpen", 0.4), ("HeadYaw", 0.4)]);
        let sources = BlendSources {
            lipsync: Some(&lipsync),
            ..BlendSources::default()
        };
        let mut blend = BlendController::new(BlendSettings {
            lipsync_intensity: 0.5,
            ..BlendSettings::default()
        });
        blend.capture_keys(sources);
        let out = blend.blend(sources);
        approx(out["JawOpen"], 0.1, 1e-6);
        approx(out["HeadYaw"], 0.2, 1e-6);
    }

    #[test]
    fn saturated_sources_are_clamped() {
        let baseline = frame(&[("JawOpen", 1.0), ("MouthLeft", -1.0)]);
        let lipsync = playing_layer(&[("JawOpen", 1.0), ("MouthLeft", -1.0)]);
        let facial = playing_layer(&[("JawOpen", 1.0), ("MouthLeft", -1.0)]);
        let sources = BlendSources {
            baseline: Some(&baseline),
            lipsync: Some(&lipsync),
            facial: Some(&facial),
        };
        let mut blend = BlendController::new(BlendSettings {
            facial_intensity: 1.0,
            ..BlendSettings::default()
        });
        blend.capture_keys(sources);
        let out = blend.blend(sources);
        assert_eq!(out["JawOpen"], 1.0);
        assert_eq!(out["MouthLeft"], -1.0);
    }

    #[test]
    fn inactive_layers_contribute_nothing() {
        let mut lipsync = playing_layer(&[("JawOpen", 0.4)]);
        let baseline = frame(&[("JawOpen", 0.8)]);
        let mut blend = BlendController::default();
        blend.capture_keys(BlendSources {
            baseline: Some(&baseline),
            lipsync: Some(&lipsync),
            facial: None,
        });

        lipsync.stop();
        lipsync.process_frame(1.1, 10.0, None);
        assert!(!lipsync.is_active());
        let out = blend.blend(BlendSources {
            baseline: Some(&baseline),
            lipsync: Some(&lipsync),
            facial: None,
        });
        approx(out["JawOpen"], 0.2, 1e-6);
    }
}
