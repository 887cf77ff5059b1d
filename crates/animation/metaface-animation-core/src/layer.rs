#![allow(dead_code)]
//! AnimationLayer: one playable set of named curves with play/stop/interrupt state.
//!
//! Lifecycle:
//! - `initialize` stores the curves, computes the duration and zeroes the frame.
//! - `play` enters Playing. Passing the duration or calling `stop` enters Interrupting.
//! - Interrupting decays frame values toward zero at 2/s and returns to Stopped
//!   once all are zero.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use metaface_api_core::Frame;

use crate::curve::{max_duration, NamedCurveSet};

/// Length of the global fade-in at the start of playback.
pub const FADE_IN_TIME: f32 = 0.3;
/// Frame decay rate while interrupting, in units per second.
pub const INTERRUPT_DECAY_RATE: f32 = 2.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerState {
    #[default]
    Stopped,
    Playing,
    Interrupting,
}

/// Fade parameters. `pause_duration` is the gap length that counts as a pause;
/// `fade_time` is the ramp length at each pause edge.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerOptions {
    pub intensity: f32,
    pub fade_on_pause: bool,
    pub pause_duration: f32,
    pub fade_time: f32,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            fade_on_pause: true,
            pause_duration: 0.3,
            fade_time: 0.12,
        }
    }
}

impl LayerOptions {
    /// Lip-sync track: no cross-component pause detection.
    pub fn lipsync() -> Self {
        Self {
            fade_on_pause: false,
            ..Self::default()
        }
    }

    /// Facial-emotion track: long pauses, fade almost half the pause.
    pub fn facial(intensity: f32, pause_duration: f32) -> Self {
        Self {
            intensity,
            fade_on_pause: true,
            pause_duration,
            fade_time: pause_duration * 0.5 - 0.01,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationLayer {
    curves: NamedCurveSet,
    frame: Frame,
    pub options: LayerOptions,
    duration: f32,
    state: LayerState,
}

fn is_head_channel(name: &str) -> bool {
    name.starts_with("Head")
}

impl AnimationLayer {
    pub fn new(curves: NamedCurveSet, options: LayerOptions) -> Self {
        let mut layer = Self::default();
        layer.initialize(curves, options);
        layer
    }

    pub fn initialize(&mut self, curves: NamedCurveSet, options: LayerOptions) {
        self.duration = max_duration(&curves);
        self.frame = curves.keys().map(|k| (k.clone(), 0.0)).collect();
        self.curves = curves;
        self.options = options;
        self.state = LayerState::Stopped;
    }

    pub fn play(&mut self) {
        self.state = LayerState::Playing;
    }

    /// Starts the fade-out. Ignored unless playing.
    pub fn stop(&mut self) {
        if self.state == LayerState::Playing {
            self.state = LayerState::Interrupting;
        }
    }

    #[inline]
    pub fn state(&self) -> LayerState {
        self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == LayerState::Playing
    }

    /// Should this layer be composited this tick.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != LayerState::Stopped
    }

    pub fn is_valid(&self) -> bool {
        !self.curves.is_empty() && !self.frame.is_empty()
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    pub fn curves(&self) -> &NamedCurveSet {
        &self.curves
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_value(&self, name: &str) -> Option<f32> {
        self.frame.get(name).copied()
    }

    /// Direct curve evaluation, or -1 when the channel is missing.
    pub fn curve_value_at(&self, name: &str, time: f32) -> f32 {
        self.curves.get(name).map(|c| c.value_at(time)).unwrap_or(-1.0)
    }

    /// Advance the evaluated frame.
    ///
    /// `speaking_interval` is the external (distance to previous key, distance to
    /// next key) pair used instead of each curve's own intervals when the layer
    /// fades on pause.
    pub fn process_frame(&mut self, play_time: f32, dt: f32, speaking_interval: Option<(f32, f32)>) {
        match self.state {
            LayerState::Stopped => {}
            LayerState::Playing => self.process_playing(play_time, speaking_interval),
            LayerState::Interrupting => self.process_interrupting(dt),
        }
    }

    fn process_playing(&mut self, play_time: f32, speaking_interval: Option<(f32, f32)>) {
        let mut alpha = self.options.intensity;
        if play_time < FADE_IN_TIME {
            alpha *= play_time / FADE_IN_TIME;
        }
        // the last frame is still evaluated before the fade-out starts
        if play_time > self.duration {
            self.state = LayerState::Interrupting;
        }

        let LayerOptions {
            fade_on_pause,
            pause_duration,
            fade_time,
            ..
        } = self.options;

        for (name, curve) in &self.curves {
            let (t0, t1) = match speaking_interval {
                Some(interval) if fade_on_pause => interval,
                _ => curve.intervals_to_keys(play_time),
            };

            let mut pause_alpha = 1.0;
            if t0 + t1 > pause_duration && !is_head_channel(name) {
                pause_alpha = if t0 < fade_time {
                    1.0 - t0 / fade_time
                } else if t1 < fade_time {
                    1.0 - t1 / fade_time
                } else {
                    0.0
                };
            }

            let value = curve.value_at(play_time) * alpha * pause_alpha;
            if let Some(slot) = self.frame.get_mut(name.as_str()) {
                *slot = value;
            }
        }
    }

    fn process_interrupting(&mut self, dt: f32) {
        let step = dt * INTERRUPT_DECAY_RATE;
        let mut finished = true;
        for value in self.frame.values_mut() {
            let magnitude = (value.abs() - step).max(0.0);
            if magnitude > 0.0 {
                *value = magnitude.copysign(*value);
                finished = false;
            } else {
                *value = 0.0;
            }
        }
        if finished {
            self.state = LayerState::Stopped;
        }
    }

    /// Validity plus per-channel time range and mean, one channel per line.
    pub fn describe(&self) -> String {
        let mut out = format!("IsValid: {}\n", u8::from(self.is_valid()));
        let mut names: Vec<&String> = self.curves.keys().collect();
        names.sort();
        for name in names {
            let curve = &self.curves[name];
            let (from, to) = match (curve.samples.first(), curve.samples.last()) {
                (Some(a), Some(b)) => (a.time, b.time),
                _ => (-1.0, -1.0),
            };
            let _ = writeln!(out, "{name}: [time {from}/{to}] average: {}", curve.mean());
        }
        out
    }
}
