#![allow(dead_code)]
//! Sparse time curves for a single named channel.
//!
//! Model:
//! - A TimeCurve is an ordered list of (time, value, flags) samples. Insertion order is
//!   treated as time order; callers append with non-decreasing times.
//! - Evaluation clamps to the first/last sample outside the covered range and
//!   interpolates linearly in between.
//! - Smoothing is an in-place moving average blended into each value by a factor.
//!   Samples flagged RICH come from a viseme preset and blend with a damped factor.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use metaface_api_core::math::lerp_f;

/// Sample comes from a viseme preset (snap shape); smoothed less aggressively.
pub const CURVE_FLAG_RICH: u8 = 1;

/// Multiplier applied to the smoothing factor for RICH samples.
pub const RICH_SMOOTHING_SCALE: f32 = 0.15;

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveSample {
    pub time: f32,
    pub value: f32,
    #[serde(default)]
    pub flags: u8,
}

impl CurveSample {
    pub fn new(time: f32, value: f32, flags: u8) -> Self {
        Self { time, value, flags }
    }

    #[inline]
    pub fn is_rich(&self) -> bool {
        self.flags & CURVE_FLAG_RICH != 0
    }
}

/// Moving-average window used by a smoothing pass.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SmoothWindow {
    Three,
    Five,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeCurve {
    pub samples: Vec<CurveSample>,
}

/// Channel name -> curve. One "track" (lip-sync or facial).
pub type NamedCurveSet = HashMap<String, TimeCurve>;

/// Find the segment [i, i+1] containing time t and the local alpha between them.
/// Edge cases:
/// - t <= first.time returns (0, 0, 0)
/// - t >= last.time returns (last, last, 0)
fn find_segment(samples: &[CurveSample], t: f32) -> (usize, usize, f32) {
    let n = samples.len();
    if n <= 1 || t <= samples[0].time {
        return (0, 0, 0.0);
    }
    if t >= samples[n - 1].time {
        return (n - 1, n - 1, 0.0);
    }
    // first sample strictly after t; always in 1..n here
    let i1 = samples.partition_point(|s| s.time <= t).clamp(1, n - 1);
    let i0 = i1 - 1;
    let t0 = samples[i0].time;
    let t1 = samples[i1].time;
    let denom = (t1 - t0).max(f32::EPSILON);
    (i0, i1, ((t - t0) / denom).clamp(0.0, 1.0))
}

impl TimeCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn from_samples(samples: Vec<CurveSample>) -> Self {
        Self { samples }
    }

    /// Append a sample. Time order is the caller's responsibility.
    #[inline]
    pub fn add_sample(&mut self, time: f32, value: f32, flags: u8) {
        self.samples.push(CurveSample::new(time, value, flags));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interpolated value at `t`, clamped to the end samples. Empty curves yield 0.
    pub fn value_at(&self, t: f32) -> f32 {
        match self.samples.len() {
            0 => 0.0,
            1 => self.samples[0].value,
            _ => {
                let (i0, i1, lt) = find_segment(&self.samples, t);
                if i0 == i1 {
                    return self.samples[i0].value;
                }
                lerp_f(self.samples[i0].value, self.samples[i1].value, lt)
            }
        }
    }

    /// Distances from `t` to the samples bracketing it: `(t - left, right - t)`.
    ///
    /// Before the first sample the left distance is 0; after the last sample
    /// the right distance is 0. An empty curve returns `(0, 0)`.
    pub fn intervals_to_keys(&self, t: f32) -> (f32, f32) {
        let n = self.samples.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        if t <= self.samples[0].time {
            return (0.0, self.samples[0].time - t);
        }
        if t >= self.samples[n - 1].time {
            return (t - self.samples[n - 1].time, 0.0);
        }
        let (i0, i1, _) = find_segment(&self.samples, t);
        (t - self.samples[i0].time, self.samples[i1].time - t)
    }

    /// Time of the last sample (0 for an empty curve).
    pub fn duration(&self) -> f32 {
        self.samples.last().map(|s| s.time).unwrap_or(0.0)
    }

    pub fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.value).sum::<f32>() / self.samples.len() as f32
    }

    pub fn scale_values(&mut self, factor: f32) {
        for s in &mut self.samples {
            s.value *= factor;
        }
    }

    /// One in-place moving-average pass over the interior samples `2..len-2`.
    ///
    /// Each value moves toward its window average by `factor`; RICH samples use
    /// `factor * rich_scale`. The pass reads neighbours already updated earlier
    /// in the same pass.
    pub fn smooth_pass(&mut self, window: SmoothWindow, factor: f32, rich_scale: f32) {
        let n = self.samples.len();
        if n < 5 {
            return;
        }
        for i in 2..n - 2 {
            let p = &self.samples;
            let avg = match window {
                SmoothWindow::Three => (p[i - 1].value + p[i].value + p[i + 1].value) / 3.0,
                SmoothWindow::Five => {
                    (p[i - 2].value + p[i - 1].value + p[i].value + p[i + 1].value + p[i + 2].value)
                        * 0.2
                }
            };
            let alpha = if p[i].is_rich() {
                factor * rich_scale
            } else {
                factor
            };
            let s = &mut self.samples[i];
            s.value = lerp_f(s.value, avg, alpha);
        }
    }

    /// Lighter 2-point average on the first and last samples.
    pub fn smooth_edges(&mut self, factor: f32) {
        let n = self.samples.len();
        if n > 1 {
            let avg = (self.samples[0].value + self.samples[1].value) * 0.5;
            self.samples[0].value = lerp_f(self.samples[0].value, avg, factor);
            if n > 2 {
                let avg = (self.samples[n - 2].value + self.samples[n - 1].value) * 0.5;
                self.samples[n - 1].value = lerp_f(self.samples[n - 1].value, avg, factor);
            }
        }
    }
}

/// Longest duration over all curves in a set.
pub fn max_duration(curves: &NamedCurveSet) -> f32 {
    curves.values().map(TimeCurve::duration).fold(0.0, f32::max)
}
