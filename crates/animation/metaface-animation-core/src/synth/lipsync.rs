use metaface_api_core::math::lerp_f;
use metaface_api_core::RawAnimData;

use crate::config::GenerationSettings;
use crate::curve::{NamedCurveSet, SmoothWindow, TimeCurve, CURVE_FLAG_RICH, RICH_SMOOTHING_SCALE};
use crate::errors::Result;
use crate::phoneme::{is_supported_symbol, PhonemeEvent, PhonemeTimeline};
use crate::viseme::{Viseme, VisemePresetTable};

use super::balance::balance_smile_frown;
use super::{end_fade, timeline_symbols, MismatchLog};

/// Minimum gap before a word start counts as a real pause.
pub const WORD_GAP_MIN: f32 = 0.2;
/// Upper bound of the offset between a word edge and its silence sample.
pub const WORD_FADE_OFFSET_MAX: f32 = 0.2;
/// Trailing zero sample offset after the last phoneme.
pub const LIPSYNC_TAIL: f32 = 0.2;
pub const LIPSYNC_SMOOTH_PASSES: usize = 2;
/// Weight of a preset value relative to the network output for rounded vowels.
const ROUNDED_NEURAL_SCALE: f32 = 0.4;

#[derive(Copy, Clone, Debug, PartialEq)]
enum WordBoundary {
    /// Nothing spoken yet: a single zero at t=0.
    Leading,
    /// Silence between two words.
    Between { fade_in: f32, fade_out: f32 },
}

/// `first` marks the phrase's first phoneme, the only one that can lead.
fn word_boundary(phoneme: &PhonemeEvent, previous_time: f32, first: bool) -> Option<WordBoundary> {
    if !phoneme.is_word_start {
        return None;
    }
    let gap = phoneme.time - previous_time;
    if gap < WORD_GAP_MIN {
        return None;
    }
    if first {
        return Some(WordBoundary::Leading);
    }
    let offset = WORD_FADE_OFFSET_MAX.min(gap * 0.5 - 0.05);
    Some(WordBoundary::Between {
        fade_in: previous_time + offset,
        fade_out: phoneme.time - offset,
    })
}

/// Preset of a neighbouring rounding viseme for this channel, if any.
fn rounding_neighbour(
    presets: &VisemePresetTable,
    viseme: Option<Viseme>,
    channel: &str,
) -> Option<f32> {
    viseme
        .filter(|v| v.is_rounding())
        .and_then(|v| presets.value(v, channel))
}

/// Blend the current value with its rounding neighbours' presets.
fn blend_neighbours(value: f32, prev: Option<f32>, next: Option<f32>) -> f32 {
    match (prev, next) {
        (Some(p), Some(n)) => (p + value + n) / 3.0,
        (Some(p), None) => (p + value) / 2.0,
        (None, Some(n)) => (value + n) / 2.0,
        (None, None) => value,
    }
}

/// Apply the current viseme's preset. Returns the value and sample flags.
fn apply_viseme(
    value: f32,
    viseme: Option<Viseme>,
    channel: &str,
    settings: &GenerationSettings,
) -> (f32, u8) {
    let Some(viseme) = viseme else {
        return (value, 0);
    };
    let Some(preset) = settings.viseme_presets.value(viseme, channel) else {
        return (value, 0);
    };
    let apply = preset * settings.viseme_apply_alpha;
    let neural = settings.lipsync_neural_intensity;
    match viseme {
        Viseme::Bmp => (apply, CURVE_FLAG_RICH),
        Viseme::Wu => (lerp_f(apply, value, neural * ROUNDED_NEURAL_SCALE), CURVE_FLAG_RICH),
        Viseme::Oh => (lerp_f(apply, value, neural * ROUNDED_NEURAL_SCALE), 0),
        _ => (lerp_f(apply, value, neural), 0),
    }
}

/// Build lip-sync curves, one per raw channel.
///
/// An empty timeline yields an empty set. A symbol whose length is not 1 aborts.
/// Symbols outside [a-z0-9] add no sample but still advance word-boundary timing.
/// A channel lacking a value at some phoneme index skips that sample only.
/// Smile/frown balancing runs last when enabled.
pub fn synthesize_lipsync(
    timeline: &PhonemeTimeline,
    raw: &RawAnimData,
    settings: &GenerationSettings,
) -> Result<NamedCurveSet> {
    let mut out = NamedCurveSet::new();
    if timeline.is_empty() {
        return Ok(out);
    }
    let symbols = timeline_symbols(timeline)?;
    let visemes: Vec<Option<Viseme>> = symbols.iter().map(|c| Viseme::from_symbol(*c)).collect();
    let phonemes = &timeline.phonemes;
    let play_time = timeline.play_time();
    let presets = &settings.viseme_presets;

    for name in raw.keys() {
        out.insert(name.clone(), TimeCurve::with_capacity(phonemes.len() + 4));
    }

    let mut mismatches = MismatchLog::default();
    let mut previous_time = 0.0f32;

    for (index, phoneme) in phonemes.iter().enumerate() {
        let boundary = word_boundary(phoneme, previous_time, index == 0);
        let recognized = is_supported_symbol(symbols[index]);

        let next_is_word_start = phonemes.get(index + 1).is_some_and(|p| p.is_word_start);
        let word_place = if phoneme.is_word_start || next_is_word_start {
            0.5
        } else {
            1.0
        };
        let prev_viseme = index.checked_sub(1).and_then(|i| visemes[i]);
        let next_viseme = visemes.get(index + 1).copied().flatten();

        for (name, values) in raw {
            let Some(curve) = out.get_mut(name) else {
                continue;
            };

            match boundary {
                Some(WordBoundary::Leading) => curve.add_sample(0.0, 0.0, CURVE_FLAG_RICH),
                Some(WordBoundary::Between { fade_in, fade_out }) => {
                    curve.add_sample(fade_in, 0.0, 0);
                    curve.add_sample(fade_out, 0.0, 0);
                }
                None => {}
            }

            if !recognized {
                continue;
            }
            let Some(raw_value) = values.get(index) else {
                mismatches.note(name, index);
                continue;
            };

            let mut value = raw_value.clamp(-1.0, 1.0) * word_place;
            value = blend_neighbours(
                value,
                rounding_neighbour(presets, prev_viseme, name),
                rounding_neighbour(presets, next_viseme, name),
            );
            let (value, flags) = apply_viseme(value, visemes[index], name, settings);
            let value = value * end_fade(play_time, phoneme.time);

            curve.add_sample(phoneme.time, value, flags);
        }

        previous_time = phoneme.time;
    }

    let tail = previous_time + LIPSYNC_TAIL;
    for curve in out.values_mut() {
        curve.add_sample(tail, 0.0, CURVE_FLAG_RICH);
    }

    let smoothness = settings.lipsync_smoothness;
    if smoothness > 0.0 {
        for curve in out.values_mut() {
            for _ in 0..LIPSYNC_SMOOTH_PASSES {
                curve.smooth_pass(SmoothWindow::Three, smoothness, RICH_SMOOTHING_SCALE);
            }
        }
    }

    if settings.balance_smile_frown && !balance_smile_frown(&mut out) {
        log::debug!("lipsync: smile/frown balance skipped, channel pair incomplete");
    }

    mismatches.report("lipsync");
    Ok(out)
}
