use metaface_api_core::RawAnimData;

use crate::config::GenerationSettings;
use crate::curve::{NamedCurveSet, SmoothWindow, TimeCurve, CURVE_FLAG_RICH};
use crate::errors::Result;
use crate::phoneme::{is_supported_symbol, PhonemeTimeline};

use super::{end_fade, timeline_symbols, MismatchLog};

pub const FACIAL_TAIL: f32 = 0.8;
pub const FACIAL_SMOOTH_PASSES: usize = 4;

const BLINK_LEFT: &str = "EyeBlinkLeft";
const BLINK_RIGHT: &str = "EyeBlinkRight";

fn dampening(channel: &str) -> f32 {
    if channel.starts_with("Brow") {
        0.6
    } else if channel.starts_with("EyeSquint") {
        0.75
    } else {
        1.0
    }
}

fn smooth_window(channel: &str) -> SmoothWindow {
    if channel.contains("Brow") {
        SmoothWindow::Three
    } else {
        SmoothWindow::Five
    }
}

/// Build facial-emotion curves, one per raw channel.
///
/// EyeBlinkRight mirrors EyeBlinkLeft when the input lacks it. When smile/frown
/// balancing is on, the smile channels are dropped from the result.
pub fn synthesize_facial(
    timeline: &PhonemeTimeline,
    raw: &RawAnimData,
    settings: &GenerationSettings,
) -> Result<NamedCurveSet> {
    let mut out = NamedCurveSet::new();
    if timeline.is_empty() {
        return Ok(out);
    }
    let symbols = timeline_symbols(timeline)?;
    let play_time = timeline.play_time();

    let mirror_blink = raw.contains_key(BLINK_LEFT) && !raw.contains_key(BLINK_RIGHT);
    for name in raw.keys() {
        out.insert(name.clone(), TimeCurve::with_capacity(timeline.len() + 1));
    }
    if mirror_blink {
        out.insert(BLINK_RIGHT.to_string(), TimeCurve::with_capacity(timeline.len() + 1));
    }

    let mut mismatches = MismatchLog::default();
    let mut previous_time = 0.0f32;

    for (index, phoneme) in timeline.phonemes.iter().enumerate() {
        previous_time = phoneme.time;
        if !is_supported_symbol(symbols[index]) {
            continue;
        }
        for (name, values) in raw {
            let Some(raw_value) = values.get(index) else {
                mismatches.note(name, index);
                continue;
            };
            let value = raw_value.clamp(-1.0, 1.0)
                * dampening(name)
                * end_fade(play_time, phoneme.time);

            if let Some(curve) = out.get_mut(name) {
                curve.add_sample(phoneme.time, value, 0);
            }
            if mirror_blink && name == BLINK_LEFT {
                if let Some(curve) = out.get_mut(BLINK_RIGHT) {
                    curve.add_sample(phoneme.time, value, 0);
                }
            }
        }
    }

    let tail = previous_time + FACIAL_TAIL;
    for curve in out.values_mut() {
        curve.add_sample(tail, 0.0, CURVE_FLAG_RICH);
    }

    let smoothness = settings.facial_smoothness;
    if smoothness > 0.0 {
        for _ in 0..FACIAL_SMOOTH_PASSES {
            for (name, curve) in out.iter_mut() {
                curve.smooth_pass(smooth_window(name), smoothness, 1.0);
                curve.smooth_edges(smoothness);
            }
        }
    }

    if settings.balance_smile_frown {
        out.remove("MouthSmileLeft");
        out.remove("MouthSmileRight");
    }

    mismatches.report("facial");
    Ok(out)
}
