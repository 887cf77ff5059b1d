//! CurveSynthesizer: phoneme timeline + raw per-phoneme values -> named time curves.
//!
//! Two variants share the same input shape:
//! - `lipsync`: viseme presets, word-boundary silence, neighbour rounding, light smoothing.
//! - `facial`: per-channel dampening, blink mirroring, heavier smoothing.
//!
//! Both are pure functions of (timeline, raw data, settings). Raw values are clamped
//! to [-1, 1] before any blend math.

pub mod balance;
pub mod facial;
pub mod lipsync;

pub use balance::balance_smile_frown;
pub use facial::synthesize_facial;
pub use lipsync::synthesize_lipsync;

use hashbrown::HashMap;

use crate::errors::{MetaFaceError, Result};
use crate::phoneme::PhonemeTimeline;

/// Values within this window before the end of the phrase fade out linearly.
pub const END_FADE_WINDOW: f32 = 0.25;

/// Validated symbols, one per phoneme.
pub(crate) fn timeline_symbols(timeline: &PhonemeTimeline) -> Result<Vec<char>> {
    timeline
        .phonemes
        .iter()
        .enumerate()
        .map(|(index, p)| {
            p.symbol_char()
                .ok_or_else(|| MetaFaceError::InvalidPhonemeSymbol {
                    index,
                    symbol: p.symbol.clone(),
                })
        })
        .collect()
}

/// Multiplier for a sample at `time` given the phrase end `play_time`.
#[inline]
pub(crate) fn end_fade(play_time: f32, time: f32) -> f32 {
    let remaining = play_time - time;
    if remaining < END_FADE_WINDOW {
        remaining / END_FADE_WINDOW
    } else {
        1.0
    }
}

/// Collects skipped (channel, index) pairs and reports the first one per channel.
#[derive(Default)]
pub(crate) struct MismatchLog<'a> {
    first: HashMap<&'a str, (usize, usize)>,
}

impl<'a> MismatchLog<'a> {
    pub(crate) fn note(&mut self, channel: &'a str, index: usize) {
        self.first
            .entry(channel)
            .and_modify(|(_, count)| *count += 1)
            .or_insert((index, 1));
    }

    pub(crate) fn report(&self, track: &str) {
        for (channel, (index, count)) in &self.first {
            let err = MetaFaceError::CurveMismatch {
                channel: (*channel).to_string(),
                index: *index,
            };
            log::warn!("{track}: {err} ({count} sample(s) skipped)");
        }
    }
}
