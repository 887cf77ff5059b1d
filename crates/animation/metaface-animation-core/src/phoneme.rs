#![allow(dead_code)]
//! Phoneme timeline input.

use serde::{Deserialize, Serialize};

use crate::errors::{MetaFaceError, Result};

/// One timed phoneme. `symbol` is expected to be a single char in [a-z0-9];
/// it stays a string so malformed input can be reported instead of truncated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhonemeEvent {
    pub time: f32,
    pub symbol: String,
    #[serde(default, rename = "wordStart", alias = "word_start")]
    pub is_word_start: bool,
}

impl PhonemeEvent {
    pub fn new(time: f32, symbol: char, is_word_start: bool) -> Self {
        Self {
            time,
            symbol: symbol.to_string(),
            is_word_start,
        }
    }

    /// The single symbol character, or None if the symbol length is not 1.
    pub fn symbol_char(&self) -> Option<char> {
        let mut chars = self.symbol.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

/// Symbols the models understand.
#[inline]
pub fn is_supported_symbol(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// Ordered phonemes of one phrase. `name` keys the per-actor animation cache.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhonemeTimeline {
    pub name: String,
    pub phonemes: Vec<PhonemeEvent>,
}

/// Padding added after the last phoneme when computing the fade-out end.
pub const PLAY_TIME_PADDING: f32 = 0.05;

impl PhonemeTimeline {
    pub fn new(name: impl Into<String>, phonemes: Vec<PhonemeEvent>) -> Self {
        Self {
            name: name.into(),
            phonemes,
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.phonemes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.phonemes.is_empty()
    }

    pub fn last_time(&self) -> f32 {
        self.phonemes.last().map(|p| p.time).unwrap_or(0.0)
    }

    /// Last phoneme time plus a small padding.
    pub fn play_time(&self) -> f32 {
        self.last_time() + PLAY_TIME_PADDING
    }

    /// Rejects empty timelines and symbols whose length is not 1.
    pub fn validate(&self) -> Result<()> {
        if self.phonemes.is_empty() {
            return Err(MetaFaceError::EmptyInput);
        }
        for (index, p) in self.phonemes.iter().enumerate() {
            if p.symbol_char().is_none() {
                return Err(MetaFaceError::InvalidPhonemeSymbol {
                    index,
                    symbol: p.symbol.clone(),
                });
            }
        }
        Ok(())
    }
}
