use std::time::Duration;

use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MIN_WPM: u32 = 100;
pub const MAX_WPM: u32 = 1000;
pub const DEFAULT_WPM: u32 = 300;

const SENTENCE_PAUSE: f64 = 2.0;
const CLAUSE_PAUSE: f64 = 1.5;

/// Which character of the displayed word gets the red highlight
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RedLetterPosition {
    #[default]
    First,
    Middle,
    Last,
    Random,
}

impl RedLetterPosition {
    /// The position after this one, wrapping around
    pub fn next(self) -> Self {
        match self {
            RedLetterPosition::First => RedLetterPosition::Middle,
            RedLetterPosition::Middle => RedLetterPosition::Last,
            RedLetterPosition::Last => RedLetterPosition::Random,
            RedLetterPosition::Random => RedLetterPosition::First,
        }
    }
}

/// Clamp any requested rate into the supported range. Out-of-range values are never rejected.
pub fn clamp_wpm(requested: i64) -> u32 {
    requested.clamp(MIN_WPM as i64, MAX_WPM as i64) as u32
}

/// Milliseconds `word` stays on screen before the next advance
pub fn delay_ms_for_word(word: &str, wpm: u32, pause_on_punctuation: bool) -> f64 {
    let base = 60_000.0 / wpm.max(1) as f64;
    if !pause_on_punctuation {
        return base;
    }

    match word.chars().last() {
        Some('.' | '!' | '?') => base * SENTENCE_PAUSE,
        Some(',' | ';' | ':') => base * CLAUSE_PAUSE,
        _ => base,
    }
}

pub fn delay_for_word(word: &str, wpm: u32, pause_on_punctuation: bool) -> Duration {
    let ms = delay_ms_for_word(word, wpm, pause_on_punctuation);
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}

/// Character index to highlight, or `None` for an empty word.
///
/// `Random` draws a fresh index on every call, so re-rendering the same word moves the
/// highlight around.
pub fn highlight_index(word: &str, position: RedLetterPosition) -> Option<usize> {
    highlight_index_with(word, position, &mut rand::thread_rng())
}

pub fn highlight_index_with<R: Rng>(
    word: &str,
    position: RedLetterPosition,
    rng: &mut R,
) -> Option<usize> {
    let len = word.chars().count();
    if len == 0 {
        return None;
    }

    Some(match position {
        RedLetterPosition::First => 0,
        RedLetterPosition::Middle => len / 2,
        RedLetterPosition::Last => len - 1,
        RedLetterPosition::Random => rng.gen_range(0..len),
    })
}

/// Split a word around its highlighted character: (before, highlighted, after)
pub fn split_at_highlight(word: &str, index: usize) -> Option<(&str, &str, &str)> {
    let (start, ch) = word.char_indices().nth(index)?;
    let end = start + ch.len_utf8();
    Some((&word[..start], &word[start..end], &word[end..]))
}
