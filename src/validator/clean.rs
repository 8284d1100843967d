use std::borrow::Cow;

use super::ResponseValidator;
use crate::text::{char_len, special_char_ratio};

const MIN_WORDS_FOR_SCAN: usize = 50;
const SCAN_REGION_WORDS: usize = 100;
const WINDOW_HALF_WIDTH: usize = 10;
const WINDOW_SPECIAL_RATIO_LIMIT: f64 = 0.4;
const WINDOW_AVG_WORD_LENGTH_LIMIT: f64 = 20.0;
const MIN_GOOD_FRACTION: f64 = 0.3;
const SENTENCE_END_FRACTION: f64 = 0.8;

impl ResponseValidator {
    /// Drops a degraded tail, then normalizes whitespace.
    ///
    /// Truncation is repeated until the word list is stable so that cleaning
    /// an already cleaned text is a no-op.
    pub fn clean_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut current = Cow::Borrowed(text);
        while let Some(truncated) = truncate_at_corruption(&current) {
            current = Cow::Owned(truncated);
        }

        let collapsed = self.whitespace_run.replace_all(&current, " ");
        let collapsed = self.newline_run.replace_all(&collapsed, "\n\n");
        collapsed.trim().to_string()
    }
}

fn truncate_at_corruption(text: &str) -> Option<String> {
    let words = text.split_whitespace().collect::<Vec<&str>>();
    if words.len() <= MIN_WORDS_FOR_SCAN {
        return None;
    }

    let corruption_point = find_corruption_point(&words)?;
    if corruption_point == 0 || corruption_point as f64 <= words.len() as f64 * MIN_GOOD_FRACTION {
        return None;
    }

    let truncated = words[..corruption_point].join(" ");
    let total_chars = char_len(&truncated);
    let last_sentence_end = truncated
        .char_indices()
        .enumerate()
        .filter(|(_, (_, character))| matches!(character, '.' | '!' | '?'))
        .last();

    if let Some((char_position, (byte_offset, _))) = last_sentence_end {
        if char_position as f64 > total_chars as f64 * SENTENCE_END_FRACTION {
            return Some(truncated[..=byte_offset].to_string());
        }
    }

    Some(truncated)
}

fn find_corruption_point(words: &[&str]) -> Option<usize> {
    let start = words.len().saturating_sub(SCAN_REGION_WORDS);

    (start..words.len()).find(|index| {
        let window_start = index.saturating_sub(WINDOW_HALF_WIDTH);
        let window_end = (index + WINDOW_HALF_WIDTH).min(words.len());
        let window = &words[window_start..window_end];

        let section = window.join(" ");
        let avg_word_len = window.iter().map(|word| char_len(word)).sum::<usize>() as f64
            / window.len().max(1) as f64;

        special_char_ratio(&section) > WINDOW_SPECIAL_RATIO_LIMIT
            || avg_word_len > WINDOW_AVG_WORD_LENGTH_LIMIT
    })
}
