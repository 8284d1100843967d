use anyhow::{Context, Result};
use regex::Regex;

use crate::model::{FinishReason, ValidationResult};
use crate::text::{char_len, mean_token_length, round3, special_char_ratio};

mod clean;

const CORRUPTION_PATTERNS: [&str; 5] = [
    r"[a-zA-Z]{20,}",
    r"[^\w\s]{10,}",
    r"[A-Z]{15,}",
    r"[a-z]{20,}",
    r"\d{10,}",
];

const CODE_PATTERNS: [&str; 9] = [
    r"<script[^>]*>.*?</script>",
    r"function\s+\w+\s*\([^)]*\)\s*\{",
    r"import\s+\w+",
    r"from\s+\w+\s+import",
    r"class\s+\w+",
    r"def\s+\w+\s*\(",
    r"const\s+\w+\s*=",
    r"var\s+\w+\s*=",
    r"\.(js|py|html|css|json|xml)\b",
];

const SPECIAL_CHAR_RATIO_LIMIT: f64 = 0.3;
const AVG_WORD_LENGTH_LIMIT: f64 = 15.0;
const CODE_MATCH_LIMIT: usize = 2;
const CODE_PENALTY: f64 = 0.3;
const MIN_TEXT_CHARS: usize = 10;

pub const WARN_TRUNCATED: &str = "Response was truncated due to max_tokens limit";
pub const WARN_CODE_LIKE: &str = "Response contains code-like patterns";
pub const WARN_EXTREMELY_SHORT: &str = "Response is extremely short";
pub const WARN_LOW_QUALITY: &str = "Response may be corrupted or low quality";

pub struct ResponseValidator {
    corruption_patterns: Vec<Regex>,
    code_patterns: Vec<Regex>,
    whitespace_run: Regex,
    newline_run: Regex,
}

impl ResponseValidator {
    pub fn new() -> Result<Self> {
        let corruption_patterns = CORRUPTION_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("failed to compile corruption pattern {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let code_patterns = CODE_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?is){pattern}"))
                    .with_context(|| format!("failed to compile code pattern {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            corruption_patterns,
            code_patterns,
            whitespace_run: Regex::new(r"\s+").context("failed to compile whitespace regex")?,
            newline_run: Regex::new(r"\n{3,}").context("failed to compile newline regex")?,
        })
    }

    pub fn validate(&self, text: &str, finish_reason: FinishReason) -> ValidationResult {
        let mut warnings = Vec::<String>::new();
        let is_truncated = finish_reason == FinishReason::Length;
        if is_truncated {
            warnings.push(WARN_TRUNCATED.to_string());
        }

        let mut corruption_indicators = 0usize;
        let mut total_checks = 0usize;
        for pattern in &self.corruption_patterns {
            corruption_indicators += pattern.find_iter(text).count();
            total_checks += 1;
        }

        let code_matches = self
            .code_patterns
            .iter()
            .filter(|pattern| pattern.is_match(text))
            .count();

        if special_char_ratio(text) > SPECIAL_CHAR_RATIO_LIMIT {
            corruption_indicators += 1;
        }

        if mean_token_length(text.split_whitespace())
            .is_some_and(|average| average > AVG_WORD_LENGTH_LIMIT)
        {
            corruption_indicators += 1;
        }

        // The denominator counts pattern families while the numerator counts
        // every match, so repeated hits of one family saturate the score.
        let mut corruption_score =
            (corruption_indicators as f64 / total_checks.max(1) as f64).min(1.0);

        if code_matches > CODE_MATCH_LIMIT {
            corruption_score += CODE_PENALTY;
            warnings.push(WARN_CODE_LIKE.to_string());
        }

        let stripped_len = char_len(text.trim());
        if stripped_len < MIN_TEXT_CHARS {
            corruption_score = 1.0;
            warnings.push(WARN_EXTREMELY_SHORT.to_string());
        } else if corruption_score > 0.5 {
            warnings.push(WARN_LOW_QUALITY.to_string());
        }

        let corruption_score = corruption_score.clamp(0.0, 1.0);
        let is_corrupted = corruption_score > 0.6 || (is_truncated && corruption_score > 0.3);
        let is_valid = !is_corrupted && stripped_len > 0;

        let cleaned_text = self.clean_text(text);
        let cleaned_length = char_len(&cleaned_text);

        ValidationResult {
            is_valid,
            is_corrupted,
            is_truncated,
            corruption_score: round3(corruption_score),
            cleaned_text,
            warnings,
            original_length: char_len(text),
            cleaned_length,
        }
    }

    /// Returns the rejection reason, if the response should not be kept.
    pub fn should_reject(&self, text: &str, finish_reason: FinishReason) -> Option<String> {
        let validation = self.validate(text, finish_reason);

        if !validation.is_valid {
            return Some("Response is invalid or corrupted".to_string());
        }
        if validation.is_corrupted {
            return Some(format!(
                "Response appears corrupted (score: {})",
                validation.corruption_score
            ));
        }
        if char_len(text.trim()) < MIN_TEXT_CHARS {
            return Some("Response is too short".to_string());
        }

        None
    }
}
