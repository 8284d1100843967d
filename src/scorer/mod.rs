use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::model::{MetricName, MetricSet, MetricValue};
use crate::text::{char_len, mean_token_length, round_to, round3, split_sentences};

#[cfg(test)]
mod tests;

const OPTIMAL_LENGTH_MIN: usize = 50;
const OPTIMAL_LENGTH_MAX: usize = 2000;
const LENGTH_PENALTY_SPAN: f64 = 5000.0;

const TRANSITION_WORDS: [&str; 16] = [
    "however",
    "therefore",
    "furthermore",
    "moreover",
    "additionally",
    "consequently",
    "meanwhile",
    "subsequently",
    "thus",
    "hence",
    "also",
    "besides",
    "further",
    "next",
    "then",
    "finally",
];

const CONCLUSION_PHRASES: [&str; 8] = [
    "conclusion",
    "summary",
    "in summary",
    "to conclude",
    "in conclusion",
    "to sum up",
    "overall",
    "finally",
];

const QUESTION_TOKENS: [&str; 7] = ["?", "what", "how", "why", "when", "where", "who"];

const COMPLETENESS_LENGTH: f64 = 500.0;
const HEADER_MAX_CHARS: usize = 80;
const TARGET_SENTENCE_WORDS: f64 = 15.0;
const TARGET_WORD_CHARS: f64 = 4.5;

const OVERALL_WEIGHTS: [(MetricName, f64); 5] = [
    (MetricName::LengthScore, 0.15),
    (MetricName::CoherenceScore, 0.25),
    (MetricName::CompletenessScore, 0.20),
    (MetricName::StructureScore, 0.15),
    (MetricName::ReadabilityScore, 0.25),
];

pub struct QualityScorer {
    bullet_item: Regex,
    numbered_item: Regex,
}

impl QualityScorer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            bullet_item: Regex::new(r"(?m)^\s*[-*•]\s+")
                .context("failed to compile bullet list regex")?,
            numbered_item: Regex::new(r"(?m)^\s*\d+[.)]\s+")
                .context("failed to compile numbered list regex")?,
        })
    }

    pub fn score_all(&self, text: &str) -> MetricSet {
        MetricName::ALL
            .into_iter()
            .map(|name| (name, self.score(name, text)))
            .collect()
    }

    pub fn score(&self, name: MetricName, text: &str) -> MetricValue {
        match name {
            MetricName::LengthScore => self.length_score(text),
            MetricName::CoherenceScore => self.coherence_score(text),
            MetricName::CompletenessScore => self.completeness_score(text),
            MetricName::StructureScore => self.structure_score(text),
            MetricName::ReadabilityScore => self.readability_score(text),
            MetricName::OverallScore => self.overall_score(text),
        }
    }

    pub fn length_score(&self, text: &str) -> MetricValue {
        let length = char_len(text);

        let score = if length < OPTIMAL_LENGTH_MIN {
            length as f64 / OPTIMAL_LENGTH_MIN as f64
        } else if length <= OPTIMAL_LENGTH_MAX {
            1.0
        } else {
            let excess = (length - OPTIMAL_LENGTH_MAX) as f64;
            (1.0 - excess / LENGTH_PENALTY_SPAN).max(0.0)
        };

        metric(
            score,
            json!({
                "length": length,
                "optimal_range": format!("{OPTIMAL_LENGTH_MIN}-{OPTIMAL_LENGTH_MAX}"),
            }),
        )
    }

    pub fn coherence_score(&self, text: &str) -> MetricValue {
        if text.trim().is_empty() {
            return MetricValue::empty();
        }

        let sentences = split_sentences(text);
        if sentences.len() < 2 {
            return metric(0.5, json!({ "sentence_count": sentences.len() }));
        }

        let lowered = text.to_lowercase();
        let transition_count = TRANSITION_WORDS
            .iter()
            .filter(|word| lowered.contains(*word))
            .count();
        let transition_score = (transition_count as f64 / sentences.len() as f64).min(1.0);

        let lengths = sentences
            .iter()
            .map(|sentence| sentence.split_whitespace().count() as f64)
            .collect::<Vec<f64>>();
        let variation_score = (population_variance(&lengths) / 100.0).min(1.0);

        metric(
            0.4 * transition_score + 0.6 * variation_score,
            json!({
                "sentence_count": sentences.len(),
                "transition_count": transition_count,
            }),
        )
    }

    pub fn completeness_score(&self, text: &str) -> MetricValue {
        if text.trim().is_empty() {
            return MetricValue::empty();
        }

        let lowered = text.to_lowercase();
        let has_conclusion = CONCLUSION_PHRASES
            .iter()
            .any(|phrase| lowered.contains(*phrase));
        let question_count = QUESTION_TOKENS
            .iter()
            .filter(|token| lowered.contains(*token))
            .count();
        let has_questions = question_count > 3;
        let length_factor = (char_len(text) as f64 / COMPLETENESS_LENGTH).min(1.0);

        let completeness = if has_questions && !has_conclusion {
            0.6 * length_factor
        } else if has_conclusion {
            0.8 + 0.2 * length_factor
        } else {
            0.7 * length_factor
        };

        metric(
            completeness,
            json!({
                "has_conclusion": has_conclusion,
                "question_count": question_count,
            }),
        )
    }

    pub fn structure_score(&self, text: &str) -> MetricValue {
        if text.trim().is_empty() {
            return MetricValue::empty();
        }

        let paragraph_count = text
            .split("\n\n")
            .filter(|paragraph| !paragraph.trim().is_empty())
            .count();
        let list_items =
            self.bullet_item.find_iter(text).count() + self.numbered_item.find_iter(text).count();
        let header_count = count_headers(text);

        let mut score: f64 = match paragraph_count {
            2..=5 => 0.4,
            count if count > 5 => 0.3,
            _ => 0.1,
        };

        if list_items > 0 {
            score += 0.3;
        } else if paragraph_count > 1 {
            score += 0.2;
        }

        score += if header_count > 0 { 0.3 } else { 0.1 };

        metric(
            score.min(1.0),
            json!({
                "paragraph_count": paragraph_count,
                "list_items": list_items,
                "header_count": header_count,
            }),
        )
    }

    pub fn readability_score(&self, text: &str) -> MetricValue {
        if text.trim().is_empty() {
            return MetricValue::empty();
        }

        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return MetricValue::empty();
        }

        let word_count = text.split_whitespace().count();
        let avg_sentence_length = word_count as f64 / sentences.len() as f64;
        let avg_word_length = mean_token_length(text.split_whitespace()).unwrap_or(0.0);

        let sentence_score = (1.0
            - (avg_sentence_length - TARGET_SENTENCE_WORDS).abs() / 30.0)
            .clamp(0.0, 1.0);
        let word_score = (1.0 - (avg_word_length - TARGET_WORD_CHARS).abs() / 3.0).clamp(0.0, 1.0);

        metric(
            0.6 * sentence_score + 0.4 * word_score,
            json!({
                "avg_sentence_length": round_to(avg_sentence_length, 1),
                "avg_word_length": round_to(avg_word_length, 1),
                "word_count": word_count,
            }),
        )
    }

    /// Weighted blend of the five component scores.
    ///
    /// Components are evaluated here directly rather than through
    /// `score_all`, which itself calls this function.
    pub fn overall_score(&self, text: &str) -> MetricValue {
        if text.trim().is_empty() {
            return MetricValue::empty();
        }

        let mut components = Map::new();
        let mut overall = 0.0;
        for (name, weight) in OVERALL_WEIGHTS {
            let component = match name {
                MetricName::LengthScore => self.length_score(text),
                MetricName::CoherenceScore => self.coherence_score(text),
                MetricName::CompletenessScore => self.completeness_score(text),
                MetricName::StructureScore => self.structure_score(text),
                MetricName::ReadabilityScore => self.readability_score(text),
                MetricName::OverallScore => continue,
            };

            overall += component.value * weight;
            components.insert(name.as_str().to_string(), json!(component.value));
        }

        metric(overall, json!({ "component_scores": components }))
    }
}

fn metric(value: f64, metadata: Value) -> MetricValue {
    let metadata = match metadata {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    MetricValue {
        value: round3(value),
        metadata,
    }
}

fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / values.len() as f64
}

/// Short lines opening a block and followed by content.
fn count_headers(text: &str) -> usize {
    let lines = text.split('\n').collect::<Vec<&str>>();

    lines
        .iter()
        .enumerate()
        .filter(|(index, line)| {
            let stripped = line.trim();
            let opens_block = *index == 0 || lines[index - 1].trim().is_empty();
            let has_content_after = index + 1 < lines.len() && !lines[index + 1].trim().is_empty();

            !stripped.is_empty()
                && char_len(stripped) < HEADER_MAX_CHARS
                && opens_block
                && has_content_after
        })
        .count()
}
