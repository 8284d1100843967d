use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterPoint {
    pub temperature: f64,
    pub top_p: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepPoint {
    pub sequence: usize,
    pub point: ParameterPoint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Other,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stop" => Self::Stop,
            "length" => Self::Length,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub is_corrupted: bool,
    pub is_truncated: bool,
    pub corruption_score: f64,
    pub cleaned_text: String,
    pub warnings: Vec<String>,
    pub original_length: usize,
    pub cleaned_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    LengthScore,
    CoherenceScore,
    CompletenessScore,
    StructureScore,
    ReadabilityScore,
    OverallScore,
}

impl MetricName {
    pub const ALL: [MetricName; 6] = [
        MetricName::LengthScore,
        MetricName::CoherenceScore,
        MetricName::CompletenessScore,
        MetricName::StructureScore,
        MetricName::ReadabilityScore,
        MetricName::OverallScore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LengthScore => "length_score",
            Self::CoherenceScore => "coherence_score",
            Self::CompletenessScore => "completeness_score",
            Self::StructureScore => "structure_score",
            Self::ReadabilityScore => "readability_score",
            Self::OverallScore => "overall_score",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == raw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub value: f64,
    pub metadata: Map<String, Value>,
}

impl MetricValue {
    pub fn empty() -> Self {
        Self {
            value: 0.0,
            metadata: Map::new(),
        }
    }
}

pub type MetricSet = BTreeMap<MetricName, MetricValue>;

/// A stored response with its metrics, as handed to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub response_id: Option<i64>,
    pub point: ParameterPoint,
    pub metrics: MetricSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<i64>,
    pub temperature: f64,
    pub top_p: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub count: usize,
    pub samples: Vec<MetricSample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepPaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub experiment_id: i64,
    pub experiment_name: String,
    pub prompt_sha256: String,
    pub model: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub temperature_range: Vec<f64>,
    pub top_p_range: Vec<f64>,
    pub max_tokens: u32,
    pub batch_size: usize,
    pub paths: SweepPaths,
    pub report: crate::dispatch::SweepReport,
}
