use std::collections::BTreeMap;

use crate::model::{MetricName, MetricSample, MetricSummary, ScoredRecord};

/// Per-metric descriptive statistics over one sweep's scored responses.
pub fn aggregate(records: &[ScoredRecord]) -> BTreeMap<MetricName, MetricSummary> {
    let mut samples = BTreeMap::<MetricName, Vec<MetricSample>>::new();
    for record in records {
        for (name, metric) in &record.metrics {
            samples.entry(*name).or_default().push(MetricSample {
                response_id: record.response_id,
                temperature: record.point.temperature,
                top_p: record.point.top_p,
                value: metric.value,
            });
        }
    }

    samples
        .into_iter()
        .filter_map(|(name, samples)| summarize(samples).map(|summary| (name, summary)))
        .collect()
}

fn summarize(samples: Vec<MetricSample>) -> Option<MetricSummary> {
    let values = samples
        .iter()
        .map(|sample| sample.value)
        .collect::<Vec<f64>>();

    Some(MetricSummary {
        mean: mean(&values)?,
        median: median(&values)?,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        std_dev: sample_std_dev(&values),
        count: values.len(),
        samples,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|left, right| left.total_cmp(right));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Bessel-corrected; zero below two samples.
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let Some(mean) = mean(values) else {
        return 0.0;
    };
    let sum_sq = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}
