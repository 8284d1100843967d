use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PipelineError};
use crate::generation::GenerationService;
use crate::model::{FinishReason, MetricSet, ParameterPoint, SweepPoint, ValidationResult};
use crate::scorer::QualityScorer;
use crate::sweep::chunk_count;
use crate::validator::ResponseValidator;

/// Everything a successful point hands to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPoint {
    pub sequence: usize,
    pub point: ParameterPoint,
    pub max_tokens: u32,
    pub text: String,
    pub finish_reason: FinishReason,
    pub validation: ValidationResult,
    pub metrics: MetricSet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointFailure {
    pub sequence: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub kind: &'static str,
    pub message: String,
}

#[async_trait]
pub trait PointSink: Send + Sync {
    async fn point_completed(&self, completed: CompletedPoint) -> Result<(), PersistenceError>;

    async fn point_failed(&self, _failure: &PointFailure) {}
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub total_points: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub chunks: usize,
    pub elapsed_ms: u128,
    pub failures: Vec<PointFailure>,
}

/// Runs a sweep in consecutive chunks of `batch_size` concurrent pipelines.
pub struct Dispatcher<'a> {
    service: &'a dyn GenerationService,
    sink: &'a dyn PointSink,
    validator: &'a ResponseValidator,
    scorer: &'a QualityScorer,
    batch_size: usize,
    max_tokens: u32,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        service: &'a dyn GenerationService,
        sink: &'a dyn PointSink,
        validator: &'a ResponseValidator,
        scorer: &'a QualityScorer,
        batch_size: usize,
        max_tokens: u32,
    ) -> Self {
        Self {
            service,
            sink,
            validator,
            scorer,
            batch_size: batch_size.max(1),
            max_tokens,
        }
    }

    pub async fn run(&self, prompt: &str, points: &[SweepPoint]) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport {
            total_points: points.len(),
            ..SweepReport::default()
        };

        let chunk_total = chunk_count(points.len(), self.batch_size);
        for (chunk_index, chunk) in points.chunks(self.batch_size).enumerate() {
            info!(
                batch = chunk_index + 1,
                batches = chunk_total,
                size = chunk.len(),
                "batch {}/{}",
                chunk_index + 1,
                chunk_total
            );

            let outcomes = join_all(
                chunk
                    .iter()
                    .map(|sweep_point| self.run_point(prompt, *sweep_point)),
            )
            .await;

            let mut chunk_succeeded = 0usize;
            for (sweep_point, outcome) in chunk.iter().zip(outcomes) {
                match outcome {
                    Ok(()) => chunk_succeeded += 1,
                    Err(err) => {
                        warn!(
                            sequence = sweep_point.sequence,
                            temperature = sweep_point.point.temperature,
                            top_p = sweep_point.point.top_p,
                            kind = err.kind(),
                            error = %err,
                            "sweep point failed"
                        );
                        let failure = PointFailure {
                            sequence: sweep_point.sequence,
                            temperature: sweep_point.point.temperature,
                            top_p: sweep_point.point.top_p,
                            kind: err.kind(),
                            message: err.to_string(),
                        };
                        self.sink.point_failed(&failure).await;
                        report.failures.push(failure);
                    }
                }
            }

            report.chunks += 1;
            report.processed += chunk.len();
            report.succeeded += chunk_succeeded;
            info!(
                batch = chunk_index + 1,
                succeeded = chunk_succeeded,
                size = chunk.len(),
                "batch complete: {}/{}",
                chunk_succeeded,
                chunk.len()
            );
        }

        report.failed = report.failures.len();
        report.elapsed_ms = started.elapsed().as_millis();
        report
    }

    async fn run_point(&self, prompt: &str, sweep_point: SweepPoint) -> Result<(), PipelineError> {
        let SweepPoint { sequence, point } = sweep_point;

        let generated = self
            .service
            .generate(prompt, point.temperature, point.top_p, self.max_tokens)
            .await?;
        debug!(
            sequence,
            temperature = point.temperature,
            top_p = point.top_p,
            length = generated.text.chars().count(),
            finish_reason = generated.finish_reason.as_str(),
            "generation received"
        );

        let validation = catch_stage("validation", || {
            self.validator
                .validate(&generated.text, generated.finish_reason)
        })?;
        if !validation.warnings.is_empty() {
            warn!(
                sequence,
                temperature = point.temperature,
                top_p = point.top_p,
                corruption_score = validation.corruption_score,
                warnings = ?validation.warnings,
                "validation warnings"
            );
        }

        let scored_text = if validation.cleaned_text.is_empty() {
            generated.text.as_str()
        } else {
            validation.cleaned_text.as_str()
        };
        let metrics = catch_stage("scoring", || self.scorer.score_all(scored_text))?;

        self.sink
            .point_completed(CompletedPoint {
                sequence,
                point,
                max_tokens: self.max_tokens,
                text: scored_text.to_string(),
                finish_reason: generated.finish_reason,
                validation,
                metrics,
            })
            .await?;

        Ok(())
    }
}

/// Runs a synchronous pipeline stage, turning a panic into a point failure.
fn catch_stage<T>(stage: &'static str, run: impl FnOnce() -> T) -> Result<T, PipelineError> {
    catch_unwind(AssertUnwindSafe(run)).map_err(|payload| PipelineError::StagePanicked {
        stage,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
