use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::*;
use crate::error::{GenerationError, GenerationErrorKind};
use crate::model::{GenerationResult, MetricName};
use crate::sweep::build_sweep;

const ANSWER: &str = "Lower temperatures keep the answer focused. Higher temperatures make the wording more varied.";

struct ScriptedService {
    failing_top_p: Option<f64>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    in_flight_on_entry: Mutex<Vec<usize>>,
}

impl ScriptedService {
    fn new(failing_top_p: Option<f64>) -> Self {
        Self {
            failing_top_p,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            in_flight_on_entry: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(
        &self,
        _prompt: &str,
        _temperature: f64,
        top_p: f64,
        _max_tokens: u32,
    ) -> Result<GenerationResult, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.in_flight_on_entry
            .lock()
            .expect("entry lock should not be poisoned")
            .push(current);

        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_top_p == Some(top_p) {
            return Err(GenerationError::new(
                GenerationErrorKind::RateLimited,
                "Rate limit exceeded",
            ));
        }

        Ok(GenerationResult {
            text: ANSWER.to_string(),
            finish_reason: FinishReason::Stop,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    fail_sequence: Option<usize>,
    completed: Mutex<Vec<CompletedPoint>>,
    failed: Mutex<Vec<usize>>,
}

#[async_trait]
impl PointSink for RecordingSink {
    async fn point_completed(&self, completed: CompletedPoint) -> Result<(), PersistenceError> {
        if self.fail_sequence == Some(completed.sequence) {
            return Err(PersistenceError::Worker("disk full".to_string()));
        }
        self.completed
            .lock()
            .expect("completed lock should not be poisoned")
            .push(completed);
        Ok(())
    }

    async fn point_failed(&self, failure: &PointFailure) {
        self.failed
            .lock()
            .expect("failed lock should not be poisoned")
            .push(failure.sequence);
    }
}

fn twelve_points() -> Vec<SweepPoint> {
    build_sweep(&[0.1, 0.2, 0.3], &[0.1, 0.2, 0.3, 0.4]).expect("ranges should be valid")
}

fn components() -> (ResponseValidator, QualityScorer) {
    (
        ResponseValidator::new().expect("validator should build"),
        QualityScorer::new().expect("scorer should build"),
    )
}

#[tokio::test]
async fn failing_points_do_not_abort_the_sweep() {
    let (validator, scorer) = components();
    let service = ScriptedService::new(Some(0.4));
    let sink = RecordingSink::default();
    let dispatcher = Dispatcher::new(&service, &sink, &validator, &scorer, 5, 256);

    let report = dispatcher.run("Explain sampling", &twelve_points()).await;

    assert_eq!(report.total_points, 12);
    assert_eq!(report.processed, 12);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.succeeded, 9);
    assert_eq!(report.failed, 3);
    assert_eq!(
        report
            .failures
            .iter()
            .map(|failure| failure.sequence)
            .collect::<Vec<_>>(),
        vec![4, 8, 12]
    );
    assert!(report.failures.iter().all(|failure| failure.kind == "rate_limited"));

    let failed = sink.failed.lock().expect("failed lock").clone();
    assert_eq!(failed, vec![4, 8, 12]);
    assert_eq!(sink.completed.lock().expect("completed lock").len(), 9);
}

#[tokio::test]
async fn in_flight_calls_never_exceed_batch_size() {
    let (validator, scorer) = components();
    let service = ScriptedService::new(None);
    let sink = RecordingSink::default();
    let dispatcher = Dispatcher::new(&service, &sink, &validator, &scorer, 5, 256);

    let report = dispatcher.run("Explain sampling", &twelve_points()).await;

    assert_eq!(report.succeeded, 12);
    assert_eq!(service.calls.load(Ordering::SeqCst), 12);
    assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn chunks_are_split_five_five_two_with_barriers() {
    let (validator, scorer) = components();
    let service = ScriptedService::new(None);
    let sink = RecordingSink::default();
    let dispatcher = Dispatcher::new(&service, &sink, &validator, &scorer, 5, 256);

    let report = dispatcher.run("Explain sampling", &twelve_points()).await;
    assert_eq!(report.chunks, 3);

    // Every chunk starts from an empty pipeline, so each new chunk begins at one.
    let entries = service
        .in_flight_on_entry
        .lock()
        .expect("entry lock")
        .clone();
    assert_eq!(entries, vec![1, 2, 3, 4, 5, 1, 2, 3, 4, 5, 1, 2]);

    let mut chunk_sizes = Vec::<usize>::new();
    for current in entries {
        if current == 1 {
            chunk_sizes.push(0);
        }
        if let Some(size) = chunk_sizes.last_mut() {
            *size += 1;
        }
    }
    assert_eq!(chunk_sizes, vec![5, 5, 2]);
}

struct BlankService;

#[async_trait]
impl GenerationService for BlankService {
    async fn generate(
        &self,
        _prompt: &str,
        _temperature: f64,
        _top_p: f64,
        _max_tokens: u32,
    ) -> Result<GenerationResult, GenerationError> {
        Ok(GenerationResult {
            text: "  \n  ".to_string(),
            finish_reason: FinishReason::Stop,
        })
    }
}

#[tokio::test]
async fn blank_cleaned_text_falls_back_to_raw_for_scoring_and_storage() {
    let (validator, scorer) = components();
    let sink = RecordingSink::default();
    let points = build_sweep(&[0.3], &[1.0]).expect("ranges should be valid");
    let dispatcher = Dispatcher::new(&BlankService, &sink, &validator, &scorer, 5, 256);

    let report = dispatcher.run("Explain sampling", &points).await;
    assert_eq!(report.succeeded, 1);

    let completed = sink.completed.lock().expect("completed lock");
    let point = completed.first().expect("one point should complete");
    assert!(point.validation.cleaned_text.is_empty());
    assert_eq!(point.text, "  \n  ");
    assert_eq!(point.metrics, scorer.score_all("  \n  "));
    assert_eq!(point.metrics[&MetricName::LengthScore].value, 0.1);
}

#[tokio::test]
async fn batch_size_one_runs_sequentially() {
    let (validator, scorer) = components();
    let service = ScriptedService::new(None);
    let sink = RecordingSink::default();
    let points = build_sweep(&[0.5], &[0.5, 1.0]).expect("ranges should be valid");
    let dispatcher = Dispatcher::new(&service, &sink, &validator, &scorer, 1, 256);

    let report = dispatcher.run("Explain sampling", &points).await;

    assert_eq!(report.chunks, 2);
    assert_eq!(service.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn completed_points_carry_validation_and_all_metrics() {
    let (validator, scorer) = components();
    let service = ScriptedService::new(None);
    let sink = RecordingSink::default();
    let points = build_sweep(&[0.7], &[0.9]).expect("ranges should be valid");
    let dispatcher = Dispatcher::new(&service, &sink, &validator, &scorer, 5, 321);

    dispatcher.run("Explain sampling", &points).await;

    let completed = sink.completed.lock().expect("completed lock");
    let point = completed.first().expect("one point should complete");
    assert_eq!(point.sequence, 1);
    assert_eq!(point.max_tokens, 321);
    assert_eq!(point.text, ANSWER);
    assert!(point.validation.is_valid);
    assert_eq!(point.metrics.len(), MetricName::ALL.len());
    assert_eq!(point.metrics, scorer.score_all(ANSWER));
}

#[tokio::test]
async fn persistence_failure_is_isolated_to_its_point() {
    let (validator, scorer) = components();
    let service = ScriptedService::new(None);
    let sink = RecordingSink {
        fail_sequence: Some(2),
        ..RecordingSink::default()
    };
    let points = build_sweep(&[0.2, 0.8], &[1.0]).expect("ranges should be valid");
    let dispatcher = Dispatcher::new(&service, &sink, &validator, &scorer, 5, 256);

    let report = dispatcher.run("Explain sampling", &points).await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].sequence, 2);
    assert_eq!(report.failures[0].kind, "persistence");
}

#[tokio::test]
async fn empty_sweep_reports_nothing() {
    let (validator, scorer) = components();
    let service = ScriptedService::new(None);
    let sink = RecordingSink::default();
    let dispatcher = Dispatcher::new(&service, &sink, &validator, &scorer, 5, 256);

    let report = dispatcher.run("Explain sampling", &[]).await;

    assert_eq!(report.chunks, 0);
    assert_eq!(report.processed, 0);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_stage_becomes_point_failure() {
    let err = catch_stage::<()>("scoring", || panic!("metric table missing"))
        .expect_err("panic should be captured");

    assert_eq!(err.kind(), "pipeline");
    match err {
        PipelineError::StagePanicked { stage, message } => {
            assert_eq!(stage, "scoring");
            assert_eq!(message, "metric table missing");
        }
        other => panic!("unexpected error: {other}"),
    }
}
