use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::ScoreArgs;
use crate::model::{FinishReason, MetricSet, ValidationResult};
use crate::scorer::QualityScorer;
use crate::validator::ResponseValidator;

#[derive(Debug, Serialize)]
struct ScoreOutput {
    finish_reason: FinishReason,
    validation: ValidationResult,
    rejection: Option<String>,
    metrics: MetricSet,
}

pub fn run(args: ScoreArgs) -> Result<()> {
    let text = match (args.text, args.file.as_deref()) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => bail!("either --text or --file is required"),
    };
    let finish_reason = FinishReason::from(args.finish_reason);

    let validator = ResponseValidator::new()?;
    let scorer = QualityScorer::new()?;
    let output = score_text(&validator, &scorer, &text, finish_reason);

    if let Some(reason) = &output.rejection {
        warn!(reason = %reason, "response would be rejected");
    }
    info!(
        length = output.validation.original_length,
        cleaned_length = output.validation.cleaned_length,
        corruption_score = output.validation.corruption_score,
        "scored text"
    );

    if args.json {
        let mut out = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut out, &output)
            .context("failed to serialize score json output")?;
        writeln!(out)?;
        out.flush()?;
        Ok(())
    } else {
        write_text_score(&output)
    }
}

fn score_text(
    validator: &ResponseValidator,
    scorer: &QualityScorer,
    text: &str,
    finish_reason: FinishReason,
) -> ScoreOutput {
    let validation = validator.validate(text, finish_reason);
    let scored_text = if validation.cleaned_text.is_empty() {
        text
    } else {
        validation.cleaned_text.as_str()
    };
    let metrics = scorer.score_all(scored_text);

    ScoreOutput {
        finish_reason,
        rejection: validator.should_reject(text, finish_reason),
        validation,
        metrics,
    }
}

fn write_text_score(score: &ScoreOutput) -> Result<()> {
    let validation = &score.validation;
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(
        output,
        "Validation: valid={} corrupted={} truncated={} corruption_score={:.3}",
        validation.is_valid,
        validation.is_corrupted,
        validation.is_truncated,
        validation.corruption_score
    )?;
    writeln!(
        output,
        "Length: original={} cleaned={} finish_reason={}",
        validation.original_length,
        validation.cleaned_length,
        score.finish_reason.as_str()
    )?;
    for warning in &validation.warnings {
        writeln!(output, "\twarning: {warning}")?;
    }
    if let Some(reason) = &score.rejection {
        writeln!(output, "Rejected: {reason}")?;
    }

    writeln!(output, "Metrics:")?;
    for (name, metric) in &score.metrics {
        writeln!(output, "\t{:<20} {:.3}", name.as_str(), metric.value)?;
    }

    output.flush()?;
    Ok(())
}
