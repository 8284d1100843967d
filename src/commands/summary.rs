use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::aggregate::aggregate;
use crate::cli::SummaryArgs;
use crate::commands::resolve_db_path;
use crate::model::{MetricName, MetricSummary};
use crate::store::{self, ExperimentRow};

#[derive(Debug, Serialize)]
struct SummaryOutput {
    experiment: ExperimentRow,
    metrics: BTreeMap<MetricName, MetricSummary>,
}

pub fn run(args: SummaryArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());
    if !db_path.exists() {
        bail!("database file missing: {}", db_path.display());
    }

    let pool = store::open_pool(&db_path)
        .with_context(|| format!("failed to open store {}", db_path.display()))?;
    let conn = pool.get().context("failed to acquire store connection")?;

    let Some(experiment) = store::load_experiment(&conn, args.experiment_id)
        .context("failed to load experiment")?
    else {
        bail!("experiment {} not found", args.experiment_id);
    };

    let records = store::load_scored_records(&conn, args.experiment_id).with_context(|| {
        format!("failed to load responses for experiment {}", args.experiment_id)
    })?;
    if records.is_empty() {
        bail!("no responses found for experiment {}", args.experiment_id);
    }

    let mut metrics = aggregate(&records);
    if !args.with_samples {
        for summary in metrics.values_mut() {
            summary.samples.clear();
        }
    }
    info!(
        experiment_id = experiment.experiment_id,
        responses = records.len(),
        metrics = metrics.len(),
        "aggregated experiment metrics"
    );

    let output = SummaryOutput {
        experiment,
        metrics,
    };
    if args.json {
        write_json_summary(&output)
    } else {
        write_text_summary(&output)
    }
}

fn write_json_summary(summary: &SummaryOutput) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, summary)
        .context("failed to serialize summary json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_summary(summary: &SummaryOutput) -> Result<()> {
    let experiment = &summary.experiment;
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(
        output,
        "Experiment: {} ({}) responses={} created_at={}",
        experiment.experiment_id,
        experiment.name,
        experiment.response_count,
        experiment.created_at
    )?;
    writeln!(
        output,
        "{:<20} {:>8} {:>8} {:>8} {:>8} {:>8} {:>6}",
        "metric", "mean", "median", "std_dev", "min", "max", "count"
    )?;

    for (name, metric) in &summary.metrics {
        writeln!(
            output,
            "{:<20} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>6}",
            name.as_str(),
            metric.mean,
            metric.median,
            metric.std_dev,
            metric.min,
            metric.max,
            metric.count
        )?;
        for sample in &metric.samples {
            writeln!(
                output,
                "\ttemperature={} top_p={} value={:.3}",
                sample.temperature, sample.top_p, sample.value
            )?;
        }
    }

    output.flush()?;
    Ok(())
}
