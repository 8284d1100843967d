use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::{default_manifest_path, resolve_db_path};
use crate::store::{self, ExperimentRow, RowCounts};

#[derive(Debug, Deserialize, Serialize)]
struct ManifestReportHead {
    total_points: usize,
    succeeded: usize,
    failed: usize,
}

/// The part of a sweep run manifest that status reports on.
#[derive(Debug, Deserialize, Serialize)]
struct SweepManifestHead {
    run_id: String,
    experiment_id: i64,
    experiment_name: String,
    model: String,
    status: String,
    updated_at: String,
    report: ManifestReportHead,
}

#[derive(Debug, Default, Serialize)]
struct StatusOutput {
    db_path: String,
    counts: Option<RowCounts>,
    experiments: Vec<ExperimentRow>,
    latest_sweep: Option<SweepManifestHead>,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let manifest_path = default_manifest_path(&args.cache_root);
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());

    info!(cache_root = %args.cache_root.display(), "status requested");

    let mut status = StatusOutput {
        db_path: db_path.display().to_string(),
        ..StatusOutput::default()
    };

    if manifest_path.exists() {
        let raw = fs::read(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest: SweepManifestHead = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

        info!(
            run_id = %manifest.run_id,
            experiment_id = manifest.experiment_id,
            status = %manifest.status,
            succeeded = manifest.report.succeeded,
            total = manifest.report.total_points,
            updated_at = %manifest.updated_at,
            "loaded sweep manifest"
        );
        status.latest_sweep = Some(manifest);
    } else {
        warn!(path = %manifest_path.display(), "sweep manifest missing");
    }

    if db_path.exists() {
        let pool = store::open_pool(&db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        let conn = pool.get().context("failed to acquire store connection")?;
        let counts = store::count_rows(&conn).context("failed to count store rows")?;
        status.experiments = store::list_experiments(&conn).context("failed to list experiments")?;

        info!(
            path = %db_path.display(),
            experiments = counts.experiments,
            responses = counts.responses,
            metrics = counts.metrics,
            "database status"
        );
        status.counts = Some(counts);
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &status)
            .context("failed to serialize status json output")?;
        writeln!(output)?;
        output.flush()?;
        Ok(())
    } else {
        write_text_status(&status)
    }
}

fn write_text_status(status: &StatusOutput) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Database: {}", status.db_path)?;
    if let Some(counts) = status.counts {
        writeln!(
            output,
            "Rows: experiments={} responses={} metrics={}",
            counts.experiments, counts.responses, counts.metrics
        )?;
    }
    for experiment in &status.experiments {
        writeln!(
            output,
            "\t{}\t{}\tresponses={}\tcreated_at={}",
            experiment.experiment_id,
            experiment.name,
            experiment.response_count,
            experiment.created_at
        )?;
    }

    if let Some(sweep) = &status.latest_sweep {
        writeln!(
            output,
            "Latest sweep: {} experiment={} ({}) model={} status={} succeeded={}/{} failed={}",
            sweep.run_id,
            sweep.experiment_id,
            sweep.experiment_name,
            sweep.model,
            sweep.status,
            sweep.report.succeeded,
            sweep.report.total_points,
            sweep.report.failed
        )?;
    }

    output.flush()?;
    Ok(())
}
