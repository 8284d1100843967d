use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use crate::cli::ResponsesArgs;
use crate::commands::resolve_db_path;
use crate::store::{self, ExperimentRow, StoredResponse};

#[derive(Debug, Serialize)]
struct ResponsesOutput {
    experiment: ExperimentRow,
    responses: Vec<StoredResponse>,
}

pub fn run(args: ResponsesArgs) -> Result<()> {
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

    let responses = store::load_responses(&conn, args.experiment_id).with_context(|| {
        format!("failed to load responses for experiment {}", args.experiment_id)
    })?;
    info!(
        experiment_id = experiment.experiment_id,
        responses = responses.len(),
        "loaded stored responses"
    );

    let output = ResponsesOutput {
        experiment,
        responses,
    };
    let mut stdout = io::BufWriter::new(io::stdout().lock());
    if args.json {
        serde_json::to_writer_pretty(&mut stdout, &output)
            .context("failed to serialize responses json output")?;
        writeln!(stdout)?;
    } else {
        write_text_responses(&mut stdout, &output)?;
    }
    stdout.flush()?;
    Ok(())
}

fn write_text_responses(output: &mut impl Write, listing: &ResponsesOutput) -> Result<()> {
    let experiment = &listing.experiment;
    writeln!(
        output,
        "Experiment: {} ({}) responses={}",
        experiment.experiment_id, experiment.name, experiment.response_count
    )?;

    for response in &listing.responses {
        let validation = &response.validation;
        writeln!(output)?;
        writeln!(
            output,
            "#{} temperature={} top_p={} max_tokens={} finish_reason={}",
            response.sequence,
            response.point.temperature,
            response.point.top_p,
            response.max_tokens,
            response.finish_reason.as_str()
        )?;
        writeln!(
            output,
            "\tvalid={} corrupted={} truncated={} corruption_score={:.3}",
            validation.is_valid,
            validation.is_corrupted,
            validation.is_truncated,
            validation.corruption_score
        )?;
        for warning in &validation.warnings {
            writeln!(output, "\twarning: {warning}")?;
        }
        for (name, metric) in &response.metrics {
            writeln!(output, "\t{:<20} {:.3}", name.as_str(), metric.value)?;
        }
        writeln!(output, "\ttext: {}", response.text.replace('\n', "\n\t      "))?;
    }

    Ok(())
}
