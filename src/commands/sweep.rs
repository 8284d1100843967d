use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::SweepArgs;
use crate::commands::{default_manifest_path, resolve_db_path};
use crate::config::{GenerationSettings, SweepConfig};
use crate::dispatch::{Dispatcher, SweepReport};
use crate::generation::OpenAiChatService;
use crate::model::{SweepPaths, SweepRunManifest};
use crate::scorer::QualityScorer;
use crate::store::{self, SqliteSink};
use crate::sweep::build_sweep;
use crate::util::{
    ensure_directory, now_utc_string, sha256_text, utc_compact_string, write_json_pretty,
};
use crate::validator::ResponseValidator;

const MANIFEST_VERSION: u32 = 1;
const MAX_NAME_CHARS: usize = 255;

pub fn run(args: SweepArgs) -> Result<()> {
    let name = args.name.trim().to_string();
    if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
        bail!("experiment name must be 1..={MAX_NAME_CHARS} characters");
    }
    let prompt = load_prompt(args.prompt.as_deref(), args.prompt_file.as_deref())?;

    let config = SweepConfig {
        temperature_range: args.temperatures.clone(),
        top_p_range: args.top_ps.clone(),
        max_tokens: args.max_tokens,
        batch_size: args.batch_size,
    };
    config.validate().context("invalid sweep configuration")?;
    let points = build_sweep(&config.temperature_range, &config.top_p_range)
        .context("failed to build parameter sweep")?;

    let settings = GenerationSettings::from_env()
        .context("generation backend is not configured")?
        .with_model(args.model.as_deref());
    let service =
        OpenAiChatService::new(&settings).context("failed to build generation client")?;
    let validator = ResponseValidator::new()?;
    let scorer = QualityScorer::new()?;

    ensure_directory(&args.cache_root)?;
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }
    let pool = store::open_pool(&db_path)
        .with_context(|| format!("failed to open store {}", db_path.display()))?;
    let experiment_id = {
        let conn = pool.get().context("failed to acquire store connection")?;
        store::create_experiment(&conn, &name, &prompt).context("failed to create experiment")?
    };

    let started_ts = Utc::now();
    let run_id = format!("sweep-{}", utc_compact_string(started_ts));
    let manifest_path = args
        .manifest_path
        .clone()
        .unwrap_or_else(|| default_manifest_path(&args.cache_root));

    let mut manifest = SweepRunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: run_id.clone(),
        experiment_id,
        experiment_name: name.clone(),
        prompt_sha256: sha256_text(&prompt),
        model: service.model().to_string(),
        status: "running".to_string(),
        started_at: now_utc_string(),
        updated_at: now_utc_string(),
        temperature_range: config.temperature_range.clone(),
        top_p_range: config.top_p_range.clone(),
        max_tokens: config.max_tokens,
        batch_size: config.batch_size,
        paths: SweepPaths {
            cache_root: args.cache_root.display().to_string(),
            manifest_dir: manifest_path
                .parent()
                .map(|parent| parent.display().to_string())
                .unwrap_or_default(),
            db_path: db_path.display().to_string(),
        },
        report: SweepReport {
            total_points: points.len(),
            ..SweepReport::default()
        },
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %run_id,
        experiment_id,
        points = points.len(),
        batch_size = config.batch_size,
        model = %manifest.model,
        "starting sweep"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let sink = SqliteSink::new(pool.clone(), experiment_id);
    let dispatcher = Dispatcher::new(
        &service,
        &sink,
        &validator,
        &scorer,
        config.batch_size,
        config.max_tokens,
    );
    let report = runtime.block_on(dispatcher.run(&prompt, &points));

    if report.succeeded == 0 && report.total_points > 0 {
        warn!(experiment_id, failed = report.failed, "no sweep point succeeded");
    }
    info!(
        experiment_id,
        succeeded = report.succeeded,
        total = report.total_points,
        failed = report.failed,
        elapsed_ms = report.elapsed_ms as u64,
        "sweep completed"
    );

    manifest.status = "completed".to_string();
    manifest.updated_at = now_utc_string();
    manifest.report = report;
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote sweep manifest");

    if args.json {
        write_json_report(&manifest)
    } else {
        write_text_report(&manifest, &manifest_path)
    }
}

fn load_prompt(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    let prompt = match (inline, file) {
        (Some(prompt), _) => prompt.to_string(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt file {}", path.display()))?,
        (None, None) => bail!("either --prompt or --prompt-file is required"),
    };

    if prompt.trim().is_empty() {
        bail!("prompt must not be empty");
    }
    Ok(prompt)
}

fn write_json_report(manifest: &SweepRunManifest) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, manifest)
        .context("failed to serialize sweep json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_report(manifest: &SweepRunManifest, manifest_path: &Path) -> Result<()> {
    let report = &manifest.report;
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(
        output,
        "Experiment: {} ({})",
        manifest.experiment_id, manifest.experiment_name
    )?;
    writeln!(output, "Run: {} model={}", manifest.run_id, manifest.model)?;
    writeln!(
        output,
        "Points: succeeded={}/{} failed={} chunks={} elapsed_ms={}",
        report.succeeded, report.total_points, report.failed, report.chunks, report.elapsed_ms
    )?;
    if !report.failures.is_empty() {
        writeln!(output, "Failures:")?;
        for failure in &report.failures {
            writeln!(
                output,
                "\t#{} temperature={} top_p={} kind={}: {}",
                failure.sequence, failure.temperature, failure.top_p, failure.kind, failure.message
            )?;
        }
    }
    writeln!(output, "Manifest: {}", manifest_path.display())?;
    output.flush()?;
    Ok(())
}
