//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;
use vigil_core::{BatchReport, BatchState, ObservationBatch};
use vigil_runtime::{BatchError, BatchRunner, LiteratureSource, RuntimeConfig, SourceRegistry};

use crate::cli::{ScoreArgs, SummarizeArgs, ValidateArgs};

/// Config file (or defaults) with environment overrides applied.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config.apply_env().context("applying environment overrides")?;
    Ok(config)
}

pub async fn execute_validate(args: ValidateArgs, mut config: RuntimeConfig) -> Result<ExitCode> {
    if let Some(source) = args.source {
        config.literature.source = source;
    }
    if let Some(fixture) = args.fixture {
        config.literature.fixture_path = Some(fixture);
    }
    if let Some(checkpoint) = args.checkpoint {
        config.batch.checkpoint_path = Some(checkpoint);
    }
    if let Some(concurrency) = args.concurrency {
        config.batch.concurrency = concurrency;
    }
    config.validate()?;

    let mut batch = ObservationBatch::from_path(&args.input)
        .with_context(|| format!("reading observations from {}", args.input.display()))?;
    let dropped = batch.retain_included(&config.batch.inclusion);
    if !dropped.is_empty() {
        tracing::debug!(?dropped, "Observations below inclusion thresholds");
        tracing::info!(count = dropped.len(), "Dropped observations below inclusion thresholds");
    }

    let source = config
        .create_source(&SourceRegistry::with_defaults())
        .context("creating literature source")?;
    preflight(source.as_ref()).await?;
    let runner = BatchRunner::from_config(&config, source, None)?;

    let cancel = runner.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current item");
            cancel.cancel();
        }
    });

    let report = match runner.run(batch.observations()).await {
        Ok(report) => report,
        Err(BatchError::Checkpoint { source, report }) => {
            write_report(&report, args.output.as_deref())?;
            return Err(source).context("checkpoint write failed; partial report written");
        }
        Err(e) => return Err(e.into()),
    };

    write_report(&report, args.output.as_deref())?;
    eprint!("{}", outcome_message(&report));

    Ok(if report.state == BatchState::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

pub fn execute_score(args: ScoreArgs, config: &RuntimeConfig) -> Result<ExitCode> {
    let scorer = config.scorer()?;
    let score = scorer.score(args.frequency, args.papers)?;
    println!("{}", serde_json::to_string_pretty(&score)?);
    Ok(ExitCode::SUCCESS)
}

pub fn execute_summarize(args: SummarizeArgs) -> Result<ExitCode> {
    let mut report = BatchReport::from_json_file(&args.report)
        .with_context(|| format!("reading report {}", args.report.display()))?;
    check_report(&report)?;
    report.resummarize();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.summary)?);
    } else {
        print!("{}", format_summary(&report, args.top));
    }
    Ok(ExitCode::SUCCESS)
}

/// Refuse to start a batch against a source that cannot answer.
pub async fn preflight(source: &dyn LiteratureSource) -> Result<()> {
    if !source.health_check().await {
        bail!("literature source '{}' is not available", source.name());
    }
    Ok(())
}

fn write_report(report: &BatchReport, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => report
            .write_json_file(path)
            .with_context(|| format!("writing report {}", path.display())),
        None => {
            println!("{}", serde_json::to_string_pretty(report)?);
            Ok(())
        }
    }
}

/// Human-readable result line plus the symptoms that need a re-run.
pub fn outcome_message(report: &BatchReport) -> String {
    let mut out = format!(
        "{}: {} validated, {} failed",
        report.state,
        report.validated.len(),
        report.errors.len()
    );
    if report.resumed > 0 {
        let _ = write!(out, " ({} from checkpoint)", report.resumed);
    }
    out.push('\n');

    for error in &report.errors {
        let _ = writeln!(out, "  failed: {} ({})", error.symptom, error.error_kind);
    }
    if let Some(reason) = &report.aborted {
        let _ = writeln!(out, "  aborted: {}", reason);
    }
    let rerun = report.rerun_symptoms();
    if !rerun.is_empty() {
        let _ = writeln!(out, "  re-run: {}", rerun.join(", "));
    }
    out
}

/// Counts, top-ranked records and hidden gems.
pub fn format_summary(report: &BatchReport, top: usize) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} validated, {} failed, {} high surprise",
        summary.total_validated, summary.total_failed, summary.high_surprise_count
    );
    for (tier, count) in &summary.by_tier {
        let _ = writeln!(out, "  tier {}: {}", tier, count);
    }

    let _ = writeln!(out, "\nTop {} by surprise:", top);
    for (rank, record) in report.ranked().into_iter().take(top).enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {:<30} {:.4} {:<8} tier {} ({} papers)",
            rank + 1,
            record.symptom,
            record.surprise_score,
            record.surprise_label,
            record.evidence_tier.value(),
            record.pubmed_data.paper_count
        );
    }

    if !summary.hidden_gems.is_empty() {
        let _ = writeln!(out, "\nHidden gems: {}", summary.hidden_gems.join(", "));
    }
    out
}

/// Reject a report that cannot be summarized.
pub fn check_report(report: &BatchReport) -> Result<()> {
    if !report.state.is_terminal() {
        bail!("report is from an unfinished batch (state {})", report.state);
    }
    Ok(())
}
