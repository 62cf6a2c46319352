//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vigil - validate patient-reported symptoms against the literature.
#[derive(Debug, Parser)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Runtime configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a batch of observations and write a report
    Validate(ValidateArgs),

    /// Score a single (frequency, paper count) pair
    Score(ScoreArgs),

    /// Summarize and rank an existing report
    Summarize(SummarizeArgs),
}

/// Arguments for the validate command.
#[derive(Debug, Parser)]
pub struct ValidateArgs {
    /// Observation file (.json, .yaml or .yml)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Report path; the report goes to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Checkpoint file for resuming an interrupted batch
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Literature source type (pubmed or fixture)
    #[arg(long)]
    pub source: Option<String>,

    /// Results file for the fixture source
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Items validated at once
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Arguments for the score command.
#[derive(Debug, Parser)]
pub struct ScoreArgs {
    /// Fraction of posts mentioning the symptom (0.0-1.0)
    #[arg(short, long)]
    pub frequency: f64,

    /// Number of papers found
    #[arg(short, long)]
    pub papers: u64,
}

/// Arguments for the summarize command.
#[derive(Debug, Parser)]
pub struct SummarizeArgs {
    /// Report written by `vigil validate`
    #[arg(short, long)]
    pub report: PathBuf,

    /// Number of ranked records to show
    #[arg(short, long, default_value = "10")]
    pub top: usize,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}
