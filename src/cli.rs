use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "docrun",
    version,
    about = "Run tracking, manifest sealing and QA verification for generated design documents"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Allocate a new run directory and carry forward the previous run.
    Allocate(AllocateArgs),
    /// Hash the run's artifacts and write its manifest.
    Seal(SealArgs),
    /// Evaluate the QA checklist for a sealed run.
    Qa(QaArgs),
    /// Write the change summary and the latest mirror.
    Publish(PublishArgs),
    /// Aggregate runs for a date, a date range or all dates.
    Analyze(AnalyzeArgs),
    /// Aggregate today's runs (UTC).
    AnalyzeToday(AnalyzeTodayArgs),
    /// Show the latest mirror and the most recent run.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// JSON file overriding harness defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub outputs_root: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AllocateArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Short id for the run name; random when omitted.
    #[arg(long)]
    pub run_id_suffix: Option<String>,

    /// Project inputs directory snapshotted into the run.
    #[arg(long)]
    pub inputs_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SealArgs {
    #[arg(long)]
    pub run_dir: PathBuf,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct QaArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long)]
    pub run_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    #[arg(long)]
    pub run_dir: PathBuf,

    #[arg(long, default_value_t = false)]
    pub skip_change_summary: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum AnalysisFormat {
    Json,
    Html,
    Text,
    Csv,
}

#[derive(Args, Debug, Clone)]
pub struct AnalysisOutputArgs {
    #[arg(long, value_enum, default_value_t = AnalysisFormat::Text)]
    pub format: AnalysisFormat,

    #[arg(long)]
    pub write_json: Option<PathBuf>,

    #[arg(long)]
    pub write_html: Option<PathBuf>,

    #[arg(long, default_value_t = false, conflicts_with_all = ["write_json", "write_html"])]
    pub no_write: bool,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub plateau_window: Option<usize>,

    /// Convergence score at or above which a run is labelled converging.
    #[arg(long)]
    pub convergence_threshold: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub output: AnalysisOutputArgs,

    #[arg(long, conflicts_with_all = ["from", "to", "all"])]
    pub date: Option<NaiveDate>,

    #[arg(long, requires = "to", conflicts_with = "all")]
    pub from: Option<NaiveDate>,

    #[arg(long, requires = "from", conflicts_with = "all")]
    pub to: Option<NaiveDate>,

    #[arg(long, default_value_t = false)]
    pub all: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeTodayArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub output: AnalysisOutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}
