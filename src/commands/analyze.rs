use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;

use crate::analysis::render::{AnalysisTargets, ReportFormat, render, write_analysis};
use crate::analysis::{AnalysisSummary, DateFilter, analyze};
use crate::cli::{AnalysisFormat, AnalysisOutputArgs, AnalyzeArgs, AnalyzeTodayArgs, CommonArgs};
use crate::commands::load_config;
use crate::config::HarnessConfig;

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let filter = match (args.date, args.from, args.to) {
        (Some(date), _, _) => DateFilter::Day { date },
        (None, Some(from), Some(to)) => DateFilter::Range { from, to },
        _ => DateFilter::All,
    };
    run_analysis(&args.common, &args.output, filter, false)
}

pub fn run_today(args: AnalyzeTodayArgs) -> Result<()> {
    let today = Utc::now().date_naive();
    run_analysis(&args.common, &args.output, DateFilter::Day { date: today }, true)
}

fn run_analysis(
    common: &CommonArgs,
    output: &AnalysisOutputArgs,
    filter: DateFilter,
    require_runs: bool,
) -> Result<()> {
    let mut config = load_config(common)?;
    if let Some(workers) = output.workers {
        config.analysis.workers = workers;
    }
    if let Some(window) = output.plateau_window {
        config.analysis.plateau_window = window;
    }
    if let Some(threshold) = output.convergence_threshold {
        config.analysis.convergence_threshold = threshold;
    }

    let summary = analyze_filter(&config, filter, require_runs)?;

    let targets = if output.no_write {
        AnalysisTargets::none()
    } else {
        let defaults = AnalysisTargets::defaults(&config.outputs_root, &summary.label, Utc::now());
        AnalysisTargets {
            json: output.write_json.clone().or(defaults.json),
            html: output.write_html.clone().or(defaults.html),
        }
    };
    let written = write_analysis(&summary, &targets)?;
    info!(files = written.len(), label = %summary.label, "analysis reports written");

    let rendered = render(&summary, report_format(output.format))?;
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(rendered.as_bytes())
        .context("failed to write analysis to stdout")?;

    Ok(())
}

/// Runs the analysis; with `require_runs`, a filter matching no run
/// directories is an error and nothing is written.
fn analyze_filter(
    config: &HarnessConfig,
    filter: DateFilter,
    require_runs: bool,
) -> Result<AnalysisSummary> {
    let summary = analyze(&config.outputs_root, &filter, &config.analysis, &config.qa)
        .with_context(|| format!("analysis of {} failed", filter.label()))?;
    if require_runs && summary.total_runs == 0 {
        bail!(
            "no runs found for {} under {}",
            summary.label,
            config.outputs_root.display()
        );
    }
    Ok(summary)
}

fn report_format(format: AnalysisFormat) -> ReportFormat {
    match format {
        AnalysisFormat::Json => ReportFormat::Json,
        AnalysisFormat::Html => ReportFormat::Html,
        AnalysisFormat::Text => ReportFormat::Text,
        AnalysisFormat::Csv => ReportFormat::Csv,
    }
}
