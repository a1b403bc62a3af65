//! Cross-run analysis: scan run directories for a date filter, classify each
//! run from its manifest and QA report, compare it with its lineage parent,
//! and aggregate pass/fail statistics and sequence convergence.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::{AnalysisConfig, QaConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::layout::{RunId, date_dir_name};
use crate::run_dir::{RunDirEntry, scan_date_dir, scan_run_dirs};
use crate::util::now_utc_string;

mod discover;
mod lineage;
mod metrics;
pub mod render;
#[cfg(test)]
mod tests;

use self::discover::{LoadedRun, load_runs};
use self::lineage::{build_sequences, link_parents};
use self::metrics::compare_with_parents;
pub use self::metrics::{ConvergenceLabel, ParentComparison};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateFilter {
    Day { date: NaiveDate },
    Range { from: NaiveDate, to: NaiveDate },
    All,
}

impl DateFilter {
    pub fn includes(&self, date: NaiveDate) -> bool {
        match *self {
            Self::Day { date: day } => date == day,
            Self::Range { from, to } => from <= date && date <= to,
            Self::All => true,
        }
    }

    /// Folder name under `analysis/` for this filter's reports.
    pub fn label(&self) -> String {
        match *self {
            Self::Day { date } => date_dir_name(date),
            Self::Range { from, to } => format!("{}_to_{}", date_dir_name(from), date_dir_name(to)),
            Self::All => "all".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    Pass,
    Fail,
    /// Manifest present, QA report missing or unreadable.
    Unknown,
}

impl RunVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub date: String,
    pub timestamp: String,
    /// Relative to the outputs root.
    pub path: String,
    pub verdict: RunVerdict,
    pub model_id: String,
    pub findings_total: Option<usize>,
    pub findings_failed: Option<usize>,
    pub findings_skipped: Option<usize>,
    /// Keys of failing findings (`QA-001:security`), sorted.
    pub failed_checks: Vec<String>,
    pub predecessor_run_id: Option<String>,
    /// Predecessor, when it is part of this scan and strictly older.
    pub parent_run_id: Option<String>,
    pub sequence_id: Option<String>,
    pub sequence_index: Option<usize>,
    /// Required document headings present in `design_doc.md`.
    pub required_sections_completion_pct: f64,
    /// Required section files present with all their headings.
    pub section_artifacts_completion_pct: f64,
    pub vs_parent: Option<ParentComparison>,
    pub convergence_label: ConvergenceLabel,
    pub note: Option<String>,
    #[serde(skip)]
    pub(crate) id: RunId,
    #[serde(skip)]
    pub(crate) document: Option<String>,
}

impl RunSummary {
    pub fn failed_check_set(&self) -> BTreeSet<&str> {
        self.failed_checks.iter().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRun {
    pub name: String,
    pub date: String,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceSummary {
    pub sequence_id: String,
    pub run_ids: Vec<String>,
    pub length: usize,
    pub first_timestamp: String,
    pub last_timestamp: String,
    pub final_verdict: RunVerdict,
    pub best_failed: Option<usize>,
    pub final_failed: Option<usize>,
    pub best_completion_pct: f64,
    pub final_completion_pct: f64,
    pub oscillating: bool,
    pub converged: bool,
    pub convergence_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub generated_at: String,
    pub outputs_root: String,
    pub filter: DateFilter,
    pub label: String,
    /// Run directories discovered, malformed ones included.
    pub total_runs: usize,
    pub pass_count: usize,
    pub fail_count: usize,
    pub unknown_count: usize,
    pub malformed_runs: usize,
    /// `pass / (pass + fail)`; `None` when neither occurs.
    pub pass_rate: Option<f64>,
    /// Number of runs failing each check id.
    pub runs_failing_check: BTreeMap<String, usize>,
    pub runs: Vec<RunSummary>,
    pub malformed: Vec<MalformedRun>,
    pub sequences: Vec<SequenceSummary>,
}

impl AnalysisSummary {
    pub fn pass_rate_display(&self) -> String {
        match self.pass_rate {
            Some(rate) => format!("{:.1}%", rate * 100.0),
            None => "undefined".to_string(),
        }
    }
}

pub fn analyze(
    outputs_root: &Path,
    filter: &DateFilter,
    config: &AnalysisConfig,
    qa: &QaConfig,
) -> HarnessResult<AnalysisSummary> {
    if !outputs_root.is_dir() {
        return Err(HarnessError::setup(
            "outputs root does not exist",
            outputs_root,
        ));
    }

    let entries: Vec<RunDirEntry> = match *filter {
        DateFilter::Day { date } => {
            let date_dir = outputs_root.join(date_dir_name(date));
            if !date_dir.is_dir() {
                return Err(HarnessError::setup(
                    format!("no run directory for {}", date_dir_name(date)),
                    date_dir,
                ));
            }
            scan_date_dir(&date_dir, date)?
        }
        DateFilter::Range { from, to } if from > to => {
            return Err(HarnessError::setup(
                format!(
                    "date range starts after it ends ({} > {})",
                    date_dir_name(from),
                    date_dir_name(to)
                ),
                outputs_root,
            ));
        }
        _ => scan_run_dirs(outputs_root, |date| filter.includes(date))?,
    };

    info!(
        outputs_root = %outputs_root.display(),
        filter = %filter.label(),
        run_dirs = entries.len(),
        workers = config.workers,
        "analyzing runs"
    );

    let total_runs = entries.len();
    let mut runs = Vec::new();
    let mut malformed = Vec::new();
    for loaded in load_runs(outputs_root, &entries, config.workers, qa) {
        match loaded {
            LoadedRun::Run(run) => runs.push(*run),
            LoadedRun::Malformed(run) => malformed.push(run),
        }
    }
    runs.sort_by(|left, right| left.id.cmp(&right.id));
    malformed.sort_by(|left, right| (&left.date, &left.name).cmp(&(&right.date, &right.name)));

    link_parents(&mut runs);
    compare_with_parents(&mut runs, config.convergence_threshold);
    let sequences = build_sequences(&mut runs, config.plateau_window);

    let count = |verdict: RunVerdict| runs.iter().filter(|run| run.verdict == verdict).count();
    let pass_count = count(RunVerdict::Pass);
    let fail_count = count(RunVerdict::Fail);
    let unknown_count = count(RunVerdict::Unknown);
    let pass_rate = match pass_count + fail_count {
        0 => None,
        decided => Some(pass_count as f64 / decided as f64),
    };

    let mut runs_failing_check = BTreeMap::new();
    for run in &runs {
        let check_ids = run
            .failed_checks
            .iter()
            .map(|key| key.split(':').next().unwrap_or(key))
            .collect::<BTreeSet<_>>();
        for check_id in check_ids {
            *runs_failing_check.entry(check_id.to_string()).or_insert(0) += 1;
        }
    }

    let summary = AnalysisSummary {
        generated_at: now_utc_string(),
        outputs_root: outputs_root.display().to_string(),
        filter: *filter,
        label: filter.label(),
        total_runs,
        pass_count,
        fail_count,
        unknown_count,
        malformed_runs: malformed.len(),
        pass_rate,
        runs_failing_check,
        runs,
        malformed,
        sequences,
    };

    info!(
        total = summary.total_runs,
        pass = summary.pass_count,
        fail = summary.fail_count,
        unknown = summary.unknown_count,
        malformed = summary.malformed_runs,
        pass_rate = %summary.pass_rate_display(),
        "analysis completed"
    );
    Ok(summary)
}
