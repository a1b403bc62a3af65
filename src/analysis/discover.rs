use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use tracing::warn;

use super::metrics::{document_completion, section_artifact_completion};
use super::{ConvergenceLabel, MalformedRun, RunSummary, RunVerdict};
use crate::config::QaConfig;
use crate::layout::{
    DOCUMENT_FILE, QA_REPORT_FILE, RUN_MANIFEST_FILE, SEAL_FAILURE_FILE, date_dir_name,
};
use crate::model::{QaReport, RunManifest, SealFailure, Verdict};
use crate::run_dir::RunDirEntry;
use crate::util::{display_relative, read_json};

pub(crate) enum LoadedRun {
    Run(Box<RunSummary>),
    Malformed(MalformedRun),
}

/// Loads every run on a bounded pool. Order of the result is unspecified;
/// callers sort before aggregating.
pub(crate) fn load_runs(
    outputs_root: &Path,
    entries: &[RunDirEntry],
    workers: usize,
    qa: &QaConfig,
) -> Vec<LoadedRun> {
    if entries.is_empty() {
        return Vec::new();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            entries
                .par_iter()
                .map(|entry| load_run(outputs_root, entry, qa))
                .collect()
        }),
        Err(err) => {
            warn!(error = %err, "analysis pool unavailable, loading runs sequentially");
            entries
                .iter()
                .map(|entry| load_run(outputs_root, entry, qa))
                .collect()
        }
    }
}

fn load_run(outputs_root: &Path, entry: &RunDirEntry, qa: &QaConfig) -> LoadedRun {
    let relative = display_relative(&entry.path, outputs_root);
    let malformed = |reason: String| {
        warn!(run = %entry.name, path = %entry.path.display(), reason = %reason, "malformed run");
        LoadedRun::Malformed(MalformedRun {
            name: entry.name.clone(),
            date: date_dir_name(entry.date),
            path: relative.clone(),
            reason,
        })
    };

    let Some(id) = entry.run_id.clone() else {
        return malformed("run directory name does not parse".to_string());
    };

    let manifest_path = entry.path.join(RUN_MANIFEST_FILE);
    if !manifest_path.is_file() {
        let failure_path = entry.path.join(SEAL_FAILURE_FILE);
        if failure_path.is_file() {
            return match read_json::<SealFailure>(&failure_path) {
                Ok(failure) => malformed(format!("sealing failed: {}", failure.reason)),
                Err(err) => malformed(format!("sealing failed, failure record unreadable: {err}")),
            };
        }
        return malformed("run manifest missing".to_string());
    }
    let manifest = match read_json::<RunManifest>(&manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => return malformed(format!("run manifest unreadable: {err}")),
    };

    let document = fs::read_to_string(entry.path.join(DOCUMENT_FILE)).ok();
    let mut summary = RunSummary {
        run_id: id.to_string(),
        date: date_dir_name(entry.date),
        timestamp: id
            .timestamp()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        path: relative.clone(),
        verdict: RunVerdict::Unknown,
        model_id: manifest.model.model_id.clone(),
        findings_total: None,
        findings_failed: None,
        findings_skipped: None,
        failed_checks: Vec::new(),
        predecessor_run_id: manifest.predecessor_run_id.clone(),
        parent_run_id: None,
        sequence_id: None,
        sequence_index: None,
        required_sections_completion_pct: document_completion(
            document.as_deref(),
            &qa.document_headings,
        ),
        section_artifacts_completion_pct: section_artifact_completion(&entry.path, qa),
        vs_parent: None,
        convergence_label: ConvergenceLabel::Baseline,
        note: None,
        id,
        document,
    };

    let report_path = entry.path.join(QA_REPORT_FILE);
    if !report_path.is_file() {
        summary.note = Some("qa report missing".to_string());
        return LoadedRun::Run(Box::new(summary));
    }
    match read_json::<QaReport>(&report_path) {
        Ok(report) => apply_report(&mut summary, &report),
        Err(err) => {
            warn!(run = %entry.name, error = %err, "qa report unreadable");
            summary.note = Some(format!("qa report unreadable: {err}"));
        }
    }
    LoadedRun::Run(Box::new(summary))
}

fn apply_report(summary: &mut RunSummary, report: &QaReport) {
    summary.verdict = match report.verdict {
        Verdict::Pass => RunVerdict::Pass,
        Verdict::Fail => RunVerdict::Fail,
    };
    summary.findings_total = Some(report.summary.total);
    summary.findings_failed = Some(report.summary.failed);
    summary.findings_skipped = Some(report.summary.skipped);
    summary.failed_checks = report
        .failed_findings()
        .map(|finding| finding.key())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
}
