use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::load_config;
use crate::layout::{DOCUMENT_FILE, QA_REPORT_FILE, SEAL_FAILURE_FILE};
use crate::manifest::load_manifest;
use crate::model::QaReport;
use crate::run_dir::{RunHandle, find_latest_prior_run, scan_run_dirs};
use crate::util::read_json;

pub fn run(args: StatusArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let outputs_root = &config.outputs_root;
    if !outputs_root.is_dir() {
        bail!("outputs root does not exist: {}", outputs_root.display());
    }

    info!(outputs_root = %outputs_root.display(), "status requested");

    let document_path = outputs_root.join(DOCUMENT_FILE);
    if document_path.is_file() {
        info!(path = %document_path.display(), "latest design document present");
    } else {
        warn!(path = %document_path.display(), "latest design document missing");
    }

    let report_path = outputs_root.join(QA_REPORT_FILE);
    if report_path.is_file() {
        let report: QaReport = read_json(&report_path)
            .with_context(|| format!("failed to parse {}", report_path.display()))?;
        info!(
            run_id = %report.run_id,
            verdict = report.verdict.as_str(),
            failed = report.summary.failed,
            evaluated_at = %report.evaluated_at,
            "latest qa report"
        );
    } else {
        warn!(path = %report_path.display(), "latest qa report missing");
    }

    let run_dirs = scan_run_dirs(outputs_root, |_| true)?;
    let newest = run_dirs
        .iter()
        .filter(|entry| entry.run_id.is_some())
        .max_by(|left, right| left.run_id.cmp(&right.run_id));
    let Some(newest) = newest else {
        warn!("no runs allocated yet");
        return Ok(());
    };
    info!(total_runs = run_dirs.len(), newest = %newest.name, "run directories");

    let handle = RunHandle::open(&newest.path)?;
    let manifest_path = handle.manifest_path();
    if manifest_path.is_file() {
        let manifest = load_manifest(&manifest_path)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;
        info!(
            run_id = %manifest.run_id,
            sealed_at = %manifest.sealed_at,
            model = %manifest.model.model_id,
            outputs = manifest.outputs.len(),
            qa_status = manifest.qa.status.as_str(),
            predecessor = %manifest.predecessor_run_id.unwrap_or_default(),
            "most recent run"
        );
    } else if handle.root().join(SEAL_FAILURE_FILE).is_file() {
        warn!(run_id = %handle.run_id(), "most recent run failed to seal");
    } else {
        warn!(run_id = %handle.run_id(), "most recent run is not sealed yet");
    }

    match find_latest_prior_run(outputs_root, None) {
        Some(sealed) if sealed.path != newest.path => {
            info!(run = %sealed.name, "most recent run with a manifest or qa report");
        }
        _ => {}
    }

    Ok(())
}
