//! Publication of a finished run: the change summary against its
//! predecessor and the "latest" mirror at the outputs root.

use std::path::PathBuf;

use tracing::info;

use crate::changes::{ChangeSummary, summarize_changes};
use crate::error::HarnessResult;
use crate::layout::{CHANGE_SUMMARY_FILE, DOCUMENT_FILE, QA_REPORT_FILE};
use crate::run_dir::RunHandle;
use crate::util::{copy_file, read_text_lossy, write_text};

/// Compares the run's document with the carried-forward previous one and
/// writes `change_summary.md` into the run and a timestamped copy at the
/// outputs root. Returns `None` when the run has no document.
pub fn write_change_summary(handle: &RunHandle) -> HarnessResult<Option<(ChangeSummary, Vec<PathBuf>)>> {
    let document_path = handle.document_path();
    if !document_path.is_file() {
        info!(run_id = %handle.run_id(), "no design document, skipping change summary");
        return Ok(None);
    }
    let current = read_text_lossy(&document_path)?;
    let prior_path = handle.prior_document_path();
    let previous = if prior_path.is_file() {
        Some(read_text_lossy(&prior_path)?)
    } else {
        None
    };

    let summary = summarize_changes(previous.as_deref(), &current);
    let rendered = summary.render_markdown();

    let run_copy = handle.root().join(CHANGE_SUMMARY_FILE);
    let root_copy = handle.outputs_root().join(format!(
        "change_summary_{}.md",
        handle.run_id().compact_timestamp()
    ));
    write_text(&run_copy, &rendered)?;
    write_text(&root_copy, &rendered)?;

    info!(
        run_id = %handle.run_id(),
        first_run = summary.first_run,
        modified = summary.modified.len(),
        path = %run_copy.display(),
        "wrote change summary"
    );
    Ok(Some((summary, vec![run_copy, root_copy])))
}

/// Copies the run's document and QA report to fixed paths at the outputs
/// root so consumers can read the current version without a run id.
pub fn publish_latest(handle: &RunHandle) -> HarnessResult<Vec<PathBuf>> {
    let outputs_root = handle.outputs_root();
    let mut written = Vec::new();

    let document = handle.document_path();
    if document.is_file() {
        let target = outputs_root.join(DOCUMENT_FILE);
        copy_file(&document, &target)?;
        written.push(target);
    }

    let report = handle.qa_report_path();
    if report.is_file() {
        let latest = outputs_root.join(QA_REPORT_FILE);
        let stamped = outputs_root.join(format!(
            "qa_report_{}.json",
            handle.run_id().compact_timestamp()
        ));
        copy_file(&report, &latest)?;
        copy_file(&report, &stamped)?;
        written.push(latest);
        written.push(stamped);
    }

    for path in &written {
        info!(run_id = %handle.run_id(), path = %path.display(), "published latest mirror file");
    }
    Ok(written)
}
