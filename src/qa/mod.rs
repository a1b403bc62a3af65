//! Deterministic QA checklist over a sealed run.
//!
//! Every check always runs; a failing check never hides the others.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::QaConfig;
use crate::error::HarnessResult;
use crate::model::{
    ArtifactKind, ArtifactReference, FindingStatus, QA_REPORT_VERSION, QaFinding, QaReport,
    QaSummary, RunManifest, Verdict,
};
use crate::run_dir::RunHandle;
use crate::util::{now_utc_string, read_json, write_json_pretty};

mod checks;
mod critique;

use self::checks::*;
pub(crate) use self::checks::missing_headings;
use self::critique::critique_gate;

/// Artifacts carried forward from the previous run. A run is a rerun as
/// soon as either file was carried forward, whether or not it parses.
#[derive(Debug, Clone, Default)]
pub struct PriorArtifacts {
    pub manifest: Option<RunManifest>,
    /// Set when a prior manifest was carried forward but cannot be read.
    pub manifest_error: Option<String>,
    pub qa_report: Option<Vec<u8>>,
}

impl PriorArtifacts {
    pub fn load(handle: &RunHandle) -> Self {
        let manifest_path = handle.prior_manifest_path();
        let (manifest, manifest_error) = if manifest_path.is_file() {
            match read_json::<RunManifest>(&manifest_path) {
                Ok(manifest) => (Some(manifest), None),
                Err(err) => {
                    warn!(path = %manifest_path.display(), error = %err, "prior manifest unreadable");
                    (None, Some(err.to_string()))
                }
            }
        } else {
            (None, None)
        };

        let report_path = handle.prior_qa_report_path();
        let qa_report = if report_path.is_file() {
            match fs::read(&report_path) {
                Ok(raw) => Some(raw),
                Err(err) => {
                    warn!(path = %report_path.display(), error = %err, "prior qa report unreadable");
                    Some(Vec::new())
                }
            }
        } else {
            None
        };

        Self {
            manifest,
            manifest_error,
            qa_report,
        }
    }

    pub fn is_first_run(&self) -> bool {
        self.manifest.is_none() && self.manifest_error.is_none() && self.qa_report.is_none()
    }
}

/// Content of one scanned artifact as read during this evaluation.
pub(crate) struct ScannedArtifact<'a> {
    pub artifact: &'a ArtifactReference,
    pub content: Result<Vec<u8>, String>,
}

impl ScannedArtifact<'_> {
    pub fn text(&self) -> Option<String> {
        self.content
            .as_ref()
            .ok()
            .map(|raw| String::from_utf8_lossy(raw).into_owned())
    }
}

pub fn evaluate(
    handle: &RunHandle,
    manifest: &RunManifest,
    config: &QaConfig,
    prior: &PriorArtifacts,
) -> QaReport {
    let sections = scan(handle, manifest.outputs_of_kind(ArtifactKind::Section));
    let documents = scan(handle, manifest.outputs_of_kind(ArtifactKind::Document));
    let document_text = document_text(&documents, &sections);

    let mut findings = Vec::new();
    findings.extend(required_sections_present(manifest, &config.required_sections));
    findings.extend(section_integrity(&sections));
    findings.extend(section_headings(&sections, &config.section_headings));
    findings.extend(placeholder_absence(
        sections.iter().chain(documents.iter()),
        &config.placeholder_markers,
    ));
    findings.push(prior_qa_continuity(
        &document_text,
        prior,
        &config.continuity_sections,
        &config.continuity_markers,
    ));
    let (critique, quality) =
        critique_gate(handle, manifest, &config.critique, &config.document_headings);
    findings.extend(critique);
    findings.push(document_present(&documents));
    findings.extend(document_headings(&documents, &config.document_headings));

    let summary = summarize_findings(&findings);
    let verdict = if summary.failed == 0 {
        Verdict::Pass
    } else {
        Verdict::Fail
    };

    info!(
        run_id = %manifest.run_id,
        verdict = verdict.as_str(),
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        "qa evaluation completed"
    );

    QaReport {
        report_version: QA_REPORT_VERSION,
        run_id: manifest.run_id.clone(),
        evaluated_at: now_utc_string(),
        verdict,
        summary,
        quality,
        findings,
    }
}

fn scan<'a>(
    handle: &RunHandle,
    artifacts: impl Iterator<Item = &'a ArtifactReference>,
) -> Vec<ScannedArtifact<'a>> {
    artifacts
        .map(|artifact| ScannedArtifact {
            artifact,
            content: fs::read(handle.root().join(&artifact.path)).map_err(|err| err.to_string()),
        })
        .collect()
}

/// The assembled document when one was recorded and is readable, otherwise
/// the section drafts in manifest order.
fn document_text(documents: &[ScannedArtifact<'_>], sections: &[ScannedArtifact<'_>]) -> String {
    let assembled = documents
        .iter()
        .filter_map(ScannedArtifact::text)
        .collect::<Vec<_>>();
    if !assembled.is_empty() {
        return assembled.join("\n\n");
    }
    sections
        .iter()
        .filter_map(ScannedArtifact::text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn summarize_findings(findings: &[QaFinding]) -> QaSummary {
    let mut summary = QaSummary {
        total: findings.len(),
        ..QaSummary::default()
    };
    for finding in findings {
        match finding.status {
            FindingStatus::Pass => summary.passed += 1,
            FindingStatus::Fail => summary.failed += 1,
            FindingStatus::Skipped => summary.skipped += 1,
        }
    }
    summary
}

pub fn write_report(handle: &RunHandle, report: &QaReport) -> HarnessResult<PathBuf> {
    let path = handle.qa_report_path();
    write_json_pretty(&path, report)?;
    info!(run_id = %report.run_id, path = %path.display(), "wrote qa report");
    Ok(path)
}

/// Failed finding counts per check id, for logs and summaries.
pub fn failures_by_check(report: &QaReport) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for finding in report.failed_findings() {
        *counts.entry(finding.check_id.clone()).or_insert(0) += 1;
    }
    counts
}
