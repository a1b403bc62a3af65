//! Completion of each run's outputs, and how each run moved relative to its
//! lineage parent.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use super::RunSummary;
use crate::changes::line_diff_stats;
use crate::config::QaConfig;
use crate::layout::SECTIONS_DIR;
use crate::qa::missing_headings;

/// Documents at least this similar to their parent count as stable.
pub(crate) const STABLE_SIMILARITY: f64 = 0.95;

/// Completion moving by at most this many points counts as stable.
pub(crate) const STABLE_COMPLETION_DELTA: f64 = 1.0;

/// Convergence scores below this are labelled regressing.
const REGRESSING_BELOW: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceLabel {
    /// No parent to compare with.
    Baseline,
    Converging,
    Mixed,
    Regressing,
}

impl ConvergenceLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Converging => "converging",
            Self::Mixed => "mixed",
            Self::Regressing => "regressing",
        }
    }
}

/// A run measured against its parent. Issues are failing finding keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParentComparison {
    pub resolved_issues: usize,
    pub introduced_issues: usize,
    pub unchanged_issues: usize,
    /// Unchanged over the union of both issue sets; 0 when both are empty.
    pub issue_jaccard: f64,
    /// `None` when either run has no readable design document.
    pub doc_similarity: Option<f64>,
    pub completion_delta_pct: f64,
    /// Parent failed count minus this run's; positive is an improvement.
    pub failed_delta: Option<i64>,
    pub convergence_score: f64,
}

/// Share of `headings` present as `## ` lines in the design document.
pub(crate) fn document_completion(document: Option<&str>, headings: &[String]) -> f64 {
    let Some(text) = document.filter(|text| !text.trim().is_empty()) else {
        return 0.0;
    };
    let present = headings.len() - missing_headings(text, headings).len();
    percentage(present, headings.len())
}

/// Share of required section files that exist and carry all their headings.
pub(crate) fn section_artifact_completion(run_dir: &Path, qa: &QaConfig) -> f64 {
    let sections_dir = run_dir.join(SECTIONS_DIR);
    let valid = qa
        .required_sections
        .iter()
        .filter(|name| {
            let Ok(text) = fs::read_to_string(sections_dir.join(format!("{name}.md"))) else {
                return false;
            };
            let headings = qa
                .section_headings
                .get(name.as_str())
                .map(Vec::as_slice)
                .unwrap_or_default();
            missing_headings(&text, headings).is_empty()
        })
        .count();
    percentage(valid, qa.required_sections.len())
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(part as f64 / total as f64 * 100.0, 1)
}

/// Line-level similarity of two documents after trailing whitespace is
/// dropped: twice the common lines over the total line count.
pub(crate) fn document_similarity(previous: &str, current: &str) -> Option<f64> {
    let previous = normalize(previous);
    let current = normalize(current);
    if previous.is_empty() || current.is_empty() {
        return None;
    }
    let (_, removed) = line_diff_stats(&previous, &current);
    let old_lines = previous.lines().count();
    let new_lines = current.lines().count();
    let common = old_lines - removed;
    Some(round_to(
        2.0 * common as f64 / (old_lines + new_lines) as f64,
        4,
    ))
}

fn normalize(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Fills `vs_parent` and `convergence_label` for every run. Parent links
/// must already be set.
pub(crate) fn compare_with_parents(runs: &mut [RunSummary], convergence_threshold: f64) {
    let position = runs
        .iter()
        .enumerate()
        .map(|(index, run)| (run.run_id.clone(), index))
        .collect::<BTreeMap<_, _>>();

    for index in 0..runs.len() {
        let parent = runs[index]
            .parent_run_id
            .as_ref()
            .and_then(|parent| position.get(parent))
            .copied();
        let Some(parent) = parent else {
            runs[index].vs_parent = None;
            runs[index].convergence_label = ConvergenceLabel::Baseline;
            continue;
        };
        let comparison = compare(&runs[parent], &runs[index]);
        runs[index].convergence_label = label_for(comparison.convergence_score, convergence_threshold);
        runs[index].vs_parent = Some(comparison);
    }
}

fn compare(parent: &RunSummary, run: &RunSummary) -> ParentComparison {
    let before = parent.failed_check_set();
    let after = run.failed_check_set();
    let resolved_issues = before.difference(&after).count();
    let introduced_issues = after.difference(&before).count();
    let unchanged_issues = before.intersection(&after).count();
    let union = before.union(&after).count();
    let issue_jaccard = match union {
        0 => 0.0,
        union => round_to(unchanged_issues as f64 / union as f64, 4),
    };

    let doc_similarity = match (&parent.document, &run.document) {
        (Some(previous), Some(current)) => document_similarity(previous, current),
        _ => None,
    };
    let completion_delta_pct = round_to(
        run.required_sections_completion_pct - parent.required_sections_completion_pct,
        1,
    );
    let failed_delta = parent
        .findings_failed
        .zip(run.findings_failed)
        .map(|(before, after)| before as i64 - after as i64);

    // Each component is scaled to 0..=1, with 0.5 meaning "no signal".
    let quality = match (parent.findings_failed, run.findings_failed) {
        (Some(before), Some(after)) => {
            to_unit((before as f64 - after as f64) / before.max(1) as f64)
        }
        _ => 0.5,
    };
    let completion = to_unit(completion_delta_pct / 100.0);
    let stability = doc_similarity.unwrap_or(0.0);
    let regression = match run.findings_failed {
        Some(failed) => {
            1.0 - (introduced_issues as f64 / (failed + introduced_issues).max(1) as f64).min(1.0)
        }
        None => 0.5,
    };
    let convergence_score = round_to(
        0.40 * quality + 0.30 * completion + 0.20 * stability + 0.10 * regression,
        4,
    );

    ParentComparison {
        resolved_issues,
        introduced_issues,
        unchanged_issues,
        issue_jaccard,
        doc_similarity,
        completion_delta_pct,
        failed_delta,
        convergence_score,
    }
}

fn label_for(score: f64, convergence_threshold: f64) -> ConvergenceLabel {
    if score >= convergence_threshold {
        ConvergenceLabel::Converging
    } else if score < REGRESSING_BELOW {
        ConvergenceLabel::Regressing
    } else {
        ConvergenceLabel::Mixed
    }
}

/// Maps -1..=1 (clamped) onto 0..=1.
fn to_unit(value: f64) -> f64 {
    (value.clamp(-1.0, 1.0) + 1.0) / 2.0
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round() / scale
}
