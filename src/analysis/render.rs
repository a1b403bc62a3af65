//! Renderings of an [`AnalysisSummary`] and the report files written for it.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use super::{AnalysisSummary, RunSummary};
use crate::error::{HarnessError, HarnessResult};
use crate::layout::ANALYSIS_DIR;
use crate::util::{utc_compact_string, write_json_pretty, write_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Html,
    Text,
    Csv,
}

pub fn render(summary: &AnalysisSummary, format: ReportFormat) -> HarnessResult<String> {
    match format {
        ReportFormat::Json => render_json(summary),
        ReportFormat::Html => Ok(render_html(summary)),
        ReportFormat::Text => Ok(render_text(summary)),
        ReportFormat::Csv => Ok(render_csv(summary)),
    }
}

pub fn render_json(summary: &AnalysisSummary) -> HarnessResult<String> {
    let mut rendered = serde_json::to_string_pretty(summary)
        .map_err(|source| HarnessError::json("failed to serialize analysis", source))?;
    rendered.push('\n');
    Ok(rendered)
}

fn optional_number<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

fn sequence_cell(run: &RunSummary) -> String {
    match (&run.sequence_id, run.sequence_index) {
        (Some(id), Some(index)) => format!("{id}#{index}"),
        _ => String::new(),
    }
}

pub fn render_text(summary: &AnalysisSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Analysis {} ({} runs): pass={} fail={} unknown={} malformed={} pass_rate={}",
        summary.label,
        summary.total_runs,
        summary.pass_count,
        summary.fail_count,
        summary.unknown_count,
        summary.malformed_runs,
        summary.pass_rate_display()
    );
    if summary.runs.is_empty() && summary.malformed.is_empty() {
        out.push_str("No runs found.\n");
        return out;
    }

    let headers = [
        "run_id",
        "verdict",
        "failed",
        "total",
        "completion%",
        "delta",
        "sequence",
        "parent",
        "conv",
    ];
    let rows = summary
        .runs
        .iter()
        .map(|run| {
            [
                run.run_id.clone(),
                run.verdict.as_str().to_string(),
                optional_number(run.findings_failed),
                optional_number(run.findings_total),
                format!("{:.1}", run.required_sections_completion_pct),
                optional_number(
                    run.vs_parent
                        .as_ref()
                        .map(|comparison| format!("{:+.1}", comparison.completion_delta_pct)),
                ),
                sequence_cell(run),
                run.parent_run_id.clone().unwrap_or_default(),
                run.convergence_label.as_str().to_string(),
            ]
        })
        .collect::<Vec<_>>();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{cell:<width$}", width = *width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    if !rows.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", line(headers.to_vec()));
        let rule = widths.map(|width| "-".repeat(width));
        let _ = writeln!(out, "{}", line(rule.iter().map(String::as_str).collect()));
        for row in &rows {
            let _ = writeln!(out, "{}", line(row.iter().map(String::as_str).collect()));
        }
    }

    if !summary.malformed.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Malformed runs:");
        for run in &summary.malformed {
            let _ = writeln!(out, "- {}: {}", run.path, run.reason);
        }
    }

    if !summary.sequences.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Sequences:");
        for sequence in &summary.sequences {
            let _ = writeln!(
                out,
                "- {}: runs={} final={} best_failed={} final_failed={} best_completion={:.1}% oscillating={} converged={}",
                sequence.sequence_id,
                sequence.length,
                sequence.final_verdict.as_str(),
                optional_number(sequence.best_failed),
                optional_number(sequence.final_failed),
                sequence.best_completion_pct,
                sequence.oscillating,
                sequence.converged
            );
        }
    }
    out
}

const CSV_COLUMNS: [&str; 21] = [
    "run_id",
    "date",
    "timestamp",
    "verdict",
    "findings_total",
    "findings_failed",
    "findings_skipped",
    "parent_run_id",
    "sequence_id",
    "sequence_index",
    "required_sections_completion_pct",
    "section_artifacts_completion_pct",
    "completion_delta_pct_vs_parent",
    "doc_similarity_vs_parent",
    "resolved_issues_vs_parent",
    "introduced_issues_vs_parent",
    "unchanged_issues_vs_parent",
    "issue_jaccard_vs_parent",
    "convergence_score",
    "convergence_label",
    "failed_checks",
];

pub fn render_csv(summary: &AnalysisSummary) -> String {
    let mut out = CSV_COLUMNS.join(",");
    out.push('\n');
    for run in &summary.runs {
        let comparison = run.vs_parent.as_ref();
        let cells = [
            run.run_id.clone(),
            run.date.clone(),
            run.timestamp.clone(),
            run.verdict.as_str().to_string(),
            optional_number(run.findings_total),
            optional_number(run.findings_failed),
            optional_number(run.findings_skipped),
            run.parent_run_id.clone().unwrap_or_default(),
            run.sequence_id.clone().unwrap_or_default(),
            optional_number(run.sequence_index),
            run.required_sections_completion_pct.to_string(),
            run.section_artifacts_completion_pct.to_string(),
            optional_number(comparison.map(|c| c.completion_delta_pct)),
            optional_number(comparison.and_then(|c| c.doc_similarity)),
            optional_number(comparison.map(|c| c.resolved_issues)),
            optional_number(comparison.map(|c| c.introduced_issues)),
            optional_number(comparison.map(|c| c.unchanged_issues)),
            optional_number(comparison.map(|c| c.issue_jaccard)),
            optional_number(comparison.map(|c| c.convergence_score)),
            run.convergence_label.as_str().to_string(),
            run.failed_checks.join(";"),
        ];
        out.push_str(
            &cells
                .iter()
                .map(|cell| escape_csv_cell(cell))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
    }
    out
}

fn escape_csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn render_html(summary: &AnalysisSummary) -> String {
    let mut out = String::new();
    let title = format!("Run analysis: {}", html_escape(&summary.label));
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(out, "<head>");
    let _ = writeln!(out, "<meta charset=\"utf-8\">");
    let _ = writeln!(out, "<title>{title}</title>");
    let _ = writeln!(
        out,
        "<style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse}}\
         th,td{{border:1px solid #ccc;padding:4px 8px;text-align:left}}\
         .pass{{color:#1a7f37}}.fail{{color:#cf222e}}.unknown{{color:#9a6700}}</style>"
    );
    let _ = writeln!(out, "</head>");
    let _ = writeln!(out, "<body>");
    let _ = writeln!(out, "<h1>{title}</h1>");
    let _ = writeln!(
        out,
        "<p>Generated {} from <code>{}</code></p>",
        html_escape(&summary.generated_at),
        html_escape(&summary.outputs_root)
    );

    let _ = writeln!(out, "<table>");
    for (label, value) in [
        ("Total runs", summary.total_runs.to_string()),
        ("Pass", summary.pass_count.to_string()),
        ("Fail", summary.fail_count.to_string()),
        ("Unknown", summary.unknown_count.to_string()),
        ("Malformed", summary.malformed_runs.to_string()),
        ("Pass rate", summary.pass_rate_display()),
    ] {
        let _ = writeln!(out, "<tr><th>{label}</th><td>{}</td></tr>", html_escape(&value));
    }
    let _ = writeln!(out, "</table>");

    let _ = writeln!(out, "<h2>Runs</h2>");
    if summary.runs.is_empty() {
        let _ = writeln!(out, "<p>No runs found.</p>");
    } else {
        let _ = writeln!(out, "<table>");
        let _ = writeln!(
            out,
            "<tr><th>Run</th><th>Verdict</th><th>Failed</th><th>Total</th><th>Completion</th><th>Similarity</th><th>Convergence</th><th>Sequence</th><th>Parent</th><th>Failing checks</th><th>Note</th></tr>"
        );
        for run in &summary.runs {
            let comparison = run.vs_parent.as_ref();
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td class=\"{verdict}\">{verdict}</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&run.run_id),
                optional_number(run.findings_failed),
                optional_number(run.findings_total),
                run.required_sections_completion_pct,
                optional_number(comparison.and_then(|c| c.doc_similarity)),
                html_escape(&match comparison {
                    Some(c) => format!("{} ({})", run.convergence_label.as_str(), c.convergence_score),
                    None => run.convergence_label.as_str().to_string(),
                }),
                html_escape(&sequence_cell(run)),
                html_escape(run.parent_run_id.as_deref().unwrap_or("")),
                html_escape(&run.failed_checks.join(", ")),
                html_escape(run.note.as_deref().unwrap_or("")),
                verdict = run.verdict.as_str(),
            );
        }
        let _ = writeln!(out, "</table>");
    }

    if !summary.malformed.is_empty() {
        let _ = writeln!(out, "<h2>Malformed runs</h2>");
        let _ = writeln!(out, "<ul>");
        for run in &summary.malformed {
            let _ = writeln!(
                out,
                "<li><code>{}</code>: {}</li>",
                html_escape(&run.path),
                html_escape(&run.reason)
            );
        }
        let _ = writeln!(out, "</ul>");
    }

    if !summary.sequences.is_empty() {
        let _ = writeln!(out, "<h2>Sequences</h2>");
        let _ = writeln!(out, "<table>");
        let _ = writeln!(
            out,
            "<tr><th>Sequence</th><th>Runs</th><th>Final</th><th>Best failed</th><th>Final failed</th><th>Best completion</th><th>Final completion</th><th>Oscillating</th><th>Converged</th></tr>"
        );
        for sequence in &summary.sequences {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td class=\"{final_verdict}\">{final_verdict}</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{:.1}%</td><td>{}</td><td>{}</td></tr>",
                html_escape(&sequence.sequence_id),
                sequence.length,
                optional_number(sequence.best_failed),
                optional_number(sequence.final_failed),
                sequence.best_completion_pct,
                sequence.final_completion_pct,
                sequence.oscillating,
                html_escape(&format!(
                    "{} ({})",
                    sequence.converged, sequence.convergence_reason
                )),
                final_verdict = sequence.final_verdict.as_str(),
            );
        }
        let _ = writeln!(out, "</table>");
    }

    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");
    out
}

/// Where analysis reports are written when no explicit path is given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTargets {
    pub json: Option<PathBuf>,
    pub html: Option<PathBuf>,
}

impl AnalysisTargets {
    /// `<outputs_root>/analysis/<label>/analysis.json` and a timestamped HTML
    /// report beside it.
    pub fn defaults(outputs_root: &Path, label: &str, generated: DateTime<Utc>) -> Self {
        let dir = outputs_root.join(ANALYSIS_DIR).join(label);
        Self {
            json: Some(dir.join("analysis.json")),
            html: Some(dir.join(format!("analysis_{}.html", utc_compact_string(generated)))),
        }
    }

    pub fn none() -> Self {
        Self {
            json: None,
            html: None,
        }
    }
}

pub fn write_analysis(summary: &AnalysisSummary, targets: &AnalysisTargets) -> HarnessResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    if let Some(path) = &targets.json {
        write_json_pretty(path, summary)?;
        info!(path = %path.display(), "wrote analysis json");
        written.push(path.clone());
    }
    if let Some(path) = &targets.html {
        write_text(path, &render_html(summary))?;
        info!(path = %path.display(), "wrote analysis html");
        written.push(path.clone());
    }
    Ok(written)
}
