use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use super::lineage::oscillates;
use super::render::{AnalysisTargets, ReportFormat, render, render_text, write_analysis};
use super::*;
use super::metrics::document_similarity;
use crate::config::{AnalysisConfig, QaConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::model::{
    CheckKind, FindingStatus, ModelConfig, QaFinding, QaRecord, QaReport, QaSummary, RunManifest,
    SealFailure, Verdict,
};
use crate::util::{parse_utc_compact, write_json_pretty};

fn day(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
}

fn run_dir(root: &Path, date: &str, name: &str) -> PathBuf {
    let dir = root.join(date).join(name);
    fs::create_dir_all(dir.join("sections")).expect("create run dir");
    dir
}

fn write_manifest(dir: &Path, name: &str, predecessor: Option<&str>) {
    let manifest = RunManifest {
        manifest_version: 1,
        run_id: name.to_string(),
        date: "2026-02-25".to_string(),
        created_at: "2026-02-25T10:00:00Z".to_string(),
        sealed_at: "2026-02-25T10:05:00Z".to_string(),
        model: ModelConfig {
            model_id: "local-test-model".to_string(),
            base_url: None,
        },
        predecessor_run_id: predecessor.map(str::to_string),
        inputs: Vec::new(),
        outputs: Vec::new(),
        qa: QaRecord::not_run(),
    };
    write_json_pretty(&dir.join("run_manifest.json"), &manifest).expect("write manifest");
}

fn write_report(dir: &Path, name: &str, failing_sections: &[&str]) {
    let mut findings = vec![QaFinding::new(
        CheckKind::PriorQaContinuity,
        None,
        FindingStatus::Skipped,
        "first run",
    )];
    for section in failing_sections {
        findings.push(QaFinding::new(
            CheckKind::RequiredSectionPresent,
            Some(*section),
            FindingStatus::Fail,
            "missing",
        ));
    }
    let failed = failing_sections.len();
    let report = QaReport {
        report_version: 1,
        run_id: name.to_string(),
        evaluated_at: "2026-02-25T10:06:00Z".to_string(),
        verdict: if failed == 0 { Verdict::Pass } else { Verdict::Fail },
        summary: QaSummary {
            total: findings.len(),
            passed: 0,
            failed,
            skipped: 1,
        },
        quality: None,
        findings,
    };
    write_json_pretty(&dir.join("qa_report.json"), &report).expect("write report");
}

/// A design document with the given `## ` headings, each with `body`.
fn document(headings: &[String], body: &str) -> String {
    let mut text = "# Design\n\n".to_string();
    for heading in headings {
        text.push_str(&format!("## {heading}\n{body}\n\n"));
    }
    text
}

fn full_document() -> String {
    document(&QaConfig::default().document_headings, "Covered.")
}

/// A sealed, evaluated run failing one QA-001 finding per listed section,
/// with a complete design document.
fn evaluated_run(root: &Path, date: &str, name: &str, predecessor: Option<&str>, failing: &[&str]) {
    evaluated_run_with_document(root, date, name, predecessor, failing, &full_document());
}

fn evaluated_run_with_document(
    root: &Path,
    date: &str,
    name: &str,
    predecessor: Option<&str>,
    failing: &[&str],
    text: &str,
) {
    let dir = run_dir(root, date, name);
    write_manifest(&dir, name, predecessor);
    write_report(&dir, name, failing);
    fs::write(dir.join("design_doc.md"), text).expect("write document");
}

fn config() -> AnalysisConfig {
    AnalysisConfig {
        workers: 3,
        plateau_window: 2,
        convergence_threshold: 0.75,
    }
}

fn analyze_with(root: &Path, filter: &DateFilter, config: &AnalysisConfig) -> HarnessResult<AnalysisSummary> {
    analyze(root, filter, config, &QaConfig::default())
}

fn analyze_day(root: &Path, date: &str) -> AnalysisSummary {
    analyze_with(root, &DateFilter::Day { date: day(date) }, &config()).expect("analysis succeeds")
}

#[test]
fn missing_outputs_root_and_date_directory_are_setup_errors() {
    let dir = tempfile::tempdir().expect("tempdir");

    let err = analyze_with(&dir.path().join("absent"), &DateFilter::All, &config())
        .expect_err("missing root");
    assert!(matches!(err, HarnessError::Setup { .. }));

    let err = analyze_with(
        dir.path(),
        &DateFilter::Day {
            date: day("2026-02-25"),
        },
        &config(),
    )
    .expect_err("missing date dir");
    assert!(err.to_string().contains("2026-02-25"));
}

#[test]
fn empty_date_directory_has_zero_runs_and_undefined_pass_rate() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join("2026-02-25")).expect("date dir");

    let summary = analyze_day(dir.path(), "2026-02-25");
    assert_eq!(summary.total_runs, 0);
    assert_eq!(summary.pass_rate, None);
    assert_eq!(summary.pass_rate_display(), "undefined");
    assert!(render_text(&summary).contains("No runs found."));
}

#[test]
fn runs_without_manifest_are_malformed_and_excluded_from_pass_rate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-25", "run_20260225T090000Z_aaa", None, &[]);
    evaluated_run(root, "2026-02-25", "run_20260225T100000Z_bbb", None, &["security"]);
    evaluated_run(root, "2026-02-25", "run_20260225T110000Z_ccc", None, &[]);
    run_dir(root, "2026-02-25", "run_20260225T120000Z_ddd");
    let sealed_badly = run_dir(root, "2026-02-25", "run_20260225T130000Z_eee");
    write_json_pretty(
        &sealed_badly.join("seal_failure.json"),
        &SealFailure {
            run_id: "run_20260225T130000Z_eee".to_string(),
            failed_at: "2026-02-25T13:05:00Z".to_string(),
            reason: "declared artifact is empty: sections/security.md".to_string(),
            path: "sections/security.md".to_string(),
        },
    )
    .expect("write seal failure");

    let summary = analyze_day(root, "2026-02-25");

    assert_eq!(summary.total_runs, 5);
    assert_eq!(summary.malformed_runs, 2);
    assert_eq!(summary.pass_count, 2);
    assert_eq!(summary.fail_count, 1);
    assert_eq!(summary.pass_rate, Some(2.0 / 3.0));
    assert_eq!(summary.malformed[0].reason, "run manifest missing");
    assert!(summary.malformed[1].reason.starts_with("sealing failed"));
    assert_eq!(summary.runs_failing_check.get("QA-001"), Some(&1));
}

#[test]
fn manifest_without_report_is_unknown_and_not_in_the_denominator() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-25", "run_20260225T090000Z_aaa", None, &["security"]);
    let pending = run_dir(root, "2026-02-25", "run_20260225T100000Z_bbb");
    write_manifest(&pending, "run_20260225T100000Z_bbb", None);
    let corrupt = run_dir(root, "2026-02-25", "run_20260225T110000Z_ccc");
    write_manifest(&corrupt, "run_20260225T110000Z_ccc", None);
    fs::write(corrupt.join("qa_report.json"), "{not json").expect("corrupt report");

    let summary = analyze_day(root, "2026-02-25");

    assert_eq!(summary.unknown_count, 2);
    assert_eq!(summary.fail_count, 1);
    assert_eq!(summary.pass_rate, Some(0.0));
    assert_eq!(summary.runs[1].note.as_deref(), Some("qa report missing"));
    assert!(
        summary.runs[2]
            .note
            .as_deref()
            .is_some_and(|note| note.starts_with("qa report unreadable"))
    );
}

#[test]
fn runs_are_sorted_by_timestamp_regardless_of_directory_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-25", "run_20260225T090000Z_aaa", None, &[]);
    evaluated_run(root, "2026-02-25", "run_20260225T080000Z_zzz", None, &[]);
    evaluated_run(root, "2026-02-24", "run_20260224T230000Z_yyy", None, &[]);

    let summary = analyze_with(root, &DateFilter::All, &config()).expect("analysis");
    let ids = summary
        .runs
        .iter()
        .map(|run| run.run_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            "run_20260224T230000Z_yyy",
            "run_20260225T080000Z_zzz",
            "run_20260225T090000Z_aaa",
        ]
    );

    let range = analyze_with(
        root,
        &DateFilter::Range {
            from: day("2026-02-25"),
            to: day("2026-02-26"),
        },
        &config(),
    )
    .expect("range analysis");
    assert_eq!(range.total_runs, 2);
    assert_eq!(range.label, "2026-02-25_to_2026-02-26");
}

#[test]
fn aggregate_is_independent_of_worker_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    for hour in 0..12 {
        let name = format!("run_20260225T{hour:02}0000Z_r{hour}");
        let failing: &[&str] = if hour % 3 == 0 { &["security"] } else { &[] };
        evaluated_run(root, "2026-02-25", &name, None, failing);
    }

    let filter = DateFilter::Day {
        date: day("2026-02-25"),
    };
    let serial = analyze_with(
        root,
        &filter,
        &AnalysisConfig {
            workers: 1,
            ..config()
        },
    )
    .expect("serial");
    let parallel = analyze_with(
        root,
        &filter,
        &AnalysisConfig {
            workers: 8,
            ..config()
        },
    )
    .expect("parallel");

    assert_eq!(serial.pass_count, 8);
    assert_eq!(serial.fail_count, 4);
    assert_eq!(serial.pass_rate, parallel.pass_rate);
    let ids = |summary: &AnalysisSummary| {
        summary
            .runs
            .iter()
            .map(|run| run.run_id.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&serial), ids(&parallel));
}

#[test]
fn lineage_links_predecessors_into_converging_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let first = "run_20260225T090000Z_one";
    let second = "run_20260225T100000Z_two";
    let third = "run_20260225T110000Z_three";
    evaluated_run(root, "2026-02-25", first, None, &["security", "data_api"]);
    evaluated_run(root, "2026-02-25", second, Some(first), &["security"]);
    evaluated_run(root, "2026-02-25", third, Some(second), &[]);
    // Predecessor outside the scan leaves this run as its own root.
    evaluated_run(
        root,
        "2026-02-25",
        "run_20260225T120000Z_solo",
        Some("run_20260101T000000Z_gone"),
        &["security"],
    );

    let summary = analyze_day(root, "2026-02-25");

    assert_eq!(summary.runs[1].parent_run_id.as_deref(), Some(first));
    assert_eq!(summary.runs[2].parent_run_id.as_deref(), Some(second));
    assert_eq!(summary.runs[3].parent_run_id, None);
    assert_eq!(summary.sequences.len(), 2);

    let chain = &summary.sequences[0];
    assert_eq!(chain.sequence_id, "seq_2026-02-25_001");
    assert_eq!(chain.run_ids, vec![first, second, third]);
    assert_eq!(chain.best_failed, Some(0));
    assert_eq!(chain.final_verdict, RunVerdict::Pass);
    assert!(chain.converged);
    assert!(!chain.oscillating);
    assert_eq!(summary.runs[2].sequence_index, Some(3));

    let solo = &summary.sequences[1];
    assert_eq!(solo.length, 1);
    assert!(!solo.converged);
}

#[test]
fn predecessor_newer_than_the_run_is_not_a_parent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(
        root,
        "2026-02-25",
        "run_20260225T090000Z_old",
        Some("run_20260225T100000Z_new"),
        &[],
    );
    evaluated_run(root, "2026-02-25", "run_20260225T100000Z_new", None, &[]);

    let summary = analyze_day(root, "2026-02-25");
    assert!(summary.runs.iter().all(|run| run.parent_run_id.is_none()));
    assert_eq!(summary.sequences.len(), 2);
}

#[test]
fn plateau_and_oscillation_are_detected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let names = [
        "run_20260225T090000Z_a",
        "run_20260225T100000Z_b",
        "run_20260225T110000Z_c",
        "run_20260225T120000Z_d",
    ];
    evaluated_run(root, "2026-02-25", names[0], None, &["security"]);
    evaluated_run(root, "2026-02-25", names[1], Some(names[0]), &["security", "data_api"]);
    evaluated_run(root, "2026-02-25", names[2], Some(names[1]), &["security"]);
    evaluated_run(root, "2026-02-25", names[3], Some(names[2]), &["security"]);

    let summary = analyze_day(root, "2026-02-25");
    let sequence = &summary.sequences[0];
    assert_eq!(sequence.length, 4);
    assert!(sequence.oscillating);
    assert!(sequence.converged, "{}", sequence.convergence_reason);
    assert_eq!(sequence.final_failed, Some(1));

    // Same count, but a different failing check: not a plateau.
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-25", names[0], None, &["security"]);
    evaluated_run(root, "2026-02-25", names[1], Some(names[0]), &["nfrs_ops"]);
    let summary = analyze_day(root, "2026-02-25");
    assert!(!summary.sequences[0].converged);
}

#[test]
fn oscillation_ignores_flat_steps() {
    assert!(!oscillates(&[3, 3, 2, 2, 1]));
    assert!(oscillates(&[3, 2, 2, 3]));
    assert!(!oscillates(&[]));
}

#[test]
fn renderings_escape_and_carry_the_same_counts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-25", "run_20260225T090000Z_aaa", None, &["<script>, \"x\""]);
    run_dir(root, "2026-02-25", "run_20260225T100000Z_bbb");

    let summary = analyze_day(root, "2026-02-25");

    let json: serde_json::Value =
        serde_json::from_str(&render(&summary, ReportFormat::Json).expect("json"))
            .expect("json parses");
    assert_eq!(json["total_runs"], 2);
    assert_eq!(json["malformed_runs"], 1);
    assert_eq!(json["filter"]["kind"], "day");
    assert_eq!(json["runs"][0]["verdict"], "fail");
    assert!(json["pass_rate"].is_number());

    let html = render(&summary, ReportFormat::Html).expect("html");
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));

    let csv = render(&summary, ReportFormat::Csv).expect("csv");
    let lines = csv.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("run_id,date,timestamp,verdict"));
    assert!(lines[1].ends_with("\"QA-001:<script>, \"\"x\"\"\""));

    let text = render(&summary, ReportFormat::Text).expect("text");
    assert!(text.contains("pass_rate=0.0%"));
    assert!(text.contains("Malformed runs:"));
}

#[test]
fn analysis_files_land_under_the_label_folder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-25", "run_20260225T090000Z_aaa", None, &[]);
    let summary = analyze_day(root, "2026-02-25");

    let generated = parse_utc_compact("20260225T180000Z").expect("timestamp");
    let targets = AnalysisTargets::defaults(root, &summary.label, generated);
    let written = write_analysis(&summary, &targets).expect("write analysis");

    assert_eq!(
        written,
        vec![
            root.join("analysis/2026-02-25/analysis.json"),
            root.join("analysis/2026-02-25/analysis_20260225T180000Z.html"),
        ]
    );
    assert!(written.iter().all(|path| path.is_file()));
    assert!(
        write_analysis(&summary, &AnalysisTargets::none())
            .expect("no targets")
            .is_empty()
    );
}

#[test]
fn date_range_includes_both_bounds_and_rejects_an_inverted_range() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-24", "run_20260224T090000Z_before", None, &[]);
    evaluated_run(root, "2026-02-25", "run_20260225T090000Z_from", None, &[]);
    evaluated_run(root, "2026-02-26", "run_20260226T090000Z_to", None, &[]);
    evaluated_run(root, "2026-02-27", "run_20260227T090000Z_after", None, &[]);

    let range = |from: &str, to: &str| DateFilter::Range {
        from: day(from),
        to: day(to),
    };

    let summary = analyze_with(root, &range("2026-02-25", "2026-02-26"), &config()).expect("range");
    let dates = summary
        .runs
        .iter()
        .map(|run| run.date.as_str())
        .collect::<Vec<_>>();
    assert_eq!(dates, vec!["2026-02-25", "2026-02-26"]);

    let single = analyze_with(root, &range("2026-02-26", "2026-02-26"), &config()).expect("one day");
    assert_eq!(single.total_runs, 1);
    assert_eq!(single.runs[0].run_id, "run_20260226T090000Z_to");

    let err = analyze_with(root, &range("2026-02-26", "2026-02-25"), &config())
        .expect_err("inverted range");
    assert!(matches!(err, HarnessError::Setup { .. }));
    assert!(err.to_string().contains("date range starts after it ends"));
}

#[test]
fn runs_are_compared_with_their_parent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let first = "run_20260225T090000Z_one";
    let second = "run_20260225T100000Z_two";
    let third = "run_20260225T110000Z_three";
    evaluated_run(root, "2026-02-25", first, None, &["security", "data_api"]);
    evaluated_run(root, "2026-02-25", second, Some(first), &["security", "nfrs_ops"]);
    evaluated_run(root, "2026-02-25", third, Some(second), &[]);

    let summary = analyze_day(root, "2026-02-25");

    assert_eq!(summary.runs[0].convergence_label, ConvergenceLabel::Baseline);
    assert!(summary.runs[0].vs_parent.is_none());
    assert_eq!(summary.runs[0].required_sections_completion_pct, 100.0);

    let swapped = summary.runs[1].vs_parent.as_ref().expect("compared with parent");
    assert_eq!(
        (swapped.resolved_issues, swapped.introduced_issues, swapped.unchanged_issues),
        (1, 1, 1)
    );
    assert_eq!(swapped.issue_jaccard, 0.3333);
    assert_eq!(swapped.doc_similarity, Some(1.0));
    assert_eq!(swapped.completion_delta_pct, 0.0);
    assert_eq!(swapped.failed_delta, Some(0));
    assert_eq!(swapped.convergence_score, 0.6167);
    assert_eq!(summary.runs[1].convergence_label, ConvergenceLabel::Mixed);

    let fixed = summary.runs[2].vs_parent.as_ref().expect("compared with parent");
    assert_eq!((fixed.resolved_issues, fixed.introduced_issues), (2, 0));
    assert_eq!(fixed.issue_jaccard, 0.0);
    assert_eq!(fixed.failed_delta, Some(2));
    assert_eq!(fixed.convergence_score, 0.85);
    assert_eq!(summary.runs[2].convergence_label, ConvergenceLabel::Converging);

    let sequence = &summary.sequences[0];
    assert_eq!(sequence.best_completion_pct, 100.0);
    assert_eq!(sequence.final_completion_pct, 100.0);

    let lenient = analyze_with(
        root,
        &DateFilter::All,
        &AnalysisConfig {
            convergence_threshold: 0.6,
            ..config()
        },
    )
    .expect("analysis");
    assert_eq!(lenient.runs[1].convergence_label, ConvergenceLabel::Converging);
}

#[test]
fn dropping_headings_while_adding_failures_is_regressing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let headings = QaConfig::default().document_headings;
    let parent = "run_20260225T090000Z_good";
    evaluated_run(root, "2026-02-25", parent, None, &[]);
    evaluated_run_with_document(
        root,
        "2026-02-25",
        "run_20260225T100000Z_worse",
        Some(parent),
        &["security", "data_api", "nfrs_ops"],
        &document(&headings[..7], "Covered."),
    );

    let summary = analyze_day(root, "2026-02-25");
    let worse = &summary.runs[1];

    assert_eq!(worse.required_sections_completion_pct, 50.0);
    assert_eq!(worse.convergence_label, ConvergenceLabel::Regressing);
    let comparison = worse.vs_parent.as_ref().expect("compared with parent");
    assert_eq!(comparison.completion_delta_pct, -50.0);
    assert_eq!(comparison.introduced_issues, 3);
    assert!(comparison.doc_similarity.is_some_and(|similarity| similarity < 1.0));
    assert_eq!(summary.sequences[0].best_completion_pct, 100.0);
    assert_eq!(summary.sequences[0].final_completion_pct, 50.0);
}

#[test]
fn plateau_needs_a_stable_document_and_stable_completion() {
    let headings = QaConfig::default().document_headings;
    let names = ["run_20260225T090000Z_a", "run_20260225T100000Z_b"];
    let rewritten = document(&headings, "Rewritten from scratch.");
    let one_heading_short = document(&headings[..headings.len() - 1], "Covered.");

    for (changed, reason) in [(&rewritten, "document rewritten"), (&one_heading_short, "completion moved")] {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        evaluated_run(root, "2026-02-25", names[0], None, &["security"]);
        evaluated_run_with_document(root, "2026-02-25", names[1], Some(names[0]), &["security"], changed);

        let summary = analyze_day(root, "2026-02-25");
        let comparison = summary.runs[1].vs_parent.as_ref().expect("compared with parent");
        assert_eq!(comparison.introduced_issues, 0, "{reason}");
        assert!(!summary.sequences[0].converged, "{reason}");
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    evaluated_run(root, "2026-02-25", names[0], None, &["security"]);
    evaluated_run_with_document(
        root,
        "2026-02-25",
        names[1],
        Some(names[0]),
        &["security"],
        &one_heading_short,
    );
    let summary = analyze_day(root, "2026-02-25");
    let comparison = summary.runs[1].vs_parent.as_ref().expect("compared with parent");
    assert!(
        comparison
            .doc_similarity
            .is_some_and(|similarity| similarity >= 0.95),
        "a missing heading alone keeps the document similar"
    );
    assert_eq!(comparison.completion_delta_pct, -7.1);
}

#[test]
fn completion_counts_document_headings_and_valid_section_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    let qa = QaConfig::default();
    let name = "run_20260225T090000Z_partial";
    evaluated_run_with_document(
        root,
        "2026-02-25",
        name,
        None,
        &[],
        &document(&qa.document_headings[..7], "Covered."),
    );
    let sections = root.join("2026-02-25").join(name).join("sections");
    for section in ["security", "architecture"] {
        let headings = qa.section_headings.get(section).cloned().unwrap_or_default();
        fs::write(sections.join(format!("{section}.md")), document(&headings, "Done."))
            .expect("write section");
    }
    fs::write(sections.join("data_api.md"), "# Data\n\nNo headings yet.\n").expect("write section");

    let summary = analyze_day(root, "2026-02-25");

    assert_eq!(summary.runs[0].required_sections_completion_pct, 50.0);
    assert_eq!(summary.runs[0].section_artifacts_completion_pct, 40.0);
}

#[test]
fn document_similarity_ignores_trailing_whitespace() {
    assert_eq!(document_similarity("a\nb\nc\nd\n", "a\nb\nc\nx\n"), Some(0.75));
    assert_eq!(document_similarity("a  \r\nb\n", "a\nb"), Some(1.0));
    assert_eq!(document_similarity("", "a"), None);
    assert_eq!(document_similarity("a", "\n  \n"), None);
}
