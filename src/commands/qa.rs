use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::QaArgs;
use crate::commands::load_config;
use crate::manifest::{load_manifest, record_qa_status};
use crate::model::Verdict;
use crate::qa::{PriorArtifacts, evaluate, failures_by_check, write_report};
use crate::run_dir::RunHandle;

pub fn run(args: QaArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let handle = RunHandle::open(&args.run_dir)?;

    let manifest_path = handle.manifest_path();
    if !manifest_path.is_file() {
        bail!(
            "run {} is not sealed, manifest missing: {}",
            handle.run_id(),
            manifest_path.display()
        );
    }
    let manifest = load_manifest(&manifest_path)
        .with_context(|| format!("failed to load {}", manifest_path.display()))?;

    let prior = PriorArtifacts::load(&handle);
    let report = evaluate(&handle, &manifest, &config.qa, &prior);
    let report_path = write_report(&handle, &report)?;
    record_qa_status(&handle, &report)?;

    for finding in report.failed_findings() {
        warn!(
            check = %finding.check_id,
            label = finding.check.label(),
            subject = %finding.subject.as_deref().unwrap_or("-"),
            detail = %finding.detail,
            "qa finding failed"
        );
    }
    for (check_id, count) in failures_by_check(&report) {
        info!(check = %check_id, failed = count, "qa failures by check");
    }

    if let Some(quality) = &report.quality {
        info!(
            source = %quality.source,
            score = ?quality.score,
            rule = %quality.threshold_rule,
            passed = quality.passed,
            "critique quality"
        );
    }

    println!("{}", report_path.display());
    if report.verdict == Verdict::Fail {
        bail!(
            "qa failed for run {} with {} failing findings",
            handle.run_id(),
            report.summary.failed
        );
    }
    Ok(())
}
