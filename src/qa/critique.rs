use std::collections::BTreeMap;
use std::fs;

use serde_json::Value;

use super::*;
use crate::config::CritiqueRubric;
use crate::layout::CRITIQUE_REPORT_FILE;
use crate::model::{CheckKind, QualitySummary};

/// Criteria scoring below this are listed individually when the gate fails.
const LOW_CRITERION_SCORE: i64 = 80;

/// Weights of a complete rubric add up to this.
const TOTAL_WEIGHT_PCT: i64 = 100;

struct Criterion<'a> {
    key: &'a str,
    score: i64,
    weight_pct: i64,
    label: Option<&'a str>,
    first_action: Option<&'a str>,
}

/// Validates the reviewer's `critique_report.json` against the rubric and
/// gates on its overall score. Skipped, with no quality summary, when the
/// run recorded no critique.
pub fn critique_gate(
    handle: &RunHandle,
    manifest: &RunManifest,
    rubric: &CritiqueRubric,
    section_names: &[String],
) -> (Vec<QaFinding>, Option<QualitySummary>) {
    let recorded = manifest
        .outputs_of_kind(ArtifactKind::Report)
        .find(|artifact| artifact.path == CRITIQUE_REPORT_FILE);
    let Some(recorded) = recorded else {
        return (
            vec![finding(
                FindingStatus::Skipped,
                "no critique report recorded for this run",
            )],
            None,
        );
    };

    let unscored = QualitySummary {
        source: CRITIQUE_REPORT_FILE.to_string(),
        score: None,
        threshold_rule: rubric.threshold_rule(),
        passed: false,
    };
    let raw = match fs::read(handle.root().join(&recorded.path)) {
        Ok(raw) => raw,
        Err(err) => {
            return (
                vec![finding(
                    FindingStatus::Fail,
                    format!("critique report unreadable: {err}"),
                )],
                Some(unscored),
            );
        }
    };
    let value: Value = match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(err) => {
            return (
                vec![finding(
                    FindingStatus::Fail,
                    format!("critique report is not valid JSON: {err}"),
                )],
                Some(unscored),
            );
        }
    };
    if !value.is_object() {
        return (
            vec![finding(
                FindingStatus::Fail,
                "critique report must be a JSON object",
            )],
            Some(unscored),
        );
    }

    let mut problems = header_problems(&value, rubric);
    let (criteria, criteria_problems) = parse_criteria(&value, rubric, section_names);
    problems.extend(criteria_problems);

    let scoring = value.get("scoring");
    let declared_score = scoring
        .and_then(|scoring| scoring.get("overall_quality_score"))
        .and_then(Value::as_i64);
    let declared_gate = scoring
        .and_then(|scoring| scoring.get("quality_gate_passed"))
        .and_then(Value::as_bool);

    match declared_score {
        None => problems.push("scoring.overall_quality_score must be an integer".to_string()),
        Some(score) if !(rubric.scale_min..=rubric.scale_max).contains(&score) => {
            problems.push(format!(
                "overall_quality_score {score} is outside {}..={}",
                rubric.scale_min, rubric.scale_max
            ));
        }
        Some(score) if problems.is_empty() => {
            let computed = weighted_score(&criteria);
            if computed != score {
                problems.push(format!(
                    "overall_quality_score {score} does not match the weighted average {computed}"
                ));
            }
        }
        Some(_) => {}
    }

    if let Some(score) = declared_score {
        let expected_gate = score > rubric.threshold_strictly_greater_than;
        match declared_gate {
            None => problems.push("scoring.quality_gate_passed must be a boolean".to_string()),
            Some(gate) if gate != expected_gate => problems.push(format!(
                "quality_gate_passed is {gate} but score {score} implies {expected_gate}"
            )),
            Some(_) => {}
        }
    }

    if !problems.is_empty() {
        let quality = QualitySummary {
            score: declared_score,
            passed: declared_gate.unwrap_or(false),
            ..unscored
        };
        let findings = problems
            .into_iter()
            .map(|problem| finding(FindingStatus::Fail, problem))
            .collect();
        return (findings, Some(quality));
    }

    // Both checked above.
    let Some(score) = declared_score else {
        return (Vec::new(), Some(unscored));
    };
    let threshold = rubric.threshold_strictly_greater_than;
    let quality = QualitySummary {
        score: Some(score),
        passed: score > threshold,
        ..unscored
    };
    if score > threshold {
        return (
            vec![finding(
                FindingStatus::Pass,
                format!("quality score {score} exceeds threshold {}", quality.threshold_rule),
            )],
            Some(quality),
        );
    }

    let mut findings = vec![finding(
        FindingStatus::Fail,
        format!(
            "quality score {score} does not meet threshold {}",
            quality.threshold_rule
        ),
    )];
    let labels = rubric
        .criteria
        .iter()
        .filter(|criterion| !criterion.label.is_empty())
        .map(|criterion| (criterion.key.as_str(), criterion.label.as_str()))
        .collect::<BTreeMap<_, _>>();
    for criterion in criteria
        .iter()
        .filter(|criterion| criterion.score < LOW_CRITERION_SCORE)
    {
        let label = criterion
            .label
            .or_else(|| labels.get(criterion.key).copied())
            .unwrap_or(criterion.key);
        let action = criterion
            .first_action
            .map(str::to_string)
            .unwrap_or_else(|| format!("improve documentation quality for {label}"));
        findings.push(QaFinding::new(
            CheckKind::CritiqueQualityGate,
            Some(criterion.key),
            FindingStatus::Fail,
            format!("low score for {label}: {}/100; {action}", criterion.score),
        ));
    }
    (findings, Some(quality))
}

fn finding(status: FindingStatus, detail: impl Into<String>) -> QaFinding {
    QaFinding::new(
        CheckKind::CritiqueQualityGate,
        Some(CRITIQUE_REPORT_FILE),
        status,
        detail,
    )
}

/// Version, reviewer role and the declared scoring rules.
fn header_problems(value: &Value, rubric: &CritiqueRubric) -> Vec<String> {
    let mut problems = Vec::new();
    if value.get("version").and_then(Value::as_i64) != Some(rubric.version) {
        problems.push(format!("version must be {}", rubric.version));
    }
    if value.get("reviewer_role").and_then(Value::as_str) != Some(rubric.reviewer_role.as_str()) {
        problems.push(format!("reviewer_role must be '{}'", rubric.reviewer_role));
    }

    let Some(scoring) = value.get("scoring").filter(|scoring| scoring.is_object()) else {
        problems.push("critique report has no scoring object".to_string());
        return problems;
    };
    let int = |key: &str| scoring.get(key).and_then(Value::as_i64);
    if int("scale_min") != Some(rubric.scale_min) || int("scale_max") != Some(rubric.scale_max) {
        problems.push(format!(
            "scoring scale must be {}..{}",
            rubric.scale_min, rubric.scale_max
        ));
    }
    if int("threshold_strictly_greater_than") != Some(rubric.threshold_strictly_greater_than) {
        problems.push(format!(
            "scoring.threshold_strictly_greater_than must be {}",
            rubric.threshold_strictly_greater_than
        ));
    }
    if scoring.get("calculation").and_then(Value::as_str) != Some(rubric.calculation.as_str()) {
        problems.push(format!(
            "scoring.calculation must be '{}'",
            rubric.calculation
        ));
    }
    problems
}

fn parse_criteria<'a>(
    value: &'a Value,
    rubric: &CritiqueRubric,
    section_names: &[String],
) -> (Vec<Criterion<'a>>, Vec<String>) {
    let mut problems = Vec::new();
    let Some(items) = value.get("criteria").and_then(Value::as_array) else {
        problems.push("critique report has no criteria list".to_string());
        return (Vec::new(), problems);
    };

    let expected = rubric
        .criteria
        .iter()
        .map(|criterion| (criterion.key.as_str(), criterion.weight_pct))
        .collect::<BTreeMap<_, _>>();

    let mut seen = BTreeMap::<&str, usize>::new();
    let mut criteria = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if !item.is_object() {
            problems.push(format!("criteria[{index}] is not an object"));
            continue;
        }
        let Some(key) = item.get("key").and_then(Value::as_str) else {
            problems.push(format!("criteria[{index}] has no key"));
            continue;
        };
        *seen.entry(key).or_insert(0) += 1;

        let score = item.get("score").and_then(Value::as_i64);
        let weight_pct = item.get("weight_pct").and_then(Value::as_i64);
        match score {
            Some(score) if (rubric.scale_min..=rubric.scale_max).contains(&score) => {}
            Some(score) => problems.push(format!(
                "score {score} for '{key}' is outside {}..={}",
                rubric.scale_min, rubric.scale_max
            )),
            None => problems.push(format!("'{key}' has no integer score")),
        }
        match (expected.get(key), weight_pct) {
            (Some(expected), Some(weight)) if *expected != weight => problems.push(format!(
                "weight_pct for '{key}' is {weight}, rubric expects {expected}"
            )),
            (_, None) => problems.push(format!("'{key}' has no integer weight_pct")),
            _ => {}
        }
        match item.get("primary_section").and_then(Value::as_str) {
            Some(section) if section_names.iter().any(|name| name == section) => {}
            Some(section) => problems.push(format!(
                "primary_section '{section}' for '{key}' is not a required document heading"
            )),
            None => problems.push(format!("'{key}' has no primary_section")),
        }

        if let (Some(score), Some(weight_pct)) = (score, weight_pct) {
            criteria.push(Criterion {
                key,
                score,
                weight_pct,
                label: item
                    .get("label")
                    .and_then(Value::as_str)
                    .filter(|label| !label.is_empty()),
                first_action: item
                    .get("recommended_actions")
                    .and_then(Value::as_array)
                    .and_then(|actions| {
                        actions
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::trim)
                            .find(|action| !action.is_empty())
                    }),
            });
        }
    }

    let missing = expected
        .keys()
        .filter(|key| !seen.contains_key(*key))
        .copied()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        problems.push(format!("missing criteria: {}", missing.join(", ")));
    }
    let unexpected = seen
        .keys()
        .filter(|key| !expected.contains_key(*key))
        .copied()
        .collect::<Vec<_>>();
    if !unexpected.is_empty() {
        problems.push(format!("unexpected criteria: {}", unexpected.join(", ")));
    }
    let duplicated = seen
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(key, _)| *key)
        .collect::<Vec<_>>();
    if !duplicated.is_empty() {
        problems.push(format!("duplicated criteria: {}", duplicated.join(", ")));
    }

    if missing.is_empty() && unexpected.is_empty() && duplicated.is_empty() {
        let weight_total: i64 = criteria.iter().map(|criterion| criterion.weight_pct).sum();
        if weight_total != TOTAL_WEIGHT_PCT {
            problems.push(format!(
                "criterion weights sum to {weight_total}, expected {TOTAL_WEIGHT_PCT}"
            ));
        }
    }

    (criteria, problems)
}

/// Weighted average of the criterion scores, rounded half away from zero.
fn weighted_score(criteria: &[Criterion<'_>]) -> i64 {
    let weight_total: i64 = criteria.iter().map(|criterion| criterion.weight_pct).sum();
    if weight_total <= 0 {
        return 0;
    }
    let total: i64 = criteria
        .iter()
        .map(|criterion| criterion.score * criterion.weight_pct)
        .sum();
    (total as f64 / weight_total as f64).round() as i64
}
