//! Harness configuration, passed explicitly into each component.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HarnessResult;
use crate::util::read_json;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub outputs_root: PathBuf,
    pub inputs_dir: PathBuf,
    pub input_files: Vec<String>,
    pub qa: QaConfig,
    pub analysis: AnalysisConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            outputs_root: PathBuf::from("outputs"),
            inputs_dir: PathBuf::from("inputs"),
            input_files: ["context.md", "constraints.yaml", "repo_manifest.txt"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            qa: QaConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: Option<&Path>) -> HarnessResult<Self> {
        match path {
            Some(path) => read_json(path),
            None => Ok(Self::default()),
        }
    }
}

pub const DOCUMENT_HEADINGS: [&str; 14] = [
    "Problem Statement",
    "Goals",
    "Non-Goals",
    "Context & Constraints",
    "Architecture Overview",
    "Data Design",
    "API / Interface Contracts",
    "Non-Functional Requirements",
    "Risks & Mitigations",
    "Rollout Plan",
    "Test Strategy",
    "Decision Log",
    "Prior QA Report Review",
    "Assumptions",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    pub required_sections: Vec<String>,
    /// Headings each named section file must carry as `## <heading>` lines.
    pub section_headings: BTreeMap<String, Vec<String>>,
    /// Top-level `## <heading>` lines the assembled document must carry.
    pub document_headings: Vec<String>,
    pub placeholder_markers: Vec<String>,
    /// Headings whose body must acknowledge the prior QA report on a rerun.
    pub continuity_sections: Vec<String>,
    /// Cross-reference tokens, matched case-insensitively anywhere in the
    /// document, that acknowledge the prior QA report on their own.
    pub continuity_markers: Vec<String>,
    pub critique: CritiqueRubric,
}

impl Default for QaConfig {
    fn default() -> Self {
        let headings: [(&str, &[&str]); 5] = [
            (
                "requirements",
                &["Problem Statement", "Goals", "Non-Goals", "Assumptions"],
            ),
            (
                "architecture",
                &[
                    "Architecture Overview",
                    "Components",
                    "Trade-offs",
                    "Diagram",
                    "Assumptions",
                ],
            ),
            (
                "data_api",
                &[
                    "Data Design",
                    "Entities",
                    "Data Flows",
                    "Storage/Retention",
                    "API / Interface Contracts",
                    "Assumptions",
                ],
            ),
            (
                "security",
                &["Risks & Mitigations", "Security Controls", "Assumptions"],
            ),
            (
                "nfrs_ops",
                &[
                    "Non-Functional Requirements",
                    "Observability",
                    "Ops Runbooks",
                    "Assumptions",
                ],
            ),
        ];

        Self {
            required_sections: headings.iter().map(|(name, _)| name.to_string()).collect(),
            section_headings: headings
                .iter()
                .map(|(name, list)| {
                    (
                        name.to_string(),
                        list.iter().map(|heading| heading.to_string()).collect(),
                    )
                })
                .collect(),
            document_headings: DOCUMENT_HEADINGS.into_iter().map(str::to_string).collect(),
            placeholder_markers: ["TODO", "TBD", "Lorem", "FILL ME", "???"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            continuity_sections: ["Prior QA Report Review", "Changes since last review"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            continuity_markers: ["previous_qa_report.json", "previous_review_report.json"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            critique: CritiqueRubric::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CritiqueRubric {
    pub version: i64,
    pub reviewer_role: String,
    /// Name of the scoring method the reviewer must declare.
    pub calculation: String,
    pub scale_min: i64,
    pub scale_max: i64,
    pub threshold_strictly_greater_than: i64,
    pub criteria: Vec<RubricCriterion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricCriterion {
    pub key: String,
    #[serde(default)]
    pub label: String,
    pub weight_pct: i64,
}

impl CritiqueRubric {
    pub fn threshold_rule(&self) -> String {
        format!(">{}", self.threshold_strictly_greater_than)
    }
}

impl Default for CritiqueRubric {
    fn default() -> Self {
        let criteria = [
            ("input_alignment_fidelity", "Input Alignment Fidelity", 20),
            ("problem_scope_clarity", "Problem Scope Clarity", 8),
            ("architecture_design_quality", "Architecture Design Quality", 12),
            ("component_interface_specificity", "Component Interface Specificity", 10),
            ("data_design_quality", "Data Design Quality", 8),
            ("security_risk_coverage", "Security Risk Coverage", 8),
            ("nfrs_operability_quality", "NFRs and Operability Quality", 8),
            ("delivery_readiness", "Delivery Readiness", 8),
            ("testability_validation_strategy", "Testability and Validation Strategy", 8),
            (
                "decision_traceability_and_assumptions",
                "Decision Traceability and Assumptions",
                5,
            ),
            (
                "document_coherence_and_consistency",
                "Document Coherence and Consistency",
                5,
            ),
        ];
        Self {
            version: 1,
            reviewer_role: "IT Super Architect".to_string(),
            calculation: "weighted_average_rounded".to_string(),
            scale_min: 0,
            scale_max: 100,
            threshold_strictly_greater_than: 80,
            criteria: criteria
                .into_iter()
                .map(|(key, label, weight_pct)| RubricCriterion {
                    key: key.to_string(),
                    label: label.to_string(),
                    weight_pct,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub workers: usize,
    pub plateau_window: usize,
    /// Convergence score at or above which a run is labelled converging.
    pub convergence_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            plateau_window: 2,
            convergence_threshold: 0.75,
        }
    }
}
