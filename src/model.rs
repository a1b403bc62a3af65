use std::path::Path;

use serde::{Deserialize, Serialize};

pub const MANIFEST_VERSION: u32 = 1;
pub const QA_REPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Section,
    Adr,
    Document,
    Report,
    Input,
    Log,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Adr => "adr",
            Self::Document => "document",
            Self::Report => "report",
            Self::Input => "input",
            Self::Log => "log",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Relative to the run root, forward slashes.
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub kind: ArtifactKind,
}

impl ArtifactReference {
    /// File stem, used to match section artifacts against required names.
    pub fn name(&self) -> &str {
        Path::new(&self.path)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaStatus {
    Pass,
    Fail,
    NotRun,
}

impl QaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::NotRun => "not_run",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaRecord {
    pub status: QaStatus,
    #[serde(default)]
    pub failed_findings: Option<usize>,
    #[serde(default)]
    pub report_path: Option<String>,
    #[serde(default)]
    pub evaluated_at: Option<String>,
}

impl QaRecord {
    pub fn not_run() -> Self {
        Self {
            status: QaStatus::NotRun,
            failed_findings: None,
            report_path: None,
            evaluated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub date: String,
    pub created_at: String,
    pub sealed_at: String,
    pub model: ModelConfig,
    #[serde(default)]
    pub predecessor_run_id: Option<String>,
    pub inputs: Vec<ArtifactReference>,
    pub outputs: Vec<ArtifactReference>,
    pub qa: QaRecord,
}

impl RunManifest {
    pub fn outputs_of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &ArtifactReference> {
        self.outputs.iter().filter(move |artifact| artifact.kind == kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealFailure {
    pub run_id: String,
    pub failed_at: String,
    pub reason: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    RequiredSectionPresent,
    SectionIntegrity,
    SectionHeadings,
    PlaceholderAbsence,
    PriorQaContinuity,
    CritiqueQualityGate,
    DocumentPresent,
    DocumentHeadings,
}

impl CheckKind {
    pub fn check_id(self) -> &'static str {
        match self {
            Self::RequiredSectionPresent => "QA-001",
            Self::SectionIntegrity => "QA-002",
            Self::SectionHeadings => "QA-003",
            Self::PlaceholderAbsence => "QA-004",
            Self::PriorQaContinuity => "QA-005",
            Self::CritiqueQualityGate => "QA-006",
            Self::DocumentPresent => "QA-007",
            Self::DocumentHeadings => "QA-008",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::RequiredSectionPresent => "Required section present",
            Self::SectionIntegrity => "Section file integrity",
            Self::SectionHeadings => "Section headings present",
            Self::PlaceholderAbsence => "Placeholder absence",
            Self::PriorQaContinuity => "Prior QA continuity",
            Self::CritiqueQualityGate => "Critique quality gate",
            Self::DocumentPresent => "Design document present",
            Self::DocumentHeadings => "Document headings present",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaFinding {
    pub check_id: String,
    pub check: CheckKind,
    #[serde(default)]
    pub subject: Option<String>,
    pub status: FindingStatus,
    pub detail: String,
}

impl QaFinding {
    pub fn new(
        check: CheckKind,
        subject: Option<&str>,
        status: FindingStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            check_id: check.check_id().to_string(),
            check,
            subject: subject.map(str::to_string),
            status,
            detail: detail.into(),
        }
    }

    /// Stable key for comparing failures across runs.
    pub fn key(&self) -> String {
        match &self.subject {
            Some(subject) => format!("{}:{}", self.check_id, subject),
            None => self.check_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Reviewer score as read from the critique report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub source: String,
    pub score: Option<i64>,
    /// `>80` style rule the score is gated on.
    pub threshold_rule: String,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaReport {
    pub report_version: u32,
    pub run_id: String,
    pub evaluated_at: String,
    pub verdict: Verdict,
    pub summary: QaSummary,
    /// `None` when the run recorded no critique report.
    #[serde(default)]
    pub quality: Option<QualitySummary>,
    pub findings: Vec<QaFinding>,
}

impl QaReport {
    pub fn failed_findings(&self) -> impl Iterator<Item = &QaFinding> {
        self.findings
            .iter()
            .filter(|finding| finding.status == FindingStatus::Fail)
    }
}
