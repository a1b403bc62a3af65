//! Well-known names inside the outputs tree and the run identifier format.
//!
//! ```text
//! <outputs_root>/
//!   design_doc.md, qa_report.json          latest mirror
//!   analysis/<label>/analysis.json
//!   <YYYY-MM-DD>/run_<YYYYMMDDTHHMMSSZ>_<id>/
//!     sections/ adrs/ inputs/ logs/
//!     run_manifest.json qa_report.json design_doc.md
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::error::{HarnessError, HarnessResult};
use crate::util::{parse_utc_compact, utc_compact_string};

pub const SECTIONS_DIR: &str = "sections";
pub const ADRS_DIR: &str = "adrs";
pub const INPUTS_DIR: &str = "inputs";
pub const LOGS_DIR: &str = "logs";
pub const RUN_SUBDIRS: [&str; 4] = [SECTIONS_DIR, ADRS_DIR, INPUTS_DIR, LOGS_DIR];

pub const RUN_MANIFEST_FILE: &str = "run_manifest.json";
pub const QA_REPORT_FILE: &str = "qa_report.json";
pub const DOCUMENT_FILE: &str = "design_doc.md";
pub const CRITIQUE_REPORT_FILE: &str = "critique_report.json";
pub const CHANGE_SUMMARY_FILE: &str = "change_summary.md";
pub const SEAL_FAILURE_FILE: &str = "seal_failure.json";

pub const PRIOR_MANIFEST_FILE: &str = "previous_run_manifest.json";
pub const PRIOR_QA_REPORT_FILE: &str = "previous_qa_report.json";
pub const PRIOR_DOCUMENT_FILE: &str = "previous_design_doc.md";

pub const ANALYSIS_DIR: &str = "analysis";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const RUN_PREFIX: &str = "run_";
const SHORT_ID_LEN: usize = 12;

fn run_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^run_(\d{8}T\d{6}Z)_([A-Za-z0-9]+)$").expect("run name pattern is valid")
    })
}

/// `run_<compact utc timestamp>_<short id>`; orders by timestamp, then id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunId {
    timestamp: DateTime<Utc>,
    suffix: String,
}

impl RunId {
    pub fn new(timestamp: DateTime<Utc>, suffix: &str) -> HarnessResult<Self> {
        if suffix.is_empty() || !suffix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(HarnessError::InvalidRunName(format!(
                "short id must be non-empty ascii alphanumerics, got {suffix:?}"
            )));
        }
        // Second precision is all the directory name can carry.
        let truncated = parse_utc_compact(&utc_compact_string(timestamp)).unwrap_or(timestamp);
        Ok(Self {
            timestamp: truncated,
            suffix: suffix.to_string(),
        })
    }

    pub fn parse(name: &str) -> HarnessResult<Self> {
        let captures = run_name_pattern()
            .captures(name)
            .ok_or_else(|| HarnessError::InvalidRunName(name.to_string()))?;
        let timestamp = captures
            .get(1)
            .and_then(|m| parse_utc_compact(m.as_str()))
            .ok_or_else(|| HarnessError::InvalidRunName(name.to_string()))?;
        let suffix = captures
            .get(2)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| HarnessError::InvalidRunName(name.to_string()))?;
        Ok(Self { timestamp, suffix })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn compact_timestamp(&self) -> String {
        utc_compact_string(self.timestamp)
    }

}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{RUN_PREFIX}{}_{}",
            utc_compact_string(self.timestamp),
            self.suffix
        )
    }
}

pub fn generate_short_id() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SHORT_ID_LEN)
        .collect()
}

pub fn date_dir_name(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

pub fn is_run_dir_name(name: &str) -> bool {
    name.starts_with(RUN_PREFIX)
}

pub fn run_dir_path(outputs_root: &Path, date: NaiveDate, run_id: &RunId) -> PathBuf {
    outputs_root
        .join(date_dir_name(date))
        .join(run_id.to_string())
}
