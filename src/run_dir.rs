//! Run directory lifecycle: allocation, re-opening, prior run discovery and
//! the carry-forward of the previous run's artifacts.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::layout::{
    DOCUMENT_FILE, INPUTS_DIR, PRIOR_DOCUMENT_FILE, PRIOR_MANIFEST_FILE, PRIOR_QA_REPORT_FILE,
    QA_REPORT_FILE, RUN_MANIFEST_FILE, RUN_SUBDIRS, RunId, date_dir_name, is_run_dir_name,
    parse_date, run_dir_path,
};
use crate::util::{copy_file, display_relative, ensure_directory};

#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: RunId,
    date: NaiveDate,
    root: PathBuf,
    outputs_root: PathBuf,
}

impl RunHandle {
    /// Re-opens an allocated run from `<outputs_root>/<date>/<run name>`.
    pub fn open(run_dir: &Path) -> HarnessResult<Self> {
        if !run_dir.is_dir() {
            return Err(HarnessError::setup("run directory does not exist", run_dir));
        }
        let name = run_dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| HarnessError::InvalidRunName(run_dir.display().to_string()))?;
        let run_id = RunId::parse(name)?;

        let date_dir = run_dir
            .parent()
            .ok_or_else(|| HarnessError::setup("run directory has no date parent", run_dir))?;
        let date = date_dir
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_date)
            .ok_or_else(|| HarnessError::setup("run directory is not under a date folder", run_dir))?;
        let outputs_root = date_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            run_id,
            date,
            root: run_dir.to_path_buf(),
            outputs_root,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn outputs_root(&self) -> &Path {
        &self.outputs_root
    }

    pub fn inputs_dir(&self) -> PathBuf {
        self.root.join(INPUTS_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(RUN_MANIFEST_FILE)
    }

    pub fn qa_report_path(&self) -> PathBuf {
        self.root.join(QA_REPORT_FILE)
    }

    pub fn document_path(&self) -> PathBuf {
        self.root.join(DOCUMENT_FILE)
    }

    pub fn prior_manifest_path(&self) -> PathBuf {
        self.inputs_dir().join(PRIOR_MANIFEST_FILE)
    }

    pub fn prior_qa_report_path(&self) -> PathBuf {
        self.inputs_dir().join(PRIOR_QA_REPORT_FILE)
    }

    pub fn prior_document_path(&self) -> PathBuf {
        self.inputs_dir().join(PRIOR_DOCUMENT_FILE)
    }

    /// Run id recorded in the carried-forward manifest, if one was copied.
    pub fn predecessor_run_id(&self) -> Option<String> {
        #[derive(Deserialize)]
        struct ManifestRunId {
            run_id: String,
        }

        let raw = fs::read(self.prior_manifest_path()).ok()?;
        serde_json::from_slice::<ManifestRunId>(&raw)
            .ok()
            .map(|value| value.run_id)
    }

    pub fn relative(&self, path: &Path) -> String {
        display_relative(path, &self.root)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorSource {
    None,
    Run { run_id: String, dir: PathBuf },
    LatestMirror,
}

#[derive(Debug, Clone)]
pub struct CarriedForward {
    pub source: PriorSource,
    /// Paths written into the new run, relative to its root.
    pub copied: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub handle: RunHandle,
    pub carried_forward: CarriedForward,
}

/// Creates `<outputs_root>/<date>/run_<ts>_<id>` with its fixed subfolders,
/// then carries forward the most recent prior run's artifacts.
///
/// The scaffold is built in a hidden staging directory and renamed into
/// place, so observers see either the complete run directory or nothing.
pub fn allocate_run(
    outputs_root: &Path,
    date: NaiveDate,
    timestamp: DateTime<Utc>,
    short_id: &str,
) -> HarnessResult<Allocation> {
    let run_id = RunId::new(timestamp, short_id)?;
    let date_dir = outputs_root.join(date_dir_name(date));
    let run_dir = run_dir_path(outputs_root, date, &run_id);

    if run_dir.exists() {
        return Err(HarnessError::Collision {
            run_id: run_id.to_string(),
            path: run_dir,
        });
    }

    ensure_directory(&date_dir)?;

    // Exclusive create: a staging dir for the same id belongs to another
    // allocator (or a crashed one) and is never removed here.
    let staging_dir = date_dir.join(format!(".staging-{run_id}"));
    if let Err(source) = fs::create_dir(&staging_dir) {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            warn!(path = %staging_dir.display(), "staging directory already exists for this run id");
            return Err(HarnessError::Collision {
                run_id: run_id.to_string(),
                path: staging_dir,
            });
        }
        return Err(HarnessError::io(
            format!("failed to create staging dir {}", staging_dir.display()),
            source,
        ));
    }
    for subdir in RUN_SUBDIRS {
        if let Err(err) = ensure_directory(&staging_dir.join(subdir)) {
            let _ = fs::remove_dir_all(&staging_dir);
            return Err(err);
        }
    }

    if run_dir.exists() {
        let _ = fs::remove_dir_all(&staging_dir);
        return Err(HarnessError::Collision {
            run_id: run_id.to_string(),
            path: run_dir,
        });
    }
    if let Err(source) = fs::rename(&staging_dir, &run_dir) {
        let _ = fs::remove_dir_all(&staging_dir);
        if run_dir.exists() {
            return Err(HarnessError::Collision {
                run_id: run_id.to_string(),
                path: run_dir,
            });
        }
        return Err(HarnessError::io(
            format!("failed to move run scaffold into {}", run_dir.display()),
            source,
        ));
    }

    info!(run_id = %run_id, path = %run_dir.display(), "allocated run directory");

    let handle = RunHandle {
        run_id,
        date,
        root: run_dir,
        outputs_root: outputs_root.to_path_buf(),
    };
    let carried_forward = carry_forward(&handle);

    Ok(Allocation {
        handle,
        carried_forward,
    })
}

#[derive(Debug, Clone)]
pub struct RunDirEntry {
    pub date: NaiveDate,
    pub name: String,
    pub path: PathBuf,
    /// `None` when the directory looks like a run but its name does not parse.
    pub run_id: Option<RunId>,
}

/// Lists `run_*` directories under every date folder accepted by `keep_date`.
/// Hidden entries (staging directories) and non-date folders are ignored.
pub fn scan_run_dirs(
    outputs_root: &Path,
    keep_date: impl Fn(NaiveDate) -> bool,
) -> HarnessResult<Vec<RunDirEntry>> {
    let mut entries = Vec::new();
    for date_entry in read_dir_sorted(outputs_root)? {
        if !date_entry.is_dir() {
            continue;
        }
        let Some(date) = date_entry
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_date)
        else {
            continue;
        };
        if !keep_date(date) {
            continue;
        }
        entries.extend(scan_date_dir(&date_entry, date)?);
    }
    Ok(entries)
}

pub fn scan_date_dir(date_dir: &Path, date: NaiveDate) -> HarnessResult<Vec<RunDirEntry>> {
    let mut entries = Vec::new();
    for path in read_dir_sorted(date_dir)? {
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_run_dir_name(name) {
            continue;
        }
        entries.push(RunDirEntry {
            date,
            name: name.to_string(),
            run_id: RunId::parse(name).ok(),
            path: path.clone(),
        });
    }
    Ok(entries)
}

fn read_dir_sorted(dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    let reader = fs::read_dir(dir)
        .map_err(|source| HarnessError::io(format!("failed to list {}", dir.display()), source))?;
    let mut paths = Vec::new();
    for entry in reader {
        match entry {
            Ok(entry) => paths.push(entry.path()),
            Err(err) => warn!(dir = %dir.display(), error = %err, "skipping unreadable entry"),
        }
    }
    paths.sort();
    Ok(paths)
}

/// Most recent run, other than `exclude`, holding a manifest or a QA report.
pub fn find_latest_prior_run(outputs_root: &Path, exclude: Option<&Path>) -> Option<RunDirEntry> {
    if !outputs_root.is_dir() {
        return None;
    }
    let entries = match scan_run_dirs(outputs_root, |_| true) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "prior run scan failed");
            return None;
        }
    };

    entries
        .into_iter()
        .filter(|entry| entry.run_id.is_some())
        .filter(|entry| exclude.is_none_or(|excluded| entry.path != excluded))
        .filter(|entry| {
            entry.path.join(RUN_MANIFEST_FILE).is_file() || entry.path.join(QA_REPORT_FILE).is_file()
        })
        .max_by(|left, right| left.run_id.cmp(&right.run_id))
}

/// Best effort: failures are logged and the run proceeds without them.
pub fn carry_forward(handle: &RunHandle) -> CarriedForward {
    if let Some(prior) = find_latest_prior_run(handle.outputs_root(), Some(handle.root())) {
        info!(run_id = %handle.run_id(), prior = %prior.name, "found prior run candidate");
        let copied = copy_prior_artifacts(
            handle,
            &[
                (prior.path.join(RUN_MANIFEST_FILE), handle.prior_manifest_path()),
                (prior.path.join(QA_REPORT_FILE), handle.prior_qa_report_path()),
                (prior.path.join(DOCUMENT_FILE), handle.prior_document_path()),
            ],
        );
        if !copied.is_empty() {
            return CarriedForward {
                source: PriorSource::Run {
                    run_id: prior.name,
                    dir: prior.path,
                },
                copied,
            };
        }
        info!(prior = %prior.name, "prior run had no reusable artifacts, using latest mirror");
    } else {
        info!(run_id = %handle.run_id(), "no prior run folders found, using latest mirror");
    }

    let outputs_root = handle.outputs_root();
    let copied = copy_prior_artifacts(
        handle,
        &[
            (outputs_root.join(QA_REPORT_FILE), handle.prior_qa_report_path()),
            (outputs_root.join(DOCUMENT_FILE), handle.prior_document_path()),
        ],
    );
    let source = if copied.is_empty() {
        PriorSource::None
    } else {
        PriorSource::LatestMirror
    };
    CarriedForward { source, copied }
}

fn copy_prior_artifacts(handle: &RunHandle, pairs: &[(PathBuf, PathBuf)]) -> Vec<String> {
    let mut copied = Vec::new();
    for (source, target) in pairs {
        if !source.is_file() {
            info!(path = %source.display(), "prior artifact missing");
            continue;
        }
        match copy_file(source, target) {
            Ok(_) => {
                info!(
                    source = %source.display(),
                    target = %target.display(),
                    "copied prior artifact"
                );
                copied.push(handle.relative(target));
            }
            Err(err) => warn!(error = %err, "failed to copy prior artifact"),
        }
    }
    copied
}

/// Copies the configured project inputs into the run's `inputs/` folder.
pub fn snapshot_inputs(handle: &RunHandle, source_dir: &Path, names: &[String]) -> Vec<String> {
    let mut copied = Vec::new();
    for name in names {
        let source = source_dir.join(name);
        if !source.is_file() {
            info!(path = %source.display(), "input snapshot missing");
            continue;
        }
        let target = handle.inputs_dir().join(name);
        match copy_file(&source, &target) {
            Ok(_) => {
                info!(source = %source.display(), target = %target.display(), "copied input snapshot");
                copied.push(handle.relative(&target));
            }
            Err(err) => warn!(error = %err, "failed to copy input snapshot"),
        }
    }
    copied
}
