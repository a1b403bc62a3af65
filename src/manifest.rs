//! Manifest sealing: hash every consumed and produced file of a run and
//! record them, with the model configuration, in `run_manifest.json`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{HarnessError, HarnessResult};
use crate::layout::{
    ADRS_DIR, CRITIQUE_REPORT_FILE, DOCUMENT_FILE, INPUTS_DIR, LOGS_DIR, QA_REPORT_FILE,
    SEAL_FAILURE_FILE, SECTIONS_DIR, date_dir_name,
};
use crate::model::{
    ArtifactKind, ArtifactReference, MANIFEST_VERSION, ModelConfig, QaRecord, QaReport, QaStatus,
    RunManifest, SealFailure, Verdict,
};
use crate::run_dir::RunHandle;
use crate::util::{now_utc_string, read_json, sha256_file, write_json_pretty};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredArtifact {
    /// Relative to the run root.
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// Required artifacts must be non-empty.
    pub required: bool,
}

impl DeclaredArtifact {
    pub fn new(path: impl Into<PathBuf>, kind: ArtifactKind, required: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            required,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeclaredArtifacts {
    pub consumed: Vec<DeclaredArtifact>,
    pub produced: Vec<DeclaredArtifact>,
}

/// Hashes the declared files and writes the manifest, sealing the run.
///
/// Fails without writing anything when a declared file is missing, when a
/// required one is empty, or when the run already has a manifest.
pub fn build_manifest(
    handle: &RunHandle,
    model: &ModelConfig,
    consumed: &[DeclaredArtifact],
    produced: &[DeclaredArtifact],
) -> HarnessResult<RunManifest> {
    let manifest_path = handle.manifest_path();
    if manifest_path.exists() {
        return Err(HarnessError::AlreadySealed {
            path: manifest_path,
        });
    }

    let inputs = consumed
        .iter()
        .map(|declared| reference_for(handle, declared))
        .collect::<HarnessResult<Vec<_>>>()?;
    let outputs = produced
        .iter()
        .map(|declared| reference_for(handle, declared))
        .collect::<HarnessResult<Vec<_>>>()?;

    let manifest = RunManifest {
        manifest_version: MANIFEST_VERSION,
        run_id: handle.run_id().to_string(),
        date: date_dir_name(handle.date()),
        created_at: handle
            .run_id()
            .timestamp()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        sealed_at: now_utc_string(),
        model: model.clone(),
        predecessor_run_id: handle.predecessor_run_id(),
        inputs,
        outputs,
        qa: QaRecord::not_run(),
    };

    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %manifest.run_id,
        inputs = manifest.inputs.len(),
        outputs = manifest.outputs.len(),
        path = %manifest_path.display(),
        "sealed run manifest"
    );

    Ok(manifest)
}

fn reference_for(handle: &RunHandle, declared: &DeclaredArtifact) -> HarnessResult<ArtifactReference> {
    let path = handle.root().join(&declared.path);
    let metadata = match fs::metadata(&path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(HarnessError::MissingArtifact { path }),
    };
    if metadata.len() == 0 && declared.required {
        return Err(HarnessError::EmptyArtifact { path });
    }

    let reference = ArtifactReference {
        path: handle.relative(&path),
        sha256: sha256_file(&path)?,
        bytes: metadata.len(),
        kind: declared.kind,
    };
    debug!(
        path = %reference.path,
        kind = reference.kind.as_str(),
        bytes = reference.bytes,
        "hashed artifact"
    );
    Ok(reference)
}

/// Declares what the external pipeline left in the run folder: section
/// drafts, ADRs, the assembled document, the critique report and logs as
/// outputs, and everything under `inputs/` as consumed.
pub fn discover_artifacts(handle: &RunHandle) -> HarnessResult<DeclaredArtifacts> {
    let root = handle.root();
    let mut produced = Vec::new();

    for path in list_files(&root.join(SECTIONS_DIR))? {
        produced.push(DeclaredArtifact::new(
            Path::new(SECTIONS_DIR).join(path),
            ArtifactKind::Section,
            true,
        ));
    }
    for path in list_files(&root.join(ADRS_DIR))? {
        produced.push(DeclaredArtifact::new(
            Path::new(ADRS_DIR).join(path),
            ArtifactKind::Adr,
            true,
        ));
    }
    if root.join(DOCUMENT_FILE).is_file() {
        produced.push(DeclaredArtifact::new(DOCUMENT_FILE, ArtifactKind::Document, true));
    }
    if root.join(CRITIQUE_REPORT_FILE).is_file() {
        produced.push(DeclaredArtifact::new(
            CRITIQUE_REPORT_FILE,
            ArtifactKind::Report,
            false,
        ));
    }
    for path in list_files(&root.join(LOGS_DIR))? {
        produced.push(DeclaredArtifact::new(
            Path::new(LOGS_DIR).join(path),
            ArtifactKind::Log,
            false,
        ));
    }

    let consumed = list_files(&root.join(INPUTS_DIR))?
        .into_iter()
        .map(|path| DeclaredArtifact::new(Path::new(INPUTS_DIR).join(path), ArtifactKind::Input, false))
        .collect();

    Ok(DeclaredArtifacts { consumed, produced })
}

/// Visible regular files directly inside `dir`, sorted by name.
fn list_files(dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let reader = fs::read_dir(dir)
        .map_err(|source| HarnessError::io(format!("failed to list {}", dir.display()), source))?;
    let mut names = Vec::new();
    for entry in reader {
        let entry = entry
            .map_err(|source| HarnessError::io(format!("failed to list {}", dir.display()), source))?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') || !entry.path().is_file() {
            continue;
        }
        names.push(PathBuf::from(name));
    }
    names.sort();
    Ok(names)
}

pub fn load_manifest(path: &Path) -> HarnessResult<RunManifest> {
    read_json(path)
}

/// Writes the QA outcome into the sealed manifest, the only field that may
/// change after sealing.
pub fn record_qa_status(handle: &RunHandle, report: &QaReport) -> HarnessResult<RunManifest> {
    let manifest_path = handle.manifest_path();
    if !manifest_path.is_file() {
        return Err(HarnessError::setup("run is not sealed, manifest missing", manifest_path));
    }
    let mut manifest = load_manifest(&manifest_path)?;
    manifest.qa = QaRecord {
        status: match report.verdict {
            Verdict::Pass => QaStatus::Pass,
            Verdict::Fail => QaStatus::Fail,
        },
        failed_findings: Some(report.summary.failed),
        report_path: Some(QA_REPORT_FILE.to_string()),
        evaluated_at: Some(report.evaluated_at.clone()),
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        run_id = %manifest.run_id,
        qa_status = manifest.qa.status.as_str(),
        failed = report.summary.failed,
        "updated manifest qa status"
    );
    Ok(manifest)
}

/// Records why sealing failed so the run is visible as failed to analysis.
pub fn record_seal_failure(handle: &RunHandle, err: &HarnessError) -> HarnessResult<PathBuf> {
    let failing_path = match err {
        HarnessError::MissingArtifact { path } | HarnessError::EmptyArtifact { path } => {
            handle.relative(path)
        }
        _ => String::new(),
    };
    let failure = SealFailure {
        run_id: handle.run_id().to_string(),
        failed_at: now_utc_string(),
        reason: err.to_string(),
        path: failing_path,
    };
    let path = handle.root().join(SEAL_FAILURE_FILE);
    write_json_pretty(&path, &failure)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_dir::allocate_run;
    use crate::util::{parse_utc_compact, sha256_bytes};

    fn new_run(root: &Path) -> RunHandle {
        let timestamp = parse_utc_compact("20260225T100000Z").expect("timestamp");
        allocate_run(root, timestamp.date_naive(), timestamp, "seal")
            .expect("allocate")
            .handle
    }

    fn model() -> ModelConfig {
        ModelConfig {
            model_id: "qwen/qwen2.5-vl-7b".to_string(),
            base_url: Some("http://127.0.0.1:1234/v1".to_string()),
        }
    }

    #[test]
    fn manifest_records_hash_and_size_of_every_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = new_run(dir.path());
        fs::write(handle.root().join("sections/requirements.md"), "## Goals\nShip.\n")
            .expect("section");
        fs::write(handle.root().join("adrs/0001-storage.md"), "# ADR 1\n").expect("adr");
        fs::write(handle.root().join("inputs/context.md"), "context").expect("input");

        let declared = discover_artifacts(&handle).expect("discover");
        let manifest =
            build_manifest(&handle, &model(), &declared.consumed, &declared.produced).expect("seal");

        assert_eq!(manifest.inputs.len(), 1);
        assert_eq!(manifest.inputs[0].path, "inputs/context.md");
        assert_eq!(manifest.outputs.len(), 2);
        assert_eq!(manifest.outputs[0].path, "sections/requirements.md");
        assert_eq!(manifest.outputs[1].kind, ArtifactKind::Adr);
        for artifact in manifest.inputs.iter().chain(manifest.outputs.iter()) {
            let bytes = fs::read(handle.root().join(&artifact.path)).expect("read artifact");
            assert_eq!(artifact.sha256, sha256_bytes(&bytes));
            assert_eq!(artifact.bytes, bytes.len() as u64);
        }
        assert_eq!(manifest.qa.status, QaStatus::NotRun);
        assert_eq!(manifest.model, model());

        let on_disk = load_manifest(&handle.manifest_path()).expect("reload");
        assert_eq!(on_disk, manifest);
    }

    #[test]
    fn missing_declared_output_fails_without_sealing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = new_run(dir.path());
        let produced = vec![DeclaredArtifact::new(
            "sections/security.md",
            ArtifactKind::Section,
            true,
        )];

        let err = build_manifest(&handle, &model(), &[], &produced).expect_err("must fail");
        assert!(matches!(err, HarnessError::MissingArtifact { .. }));
        assert!(err.is_artifact_failure());
        assert!(!handle.manifest_path().exists());
    }

    #[test]
    fn empty_required_output_fails_but_empty_optional_is_recorded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = new_run(dir.path());
        fs::write(handle.root().join("sections/security.md"), "").expect("empty section");
        fs::write(handle.root().join("logs/run.log"), "").expect("empty log");

        let required = vec![DeclaredArtifact::new(
            "sections/security.md",
            ArtifactKind::Section,
            true,
        )];
        let err = build_manifest(&handle, &model(), &[], &required).expect_err("must fail");
        assert!(matches!(err, HarnessError::EmptyArtifact { .. }));

        let failure_path = record_seal_failure(&handle, &err).expect("record failure");
        let failure: SealFailure = read_json(&failure_path).expect("failure readable");
        assert_eq!(failure.path, "sections/security.md");

        let optional = vec![DeclaredArtifact::new("logs/run.log", ArtifactKind::Log, false)];
        let manifest = build_manifest(&handle, &model(), &[], &optional).expect("seal optional");
        assert_eq!(manifest.outputs[0].bytes, 0);
    }

    #[test]
    fn sealed_run_cannot_be_sealed_again() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = new_run(dir.path());
        build_manifest(&handle, &model(), &[], &[]).expect("first seal");

        let err = build_manifest(&handle, &model(), &[], &[]).expect_err("second seal");
        assert!(matches!(err, HarnessError::AlreadySealed { .. }));
    }

    #[test]
    fn qa_status_update_changes_only_the_qa_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let handle = new_run(dir.path());
        let sealed = build_manifest(&handle, &model(), &[], &[]).expect("seal");

        let report = QaReport {
            report_version: 1,
            run_id: sealed.run_id.clone(),
            evaluated_at: "2026-02-25T10:10:00Z".to_string(),
            verdict: Verdict::Fail,
            summary: crate::model::QaSummary {
                total: 3,
                passed: 1,
                failed: 2,
                skipped: 0,
            },
            quality: None,
            findings: Vec::new(),
        };
        let updated = record_qa_status(&handle, &report).expect("record qa");

        assert_eq!(updated.qa.status, QaStatus::Fail);
        assert_eq!(updated.qa.failed_findings, Some(2));
        assert_eq!(updated.outputs, sealed.outputs);
        assert_eq!(updated.sealed_at, sealed.sealed_at);
    }
}
