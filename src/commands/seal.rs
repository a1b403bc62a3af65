use anyhow::{Context, Result};
use tracing::{error, info};

use crate::cli::SealArgs;
use crate::commands::env_value;
use crate::manifest::{build_manifest, discover_artifacts, record_seal_failure};
use crate::model::ModelConfig;
use crate::run_dir::RunHandle;

pub fn run(args: SealArgs) -> Result<()> {
    let handle = RunHandle::open(&args.run_dir)?;
    let model = ModelConfig {
        model_id: resolve_model_id(args.model),
        base_url: args.base_url.or_else(|| env_value(&["OPENAI_API_BASE"])),
    };

    let declared = discover_artifacts(&handle)
        .with_context(|| format!("failed to list artifacts in {}", handle.root().display()))?;
    info!(
        run_id = %handle.run_id(),
        consumed = declared.consumed.len(),
        produced = declared.produced.len(),
        model = %model.model_id,
        "sealing run"
    );

    match build_manifest(&handle, &model, &declared.consumed, &declared.produced) {
        Ok(manifest) => {
            println!("{}", handle.manifest_path().display());
            info!(run_id = %manifest.run_id, "run sealed");
            Ok(())
        }
        Err(err) if err.is_artifact_failure() => {
            match record_seal_failure(&handle, &err) {
                Ok(path) => error!(path = %path.display(), "recorded seal failure"),
                Err(record_err) => error!(error = %record_err, "failed to record seal failure"),
            }
            Err(err).context(format!("run {} was not sealed", handle.run_id()))
        }
        Err(err) => Err(err.into()),
    }
}

fn resolve_model_id(explicit: Option<String>) -> String {
    explicit
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| env_value(&["DOCRUN_MODEL", "LOCAL_LLM_MODEL"]))
        .unwrap_or_else(|| "unknown".to_string())
}
