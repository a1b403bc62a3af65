use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::cli::AllocateArgs;
use crate::commands::load_config;
use crate::layout::generate_short_id;
use crate::run_dir::{PriorSource, allocate_run, snapshot_inputs};

pub fn run(args: AllocateArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let now = Utc::now();
    let short_id = args.run_id_suffix.unwrap_or_else(generate_short_id);

    let allocation = allocate_run(&config.outputs_root, now.date_naive(), now, &short_id)
        .with_context(|| format!("failed to allocate run under {}", config.outputs_root.display()))?;
    let handle = &allocation.handle;

    let inputs_dir = args.inputs_dir.unwrap_or_else(|| config.inputs_dir.clone());
    let snapshot = snapshot_inputs(handle, &inputs_dir, &config.input_files);

    let prior = match &allocation.carried_forward.source {
        PriorSource::Run { run_id, .. } => run_id.clone(),
        PriorSource::LatestMirror => "latest mirror".to_string(),
        PriorSource::None => "none".to_string(),
    };
    info!(
        run_id = %handle.run_id(),
        inputs = snapshot.len(),
        prior = %prior,
        carried_forward = allocation.carried_forward.copied.len(),
        "run ready"
    );

    println!("{}", handle.root().display());
    Ok(())
}
