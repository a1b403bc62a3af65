use anyhow::{Context, Result};
use tracing::info;

use crate::cli::PublishArgs;
use crate::publish::{publish_latest, write_change_summary};
use crate::run_dir::RunHandle;

pub fn run(args: PublishArgs) -> Result<()> {
    let handle = RunHandle::open(&args.run_dir)?;

    if !args.skip_change_summary {
        write_change_summary(&handle).context("failed to write change summary")?;
    }
    let written = publish_latest(&handle).with_context(|| {
        format!(
            "failed to publish latest mirror into {}",
            handle.outputs_root().display()
        )
    })?;

    info!(run_id = %handle.run_id(), files = written.len(), "publish completed");
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
