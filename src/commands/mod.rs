pub mod allocate;
pub mod analyze;
pub mod publish;
pub mod qa;
pub mod seal;
pub mod status;

use anyhow::{Context, Result};

use crate::cli::CommonArgs;
use crate::config::HarnessConfig;

/// Config file (if any) with command-line overrides applied.
pub(crate) fn load_config(common: &CommonArgs) -> Result<HarnessConfig> {
    let mut config = match &common.config {
        Some(path) => HarnessConfig::load(Some(path.as_path()))
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    if let Some(outputs_root) = &common.outputs_root {
        config.outputs_root = outputs_root.clone();
    }
    Ok(config)
}

/// First non-empty value among the given environment variables.
pub(crate) fn env_value(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
