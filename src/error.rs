//! Error taxonomy for the run harness.
//!
//! Only conditions that stop an operation live here. QA problems are
//! reported as findings and malformed runs as analysis entries.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("{message}: {}", path.display())]
    Setup { message: String, path: PathBuf },

    #[error("run id {run_id} already exists at {}", path.display())]
    Collision { run_id: String, path: PathBuf },

    #[error("declared artifact does not exist: {}", path.display())]
    MissingArtifact { path: PathBuf },

    #[error("declared artifact is empty: {}", path.display())]
    EmptyArtifact { path: PathBuf },

    #[error("run is already sealed, manifest exists: {}", path.display())]
    AlreadySealed { path: PathBuf },

    #[error("invalid run name: {0}")]
    InvalidRunName(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl HarnessError {
    pub fn setup(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::Setup {
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    /// Artifact errors abort sealing but still get recorded against the run.
    pub fn is_artifact_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingArtifact { .. } | Self::EmptyArtifact { .. }
        )
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
