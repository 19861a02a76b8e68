//! External stage error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StageError {
    /// An external tool exited with a nonzero status that no detector
    /// recognised.
    #[error("{stage} failed with exit code {exit_code:?}: {}", command.join(" "))]
    Failed {
        stage: String,
        command: Vec<String>,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("failed to spawn {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("failed to extract {path}: {message}")]
    ExtractionFailed { path: String, message: String },

    #[error("failed to compress {path}: {message}")]
    CompressionFailed { path: String, message: String },
}

impl UserFacingError for StageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Failed { .. } => Some("Inspect the stage log under the package's logs directory."),
            Self::SpawnFailed { .. } => {
                Some("Ensure the packaging tools are installed or set `tools.virtualenv_path`.")
            }
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Failed { .. } => "stage.failed",
            Self::SpawnFailed { .. } => "stage.spawn_failed",
            Self::ExtractionFailed { .. } => "stage.extraction_failed",
            Self::CompressionFailed { .. } => "stage.compression_failed",
        };
        Some(code)
    }
}
