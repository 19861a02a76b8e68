//! Errors for files held in a package workspace

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A file the package needs is missing from its workspace
    #[error("missing file: {path}")]
    MissingFile { path: String },

    #[error("corrupted data: {message}")]
    CorruptedData { message: String },

    #[error("storage I/O failed: {message}")]
    Io { message: String },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl UserFacingError for StorageError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingFile { .. } => {
                Some("Download the record again to restore the package workspace.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::MissingFile { .. } => "storage.missing_file",
            Self::CorruptedData { .. } => "storage.corrupted_data",
            Self::Io { .. } => "storage.io",
        };
        Some(code)
    }
}
