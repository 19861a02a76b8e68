//! Per-record preservation error types
//!
//! These are the only errors that concern a single record rather than the
//! system as a whole. Each carries a short `reason` suitable for freezing the
//! record and a longer `detail` for the operator.

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum PreservationError {
    #[error(
        "Unsupported file format: {extension}\n\n\
         File format {extension} in SIP {sip_filename} not supported for preservation."
    )]
    UnsupportedFormat {
        extension: String,
        sip_filename: String,
    },

    #[error(
        "Filename contains non-ASCII characters\n\n\
         Filename {filename} contains non-ASCII characters"
    )]
    InvalidFilename { filename: String },

    /// A failed external stage recognised by one of the stderr detectors
    #[error("{reason}\n\n{detail}")]
    Classified {
        code: String,
        reason: String,
        detail: String,
    },
}

impl PreservationError {
    /// Short, stable explanation used when freezing the record
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::UnsupportedFormat { extension, .. } => {
                format!("Unsupported file format: {extension}")
            }
            Self::InvalidFilename { .. } => "Filename contains non-ASCII characters".to_string(),
            Self::Classified { reason, .. } => reason.clone(),
        }
    }

    /// Longer explanation referencing the offending file
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::UnsupportedFormat {
                extension,
                sip_filename,
            } => format!(
                "File format {extension} in SIP {sip_filename} not supported for preservation."
            ),
            Self::InvalidFilename { filename } => {
                format!("Filename {filename} contains non-ASCII characters")
            }
            Self::Classified { detail, .. } => detail.clone(),
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported-format",
            Self::InvalidFilename { .. } => "invalid-filename",
            Self::Classified { code, .. } => code,
        }
    }
}

impl UserFacingError for PreservationError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.reason())
    }

    fn user_hint(&self) -> Option<&'static str> {
        Some("Fix the source record upstream and unfreeze it before resubmitting.")
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::UnsupportedFormat { .. } => "preservation.unsupported_format",
            Self::InvalidFilename { .. } => "preservation.invalid_filename",
            Self::Classified { .. } => "preservation.classified",
        };
        Some(code)
    }
}
