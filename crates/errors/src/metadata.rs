//! Remote metadata error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum MetadataError {
    /// The record came back without any data fields, which is what the
    /// service returns when the account lacks read permissions.
    #[error("{kind} {id} metadata appears truncated")]
    Truncated { kind: String, id: u64 },

    #[error("malformed metadata document: {message}")]
    Malformed { message: String },

    #[error("metadata field missing: {field}")]
    MissingField { field: String },

    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp { value: String },

    #[error("{what} have not been loaded")]
    NotLoaded { what: String },
}

impl MetadataError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

impl UserFacingError for MetadataError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Truncated { .. } => {
                Some("Grant the service account read access to every field of the record.")
            }
            Self::NotLoaded { .. } => Some("Open or download the package before assembling it."),
            _ => None,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Truncated { .. } => "metadata.truncated",
            Self::Malformed { .. } => "metadata.malformed",
            Self::MissingField { .. } => "metadata.missing_field",
            Self::InvalidTimestamp { .. } => "metadata.invalid_timestamp",
            Self::NotLoaded { .. } => "metadata.not_loaded",
        };
        Some(code)
    }
}
