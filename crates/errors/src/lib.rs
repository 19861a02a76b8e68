#![warn(mismatched_lifetime_syntaxes)]
#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for sipforge
//!
//! Errors are organized by domain. The top-level [`Error`] separates
//! per-record domain conditions ([`PreservationError`]) from systemic
//! failures so callers can freeze a single record and keep going.

use std::borrow::Cow;

use thiserror::Error;

pub mod auth;
pub mod config;
pub mod metadata;
pub mod network;
pub mod preservation;
pub mod stage;
pub mod storage;

pub use auth::AuthError;
pub use config::ConfigError;
pub use metadata::MetadataError;
pub use network::NetworkError;
pub use preservation::PreservationError;
pub use stage::StageError;
pub use storage::StorageError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Preservation(#[from] PreservationError),

    #[error("stage error: {0}")]
    Stage(#[from] StageError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid argument error with a message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: format!("{err}"),
            path: Some(path.into()),
        }
    }

    /// Whether this error concerns only the record being processed.
    ///
    /// Domain errors freeze the affected record; every other error halts
    /// the run.
    #[must_use]
    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Preservation(_))
    }

    /// The preservation error carried by this error, if any
    #[must_use]
    pub fn as_preservation(&self) -> Option<&PreservationError> {
        match self {
            Self::Preservation(err) => Some(err),
            _ => None,
        }
    }

    /// Whether this is an I/O error of the given kind
    #[must_use]
    pub fn is_io_kind(&self, expected: std::io::ErrorKind) -> bool {
        matches!(self, Self::Io { kind, .. } if *kind == expected)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}

/// Result type alias for sipforge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Minimal interface for rendering user-facing error information without
/// requiring heavyweight envelopes.
pub trait UserFacingError {
    /// Short message suitable for CLI output.
    fn user_message(&self) -> Cow<'_, str>;

    /// Optional remediation hint.
    fn user_hint(&self) -> Option<&'static str> {
        None
    }

    /// Whether retrying the same operation is likely to succeed.
    fn is_retryable(&self) -> bool {
        false
    }

    /// Stable error code for analytics / structured reporting.
    fn user_code(&self) -> Option<&'static str> {
        None
    }
}

impl UserFacingError for Error {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Error::Auth(err) => err.user_message(),
            Error::Network(err) => err.user_message(),
            Error::Metadata(err) => err.user_message(),
            Error::Preservation(err) => err.user_message(),
            Error::Stage(err) => err.user_message(),
            Error::Storage(err) => err.user_message(),
            Error::Config(err) => err.user_message(),
            Error::Io { message, .. } => Cow::Owned(message.clone()),
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Error::Auth(err) => err.user_hint(),
            Error::Network(err) => err.user_hint(),
            Error::Metadata(err) => err.user_hint(),
            Error::Preservation(err) => err.user_hint(),
            Error::Stage(err) => err.user_hint(),
            Error::Storage(err) => err.user_hint(),
            Error::Config(err) => err.user_hint(),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(err) => err.is_retryable(),
            Error::Storage(err) => err.is_retryable(),
            Error::Io { .. } => true,
            _ => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        match self {
            Error::Auth(err) => err.user_code(),
            Error::Network(err) => err.user_code(),
            Error::Metadata(err) => err.user_code(),
            Error::Preservation(err) => err.user_code(),
            Error::Stage(err) => err.user_code(),
            Error::Storage(err) => err.user_code(),
            Error::Config(err) => err.user_code(),
            Error::InvalidArgument(_) => Some("error.invalid_argument"),
            Error::Internal(_) => Some("error.internal"),
            Error::Cancelled => Some("error.cancelled"),
            Error::Io { .. } => Some("error.io"),
        }
    }
}
