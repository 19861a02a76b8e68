//! Network-related error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("connection timeout to {url}")]
    Timeout { url: String },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error {status} for {url}")]
    HttpError { status: u16, url: String },

    #[error("request failed: {0}")]
    RequestFailed(String),
}

impl NetworkError {
    /// Classify a reqwest failure for the given URL
    #[must_use]
    pub fn from_request(url: &str, message: &str, is_timeout: bool, is_connect: bool) -> Self {
        if is_timeout {
            Self::Timeout {
                url: url.to_string(),
            }
        } else if is_connect {
            Self::ConnectionRefused(format!("{url}: {message}"))
        } else {
            Self::RequestFailed(format!("{url}: {message}"))
        }
    }
}

impl UserFacingError for NetworkError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Timeout { .. } | Self::ConnectionRefused(_) => {
                Some("Check that the metadata service is reachable and retry.")
            }
            Self::InvalidUrl(_) => Some("Fix `remote.url` in the configuration file."),
            Self::HttpError { status, .. } if *status == 401 || *status == 403 => {
                Some("Verify the configured service account has access to this record.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::ConnectionRefused(_)
            | Self::DownloadFailed(_)
            | Self::RequestFailed(_) => true,
            Self::HttpError { status, .. } => *status >= 500,
            Self::InvalidUrl(_) => false,
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::Timeout { .. } => "network.timeout",
            Self::DownloadFailed(_) => "network.download_failed",
            Self::ConnectionRefused(_) => "network.connection_refused",
            Self::InvalidUrl(_) => "network.invalid_url",
            Self::HttpError { .. } => "network.http_error",
            Self::RequestFailed(_) => "network.request_failed",
        };
        Some(code)
    }
}
