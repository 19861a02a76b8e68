//! Authentication error types

use std::borrow::Cow;

use crate::UserFacingError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("credential exchange with {host} failed: {message}")]
    ExchangeFailed { host: String, message: String },

    #[error("session response from {host} did not contain a session key")]
    MissingSessionKey { host: String },

    #[error("failed to lock session cache {path}: {message}")]
    LockFailed { path: String, message: String },

    #[error("failed to persist session key to {path}: {message}")]
    PersistFailed { path: String, message: String },
}

impl UserFacingError for AuthError {
    fn user_message(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::ExchangeFailed { .. } | Self::MissingSessionKey { .. } => {
                Some("Check `remote.username` and `remote.password` in the configuration file.")
            }
            Self::LockFailed { .. } | Self::PersistFailed { .. } => {
                Some("Ensure the session cache directory is writable.")
            }
        }
    }

    fn user_code(&self) -> Option<&'static str> {
        let code = match self {
            Self::ExchangeFailed { .. } => "auth.exchange_failed",
            Self::MissingSessionKey { .. } => "auth.missing_session_key",
            Self::LockFailed { .. } => "auth.lock_failed",
            Self::PersistFailed { .. } => "auth.persist_failed",
        };
        Some(code)
    }
}
