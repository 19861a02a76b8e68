//! CLI error handling

use std::fmt;

use sipforge_errors::UserFacingError;

/// CLI-specific error type
#[derive(Debug)]
pub enum CliError {
    /// Operations error
    Ops(sipforge_errors::Error),
    /// I/O error
    Io(std::io::Error),
}

impl CliError {
    /// Process exit code; domain errors froze a record rather than failing
    /// the run
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Ops(e) if e.is_domain() => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Ops(e) => {
                let message = e.user_message();
                write!(f, "{message}")?;
                if let Some(code) = e.user_code() {
                    write!(f, "\n  Code: {code}")?;
                }
                if let Some(hint) = e.user_hint() {
                    write!(f, "\n  Hint: {hint}")?;
                }
                if e.is_retryable() {
                    write!(f, "\n  Retry: safe to retry this operation.")?;
                }
                Ok(())
            }
            CliError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Ops(e) => Some(e),
            CliError::Io(e) => Some(e),
        }
    }
}

impl From<sipforge_errors::Error> for CliError {
    fn from(e: sipforge_errors::Error) -> Self {
        CliError::Ops(e)
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipforge_errors::{Error, PreservationError};

    #[test]
    fn domain_errors_exit_with_two() {
        let frozen = CliError::from(Error::from(PreservationError::InvalidFilename {
            filename: "Käse.tif".to_string(),
        }));
        assert_eq!(frozen.exit_code(), 2);

        let failed = CliError::from(Error::internal("boom"));
        assert_eq!(failed.exit_code(), 1);
    }
}
