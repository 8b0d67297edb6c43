//! CLI error types.

use std::fmt;

use retromap::{AppError, DownloadError};

/// Errors surfaced by CLI commands, mapped onto exit codes in `main`.
#[derive(Debug)]
pub enum CliError {
    /// Invalid arguments or configuration (exit code 2).
    Usage(String),

    /// A download job or batch failed (exit code 1).
    Job(String),

    /// Setup failure: cache, provider connection, output directory
    /// (exit code 1).
    Setup(String),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            CliError::Job(_) | CliError::Setup(_) => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Job(msg) => write!(f, "Job failed: {}", msg),
            CliError::Setup(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Config(msg) => CliError::Usage(msg),
            AppError::Download(d) => d.into(),
            other => CliError::Setup(other.to_string()),
        }
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        match e {
            DownloadError::Provider(retromap::ProviderError::Coord(c)) => {
                CliError::Usage(c.to_string())
            }
            other => CliError::Job(other.to_string()),
        }
    }
}
