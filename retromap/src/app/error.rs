//! Application error types.

use std::fmt;

use crate::cache::CacheError;
use crate::download::DownloadError;
use crate::provider::ProviderError;

/// Errors that can occur during application setup and job execution.
#[derive(Debug)]
pub enum AppError {
    /// Failed to open the tile cache.
    CacheOpen(CacheError),

    /// Failed to connect to a provider.
    ProviderConnect(ProviderError),

    /// A download job or batch failed.
    Download(DownloadError),

    /// Configuration error.
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::CacheOpen(e) => {
                write!(f, "Failed to open tile cache: {}", e)
            }
            AppError::ProviderConnect(e) => {
                write!(f, "Failed to connect to provider: {}", e)
            }
            AppError::Download(e) => {
                write!(f, "Download failed: {}", e)
            }
            AppError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::CacheOpen(e) => Some(e),
            AppError::ProviderConnect(e) => Some(e),
            AppError::Download(e) => Some(e),
            AppError::Config(_) => None,
        }
    }
}

impl From<CacheError> for AppError {
    fn from(e: CacheError) -> Self {
        AppError::CacheOpen(e)
    }
}

impl From<ProviderError> for AppError {
    fn from(e: ProviderError) -> Self {
        AppError::ProviderConnect(e)
    }
}

impl From<DownloadError> for AppError {
    fn from(e: DownloadError) -> Self {
        AppError::Download(e)
    }
}
