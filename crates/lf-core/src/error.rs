//! # AppError
//!
//! Centralized error handling for the LucidFlow image lifecycle.
//! Maps storage and reconciliation failures to actionable error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all lf-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// A resolved path would land outside the storage root. Never retried.
    #[error("forbidden path: {} escapes the storage root", .0.display())]
    ForbiddenPath(PathBuf),

    /// Caller misuse (empty upload, blank filename, duplicate ids)
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Submitted image display indices are not exactly `0..n`
    #[error("image display indices must be sequential and contiguous starting from 0 (expected {expected}, found {found})")]
    InvalidDisplayIndex { expected: u32, found: u32 },

    /// Underlying filesystem failure (disk full, permission denied, missing move source)
    #[error("storage failure: {context}: {source}")]
    StorageFailure {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Resource not found (e.g., Post, Image)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Upload whose declared content type is not an image
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Field-level validation failure (e.g., blank title, oversized url)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn storage(context: impl Into<String>, source: io::Error) -> Self {
        Self::StorageFailure {
            context: context.into(),
            source,
        }
    }

    /// True when a storage failure was caused by the file not existing.
    pub fn is_missing_file(&self) -> bool {
        matches!(
            self,
            Self::StorageFailure { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }

    /// Validation-style failures the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// HTTP status the surrounding request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidOperation(_) | Self::InvalidDisplayIndex { .. } | Self::ValidationError(_) => 400,
            Self::ForbiddenPath(_) => 403,
            Self::NotFound(..) => 404,
            Self::UnsupportedMediaType(_) => 415,
            Self::StorageFailure { .. } | Self::Internal(_) => 500,
        }
    }
}

/// A specialized Result type for LucidFlow logic.
pub type Result<T> = std::result::Result<T, AppError>;
