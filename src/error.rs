//! Error types for the trade-thread library.
//!
//! Domain rejections (`Forbidden`, `Conflict`, ...) and infrastructure failures
//! share one `thiserror` enum so every operation returns a single `Result`
//! type the transport layer can map to a status code.

use thiserror::Error;

/// Errors that can occur in the trade-thread library.
#[derive(Error, Debug)]
pub enum TradeError {
    /// Caller is not allowed to perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness violation (duplicate claim, duplicate rating)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Edit/delete window has elapsed
    #[error("Expired: {0}")]
    Expired(String),

    /// Item or message absent, or message already deleted
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed validation
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Transaction state does not allow the action
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with TradeError
pub type Result<T> = std::result::Result<T, TradeError>;

impl TradeError {
    /// HTTP status a transport layer should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Forbidden(_) | Self::Expired(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::ValidationFailed(_) => 422,
            Self::PreconditionFailed(_) => 400,
            _ => 500,
        }
    }

    /// True for domain rejections, false for infrastructure failures.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        self.status_code() < 500
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Expired(_) => "expired",
            Self::NotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::Database(_) | Self::Pool(_) => "database",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}
