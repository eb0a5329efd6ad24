use thiserror::Error;

/// Main error type for the catalog.
#[derive(Error, Debug)]
pub enum AppError {
    /// Entity construction or insert rejected by an invariant.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend failure (query, commit, schema).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Bulk import failure.
    #[error("Import error: {0}")]
    Import(String),

    /// Registration or login rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Whether this error was raised by entity validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }
}

/// Result type alias for the catalog.
pub type Result<T> = std::result::Result<T, AppError>;
