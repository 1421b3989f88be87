use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Record is read-only: {0}")]
    ReadOnly(String),

    #[error("Failed to persist database '{}': {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("Failed to parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Stable machine-readable code, surfaced by health and admin tooling.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ReadOnly(_) => "READ_ONLY",
            Self::Persistence { .. } => "PERSISTENCE",
            Self::Parse { .. } => "PARSE",
            Self::ShapeMismatch(_) => "SHAPE_MISMATCH",
            Self::CollectionNotFound(_) => "COLLECTION_NOT_FOUND",
            Self::LockError(_) => "LOCK",
            Self::IoError(_) => "IO",
            Self::Config(_) => "CONFIG",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
