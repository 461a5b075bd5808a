//! Errors reported by the file service
//!
//! Every message names the user-visible file or folder involved. Backend
//! failures are logged with their full context where they occur and reach
//! callers only as `Unexpected`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FileStorageError {
    /// The addressed file or folder does not exist
    #[error("{0}")]
    NotFound(String),

    /// The destination name is already taken
    #[error("{0}")]
    Conflict(String),

    /// A path or name does not follow the path grammar
    #[error("{0}")]
    InvalidPath(String),

    /// The uploaded content could not be read
    #[error("{0}")]
    Storage(String),

    /// Some objects of a folder could not be deleted
    #[error("{message} ({} objects left behind)", .failed.len())]
    PartialDelete { message: String, failed: Vec<String> },

    /// The object store failed
    #[error("{0}")]
    Unexpected(String),
}

impl FileStorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FileStorageError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, FileStorageError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, FileStorageError>;
