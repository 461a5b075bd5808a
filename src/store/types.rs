//! Shared types for object store backends
//!
//! This module contains the types exchanged with every backend: the listing
//! record, write and delete outcomes, the S3 connection settings and the
//! gateway error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::StorageConfig;
use crate::path::DELIMITER;

/// Content type stored on zero-byte folder marker objects
pub const FOLDER_CONTENT_TYPE: &str = "application/x-directory";

/// Fallback content type for uploads without one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// One entry of a key listing
///
/// Whether an object is a folder is inferred from its key alone: folder
/// markers and delimited prefixes end with `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Full object key
    pub key: String,
    /// Size in bytes (0 for markers and prefixes)
    pub size: u64,
    /// Content type, when the listing reports one
    pub content_type: Option<String>,
}

impl StorageObject {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            content_type: None,
        }
    }

    /// Prefix entry reported by a delimited listing
    pub fn prefix(key: impl Into<String>) -> Self {
        Self::new(key, 0)
    }

    pub fn is_folder(&self) -> bool {
        self.key.ends_with(DELIMITER)
    }
}

/// How `put` treats an already existing key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace whatever is stored under the key
    #[default]
    Overwrite,
    /// Fail with `AlreadyExists` if the key is taken
    CreateNew,
}

/// Outcome of a batch delete
///
/// Deletion is best effort: every key that could be removed is removed and
/// the rest are reported in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Number of keys removed
    pub deleted: usize,
    /// Keys the backend refused to remove, with its reason
    pub failed: Vec<FailedDelete>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: DeleteReport) {
        self.deleted += other.deleted;
        self.failed.extend(other.failed);
    }

    pub fn failed_keys(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.key.clone()).collect()
    }
}

/// A key left behind by a batch delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelete {
    pub key: String,
    pub reason: String,
}

/// S3-specific configuration
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3-compatible endpoint URL (empty for AWS S3)
    pub endpoint: Option<String>,
    /// AWS region (e.g., us-east-1)
    pub region: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key (SecretString for memory zeroization)
    pub secret_access_key: secrecy::SecretString,
    /// Bucket shared by all users
    pub bucket: String,
    /// Use path-style addressing (for MinIO, etc.)
    pub path_style: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Send `If-None-Match: *` for `WriteMode::CreateNew`
    pub conditional_writes: bool,
}

impl S3Config {
    pub fn from_storage_config(config: &StorageConfig) -> Result<Self, StoreError> {
        let bucket = config.bucket.trim().to_string();
        if bucket.is_empty() {
            return Err(StoreError::InvalidConfig("S3 bucket name is required".to_string()));
        }

        let s3 = &config.s3;
        let endpoint = match s3.endpoint.as_deref().map(str::trim) {
            None | Some("") | Some("s3.amazonaws.com") => None,
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                Some(host.to_string())
            }
            // Ensure endpoint has scheme
            Some(host) => Some(format!("https://{}", host)),
        };

        // Default to path style for custom endpoints
        let path_style = s3.path_style.unwrap_or(endpoint.is_some());

        Ok(Self {
            endpoint,
            region: s3.region.trim().to_string(),
            access_key_id: s3.access_key_id.clone().unwrap_or_default(),
            secret_access_key: secrecy::SecretString::from(
                s3.secret_access_key.clone().unwrap_or_default(),
            ),
            bucket,
            path_style,
            timeout_secs: s3.timeout_secs,
            conditional_writes: config.conditional_writes,
        })
    }
}

/// Object store error type
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Server error: {0}")]
    ServerError(String),
}

impl StoreError {
    /// Check if this error is transient (a later attempt may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::NetworkError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StoreError::Timeout
        } else {
            StoreError::NetworkError(e.to_string())
        }
    }
}
