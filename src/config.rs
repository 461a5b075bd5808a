// Storage configuration
// Immutable settings handed to the object store and the file service at construction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::archive::DEFAULT_COMPRESSION_LEVEL;
use crate::path::{KeyCodec, DEFAULT_USER_ROOT_FORMAT, DELIMITER, USER_ID_PLACEHOLDER};
use crate::store::http_retry::HttpRetryConfig;

/// Environment variables taking precedence over the config file
pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_BUCKET: &str = "CFS_BUCKET";
pub const ENV_ENDPOINT: &str = "CFS_S3_ENDPOINT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings of the file service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket shared by all users
    pub bucket: String,
    /// Key prefix of a user's tree, `{id}` is replaced by the user id
    pub user_root_format: String,
    /// Connection to the S3-compatible store
    pub s3: S3Settings,
    /// Retry of transient HTTP failures
    pub retry: HttpRetryConfig,
    /// Deflate level of folder downloads (0 = stored)
    pub zip_compression_level: i64,
    /// Refuse to overwrite on upload and folder creation at the store level
    pub conditional_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            user_root_format: DEFAULT_USER_ROOT_FORMAT.to_string(),
            s3: S3Settings::default(),
            retry: HttpRetryConfig::default(),
            zip_compression_level: DEFAULT_COMPRESSION_LEVEL,
            conditional_writes: true,
        }
    }
}

impl StorageConfig {
    /// Path codec for the configured user root format
    pub fn codec(&self) -> KeyCodec {
        KeyCodec::new(self.user_root_format.clone())
    }
}

/// S3 connection parameters as stored on disk
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Path-style addressing; defaults to true when `endpoint` is set
    pub path_style: Option<bool>,
    pub timeout_secs: u64,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            path_style: None,
            timeout_secs: 60,
        }
    }
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("path_style", &self.path_style)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Get the default path of the config file
pub fn default_config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
    config_dir.join("cloud-file-storage").join("config.json")
}

/// Load configuration from `path`.
///
/// A missing file yields the defaults; a file that cannot be read or parsed
/// is an error.
pub fn load_config(path: &Path) -> Result<StorageConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config file at {:?}, using defaults", path);
        return Ok(StorageConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str(&content).map_err(|e| {
        tracing::warn!("Failed to parse config {:?}: {}", path, e);
        e
    })?;
    Ok(config)
}

/// Save configuration to `path`, creating its directory if needed
pub fn save_config(config: &StorageConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Apply overrides from the process environment
pub fn apply_env_overrides(config: &mut StorageConfig) {
    apply_overrides(config, |name| std::env::var(name).ok());
}

/// Apply overrides looked up by variable name. Empty values are ignored.
pub fn apply_overrides<F>(config: &mut StorageConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(bucket) = get(ENV_BUCKET) {
        config.bucket = bucket;
    }
    if let Some(endpoint) = get(ENV_ENDPOINT) {
        config.s3.endpoint = Some(endpoint);
    }
    if let Some(region) = get(ENV_REGION) {
        config.s3.region = region;
    }
    if let Some(key) = get(ENV_ACCESS_KEY_ID) {
        config.s3.access_key_id = Some(key);
    }
    if let Some(secret) = get(ENV_SECRET_ACCESS_KEY) {
        config.s3.secret_access_key = Some(secret);
    }
}

/// Validate storage configuration
pub fn validate_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.bucket.trim().is_empty() {
        return Err(ConfigError::Invalid("Bucket name cannot be empty".to_string()));
    }

    let format = &config.user_root_format;
    if !format.contains(USER_ID_PLACEHOLDER) {
        return Err(ConfigError::Invalid(format!(
            "User root format must contain {}",
            USER_ID_PLACEHOLDER
        )));
    }
    if format.contains(DELIMITER) {
        return Err(ConfigError::Invalid(format!(
            "User root format '{}' must not contain '{}'",
            format, DELIMITER
        )));
    }

    if !(0..=9).contains(&config.zip_compression_level) {
        return Err(ConfigError::Invalid(format!(
            "Zip compression level {} is outside 0..=9",
            config.zip_compression_level
        )));
    }

    if config.s3.region.trim().is_empty() {
        return Err(ConfigError::Invalid("Region cannot be empty".to_string()));
    }

    Ok(())
}
