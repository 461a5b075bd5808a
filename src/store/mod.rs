//! Object Store Module
//!
//! This module provides the gateway between the virtual file tree and a flat
//! key-value object store. All backends implement the `ObjectStore` trait,
//! so the folder operations above it never see store-specific details.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             ObjectStore Trait               │
//! │  put, get, exists, list, copy, delete, ...  │
//! └─────────────────────────────────────────────┘
//!                      │
//!             ┌────────┴────────┐
//!             ▼                 ▼
//!        ┌─────────┐      ┌──────────┐
//!        │   S3    │      │  Memory  │
//!        └─────────┘      └──────────┘
//! ```
//!
//! Multi-key operations (`copy_all`, `delete_all`) are built from single-key
//! calls and are not atomic: a failure midway leaves the keys processed so
//! far in their new state.

pub mod http_retry;
pub mod memory;
pub mod s3;
pub mod types;

pub use memory::MemoryStore;
pub use s3::S3Store;
pub use types::*;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::path::relative_to;

/// Unified object store trait
///
/// Implementations must be safe to share between concurrent requests; every
/// call is independent and no cursor or session state survives it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get display name for this store instance
    fn display_name(&self) -> String;

    /// Store `data` under `key`
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        mode: WriteMode,
    ) -> Result<(), StoreError>;

    /// Fetch the content stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Check if `key` resolves to a stored object
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// List keys under `prefix`
    ///
    /// Non-recursive listings return the immediate children only: objects
    /// one segment past `prefix` and one prefix entry (ending in `/`) per
    /// sub-folder. Recursive listings return every key under `prefix`.
    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<StorageObject>, StoreError>;

    /// Server-side copy of `source` to `dest`
    async fn copy(&self, dest: &str, source: &str) -> Result<(), StoreError>;

    /// Delete a single key, failing with `NotFound` if it is absent
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete a set of keys, best effort
    async fn delete_batch(&self, keys: &[String]) -> Result<DeleteReport, StoreError>;

    /// Copy every key under `source_prefix` to the same relative key under
    /// `dest_prefix`. Returns the number of copied keys.
    async fn copy_all(&self, dest_prefix: &str, source_prefix: &str) -> Result<usize, StoreError> {
        let objects = self.list(source_prefix, true).await?;
        if objects.is_empty() {
            return Err(StoreError::NotFound(source_prefix.to_string()));
        }

        for object in &objects {
            let dest = format!("{}{}", dest_prefix, relative_to(&object.key, source_prefix));
            debug!("Copying {} -> {}", object.key, dest);
            self.copy(&dest, &object.key).await?;
        }

        Ok(objects.len())
    }

    /// Delete every key under `prefix`
    ///
    /// An empty prefix is `NotFound`, never a silent no-op.
    async fn delete_all(&self, prefix: &str) -> Result<DeleteReport, StoreError> {
        let keys: Vec<String> = self
            .list(prefix, true)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();

        if keys.is_empty() {
            return Err(StoreError::NotFound(prefix.to_string()));
        }

        let report = self.delete_batch(&keys).await?;
        for failure in &report.failed {
            warn!("Failed to delete {}: {}", failure.key, failure.reason);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for key in ["root/a/", "root/a/x.txt", "root/a/sub/y.txt", "root/b.txt"] {
            store
                .put(key, b"data".to_vec(), DEFAULT_CONTENT_TYPE, WriteMode::Overwrite)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_copy_all_preserves_relative_keys() {
        let store = seeded().await;
        let copied = store.copy_all("root/c/", "root/a/").await.unwrap();
        assert_eq!(copied, 3);
        assert!(store.exists("root/c/").await.unwrap());
        assert!(store.exists("root/c/x.txt").await.unwrap());
        assert!(store.exists("root/c/sub/y.txt").await.unwrap());
        // source untouched
        assert!(store.exists("root/a/x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_all_empty_prefix_is_not_found() {
        let store = seeded().await;
        let err = store.copy_all("root/d/", "root/missing/").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = seeded().await;
        let report = store.delete_all("root/a/").await.unwrap();
        assert_eq!(report.deleted, 3);
        assert!(report.is_complete());
        assert!(store.list("root/a/", true).await.unwrap().is_empty());
        assert!(store.exists("root/b.txt").await.unwrap());

        let err = store.delete_all("root/a/").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_all_is_best_effort() {
        let store = seeded().await;
        store.fail_deletes_for("root/a/x.txt");

        let report = store.delete_all("root/a/").await.unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed_keys(), vec!["root/a/x.txt".to_string()]);
        assert!(store.exists("root/a/x.txt").await.unwrap());
        assert!(!store.exists("root/a/sub/y.txt").await.unwrap());
    }
}
