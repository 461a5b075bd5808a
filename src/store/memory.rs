//! In-memory object store
//!
//! Keeps objects in an ordered map and emulates the listing semantics of an
//! S3 bucket, including delimited listings that fold deeper keys into
//! prefix entries. Used by tests and by embedders that need a throwaway
//! store.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;
use tokio::sync::RwLock;

use super::{DeleteReport, FailedDelete, ObjectStore, StorageObject, StoreError, WriteMode};
use crate::path::DELIMITER;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    content_type: String,
}

/// Object store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    refused_deletes: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make batch deletes report `key` as failed instead of removing it.
    pub fn fail_deletes_for(&self, key: &str) {
        if let Ok(mut refused) = self.refused_deletes.lock() {
            refused.insert(key.to_string());
        }
    }

    fn is_refused(&self, key: &str) -> bool {
        self.refused_deletes
            .lock()
            .map(|refused| refused.contains(key))
            .unwrap_or(false)
    }

    /// Content type recorded for `key`
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.content_type.clone())
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn display_name(&self) -> String {
        "memory://".to_string()
    }

    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        if mode == WriteMode::CreateNew && objects.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        objects.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<StorageObject>, StoreError> {
        let objects = self.objects.read().await;
        let mut entries = Vec::new();
        let mut prefixes = BTreeSet::new();

        for (key, object) in objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };

            if !recursive {
                if let Some(idx) = rest.find(DELIMITER) {
                    prefixes.insert(format!("{}{}", prefix, &rest[..=idx]));
                    continue;
                }
            }

            entries.push(StorageObject {
                key: key.clone(),
                size: object.data.len() as u64,
                content_type: Some(object.content_type.clone()),
            });
        }

        entries.extend(prefixes.into_iter().map(StorageObject::prefix));
        Ok(entries)
    }

    async fn copy(&self, dest: &str, source: &str) -> Result<(), StoreError> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get(source)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(source.to_string()))?;
        objects.insert(dest.to_string(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<DeleteReport, StoreError> {
        let mut objects = self.objects.write().await;
        let mut report = DeleteReport::default();

        for key in keys {
            if self.is_refused(key) {
                report.failed.push(FailedDelete {
                    key: key.clone(),
                    reason: "AccessDenied".to_string(),
                });
                continue;
            }
            // Absent keys count as deleted, as with S3 multi-object delete
            objects.remove(key);
            report.deleted += 1;
        }

        Ok(report)
    }
}
