//! File service
//!
//! The user-facing operations over a virtual file tree: upload, folder
//! creation, listing, search, rename, delete and downloads. Every call is
//! independent. The service keeps no state besides its configuration, and the
//! object store is the only source of truth.
//!
//! Operations touching several keys (folder rename, folder delete) are
//! sequences of single-key store calls and are not atomic. A failure midway
//! leaves the keys processed so far in their new state and is reported to the
//! caller; nothing is rolled back or retried here.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};

use crate::archive::{ZipAssembler, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{FileStorageError, Result};
use crate::path::{self, KeyCodec, UserId, DELIMITER, ROOT};
use crate::store::{
    DeleteReport, ObjectStore, StoreError, WriteMode, DEFAULT_CONTENT_TYPE, FOLDER_CONTENT_TYPE,
};
use crate::tree::{self, ListingEntry};

/// Virtual file system of every user, kept in one object store
pub struct FileStorageService {
    store: Arc<dyn ObjectStore>,
    codec: KeyCodec,
    compression_level: i64,
}

impl FileStorageService {
    pub fn new(store: Arc<dyn ObjectStore>, codec: KeyCodec) -> Self {
        Self {
            store,
            codec,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Deflate level used by folder downloads (0 = stored)
    pub fn with_compression_level(mut self, level: i64) -> Self {
        self.compression_level = level;
        self
    }

    /// Store `content` as `file_name` inside `folder_path`.
    ///
    /// Fails with `Conflict` if a file or folder of that name exists. Nothing
    /// is written when reading `content` fails.
    pub async fn upload<R>(
        &self,
        user_id: UserId,
        file_name: &str,
        mut content: R,
        size: u64,
        content_type: &str,
        folder_path: &str,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        require_folder_path(folder_path)?;
        require_name(file_name)?;

        let path = format!("{}{}", folder_path, file_name);
        let key = self.codec.to_object_key(user_id, &path);
        self.ensure_vacant(&key, file_name, "upload file").await?;

        let mut data = Vec::with_capacity(size.min(64 * 1024 * 1024) as usize);
        if let Err(e) = content.read_to_end(&mut data).await {
            error!("Failed to read upload of {} for user {}: {}", path, user_id, e);
            return Err(FileStorageError::Storage(format!(
                "Unable to upload file: {}",
                file_name
            )));
        }
        if data.len() as u64 != size {
            error!(
                "Upload of {} for user {} announced {} bytes but sent {}",
                path, user_id, size, data.len()
            );
            return Err(FileStorageError::Storage(format!(
                "Unable to upload file: {}",
                file_name
            )));
        }

        let content_type = if content_type.trim().is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };

        self.store
            .put(&key, data, content_type, WriteMode::CreateNew)
            .await
            .map_err(|e| self.map_store_error(e, "upload file", file_name))?;

        info!("User {} uploaded {} ({} bytes)", user_id, path, size);
        Ok(())
    }

    /// Create an empty folder `name` inside `folder_path`.
    pub async fn create_folder(&self, user_id: UserId, name: &str, folder_path: &str) -> Result<()> {
        require_folder_path(folder_path)?;
        require_name(name)?;

        let path = format!("{}{}{}", folder_path, name, DELIMITER);
        let key = self.codec.to_object_key(user_id, &path);
        self.ensure_vacant(&key, name, "create folder").await?;

        self.store
            .put(&key, Vec::new(), FOLDER_CONTENT_TYPE, WriteMode::CreateNew)
            .await
            .map_err(|e| self.map_store_error(e, "create folder", name))?;

        info!("User {} created folder {}", user_id, path);
        Ok(())
    }

    /// Immediate children of `folder_path`, folders first.
    ///
    /// A folder exists when its marker exists or any key lies below it.
    pub async fn list(&self, user_id: UserId, folder_path: &str) -> Result<Vec<ListingEntry>> {
        require_valid_path(folder_path)?;
        if !path::is_folder(folder_path) {
            return Err(FileStorageError::NotFound(format!(
                "'{}' is not a folder",
                folder_path
            )));
        }

        let key = self.codec.to_object_key(user_id, folder_path);
        let objects = self
            .store
            .list(&key, false)
            .await
            .map_err(|e| self.map_store_error(e, "list folder", display_name(folder_path)))?;

        if objects.is_empty() && folder_path != ROOT {
            warn!("User {} listed missing folder {}", user_id, folder_path);
            return Err(FileStorageError::NotFound(format!(
                "Folder '{}' does not exist",
                folder_path
            )));
        }

        let entries = tree::children(&objects, &key, &self.codec.user_root(user_id));
        debug!("Listed {} entries in {} for user {}", entries.len(), folder_path, user_id);
        Ok(entries)
    }

    /// Files and folders of the user whose name contains `query`.
    ///
    /// Folders only implied by nested keys are found as well.
    pub async fn search(&self, user_id: UserId, query: &str) -> Result<Vec<ListingEntry>> {
        let root_key = self.codec.to_object_key(user_id, ROOT);
        let objects = self
            .store
            .list(&root_key, true)
            .await
            .map_err(|e| self.map_store_error(e, "search", query))?;

        let found = tree::search(&objects, &self.codec.user_root(user_id), query);
        debug!(
            "Search '{}' for user {} scanned {} keys, {} matches",
            query,
            user_id,
            objects.len(),
            found.len()
        );
        Ok(found)
    }

    /// Give the file or folder at `path` the leaf name `new_name`.
    ///
    /// Folders are copied key by key and the source removed afterwards.
    pub async fn rename(&self, user_id: UserId, new_name: &str, path: &str) -> Result<()> {
        require_valid_path(path)?;
        require_name(new_name)?;
        require_not_root(path, "rename")?;

        let name = display_name(path);
        let dest_path = path::renamed_path(path, new_name);
        let source_key = self.codec.to_object_key(user_id, path);
        let dest_key = self.codec.to_object_key(user_id, &dest_path);
        let missing = || format!("Unable to rename '{}' because it does not exist", name);

        self.ensure_vacant(&dest_key, new_name, "rename").await?;

        if path::is_folder(path) {
            let copied = self
                .store
                .copy_all(&dest_key, &source_key)
                .await
                .map_err(|e| self.map_not_found(e, "rename", name, missing()))?;
            debug!("Copied {} keys from {} to {}", copied, path, dest_path);

            let report = self
                .store
                .delete_all(&source_key)
                .await
                .map_err(|e| self.map_not_found(e, "rename", name, missing()))?;
            self.check_report(user_id, report, format!("Unable to rename '{}'", name))?;
        } else {
            self.store
                .copy(&dest_key, &source_key)
                .await
                .map_err(|e| self.map_not_found(e, "rename", name, missing()))?;
            self.store
                .delete(&source_key)
                .await
                .map_err(|e| self.map_not_found(e, "rename", name, missing()))?;
        }

        info!("User {} renamed {} to {}", user_id, path, dest_path);
        Ok(())
    }

    /// Delete the file or the whole folder at `path`.
    pub async fn delete(&self, user_id: UserId, path: &str) -> Result<()> {
        require_valid_path(path)?;
        require_not_root(path, "delete")?;

        let name = display_name(path);
        let key = self.codec.to_object_key(user_id, path);
        let missing = || format!("Unable to delete '{}' because it does not exist", name);

        if path::is_folder(path) {
            let report = self
                .store
                .delete_all(&key)
                .await
                .map_err(|e| self.map_not_found(e, "delete", name, missing()))?;
            self.check_report(user_id, report, format!("Unable to delete '{}'", name))?;
        } else {
            self.store
                .delete(&key)
                .await
                .map_err(|e| self.map_not_found(e, "delete", name, missing()))?;
        }

        info!("User {} deleted {}", user_id, path);
        Ok(())
    }

    /// Content of the file at `path`
    pub async fn download_file(&self, user_id: UserId, path: &str) -> Result<Vec<u8>> {
        require_valid_path(path)?;
        if path::is_folder(path) {
            return Err(FileStorageError::InvalidPath(format!(
                "'{}' is a folder, download it as a zip archive",
                path
            )));
        }

        let name = display_name(path);
        let key = self.codec.to_object_key(user_id, path);
        let missing = || format!("Unable to download file '{}' because it does not exist", name);

        self.store
            .get(&key)
            .await
            .map_err(|e| self.map_not_found(e, "download file", name, missing()))
    }

    /// Zip archive of everything below the folder at `path`.
    ///
    /// Entry names are relative to the folder; sub-folders appear as
    /// directory entries.
    pub async fn download_folder_as_zip(&self, user_id: UserId, path: &str) -> Result<Vec<u8>> {
        require_valid_path(path)?;
        if !path::is_folder(path) {
            return Err(FileStorageError::InvalidPath(format!("'{}' is not a folder", path)));
        }

        let name = display_name(path);
        let key = self.codec.to_object_key(user_id, path);
        let missing = || format!("Unable to download folder '{}' because it does not exist", name);

        let objects = self
            .store
            .list(&key, true)
            .await
            .map_err(|e| self.map_store_error(e, "download folder", name))?;
        if objects.is_empty() {
            warn!("User {} requested zip of missing folder {}", user_id, path);
            return Err(FileStorageError::NotFound(missing()));
        }

        let mut assembler = ZipAssembler::in_memory(&key, self.compression_level);
        for object in &objects {
            let data = if object.is_folder() {
                Vec::new()
            } else {
                self.store
                    .get(&object.key)
                    .await
                    .map_err(|e| self.map_not_found(e, "download folder", name, missing()))?
            };

            assembler.append(&object.key, &mut data.as_slice()).map_err(|e| {
                error!("Failed to add {} to archive: {}", object.key, e);
                FileStorageError::Unexpected(format!("Unable to download folder: {}", name))
            })?;
        }

        let entries = assembler.entries();
        let archive = assembler.finish().map_err(|e| {
            error!("Failed to finish archive of {}: {}", path, e);
            FileStorageError::Unexpected(format!("Unable to download folder: {}", name))
        })?;

        info!("User {} downloaded {} as zip ({} entries)", user_id, path, entries);
        Ok(archive.into_inner())
    }

    /// Fail with `Conflict` when `key` or its file/folder twin is taken.
    async fn ensure_vacant(&self, key: &str, name: &str, operation: &str) -> Result<()> {
        let taken = self
            .is_taken(key)
            .await
            .map_err(|e| self.map_store_error(e, operation, name))?;

        if taken {
            info!("Refusing to {} over existing {}", operation, key);
            return Err(conflict(name));
        }
        Ok(())
    }

    async fn is_taken(&self, key: &str) -> std::result::Result<bool, StoreError> {
        let (file_key, folder_key) = match key.strip_suffix(DELIMITER) {
            Some(file) => (file.to_string(), key.to_string()),
            None => (key.to_string(), format!("{}{}", key, DELIMITER)),
        };

        if self.store.exists(&file_key).await? {
            return Ok(true);
        }
        // Folders without a marker still occupy their name
        Ok(!self.store.list(&folder_key, false).await?.is_empty())
    }

    fn check_report(&self, user_id: UserId, report: DeleteReport, message: String) -> Result<()> {
        if report.is_complete() {
            return Ok(());
        }

        let failed: Vec<String> = report
            .failed_keys()
            .iter()
            .map(|key| self.codec.to_virtual_path(user_id, key))
            .collect();
        warn!(
            "{}: {} deleted, {} left behind for user {}",
            message,
            report.deleted,
            failed.len(),
            user_id
        );
        Err(FileStorageError::PartialDelete { message, failed })
    }

    fn map_not_found(&self, err: StoreError, operation: &str, name: &str, message: String) -> FileStorageError {
        if err.is_not_found() {
            warn!("{}", message);
            FileStorageError::NotFound(message)
        } else {
            self.map_store_error(err, operation, name)
        }
    }

    fn map_store_error(&self, err: StoreError, operation: &str, name: &str) -> FileStorageError {
        match err {
            StoreError::AlreadyExists(key) => {
                info!("Lost race to {} at {}", operation, key);
                conflict(name)
            }
            StoreError::NotFound(key) => {
                warn!("Object vanished during {}: {}", operation, key);
                FileStorageError::NotFound(format!("'{}' does not exist", name))
            }
            other if other.is_recoverable() => {
                warn!(
                    "Object store {} gave up on {} '{}' after retries: {}",
                    self.store.display_name(),
                    operation,
                    name,
                    other
                );
                FileStorageError::Unexpected(format!("Unable to {}: {}", operation, name))
            }
            other => {
                error!(
                    "Object store {} failed to {} '{}': {}",
                    self.store.display_name(),
                    operation,
                    name,
                    other
                );
                FileStorageError::Unexpected(format!("Unable to {}: {}", operation, name))
            }
        }
    }
}

fn conflict(name: &str) -> FileStorageError {
    FileStorageError::Conflict(format!(
        "There is already a file or folder with name '{}'",
        name
    ))
}

/// Leaf name for messages; the root is shown as `/`
fn display_name(path: &str) -> &str {
    match path::leaf_name(path) {
        "" => ROOT,
        leaf => leaf,
    }
}

fn require_valid_path(path: &str) -> Result<()> {
    if path::is_valid_path(path) {
        Ok(())
    } else {
        Err(FileStorageError::InvalidPath(format!("Invalid path '{}'", path)))
    }
}

fn require_folder_path(path: &str) -> Result<()> {
    require_valid_path(path)?;
    if path::is_folder(path) {
        Ok(())
    } else {
        Err(FileStorageError::InvalidPath(format!("'{}' is not a folder", path)))
    }
}

fn require_name(name: &str) -> Result<()> {
    if path::is_valid_name(name) {
        Ok(())
    } else {
        Err(FileStorageError::InvalidPath(format!("Invalid name '{}'", name)))
    }
}

fn require_not_root(path: &str, operation: &str) -> Result<()> {
    if path == ROOT {
        Err(FileStorageError::InvalidPath(format!("Unable to {} the root folder", operation)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StorageObject};
    use async_trait::async_trait;
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    const USER: UserId = 1;

    fn service() -> (FileStorageService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = FileStorageService::new(store.clone(), KeyCodec::default());
        (service, store)
    }

    async fn upload(service: &FileStorageService, folder: &str, name: &str, data: &[u8]) {
        service
            .upload(USER, name, data, data.len() as u64, "text/plain", folder)
            .await
            .unwrap();
    }

    fn names(entries: &[ListingEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Store where another writer claims every key just before each put
    struct RacingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ObjectStore for RacingStore {
        fn display_name(&self) -> String {
            "racing".to_string()
        }

        async fn put(
            &self,
            key: &str,
            data: Vec<u8>,
            content_type: &str,
            mode: WriteMode,
        ) -> std::result::Result<(), StoreError> {
            self.inner
                .put(key, b"other".to_vec(), content_type, WriteMode::Overwrite)
                .await?;
            self.inner.put(key, data, content_type, mode).await
        }

        async fn get(&self, key: &str) -> std::result::Result<Vec<u8>, StoreError> {
            self.inner.get(key).await
        }

        async fn exists(&self, key: &str) -> std::result::Result<bool, StoreError> {
            self.inner.exists(key).await
        }

        async fn list(
            &self,
            prefix: &str,
            recursive: bool,
        ) -> std::result::Result<Vec<StorageObject>, StoreError> {
            self.inner.list(prefix, recursive).await
        }

        async fn copy(&self, dest: &str, source: &str) -> std::result::Result<(), StoreError> {
            self.inner.copy(dest, source).await
        }

        async fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn delete_batch(
            &self,
            keys: &[String],
        ) -> std::result::Result<DeleteReport, StoreError> {
            self.inner.delete_batch(keys).await
        }
    }

    #[tokio::test]
    async fn test_upload_then_list() {
        let (service, store) = service();
        service.create_folder(USER, "docs", "/").await.unwrap();
        upload(&service, "/docs/", "report.pdf", b"%PDF").await;

        let entries = service.list(USER, "/docs/").await.unwrap();
        assert_eq!(entries, vec![ListingEntry::file("report.pdf", "/docs/report.pdf")]);
        assert_eq!(
            store.content_type("user-1-files/docs/").await.as_deref(),
            Some(FOLDER_CONTENT_TYPE)
        );
        assert_eq!(
            store.content_type("user-1-files/docs/report.pdf").await.as_deref(),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn test_create_folder_twice_conflicts() {
        let (service, _) = service();
        service.create_folder(USER, "photos", "/").await.unwrap();
        let err = service.create_folder(USER, "photos", "/").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "There is already a file or folder with name 'photos'");
    }

    #[tokio::test]
    async fn test_file_and_folder_names_collide() {
        let (service, _) = service();
        upload(&service, "/", "notes", b"n").await;
        assert!(service.create_folder(USER, "notes", "/").await.unwrap_err().is_conflict());

        // a folder implied by a nested upload also occupies its name
        upload(&service, "/music/", "song.mp3", b"m").await;
        let err = service
            .upload(USER, "music", &b"x"[..], 1, "text/plain", "/")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_names_and_paths() {
        let (service, store) = service();
        for name in ["", "..", "a/b"] {
            let err = service.upload(USER, name, &b""[..], 0, "", "/").await.unwrap_err();
            assert!(matches!(err, FileStorageError::InvalidPath(_)), "{} accepted", name);
        }
        let err = service.upload(USER, "a", &b""[..], 0, "", "/docs").await.unwrap_err();
        assert!(matches!(err, FileStorageError::InvalidPath(_)));
        let err = service.create_folder(USER, "x", "//").await.unwrap_err();
        assert!(matches!(err, FileStorageError::InvalidPath(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_dot_segments_never_leave_the_user_root() {
        let (service, store) = service();
        service
            .upload(2, "secret.txt", &b"s3cret"[..], 6, "text/plain", "/")
            .await
            .unwrap();
        upload(&service, "/a/", "b.txt", b"b").await;

        let invalid = |err: FileStorageError| matches!(err, FileStorageError::InvalidPath(_));
        assert!(invalid(
            service.download_file(USER, "/../user-2-files/secret.txt").await.unwrap_err()
        ));
        assert!(invalid(
            service
                .upload(USER, "secret.txt", &b"x"[..], 1, "text/plain", "/../user-2-files/")
                .await
                .unwrap_err()
        ));
        assert!(invalid(service.delete(USER, "/../user-2-files/secret.txt").await.unwrap_err()));
        assert!(invalid(service.delete(USER, "/a/../").await.unwrap_err()));
        assert!(invalid(service.list(USER, "/a/./").await.unwrap_err()));
        assert!(invalid(service.rename(USER, "c.txt", "/a/./b.txt").await.unwrap_err()));
        assert!(invalid(service.download_folder_as_zip(USER, "/a/../").await.unwrap_err()));

        assert_eq!(store.get("user-2-files/secret.txt").await.unwrap(), b"s3cret".to_vec());
        assert!(store.exists("user-1-files/a/b.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_lost_create_race_is_a_conflict() {
        let store = Arc::new(RacingStore {
            inner: MemoryStore::new(),
        });
        let service = FileStorageService::new(store.clone(), KeyCodec::default());

        let err = service
            .upload(USER, "a.txt", &b"mine"[..], 4, "text/plain", "/")
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "There is already a file or folder with name 'a.txt'");
        // the competing writer's content is left alone
        assert_eq!(store.inner.get("user-1-files/a.txt").await.unwrap(), b"other".to_vec());

        let err = service.create_folder(USER, "docs", "/").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_short_upload_writes_nothing() {
        let (service, store) = service();
        let err = service
            .upload(USER, "a.txt", &b"abc"[..], 10, "text/plain", "/")
            .await
            .unwrap_err();
        assert!(matches!(err, FileStorageError::Storage(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_sorts_and_skips_self() {
        let (service, _) = service();
        service.create_folder(USER, "docs", "/").await.unwrap();
        upload(&service, "/docs/", "b.txt", b"b").await;
        upload(&service, "/docs/", "A.txt", b"a").await;
        service.create_folder(USER, "zeta", "/docs/").await.unwrap();
        upload(&service, "/docs/Alpha/", "deep.txt", b"d").await;

        let entries = service.list(USER, "/docs/").await.unwrap();
        assert_eq!(names(&entries), vec!["Alpha", "zeta", "A.txt", "b.txt"]);
        assert!(entries.iter().all(|e| e.path != "/docs/"));

        let root = service.list(USER, "/").await.unwrap();
        assert_eq!(root, vec![ListingEntry::folder("docs", "/docs/")]);
    }

    #[tokio::test]
    async fn test_list_missing_or_file_is_not_found() {
        let (service, _) = service();
        upload(&service, "/", "a.txt", b"a").await;

        assert!(service.list(USER, "/nope/").await.unwrap_err().is_not_found());
        assert!(service.list(USER, "/a.txt").await.unwrap_err().is_not_found());
        // an empty root is still listable
        assert!(service.list(2, "/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let (service, _) = service();
        upload(&service, "/", "mine.txt", b"1").await;
        service
            .upload(10, "theirs.txt", &b"2"[..], 1, "text/plain", "/")
            .await
            .unwrap();

        assert_eq!(names(&service.list(USER, "/").await.unwrap()), vec!["mine.txt"]);
        assert_eq!(names(&service.search(USER, "txt").await.unwrap()), vec!["mine.txt"]);
    }

    #[tokio::test]
    async fn test_search_finds_implied_folders() {
        let (service, _) = service();
        upload(&service, "/a/b/", "x.txt", b"x").await;
        upload(&service, "/x/", "y.txt", b"y").await;

        let found = service.search(USER, "x").await.unwrap();
        assert!(found.contains(&ListingEntry::file("x.txt", "/a/b/")));
        let folder = found.iter().find(|e| e.is_folder).unwrap();
        assert_eq!((folder.display_name().as_str(), path::parent_folder(&folder.path)), ("x/", "/"));
        // "y.txt" matches through its extension
        assert!(found.contains(&ListingEntry::file("y.txt", "/x/")));
        assert_eq!(found.len(), 3);
    }

    #[tokio::test]
    async fn test_rename_folder() {
        let (service, _) = service();
        upload(&service, "/x/", "a.txt", b"a").await;
        upload(&service, "/x/sub/", "b.txt", b"b").await;

        service.rename(USER, "y", "/x/").await.unwrap();

        assert_eq!(names(&service.list(USER, "/y/").await.unwrap()), vec!["sub", "a.txt"]);
        assert!(service.list(USER, "/x/").await.unwrap_err().is_not_found());
        assert_eq!(service.download_file(USER, "/y/sub/b.txt").await.unwrap(), b"b".to_vec());
    }

    #[tokio::test]
    async fn test_rename_file() {
        let (service, _) = service();
        upload(&service, "/docs/", "old.txt", b"content").await;

        service.rename(USER, "new.txt", "/docs/old.txt").await.unwrap();

        assert_eq!(
            service.download_file(USER, "/docs/new.txt").await.unwrap(),
            b"content".to_vec()
        );
        assert!(service
            .download_file(USER, "/docs/old.txt")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_rename_conflicts_and_missing() {
        let (service, _) = service();
        upload(&service, "/", "a.txt", b"a").await;
        upload(&service, "/", "b.txt", b"b").await;

        assert!(service.rename(USER, "b.txt", "/a.txt").await.unwrap_err().is_conflict());

        let err = service.rename(USER, "d", "/c/").await.unwrap_err();
        assert_eq!(err, FileStorageError::NotFound("Unable to rename 'c' because it does not exist".into()));

        let err = service.rename(USER, "x", "/").await.unwrap_err();
        assert!(matches!(err, FileStorageError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (service, _) = service();
        upload(&service, "/", "a.txt", b"a").await;
        service.create_folder(USER, "f", "/").await.unwrap();

        service.delete(USER, "/a.txt").await.unwrap();
        let err = service.delete(USER, "/a.txt").await.unwrap_err();
        assert_eq!(err.to_string(), "Unable to delete 'a.txt' because it does not exist");

        service.delete(USER, "/f/").await.unwrap();
        assert!(service.delete(USER, "/f/").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_partial_folder_delete_reports_leftovers() {
        let (service, store) = service();
        upload(&service, "/docs/", "a.txt", b"a").await;
        upload(&service, "/docs/", "b.txt", b"b").await;
        store.fail_deletes_for("user-1-files/docs/a.txt");

        let err = service.delete(USER, "/docs/").await.unwrap_err();
        assert_eq!(
            err,
            FileStorageError::PartialDelete {
                message: "Unable to delete 'docs'".to_string(),
                failed: vec!["/docs/a.txt".to_string()],
            }
        );
        // best effort: the other object is gone
        assert_eq!(names(&service.list(USER, "/docs/").await.unwrap()), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_download_file_requires_file_path() {
        let (service, _) = service();
        upload(&service, "/", "a.txt", b"hello").await;

        assert_eq!(service.download_file(USER, "/a.txt").await.unwrap(), b"hello".to_vec());
        let err = service.download_file(USER, "/").await.unwrap_err();
        assert!(matches!(err, FileStorageError::InvalidPath(_)));
        assert!(service.download_file(USER, "/b.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_download_folder_as_zip() {
        let (service, _) = service();
        service.create_folder(USER, "x", "/").await.unwrap();
        upload(&service, "/x/", "a.txt", b"alpha").await;
        upload(&service, "/x/sub/", "b.txt", b"beta").await;

        let bytes = service.download_folder_as_zip(USER, "/x/").await.unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entries: Vec<String> = archive.file_names().map(str::to_string).collect();
        entries.sort();
        assert_eq!(entries, vec!["a.txt", "sub/b.txt"]);

        let mut content = String::new();
        archive.by_name("sub/b.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "beta");

        assert!(service
            .download_folder_as_zip(USER, "/missing/")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(matches!(
            service.download_folder_as_zip(USER, "/x/a.txt").await.unwrap_err(),
            FileStorageError::InvalidPath(_)
        ));
    }

    #[tokio::test]
    async fn test_download_folder_as_stored_zip() {
        let store = Arc::new(MemoryStore::new());
        let service =
            FileStorageService::new(store, KeyCodec::default()).with_compression_level(0);
        upload(&service, "/x/", "a.txt", b"alpha").await;
        service.create_folder(USER, "sub", "/x/").await.unwrap();

        let bytes = service.download_folder_as_zip(USER, "/x/").await.unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        assert!(archive.by_name("sub/").unwrap().is_dir());

        let mut entry = archive.by_name("a.txt").unwrap();
        assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "alpha");
    }
}
