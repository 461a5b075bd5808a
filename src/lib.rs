// Cloud File Storage - per-user virtual file system over S3-compatible object stores
// Folders are key prefixes; markers, listings, renames and zip downloads are emulated on flat keys

pub mod archive;
pub mod config;
pub mod error;
pub mod path;
pub mod service;
pub mod store;
pub mod tree;

pub use config::{load_config, StorageConfig};
pub use error::{FileStorageError, Result};
pub use path::{Breadcrumb, KeyCodec, UserId};
pub use service::FileStorageService;
pub use store::{MemoryStore, ObjectStore, S3Store, StoreError};
pub use tree::ListingEntry;
