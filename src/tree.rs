//! Folder tree reconstruction from flat key listings
//!
//! The store only knows keys. Listing and search rebuild the user-visible
//! tree from them: each key becomes a [`Node`], and every folder a key lies
//! in is implied even when no marker object was ever written for it.

use serde::Serialize;
use std::collections::HashSet;

use crate::path::{self, DELIMITER, ROOT};
use crate::store::StorageObject;

/// A key of the store seen as part of the virtual tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File { path: String, size: u64 },
    Folder { path: String },
}

impl Node {
    /// Build a node from a listed object, given the user root it lives under.
    ///
    /// Returns `None` for keys outside `user_root`.
    pub fn from_object(object: &StorageObject, user_root: &str) -> Option<Self> {
        let path = object.key.strip_prefix(user_root)?;
        if !path.starts_with(DELIMITER) {
            return None;
        }

        let node = if object.is_folder() {
            Node::Folder { path: path.to_string() }
        } else {
            Node::File { path: path.to_string(), size: object.size }
        };
        Some(node)
    }

    pub fn path(&self) -> &str {
        match self {
            Node::File { path, .. } | Node::Folder { path } => path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Node::Folder { .. })
    }

    pub fn name(&self) -> &str {
        path::leaf_name(self.path())
    }

    /// Every folder this node lies in, outermost first, excluding the root.
    ///
    /// A folder node includes itself.
    pub fn folders(&self) -> Vec<String> {
        let path = self.path();
        let mut folders = Vec::new();
        let mut start = ROOT.len();

        while let Some(offset) = path[start..].find(DELIMITER) {
            let end = start + offset + 1;
            folders.push(path[..end].to_string());
            start = end;
        }

        folders
    }

    /// Search rows for this node: the file itself (located in its parent
    /// folder) plus one synthetic row per enclosing folder.
    pub fn search_entries(&self) -> Vec<ListingEntry> {
        let mut entries: Vec<ListingEntry> = self
            .folders()
            .iter()
            .map(|folder| ListingEntry::folder(path::leaf_name(folder), folder))
            .collect();

        if let Node::File { path, .. } = self {
            entries.push(ListingEntry::file(path::leaf_name(path), path::parent_folder(path)));
        }

        entries
    }
}

/// A row returned to callers by `list` and `search`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    /// Leaf name, without the folder delimiter
    pub name: String,
    /// Virtual path of the row
    pub path: String,
    pub is_folder: bool,
}

impl ListingEntry {
    pub fn file(name: &str, path: &str) -> Self {
        Self { name: name.to_string(), path: path.to_string(), is_folder: false }
    }

    pub fn folder(name: &str, path: &str) -> Self {
        Self { name: name.to_string(), path: path.to_string(), is_folder: true }
    }

    /// Name as shown to users; folders carry a trailing delimiter.
    pub fn display_name(&self) -> String {
        if self.is_folder {
            format!("{}{}", self.name, DELIMITER)
        } else {
            self.name.clone()
        }
    }
}

/// Entries of a non-recursive listing of `folder_key`, folders first.
///
/// The folder's own marker is skipped.
pub fn children(objects: &[StorageObject], folder_key: &str, user_root: &str) -> Vec<ListingEntry> {
    let mut entries: Vec<ListingEntry> = objects
        .iter()
        .filter(|object| !path::relative_to(&object.key, folder_key).is_empty())
        .filter_map(|object| Node::from_object(object, user_root))
        .map(|node| ListingEntry {
            name: node.name().to_string(),
            path: node.path().to_string(),
            is_folder: node.is_folder(),
        })
        .collect();

    sort_folders_first(&mut entries);
    entries
}

/// Folders before files, then case-insensitively by path.
pub fn sort_folders_first(entries: &mut [ListingEntry]) {
    entries.sort_by(|a, b| {
        b.is_folder
            .cmp(&a.is_folder)
            .then_with(|| a.path.to_lowercase().cmp(&b.path.to_lowercase()))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// All files and implied folders under `user_root` whose name contains
/// `query`, case-insensitively, ordered by name.
pub fn search(objects: &[StorageObject], user_root: &str, query: &str) -> Vec<ListingEntry> {
    let unique: HashSet<ListingEntry> = objects
        .iter()
        .filter_map(|object| Node::from_object(object, user_root))
        .flat_map(|node| node.search_entries())
        .collect();

    let needle = query.trim().to_lowercase();
    let mut matches: Vec<ListingEntry> = unique
        .into_iter()
        .filter(|entry| entry.name.to_lowercase().contains(&needle))
        .collect();

    matches.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.path.cmp(&b.path))
    });
    matches
}
