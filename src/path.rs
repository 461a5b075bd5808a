//! Virtual path handling
//!
//! Users address their files with `/`-delimited virtual paths. A trailing `/`
//! marks a folder (the root folder is `"/"`), anything else is a file. The
//! object store has no directories, so every virtual path is mapped onto a
//! flat key by prefixing it with the user's root (`user-<id>-files`).
//!
//! All functions here are pure string manipulation and never touch the store.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Path delimiter used by virtual paths and object keys alike
pub const DELIMITER: char = '/';

/// The root folder of every user
pub const ROOT: &str = "/";

/// Placeholder substituted with the user id in a user root format
pub const USER_ID_PLACEHOLDER: &str = "{id}";

/// Default user root format, yielding keys like `user-42-files/docs/a.txt`
pub const DEFAULT_USER_ROOT_FORMAT: &str = "user-{id}-files";

/// Identifier of the account owning a tree of objects
pub type UserId = u64;

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(/[^/]+)*/?$").expect("static path pattern"))
}

/// Check that `path` is a well-formed virtual path.
///
/// `.` and `..` segments are refused: they would escape the user's root
/// once the key is turned into a request URL.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path_pattern().is_match(path)
        && !path.split(DELIMITER).any(is_dot_segment)
}

/// Whether a segment would be resolved as `.` or `..` by URL normalization
fn is_dot_segment(segment: &str) -> bool {
    segment == "." || segment == ".."
}

/// Check that `name` can be used as the leaf of a new file or folder.
pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty() && !is_dot_segment(name) && !name.contains(DELIMITER)
}

/// Maps virtual paths of a user onto object keys and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    user_root_format: String,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_USER_ROOT_FORMAT)
    }
}

impl KeyCodec {
    pub fn new(user_root_format: impl Into<String>) -> Self {
        Self {
            user_root_format: user_root_format.into(),
        }
    }

    /// Key prefix owning every object of `user_id` (no trailing delimiter)
    pub fn user_root(&self, user_id: UserId) -> String {
        self.user_root_format
            .replace(USER_ID_PLACEHOLDER, &user_id.to_string())
    }

    /// Object key for a virtual path of `user_id`
    pub fn to_object_key(&self, user_id: UserId, path: &str) -> String {
        format!("{}{}", self.user_root(user_id), path)
    }

    /// Virtual path for an object key of `user_id`
    ///
    /// Keys outside the user's root are returned unchanged.
    pub fn to_virtual_path(&self, user_id: UserId, key: &str) -> String {
        relative_to(key, &self.user_root(user_id)).to_string()
    }
}

/// Whether `path` denotes a folder.
pub fn is_folder(path: &str) -> bool {
    path.ends_with(DELIMITER)
}

/// Strip the trailing delimiter of a folder path; file paths pass through.
fn trim_folder(path: &str) -> &str {
    if is_folder(path) {
        &path[..path.len() - 1]
    } else {
        path
    }
}

/// Last segment of a path, without the folder delimiter.
///
/// `"/a/b/"` and `"/a/b"` both yield `"b"`; the root yields `""`.
pub fn leaf_name(path: &str) -> &str {
    let trimmed = trim_folder(path);
    match trimmed.rfind(DELIMITER) {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Folder containing `path`. The parent of the root is the root.
pub fn parent_folder(path: &str) -> &str {
    let trimmed = trim_folder(path);
    match trimmed.rfind(DELIMITER) {
        Some(idx) => &trimmed[..=idx],
        None => ROOT,
    }
}

/// Replace the leaf of `path` with `new_name`, keeping it a file or a folder.
pub fn renamed_path(path: &str, new_name: &str) -> String {
    let mut renamed = format!("{}{}", parent_folder(path), new_name);
    if is_folder(path) {
        renamed.push(DELIMITER);
    }
    renamed
}

/// Remove a literal `prefix` from `full`.
///
/// When `full` does not start with `prefix` it is returned unchanged.
pub fn relative_to<'a>(full: &'a str, prefix: &str) -> &'a str {
    full.strip_prefix(prefix).unwrap_or(full)
}

/// One step of the navigation trail above a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

/// Navigation trail for `path`, starting at the root.
///
/// Every crumb except the root carries the cumulative folder path
/// (`/a/`, `/a/b/`, ...). A file leaf keeps its file path.
pub fn breadcrumbs(path: &str) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb {
        name: "Home".to_string(),
        path: ROOT.to_string(),
    }];

    let segments: Vec<&str> = path.split(DELIMITER).filter(|s| !s.is_empty()).collect();
    let mut current = String::from(ROOT);

    for (idx, segment) in segments.iter().enumerate() {
        current.push_str(segment);
        let is_leaf_file = idx == segments.len() - 1 && !is_folder(path);
        if !is_leaf_file {
            current.push(DELIMITER);
        }
        crumbs.push(Breadcrumb {
            name: segment.to_string(),
            path: current.clone(),
        });
    }

    crumbs
}

/// File name offered for a zipped folder download, e.g. `photos-20240102T030405Z.zip`.
pub fn zip_file_name(path: &str, now: DateTime<Utc>) -> String {
    let name = match leaf_name(path) {
        "" => "files",
        name => name,
    };
    format!("{}-{}.zip", name, now.format("%Y%m%dT%H%M%SZ"))
}
