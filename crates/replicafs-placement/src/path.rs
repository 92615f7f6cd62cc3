//! Storage path derivation
//!
//! Objects are fanned out over three directory levels taken from the last
//! three characters of the file identifier, last character first:
//! `<root>/<c1>/<c2>/<c3>/<file_id>.<ext>`.

use replicafs_common::FileId;
use std::path::Path;

/// Number of directory levels derived from the identifier
pub const FANOUT_LEVELS: usize = 3;

/// Build the host-relative storage path for a file.
///
/// The extension is taken from `source` and, when that has none, from
/// `display_name`; it is lower-cased. Without either the object is stored
/// without an extension.
#[must_use]
pub fn storage_path(
    file_id: &FileId,
    root_path: &str,
    source: &Path,
    display_name: Option<&str>,
) -> String {
    let mut path = normalize_root(root_path);
    for c in fanout(file_id) {
        path.push('/');
        path.push(c);
    }
    path.push('/');
    path.push_str(&object_name(file_id, source, display_name));
    path
}

/// `<file_id>[.<ext>]`
#[must_use]
pub fn object_name(file_id: &FileId, source: &Path, display_name: Option<&str>) -> String {
    match extension(source, display_name) {
        Some(ext) => format!("{file_id}.{ext}"),
        None => file_id.to_string(),
    }
}

/// Lower-cased extension of `source`, falling back to `display_name`
#[must_use]
pub fn extension(source: &Path, display_name: Option<&str>) -> Option<String> {
    ext_of(source).or_else(|| display_name.and_then(|name| ext_of(Path::new(name))))
}

fn ext_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
}

/// Directory levels for an identifier; shorter identifiers yield fewer levels
fn fanout(file_id: &FileId) -> impl Iterator<Item = char> + '_ {
    file_id.as_str().chars().rev().take(FANOUT_LEVELS)
}

/// Leading slash, no trailing slash; empty stays empty
fn normalize_root(root: &str) -> String {
    let trimmed = root.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
