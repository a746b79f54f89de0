//! Separator handling for storage keys and local paths.

use regex::Regex;
use std::sync::LazyLock;

/// Separator used inside the bucket, independent of the host OS.
pub const STORAGE_SEP: &str = "/";

/// Separator of the local filesystem.
pub const LOCAL_SEP: &str = std::path::MAIN_SEPARATOR_STR;

// Optional trailing slash, then the first query/fragment marker or the end.
static TRAILING_SEP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/?(\?|#|$)").expect("static pattern"));

/// Makes sure a storage key prefix ends with `/`.
///
/// When the key carries a query (`?`) or fragment (`#`), the separator goes right
/// before the marker instead of at the very end. Empty input is returned as is.
pub fn normalize_storage_key(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    TRAILING_SEP.replace(path, "/$1").into_owned()
}

/// Appends the local separator to a directory path unless it is already there.
pub fn normalize_local_path(path: &str) -> String {
    if path.is_empty() || path.ends_with(LOCAL_SEP) {
        return path.to_string();
    }
    format!("{path}{LOCAL_SEP}")
}

/// Converts a relative local path into a storage name (`a\b\c.js` -> `a/b/c.js` on Windows).
pub fn to_storage_name(relative: &str) -> String {
    relative.split(LOCAL_SEP).collect::<Vec<_>>().join(STORAGE_SEP)
}
