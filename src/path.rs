//! Path handling
//!
//! All paths inside the engine are relative, `/`-separated, without leading or
//! trailing slash, in Unicode NFC form. The empty string is the mount root.
//! Ancestry is decided segment-wise: `foo` is a base of `foo/bar` but not of
//! `foobar`.

use crate::error::DbafsError;
use unicode_normalization::UnicodeNormalization;

/// Normalize a path: drop empty and `.` segments, resolve `..`, NFC-compose.
///
/// Fails when `..` would leave the root.
pub fn normalize(path: &str) -> Result<String, DbafsError> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(DbafsError::invalid_path(path, "escapes the root"));
                }
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/").nfc().collect())
}

/// `true` if `base` equals `path` or is one of its segment-wise ancestors.
pub fn is_base_path(base: &str, path: &str) -> bool {
    if base.is_empty() {
        return true;
    }
    match path.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// `path` relative to `base`, or `None` if `base` is not a base path of it.
pub fn make_relative<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    if base.is_empty() {
        return Some(path);
    }
    match path.strip_prefix(base)? {
        "" => Some(""),
        rest => rest.strip_prefix('/'),
    }
}

/// Join two normalized paths.
pub fn join(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path),
    }
}

/// Parent directory (`""` for top-level entries), `None` for the root itself.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map(|(p, _)| p).unwrap_or(""))
}

/// Last segment of a path.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path)
}

/// Proper ancestors of `path`, nearest first. The root is not included.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut current = path;
    while let Some((p, _)) = current.rsplit_once('/') {
        result.push(p);
        current = p;
    }
    result
}

/// Number of segments.
pub fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('/').count()
    }
}
