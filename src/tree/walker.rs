//! Local directory storage
//!
//! Enumerates a directory on disk with `walkdir`. Symlinks are not followed;
//! entries that are neither files nor directories are skipped.

use super::node::{Storage, StorageEntry};
use crate::error::StorageError;
use crate::types::{ResourceType, Timestamp};
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = dunce::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(StorageError::NotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }

    fn relative(&self, absolute: &Path) -> Result<String, StorageError> {
        let rel = absolute.strip_prefix(&self.root).map_err(|_| {
            StorageError::NotFound(absolute.display().to_string())
        })?;
        let mut segments = Vec::new();
        for component in rel.components() {
            let segment = component.as_os_str().to_str().ok_or_else(|| {
                StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("non UTF-8 path below storage root: {}", absolute.display()),
                ))
            })?;
            segments.push(segment);
        }
        Ok(segments.join("/"))
    }
}

fn entry_from_metadata(path: String, metadata: &Metadata) -> Option<StorageEntry> {
    let resource_type = if metadata.is_file() {
        ResourceType::File
    } else if metadata.is_dir() {
        ResourceType::Directory
    } else {
        return None;
    };
    let last_modified: Option<Timestamp> = metadata
        .modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).timestamp());
    Some(StorageEntry {
        path,
        resource_type,
        last_modified,
        file_size: metadata.is_file().then(|| metadata.len()),
        mime_type: None,
    })
}

impl Storage for LocalStorage {
    fn stat(&self, path: &str) -> Result<Option<StorageEntry>, StorageError> {
        match std::fs::symlink_metadata(self.absolute(path)) {
            Ok(metadata) => Ok(entry_from_metadata(path.to_string(), &metadata)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, path: &str, deep: bool) -> Result<Vec<StorageEntry>, StorageError> {
        let start = self.absolute(path);
        if !start.is_dir() {
            return Ok(Vec::new());
        }
        let mut walker = WalkDir::new(&start).min_depth(1).follow_links(false);
        if !deep {
            walker = walker.max_depth(1);
        }

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let relative = self.relative(entry.path())?;
            if let Some(item) = entry_from_metadata(relative, &metadata) {
                entries.push(item);
            }
        }
        Ok(entries)
    }
}
