//! Storage entries and the enumeration interface

use crate::error::StorageError;
use crate::types::{ResourceType, Timestamp};

/// One entry of a storage listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub path: String,
    pub resource_type: ResourceType,
    pub last_modified: Option<Timestamp>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

impl StorageEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path.into(), ResourceType::File)
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self::new(path.into(), ResourceType::Directory)
    }

    fn new(path: String, resource_type: ResourceType) -> Self {
        Self {
            path,
            resource_type,
            last_modified: None,
            file_size: None,
            mime_type: None,
        }
    }

    pub fn is_file(&self) -> bool {
        self.resource_type.is_file()
    }
}

/// Enumerable hierarchical storage.
pub trait Storage: Send + Sync {
    /// The entry at `path`, or `None` if nothing exists there. `""` is the root
    /// and always a directory.
    fn stat(&self, path: &str) -> Result<Option<StorageEntry>, StorageError>;

    /// Entries below the directory `path` (not `path` itself); direct
    /// children only unless `deep`. Order is unspecified.
    fn list(&self, path: &str, deep: bool) -> Result<Vec<StorageEntry>, StorageError>;
}
