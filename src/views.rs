//! Read views
//!
//! `FilesystemItem` is what every read returns. It is rebuilt from a record
//! on each call and carries only the attributes the owning mount guarantees.

use crate::path;
use crate::store::Record;
use crate::types::{ExtraMetadata, Features, ResourceType, Timestamp};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct FilesystemItem {
    pub path: String,
    pub is_file: bool,
    pub uuid: Option<Uuid>,
    pub last_modified: Option<Timestamp>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
    pub extra_metadata: ExtraMetadata,
}

impl FilesystemItem {
    pub fn file(path: impl Into<String>) -> Self {
        Self::bare(path.into(), true)
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self::bare(path.into(), false)
    }

    fn bare(path: String, is_file: bool) -> Self {
        Self {
            path,
            is_file,
            uuid: None,
            last_modified: None,
            file_size: None,
            mime_type: None,
            extra_metadata: ExtraMetadata::new(),
        }
    }

    /// Build a view of `record`, dropping attributes outside `features`.
    pub fn from_record(record: Record, features: Features) -> Self {
        let is_file = record.resource_type == ResourceType::File;
        Self {
            path: record.path,
            is_file,
            uuid: Some(record.uuid),
            last_modified: record
                .last_modified
                .filter(|_| features.contains(Features::LAST_MODIFIED)),
            file_size: record
                .file_size
                .filter(|_| is_file && features.contains(Features::FILE_SIZE)),
            mime_type: record
                .mime_type
                .filter(|_| is_file && features.contains(Features::MIME_TYPE)),
            extra_metadata: if features.contains(Features::EXTRA_METADATA) {
                record.extra_metadata
            } else {
                ExtraMetadata::new()
            },
        }
    }

    pub fn is_directory(&self) -> bool {
        !self.is_file
    }

    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }

    /// Same item, with its path placed below `prefix`.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.path = path::join(prefix, &self.path);
        self
    }
}
