//! Record Store
//!
//! The persisted side of a mount: one typed `Record` per tracked path. The
//! engine reads records by scope, resolves UUIDs, and writes whole sync
//! results as a single atomic `RecordBatch`.

pub mod memory;
pub mod persistence;

use crate::error::StorageError;
use crate::path;
use crate::types::{ExtraMetadata, Hash, ResourceType, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub use memory::MemoryRecordStore;
pub use persistence::SledRecordStore;

/// Record: persisted state of one resource of a mount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub path: String,
    pub uuid: Uuid,
    pub hash: Hash,
    pub resource_type: ResourceType,
    #[serde(default)]
    pub last_modified: Option<Timestamp>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub extra_metadata: ExtraMetadata,
}

impl Record {
    pub fn new(
        path: impl Into<String>,
        hash: impl Into<Hash>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            path: path.into(),
            uuid: Uuid::new_v4(),
            hash: hash.into(),
            resource_type,
            last_modified: None,
            file_size: None,
            mime_type: None,
            extra_metadata: ExtraMetadata::new(),
        }
    }

    /// Reject rows the engine cannot reason about.
    pub fn validate(&self) -> Result<(), StorageError> {
        let invalid = |reason: &str| StorageError::InvalidRecord {
            path: self.path.clone(),
            reason: reason.to_string(),
        };
        if self.path.is_empty() {
            return Err(invalid("the mount root cannot be a record"));
        }
        match path::normalize(&self.path) {
            Ok(normalized) if normalized == self.path => {}
            _ => return Err(invalid("path is not normalized")),
        }
        if self.hash.is_empty() {
            return Err(invalid("missing hash"));
        }
        if self.resource_type == ResourceType::Directory && self.file_size.is_some() {
            return Err(invalid("directories have no file size"));
        }
        Ok(())
    }
}

/// Selects records by path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordScope {
    /// Exactly this path.
    Exact(String),
    /// Direct children of this path, not the path itself.
    Children(String),
    /// This path and everything below it. `""` selects the whole mount.
    Subtree(String),
}

impl RecordScope {
    pub fn contains(&self, candidate: &str) -> bool {
        match self {
            RecordScope::Exact(p) => candidate == p,
            RecordScope::Children(p) => path::parent(candidate) == Some(p.as_str()),
            RecordScope::Subtree(p) => path::is_base_path(p, candidate),
        }
    }
}

/// Changed attributes of an existing record; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub path: String,
    pub new_path: Option<String>,
    pub hash: Option<Hash>,
    pub last_modified: Option<Timestamp>,
    pub file_size: Option<u64>,
    pub mime_type: Option<String>,
}

impl RecordUpdate {
    fn apply_to(&self, record: &mut Record) {
        if let Some(new_path) = &self.new_path {
            record.path = new_path.clone();
        }
        if let Some(hash) = &self.hash {
            record.hash = hash.clone();
        }
        if self.last_modified.is_some() {
            record.last_modified = self.last_modified;
        }
        if self.file_size.is_some() {
            record.file_size = self.file_size;
        }
        if self.mime_type.is_some() {
            record.mime_type = self.mime_type.clone();
        }
    }
}

/// One sync result, applied atomically: deletes, then updates, then creates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub deletes: Vec<String>,
    pub updates: Vec<RecordUpdate>,
    pub creates: Vec<Record>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.creates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deletes.len() + self.updates.len() + self.creates.len()
    }
}

/// Record store interface
pub trait RecordStore: Send + Sync {
    /// All records matching any of the scopes, in ascending path order.
    fn fetch(&self, scopes: &[RecordScope]) -> Result<Vec<Record>, StorageError>;

    fn get(&self, path: &str) -> Result<Option<Record>, StorageError>;

    fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<Record>, StorageError>;

    /// Apply a batch atomically: either every operation lands or none does.
    fn apply(&self, batch: &RecordBatch) -> Result<(), StorageError>;

    /// Replace the extra metadata of a record. Returns `false` if no record
    /// exists at `path`.
    fn set_extra_metadata(&self, path: &str, data: &ExtraMetadata) -> Result<bool, StorageError>;

    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Apply a batch to an ordered in-memory map.
///
/// Moved records are lifted out before any is reinserted, so rotations
/// (`a -> b`, `b -> c`) apply cleanly.
pub(crate) fn apply_batch(
    records: &mut BTreeMap<String, Record>,
    batch: &RecordBatch,
) -> Result<(), StorageError> {
    for path in &batch.deletes {
        records.remove(path);
    }

    let mut lifted = Vec::with_capacity(batch.updates.len());
    for update in &batch.updates {
        let record = records
            .remove(&update.path)
            .ok_or_else(|| StorageError::NotFound(update.path.clone()))?;
        lifted.push((update, record));
    }
    for (update, mut record) in lifted {
        update.apply_to(&mut record);
        insert_unique(records, record)?;
    }

    for record in &batch.creates {
        record.validate()?;
        insert_unique(records, record.clone())?;
    }
    Ok(())
}

fn insert_unique(
    records: &mut BTreeMap<String, Record>,
    record: Record,
) -> Result<(), StorageError> {
    if records.contains_key(&record.path) {
        return Err(StorageError::InvalidRecord {
            path: record.path,
            reason: "a record already exists at the target path".to_string(),
        });
    }
    records.insert(record.path.clone(), record);
    Ok(())
}
