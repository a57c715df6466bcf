//! In-memory record store
//!
//! Readers clone the current snapshot `Arc` and never wait on a running
//! apply; `apply` builds the next snapshot aside and swaps it in.

use super::{apply_batch, Record, RecordBatch, RecordScope, RecordStore};
use crate::error::StorageError;
use crate::types::ExtraMetadata;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

type Snapshot = Arc<BTreeMap<String, Record>>;

#[derive(Default)]
pub struct MemoryRecordStore {
    snapshot: RwLock<Snapshot>,
    writer: Mutex<()>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, validating every row.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Result<Self, StorageError> {
        let mut map = BTreeMap::new();
        for record in records {
            record.validate()?;
            map.insert(record.path.clone(), record);
        }
        Ok(Self {
            snapshot: RwLock::new(Arc::new(map)),
            writer: Mutex::new(()),
        })
    }

    fn current(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    fn commit<F>(&self, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, Record>) -> Result<(), StorageError>,
    {
        let _guard = self.writer.lock();
        let mut next = (*self.current()).clone();
        mutate(&mut next)?;
        *self.snapshot.write() = Arc::new(next);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}

impl RecordStore for MemoryRecordStore {
    fn fetch(&self, scopes: &[RecordScope]) -> Result<Vec<Record>, StorageError> {
        let snapshot = self.current();
        Ok(snapshot
            .values()
            .filter(|record| scopes.iter().any(|scope| scope.contains(&record.path)))
            .cloned()
            .collect())
    }

    fn get(&self, path: &str) -> Result<Option<Record>, StorageError> {
        Ok(self.current().get(path).cloned())
    }

    fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<Record>, StorageError> {
        Ok(self.current().values().find(|r| r.uuid == *uuid).cloned())
    }

    fn apply(&self, batch: &RecordBatch) -> Result<(), StorageError> {
        self.commit(|records| apply_batch(records, batch))
    }

    fn set_extra_metadata(&self, path: &str, data: &ExtraMetadata) -> Result<bool, StorageError> {
        let mut found = false;
        self.commit(|records| {
            if let Some(record) = records.get_mut(path) {
                record.extra_metadata = data.clone();
                found = true;
            }
            Ok(())
        })?;
        Ok(found)
    }
}
