//! Sled-backed record store
//!
//! Each mount owns two trees in a shared database: `records/<name>` keyed by
//! path and `uuids/<name>` mapping UUID bytes back to the path. Rows are
//! bincode encoded; extra metadata is carried as a JSON string inside the row.

use super::{Record, RecordBatch, RecordScope, RecordStore};
use crate::error::StorageError;
use crate::types::{ExtraMetadata, ResourceType, Timestamp};
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, Transactional, TransactionalTree,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct RecordRow {
    uuid: [u8; 16],
    hash: String,
    resource_type: ResourceType,
    last_modified: Option<Timestamp>,
    file_size: Option<u64>,
    mime_type: Option<String>,
    extra_metadata: String,
}

fn encode(record: &Record) -> Result<Vec<u8>, StorageError> {
    let row = RecordRow {
        uuid: record.uuid.into_bytes(),
        hash: record.hash.clone(),
        resource_type: record.resource_type,
        last_modified: record.last_modified,
        file_size: record.file_size,
        mime_type: record.mime_type.clone(),
        extra_metadata: serde_json::to_string(&record.extra_metadata)?,
    };
    Ok(bincode::serialize(&row)?)
}

fn decode(path: &str, raw: &[u8]) -> Result<Record, StorageError> {
    let row: RecordRow = bincode::deserialize(raw).map_err(|e| StorageError::InvalidRecord {
        path: path.to_string(),
        reason: format!("undecodable row: {}", e),
    })?;
    let extra_metadata: ExtraMetadata = serde_json::from_str(&row.extra_metadata)?;
    let record = Record {
        path: path.to_string(),
        uuid: Uuid::from_bytes(row.uuid),
        hash: row.hash,
        resource_type: row.resource_type,
        last_modified: row.last_modified,
        file_size: row.file_size,
        mime_type: row.mime_type,
        extra_metadata,
    };
    record.validate()?;
    Ok(record)
}

fn decode_key(key: &[u8]) -> Result<String, StorageError> {
    String::from_utf8(key.to_vec()).map_err(|_| StorageError::InvalidRecord {
        path: String::from_utf8_lossy(key).into_owned(),
        reason: "path key is not valid UTF-8".to_string(),
    })
}

type TxResult<T> = Result<T, ConflictableTransactionError<StorageError>>;

fn abort<T>(err: StorageError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

fn tx_get(records: &TransactionalTree, path: &str) -> TxResult<Option<Record>> {
    match records.get(path.as_bytes())? {
        Some(raw) => decode(path, &raw).map(Some).or_else(abort),
        None => Ok(None),
    }
}

fn tx_insert(
    records: &TransactionalTree,
    uuids: &TransactionalTree,
    record: &Record,
) -> TxResult<()> {
    if records.get(record.path.as_bytes())?.is_some() {
        return abort(StorageError::InvalidRecord {
            path: record.path.clone(),
            reason: "a record already exists at the target path".to_string(),
        });
    }
    let raw = encode(record).or_else(abort)?;
    records.insert(record.path.as_bytes(), raw)?;
    uuids.insert(&record.uuid.as_bytes()[..], record.path.as_bytes())?;
    Ok(())
}

fn flatten(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => StorageError::Sled(err),
    }
}

/// Persistent record store for one mount.
pub struct SledRecordStore {
    records: sled::Tree,
    uuids: sled::Tree,
}

impl SledRecordStore {
    /// Open the trees for mount `name` in an existing database.
    pub fn new(db: &sled::Db, name: &str) -> Result<Self, StorageError> {
        Ok(Self {
            records: db.open_tree(format!("records/{}", name))?,
            uuids: db.open_tree(format!("uuids/{}", name))?,
        })
    }

    /// Open (or create) a database at `path` holding a single mount.
    pub fn open(path: &Path, name: &str) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::new(&db, name)
    }

    fn scan(
        &self,
        prefix: &str,
        out: &mut BTreeMap<String, Record>,
        direct_only: bool,
    ) -> Result<(), StorageError> {
        for entry in self.records.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let path = decode_key(&key)?;
            if direct_only && path[prefix.len()..].contains('/') {
                continue;
            }
            let record = decode(&path, &value)?;
            out.insert(path, record);
        }
        Ok(())
    }
}

impl RecordStore for SledRecordStore {
    fn fetch(&self, scopes: &[RecordScope]) -> Result<Vec<Record>, StorageError> {
        let mut found = BTreeMap::new();
        for scope in scopes {
            match scope {
                RecordScope::Exact(path) => {
                    if let Some(record) = self.get(path)? {
                        found.insert(record.path.clone(), record);
                    }
                }
                RecordScope::Subtree(path) if path.is_empty() => self.scan("", &mut found, false)?,
                RecordScope::Subtree(path) => {
                    if let Some(record) = self.get(path)? {
                        found.insert(record.path.clone(), record);
                    }
                    self.scan(&format!("{}/", path), &mut found, false)?;
                }
                RecordScope::Children(path) if path.is_empty() => self.scan("", &mut found, true)?,
                RecordScope::Children(path) => self.scan(&format!("{}/", path), &mut found, true)?,
            }
        }
        Ok(found.into_values().collect())
    }

    fn get(&self, path: &str) -> Result<Option<Record>, StorageError> {
        match self.records.get(path.as_bytes())? {
            Some(raw) => decode(path, &raw).map(Some),
            None => Ok(None),
        }
    }

    fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<Record>, StorageError> {
        match self.uuids.get(&uuid.as_bytes()[..])? {
            Some(path) => self.get(&decode_key(&path)?),
            None => Ok(None),
        }
    }

    fn apply(&self, batch: &RecordBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        (&self.records, &self.uuids)
            .transaction(|(records, uuids)| {
                for path in &batch.deletes {
                    if let Some(record) = tx_get(records, path)? {
                        records.remove(path.as_bytes())?;
                        uuids.remove(&record.uuid.as_bytes()[..])?;
                    }
                }

                let mut lifted = Vec::with_capacity(batch.updates.len());
                for update in &batch.updates {
                    let Some(record) = tx_get(records, &update.path)? else {
                        return abort(StorageError::NotFound(update.path.clone()));
                    };
                    records.remove(update.path.as_bytes())?;
                    uuids.remove(&record.uuid.as_bytes()[..])?;
                    lifted.push((update, record));
                }
                for (update, mut record) in lifted {
                    update.apply_to(&mut record);
                    tx_insert(records, uuids, &record)?;
                }

                for record in &batch.creates {
                    record.validate().or_else(abort)?;
                    tx_insert(records, uuids, record)?;
                }
                Ok(())
            })
            .map_err(flatten)?;
        self.records.flush()?;
        debug!(operations = batch.len(), "Applied record batch");
        Ok(())
    }

    fn set_extra_metadata(&self, path: &str, data: &ExtraMetadata) -> Result<bool, StorageError> {
        let found = self
            .records
            .transaction(|records| {
                let Some(mut record) = tx_get(records, path)? else {
                    return Ok(false);
                };
                record.extra_metadata = data.clone();
                let raw = encode(&record).or_else(abort)?;
                records.insert(path.as_bytes(), raw)?;
                Ok(true)
            })
            .map_err(flatten)?;
        Ok(found)
    }
}
