//! Per-mount reconciliation engine
//!
//! A `Dbafs` keeps one record store in step with one storage tree. `sync`
//! scans storage, diffs it against the stored records and, in apply mode,
//! writes the result as one atomic batch.

mod apply;
mod diff;
mod scan;
pub mod scope;

pub use scope::{Scope, ScopeDepth, ScopeSet};

use crate::changeset::ChangeSet;
use crate::error::DbafsError;
use crate::path;
use crate::store::{Record, RecordScope, RecordStore};
use crate::tree::{HashProvider, Storage};
use crate::types::{ExtraMetadata, Features, ResourceType};
use crate::views::FilesystemItem;
use parking_lot::Mutex;
use scan::{Scanner, StoredState};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Name of the marker file that excludes a directory from syncing.
pub const DEFAULT_NO_SYNC_MARKER: &str = ".nosync";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbafsOptions {
    /// Optional attributes this mount records and guarantees.
    pub features: Features,
    /// Files above this size (bytes) are not tracked.
    pub max_file_size: Option<u64>,
    /// Directories containing a file with this name are not tracked.
    pub no_sync_marker: Option<String>,
}

impl Default for DbafsOptions {
    fn default() -> Self {
        Self {
            features: Features::EXTRA_METADATA,
            max_file_size: None,
            no_sync_marker: Some(DEFAULT_NO_SYNC_MARKER.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Compute the ChangeSet only.
    DryRun,
    /// Compute and persist the ChangeSet.
    Apply,
}

/// What the manager needs from a mount.
pub trait DbafsMount: Send + Sync {
    fn supported_features(&self) -> Features;

    fn get_record(&self, path: &str) -> Result<Option<FilesystemItem>, DbafsError>;

    /// Records below `path` (not `path` itself), ascending. Without `deep`
    /// only direct children.
    fn get_records(&self, path: &str, deep: bool) -> Result<Vec<FilesystemItem>, DbafsError>;

    fn get_path_from_uuid(&self, uuid: &Uuid) -> Result<Option<String>, DbafsError>;

    fn set_extra_metadata(&self, path: &str, data: ExtraMetadata) -> Result<(), DbafsError>;

    fn sync(&self, scopes: &[&str], mode: SyncMode) -> Result<ChangeSet, DbafsError>;
}

pub struct Dbafs {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn Storage>,
    hasher: Arc<dyn HashProvider>,
    options: DbafsOptions,
    sync_lock: Mutex<()>,
}

impl Dbafs {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn Storage>,
        hasher: Arc<dyn HashProvider>,
        options: DbafsOptions,
    ) -> Self {
        Self {
            records,
            storage,
            hasher,
            options,
            sync_lock: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &DbafsOptions {
        &self.options
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Diff storage against the records for `scopes`.
    pub fn compute_change_set(&self, scopes: &ScopeSet) -> Result<ChangeSet, DbafsError> {
        self.compute(scopes).map(|(changes, _)| changes)
    }

    fn compute(&self, scopes: &ScopeSet) -> Result<(ChangeSet, scan::Snapshot), DbafsError> {
        let scopes = self.widen(scopes)?;
        let mut in_scope = index(self.records.fetch(&scopes.record_scopes())?);

        let cascade = scopes.cascade_dirs();
        let context = if cascade.is_empty() {
            BTreeMap::new()
        } else {
            let selectors: Vec<RecordScope> = cascade
                .iter()
                .flat_map(|dir| {
                    [
                        RecordScope::Exact(dir.clone()),
                        RecordScope::Children(dir.clone()),
                    ]
                })
                .collect();
            index(self.records.fetch(&selectors)?)
        };
        debug!(
            records = in_scope.len(),
            context = context.len(),
            "Loaded records for sync"
        );

        let stored = StoredState {
            in_scope: &in_scope,
            context: &context,
        };
        let scanner = Scanner {
            storage: self.storage.as_ref(),
            hasher: self.hasher.as_ref(),
            options: &self.options,
        };
        let snapshot = scanner.scan(&scopes, &stored)?;

        // A vanished directory outside every deep scope takes its whole
        // stored subtree with it.
        let vanished: Vec<RecordScope> = in_scope
            .values()
            .filter(|r| r.resource_type == ResourceType::Directory)
            .filter(|r| !scopes.deep_covers(&r.path))
            .filter(|r| !snapshot.entries.get(&r.path).is_some_and(|e| !e.is_file()))
            .map(|r| RecordScope::Subtree(r.path.clone()))
            .collect();
        if !vanished.is_empty() {
            for record in self.records.fetch(&vanished)? {
                in_scope.entry(record.path.clone()).or_insert(record);
            }
        }

        let changes = diff::compute(
            &scopes,
            &in_scope,
            &context,
            &snapshot,
            self.options.features.contains(Features::LAST_MODIFIED),
        );
        Ok((changes, snapshot))
    }

    /// Cascade directories are rebuilt from their stored children, so each
    /// needs a directory record. Where one is missing, the directory is
    /// scanned as a deep scope of its own.
    fn widen(&self, scopes: &ScopeSet) -> Result<ScopeSet, DbafsError> {
        let cascade = scopes.cascade_dirs();
        if cascade.is_empty() {
            return Ok(scopes.clone());
        }
        let selectors: Vec<RecordScope> = cascade.iter().cloned().map(RecordScope::Exact).collect();
        let recorded = index(self.records.fetch(&selectors)?);
        let unrecorded: Vec<Scope> = cascade
            .into_iter()
            .filter(|dir| {
                !recorded
                    .get(dir)
                    .is_some_and(|r| r.resource_type == ResourceType::Directory)
            })
            .map(Scope::deep)
            .collect();
        if unrecorded.is_empty() {
            return Ok(scopes.clone());
        }

        debug!(directories = ?unrecorded, "Scanning unrecorded ancestors in full");
        let mut widened = scopes.scopes().to_vec();
        widened.extend(unrecorded);
        Ok(ScopeSet::from_scopes(widened))
    }

    fn item(&self, record: Record) -> FilesystemItem {
        FilesystemItem::from_record(record, self.options.features)
    }
}

fn index(records: Vec<Record>) -> BTreeMap<String, Record> {
    records.into_iter().map(|r| (r.path.clone(), r)).collect()
}

impl DbafsMount for Dbafs {
    fn supported_features(&self) -> Features {
        self.options.features
    }

    fn get_record(&self, path: &str) -> Result<Option<FilesystemItem>, DbafsError> {
        let path = path::normalize(path)?;
        Ok(self.records.get(&path)?.map(|r| self.item(r)))
    }

    fn get_records(&self, path: &str, deep: bool) -> Result<Vec<FilesystemItem>, DbafsError> {
        let path = path::normalize(path)?;
        let selector = if deep {
            RecordScope::Subtree(path.clone())
        } else {
            RecordScope::Children(path.clone())
        };
        Ok(self
            .records
            .fetch(&[selector])?
            .into_iter()
            .filter(|r| r.path != path)
            .map(|r| self.item(r))
            .collect())
    }

    fn get_path_from_uuid(&self, uuid: &Uuid) -> Result<Option<String>, DbafsError> {
        Ok(self.records.find_by_uuid(uuid)?.map(|r| r.path))
    }

    fn set_extra_metadata(&self, path: &str, data: ExtraMetadata) -> Result<(), DbafsError> {
        let path = path::normalize(path)?;
        if !self.options.features.contains(Features::EXTRA_METADATA) {
            return Err(DbafsError::Unsupported {
                feature: Features::EXTRA_METADATA,
                path,
            });
        }
        if self.records.set_extra_metadata(&path, &data)? {
            Ok(())
        } else {
            Err(DbafsError::RecordNotFound(path))
        }
    }

    #[instrument(skip(self))]
    fn sync(&self, scopes: &[&str], mode: SyncMode) -> Result<ChangeSet, DbafsError> {
        let scopes = ScopeSet::parse(scopes)?;
        let started = Instant::now();

        // Held across compute and apply so no other sync interleaves.
        let _guard = self.sync_lock.lock();
        let (changes, snapshot) = self.compute(&scopes)?;

        if mode == SyncMode::Apply && !changes.is_empty(true) {
            let batch = apply::build_batch(
                &changes,
                &snapshot,
                self.options.features,
                self.records.as_ref(),
            );
            debug!(operations = batch.len(), "Applying record batch");
            self.records.apply(&batch)?;
        }

        info!(
            changes = %changes,
            applied = mode == SyncMode::Apply,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync finished"
        );
        Ok(changes)
    }
}
