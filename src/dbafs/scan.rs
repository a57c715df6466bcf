//! Storage scan
//!
//! Enumerates storage for a scope set and derives the current hash of every
//! entry. Directory hashes are built bottom-up from child names and hashes;
//! leaf hashes come from the hash provider in one batch.

use super::scope::{ScopeDepth, ScopeSet};
use super::DbafsOptions;
use crate::error::{DbafsError, StorageError};
use crate::path;
use crate::store::Record;
use crate::tree::{directory_hash, HashProvider, Storage, StorageEntry};
use crate::types::{Features, Hash, ResourceType};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Current state of the scanned part of a mount.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    /// Everything found in storage within the scopes.
    pub entries: BTreeMap<String, StorageEntry>,
    /// Current hash of every entry, plus rebuilt cascade directories.
    /// Directories above a broken cascade have none.
    pub hashes: BTreeMap<String, Hash>,
}

impl Snapshot {
    /// Type and hash of a scanned entry, if both are known.
    pub fn current(&self, path: &str) -> Option<(ResourceType, &str)> {
        let entry = self.entries.get(path)?;
        let hash = self.hashes.get(path)?;
        Some((entry.resource_type, hash.as_str()))
    }
}

/// Stored rows the scan consults.
pub(crate) struct StoredState<'a> {
    /// Records the scopes may classify.
    pub in_scope: &'a BTreeMap<String, Record>,
    /// Cascade directories and their direct children.
    pub context: &'a BTreeMap<String, Record>,
}

pub(crate) struct Scanner<'a> {
    pub storage: &'a dyn Storage,
    pub hasher: &'a dyn HashProvider,
    pub options: &'a DbafsOptions,
}

impl<'a> Scanner<'a> {
    pub fn scan(
        &self,
        scopes: &ScopeSet,
        stored: &StoredState<'_>,
    ) -> Result<Snapshot, DbafsError> {
        let cascade = scopes.cascade_dirs();
        let (mut entries, mut opaque) = self.enumerate(scopes, stored, &cascade)?;
        self.exclude(scopes, &mut entries)?;
        opaque.retain(|p| entries.contains_key(p));

        let mut hashes = self.leaf_hashes(&entries, &opaque, stored)?;
        self.directory_hashes(scopes, stored, &cascade, &entries, &opaque, &mut hashes)?;

        debug!(
            entries = entries.len(),
            opaque = opaque.len(),
            cascade = cascade.len(),
            "Scanned storage"
        );
        Ok(Snapshot { entries, hashes })
    }

    /// List storage below every scope. Child directories of shallow scopes
    /// that already have a record stay opaque (not descended into), unless
    /// another scope lists them.
    fn enumerate(
        &self,
        scopes: &ScopeSet,
        stored: &StoredState<'_>,
        cascade: &[String],
    ) -> Result<(BTreeMap<String, StorageEntry>, BTreeSet<String>), DbafsError> {
        let mut entries = BTreeMap::new();
        let mut opaque = BTreeSet::new();

        for scope in scopes.scopes() {
            if !scope.path.is_empty() {
                match self.storage.stat(&scope.path)? {
                    Some(entry) if entry.is_file() => {
                        entries.insert(entry.path.clone(), entry);
                        continue;
                    }
                    Some(entry) => {
                        entries.insert(entry.path.clone(), entry);
                    }
                    None => continue,
                }
            }

            let deep = scope.depth == ScopeDepth::Deep;
            for entry in self.storage.list(&scope.path, deep)? {
                if !deep && !entry.is_file() && !scopes.fully_listed(&entry.path) {
                    let recorded = stored
                        .in_scope
                        .get(&entry.path)
                        .is_some_and(|r| r.resource_type == ResourceType::Directory);
                    if cascade.contains(&entry.path) {
                        // rebuilt from stored children further down
                    } else if recorded {
                        opaque.insert(entry.path.clone());
                    } else {
                        for nested in self.storage.list(&entry.path, true)? {
                            entries.insert(nested.path.clone(), nested);
                        }
                    }
                }
                entries.insert(entry.path.clone(), entry);
            }
        }
        Ok((entries, opaque))
    }

    /// Drop entries below `.nosync` markers and files over the size limit.
    fn exclude(
        &self,
        scopes: &ScopeSet,
        entries: &mut BTreeMap<String, StorageEntry>,
    ) -> Result<(), DbafsError> {
        if let Some(marker) = &self.options.no_sync_marker {
            let mut excluded: BTreeSet<String> = entries
                .values()
                .filter(|e| e.is_file() && path::file_name(&e.path) == marker.as_str())
                .filter_map(|e| path::parent(&e.path).map(str::to_string))
                .collect();

            for scope in scopes.scopes() {
                let mut chain: Vec<&str> = path::ancestors(&scope.path);
                chain.push("");
                for dir in chain {
                    if excluded.contains(dir) {
                        continue;
                    }
                    let marker_path = path::join(dir, marker);
                    if self.storage.stat(&marker_path)?.is_some_and(|e| e.is_file()) {
                        excluded.insert(dir.to_string());
                    }
                }
            }

            if !excluded.is_empty() {
                debug!(directories = ?excluded, "Skipping directories marked as no-sync");
                entries.retain(|p, _| !excluded.iter().any(|dir| path::is_base_path(dir, p)));
            }
        }

        if let Some(limit) = self.options.max_file_size {
            entries.retain(|p, entry| match entry.file_size {
                Some(size) if entry.is_file() && size > limit => {
                    warn!(path = %p, size, limit, "Skipping file above the size limit");
                    false
                }
                _ => true,
            });
        }
        Ok(())
    }

    /// Hashes of files and opaque directories. A stored file hash is reused
    /// when the mount tracks timestamps and storage reports the stored one.
    fn leaf_hashes(
        &self,
        entries: &BTreeMap<String, StorageEntry>,
        opaque: &BTreeSet<String>,
        stored: &StoredState<'_>,
    ) -> Result<BTreeMap<String, Hash>, DbafsError> {
        let reuse_by_timestamp = self.options.features.contains(Features::LAST_MODIFIED);
        let mut hashes = BTreeMap::new();
        let mut to_hash = Vec::new();

        for (p, entry) in entries {
            let record = stored.in_scope.get(p);
            if opaque.contains(p) {
                if let Some(record) = record {
                    hashes.insert(p.clone(), record.hash.clone());
                }
                continue;
            }
            if !entry.is_file() {
                continue;
            }
            let unchanged = reuse_by_timestamp
                && record.is_some_and(|r| {
                    r.resource_type == ResourceType::File
                        && r.last_modified.is_some()
                        && r.last_modified == entry.last_modified
                });
            match record {
                Some(record) if unchanged => {
                    hashes.insert(p.clone(), record.hash.clone());
                }
                _ => to_hash.push(p.clone()),
            }
        }

        if !to_hash.is_empty() {
            debug!(files = to_hash.len(), "Hashing files");
            let mut computed = self.hasher.hashes(&to_hash)?;
            for p in to_hash {
                let hash = computed
                    .remove(&p)
                    .ok_or_else(|| StorageError::NotFound(p.clone()))?;
                hashes.insert(p, hash);
            }
        }
        Ok(hashes)
    }

    /// Bottom-up directory hashes. Cascade directories combine stored
    /// children outside the scopes with scanned ones; a cascade directory
    /// missing from storage breaks the cascade above it.
    fn directory_hashes(
        &self,
        scopes: &ScopeSet,
        stored: &StoredState<'_>,
        cascade: &[String],
        entries: &BTreeMap<String, StorageEntry>,
        opaque: &BTreeSet<String>,
        hashes: &mut BTreeMap<String, Hash>,
    ) -> Result<(), DbafsError> {
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for p in entries.keys() {
            if let Some(parent) = path::parent(p) {
                children.entry(parent).or_default().push(p.as_str());
            }
        }

        let mut dirs: Vec<&str> = entries
            .values()
            .filter(|e| !e.is_file() && !opaque.contains(&e.path))
            .map(|e| e.path.as_str())
            .chain(cascade.iter().map(String::as_str))
            .collect();
        dirs.sort_by(|a, b| path::depth(b).cmp(&path::depth(a)).then_with(|| a.cmp(b)));
        dirs.dedup();

        let mut broken: BTreeSet<&str> = BTreeSet::new();
        for dir in dirs {
            let scanned = children.get(dir).map(Vec::as_slice).unwrap_or(&[]);

            if scanned.iter().any(|child| broken.contains(child)) {
                broken.insert(dir);
                continue;
            }

            if !cascade.iter().any(|c| c == dir) {
                let mut pairs = Vec::with_capacity(scanned.len());
                for child in scanned {
                    let hash = hashes
                        .get(*child)
                        .ok_or_else(|| StorageError::NotFound(child.to_string()))?;
                    pairs.push((path::file_name(child), hash.as_str()));
                }
                let hash = directory_hash(pairs);
                hashes.insert(dir.to_string(), hash);
                continue;
            }

            let exists = match entries.get(dir) {
                Some(entry) => !entry.is_file(),
                None => self.storage.stat(dir)?.is_some_and(|e| !e.is_file()),
            };
            let stored_children: Vec<&Record> = stored
                .context
                .values()
                .filter(|r| path::parent(&r.path) == Some(dir) && !scopes.covers(&r.path))
                .collect();
            if !exists || stored_children.iter().any(|r| broken.contains(r.path.as_str())) {
                broken.insert(dir);
                continue;
            }

            let mut pairs: Vec<(&str, &str)> = Vec::new();
            for record in &stored_children {
                let hash = hashes.get(&record.path).unwrap_or(&record.hash);
                pairs.push((path::file_name(&record.path), hash.as_str()));
            }
            for child in scanned {
                let hash = hashes
                    .get(*child)
                    .ok_or_else(|| StorageError::NotFound(child.to_string()))?;
                pairs.push((path::file_name(child), hash.as_str()));
            }
            let hash = directory_hash(pairs);
            hashes.insert(dir.to_string(), hash);
        }

        if !broken.is_empty() {
            debug!(directories = ?broken, "Directory hash cascade stopped at missing directories");
        }
        Ok(())
    }
}
