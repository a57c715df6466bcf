//! ChangeSet
//!
//! Immutable diff between the record store and a storage snapshot. Keys of
//! `items_to_update`, `items_to_delete` and `last_modified_updates` are paths
//! as currently recorded; `items_to_create` holds new paths in dependency
//! order (a directory precedes everything below it).

use crate::path;
use crate::types::{Hash, ResourceType, Timestamp};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;

/// A resource to be inserted into the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateItem {
    pub hash: Hash,
    pub path: String,
    pub resource_type: ResourceType,
}

/// Partial attribute set of an update. `None` means unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateAttributes {
    pub path: Option<String>,
    pub hash: Option<Hash>,
    /// Only populated by `ChangeSet::items_to_update(true)`.
    pub last_modified: Option<Timestamp>,
}

impl UpdateAttributes {
    pub fn moved_to(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn rehashed(hash: impl Into<Hash>) -> Self {
        Self {
            hash: Some(hash.into()),
            ..Self::default()
        }
    }

    /// Take every attribute `other` defines.
    fn overlay(&mut self, other: UpdateAttributes) {
        if other.path.is_some() {
            self.path = other.path;
        }
        if other.hash.is_some() {
            self.hash = other.hash;
        }
        if other.last_modified.is_some() {
            self.last_modified = other.last_modified;
        }
    }
}

/// Counters for logging and reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub last_modified: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    items_to_create: Vec<CreateItem>,
    items_to_update: IndexMap<String, UpdateAttributes>,
    items_to_delete: IndexMap<String, ResourceType>,
    last_modified_updates: IndexMap<String, Timestamp>,
}

impl ChangeSet {
    pub fn new(
        items_to_create: Vec<CreateItem>,
        items_to_update: IndexMap<String, UpdateAttributes>,
        items_to_delete: IndexMap<String, ResourceType>,
        last_modified_updates: IndexMap<String, Timestamp>,
    ) -> Self {
        Self {
            items_to_create,
            items_to_update,
            items_to_delete,
            last_modified_updates,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// `true` if nothing is created, updated or deleted. With
    /// `include_last_modified`, pending timestamp updates also count.
    pub fn is_empty(&self, include_last_modified: bool) -> bool {
        self.items_to_create.is_empty()
            && self.items_to_update.is_empty()
            && self.items_to_delete.is_empty()
            && (!include_last_modified || self.last_modified_updates.is_empty())
    }

    pub fn items_to_create(&self) -> &[CreateItem] {
        &self.items_to_create
    }

    /// Updates keyed by recorded path.
    ///
    /// With `merge_last_modified`, timestamp updates are folded in: paths that
    /// only changed their timestamp get an entry of their own.
    pub fn items_to_update(&self, merge_last_modified: bool) -> IndexMap<String, UpdateAttributes> {
        let mut updates = self.items_to_update.clone();
        if merge_last_modified {
            for (path, timestamp) in &self.last_modified_updates {
                updates.entry(path.clone()).or_default().last_modified = Some(*timestamp);
            }
        }
        updates
    }

    pub fn items_to_delete(&self) -> &IndexMap<String, ResourceType> {
        &self.items_to_delete
    }

    pub fn last_modified_updates(&self) -> &IndexMap<String, Timestamp> {
        &self.last_modified_updates
    }

    /// Merge a ChangeSet computed for a deeper scope, prefixing each of its
    /// paths with `prefix`. Creates and deletes keep this set's entries first;
    /// on conflicting update attributes and timestamps `other` wins.
    pub fn with_other(&self, other: &ChangeSet, prefix: &str) -> ChangeSet {
        let translate = |p: &str| path::join(prefix, p);

        let mut items_to_create = self.items_to_create.clone();
        let mut created: HashSet<String> =
            items_to_create.iter().map(|item| item.path.clone()).collect();
        for item in &other.items_to_create {
            let target = translate(&item.path);
            if created.insert(target.clone()) {
                items_to_create.push(CreateItem {
                    hash: item.hash.clone(),
                    path: target,
                    resource_type: item.resource_type,
                });
            }
        }

        let mut items_to_update = self.items_to_update.clone();
        for (key, attributes) in &other.items_to_update {
            let mut attributes = attributes.clone();
            attributes.path = attributes.path.map(|p| translate(&p));
            items_to_update
                .entry(translate(key))
                .or_default()
                .overlay(attributes);
        }

        let mut items_to_delete = self.items_to_delete.clone();
        for (key, resource_type) in &other.items_to_delete {
            items_to_delete.entry(translate(key)).or_insert(*resource_type);
        }

        let mut last_modified_updates = self.last_modified_updates.clone();
        for (key, timestamp) in &other.last_modified_updates {
            last_modified_updates.insert(translate(key), *timestamp);
        }

        ChangeSet {
            items_to_create,
            items_to_update,
            items_to_delete,
            last_modified_updates,
        }
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            created: self.items_to_create.len(),
            updated: self.items_to_update.len(),
            deleted: self.items_to_delete.len(),
            last_modified: self.last_modified_updates.len(),
        }
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.summary();
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} timestamp update(s)",
            s.created, s.updated, s.deleted, s.last_modified
        )
    }
}
