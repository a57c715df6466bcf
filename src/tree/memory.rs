//! In-memory storage tree
//!
//! Files carry an explicit content hash, so the tree is its own
//! `HashProvider`. Parents are created implicitly.

use super::hasher::HashProvider;
use super::node::{Storage, StorageEntry};
use crate::error::StorageError;
use crate::path;
use crate::types::{Hash, ResourceType, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct MemoryNode {
    entry: StorageEntry,
    hash: Option<Hash>,
}

#[derive(Default)]
pub struct MemoryStorage {
    nodes: RwLock<BTreeMap<String, MemoryNode>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(path, hash)` file pairs.
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let storage = Self::new();
        for (path, hash) in files {
            storage.add_file(path, hash);
        }
        storage
    }

    pub fn add_file(&self, path: &str, hash: &str) {
        let mut entry = StorageEntry::file(path);
        entry.file_size = Some(hash.len() as u64);
        self.add_entry(entry, hash);
    }

    /// Add a file with explicit attributes; `entry.path` is the location.
    pub fn add_entry(&self, entry: StorageEntry, hash: &str) {
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, &entry.path);
        nodes.insert(
            entry.path.clone(),
            MemoryNode {
                entry,
                hash: Some(hash.to_string()),
            },
        );
    }

    pub fn add_directory(&self, path: &str) {
        let mut nodes = self.nodes.write();
        Self::ensure_parents(&mut nodes, path);
        nodes.entry(path.to_string()).or_insert_with(|| MemoryNode {
            entry: StorageEntry::directory(path),
            hash: None,
        });
    }

    /// Remove `path` and everything below it.
    pub fn remove(&self, path: &str) {
        self.nodes.write().retain(|p, _| !path::is_base_path(path, p));
    }

    /// Move `from` (and everything below it) to `to`.
    pub fn rename(&self, from: &str, to: &str) {
        let mut nodes = self.nodes.write();
        let moved: Vec<String> = nodes
            .keys()
            .filter(|p| path::is_base_path(from, p))
            .cloned()
            .collect();
        Self::ensure_parents(&mut nodes, to);
        for old in moved {
            if let Some(mut node) = nodes.remove(&old) {
                let rest = path::make_relative(&old, from).unwrap_or_default();
                let new = path::join(to, rest);
                node.entry.path = new.clone();
                nodes.insert(new, node);
            }
        }
    }

    pub fn set_hash(&self, path: &str, hash: &str) {
        if let Some(node) = self.nodes.write().get_mut(path) {
            node.hash = Some(hash.to_string());
        }
    }

    pub fn touch(&self, path: &str, timestamp: Timestamp) {
        if let Some(node) = self.nodes.write().get_mut(path) {
            node.entry.last_modified = Some(timestamp);
        }
    }

    fn ensure_parents(nodes: &mut BTreeMap<String, MemoryNode>, path: &str) {
        for ancestor in path::ancestors(path) {
            nodes.entry(ancestor.to_string()).or_insert_with(|| MemoryNode {
                entry: StorageEntry::directory(ancestor),
                hash: None,
            });
        }
    }
}

impl Storage for MemoryStorage {
    fn stat(&self, path: &str) -> Result<Option<StorageEntry>, StorageError> {
        if path.is_empty() {
            return Ok(Some(StorageEntry::directory("")));
        }
        Ok(self.nodes.read().get(path).map(|node| node.entry.clone()))
    }

    fn list(&self, path: &str, deep: bool) -> Result<Vec<StorageEntry>, StorageError> {
        let nodes = self.nodes.read();
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.as_str() != path && path::is_base_path(path, p))
            .filter(|(p, _)| deep || path::parent(p) == Some(path))
            .map(|(_, node)| node.entry.clone())
            .collect())
    }
}

impl HashProvider for MemoryStorage {
    fn hashes(&self, paths: &[String]) -> Result<BTreeMap<String, Hash>, StorageError> {
        let nodes = self.nodes.read();
        paths
            .iter()
            .map(|p| {
                let hash = nodes
                    .get(p)
                    .filter(|node| node.entry.resource_type == ResourceType::File)
                    .and_then(|node| node.hash.clone())
                    .ok_or_else(|| StorageError::NotFound(p.clone()))?;
                Ok((p.clone(), hash))
            })
            .collect()
    }
}
