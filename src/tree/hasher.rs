//! Hash computation
//!
//! Leaf hashes come from a `HashProvider`. A directory hash is BLAKE3 over its
//! children sorted by name, each fed as `name \0 hash \0`, so it depends only
//! on child names and child hashes.

use crate::error::StorageError;
use crate::types::Hash;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

/// Maps leaf paths to content hashes in one batch.
pub trait HashProvider: Send + Sync {
    /// Hash every path in `paths`. Every requested path must be present in
    /// the result.
    fn hashes(&self, paths: &[String]) -> Result<BTreeMap<String, Hash>, StorageError>;
}

/// Compute a directory hash from `(child name, child hash)` pairs in any order.
pub fn directory_hash<'a, I>(children: I) -> Hash
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut children: Vec<(&str, &str)> = children.into_iter().collect();
    children.sort_unstable();

    let mut hasher = blake3::Hasher::new();
    for (name, hash) in children {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(hash.as_bytes());
        hasher.update(&[0]);
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Hashes file contents below a local root directory with BLAKE3.
pub struct Blake3HashProvider {
    root: PathBuf,
}

impl Blake3HashProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn hash_file(&self, relative: &str) -> Result<Hash, StorageError> {
        let mut full = self.root.clone();
        for segment in relative.split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        let mut reader = BufReader::new(File::open(&full)?);
        let mut hasher = blake3::Hasher::new();
        std::io::copy(&mut reader, &mut hasher)?;
        Ok(hex::encode(hasher.finalize().as_bytes()))
    }
}

impl HashProvider for Blake3HashProvider {
    fn hashes(&self, paths: &[String]) -> Result<BTreeMap<String, Hash>, StorageError> {
        paths
            .iter()
            .map(|p| Ok((p.clone(), self.hash_file(p)?)))
            .collect()
    }
}

/// Hash of a leaf's bytes, as `Blake3HashProvider` computes it.
pub fn content_hash(bytes: &[u8]) -> Hash {
    hex::encode(blake3::hash(bytes).as_bytes())
}
