//! Error types
//!
//! `StorageError` covers failures of the external collaborators (record store,
//! storage backend, hash provider). `DbafsError` is what the reconciliation
//! engine and the manager return; storage failures pass through it unchanged.

use crate::types::Features;
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by record stores, storage backends and hash providers.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record at {path:?}: {reason}")]
    InvalidRecord { path: String, reason: String },

    #[error("path not found in storage: {0}")]
    NotFound(String),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Errors returned by `Dbafs` and `DbafsManager`.
#[derive(Debug, Error)]
pub enum DbafsError {
    /// A nested mount does not guarantee a feature its ancestor guarantees.
    #[error("mount {nested:?} lacks feature(s) {missing} of enclosing mount {ancestor:?}")]
    FeatureViolation {
        missing: Features,
        nested: String,
        ancestor: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("no record exists for path {0:?}")]
    RecordNotFound(String),

    #[error("uuid {uuid} could not be resolved{}", within(.scope))]
    UuidNotFound { uuid: Uuid, scope: Option<String> },

    #[error("metadata key(s) {} set by more than one mount for {path:?}", .keys.join(", "))]
    MetadataConflict { keys: Vec<String>, path: String },

    #[error("mount does not support {feature} for path {path:?}")]
    Unsupported { feature: Features, path: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn within(scope: &Option<String>) -> String {
    scope
        .as_ref()
        .map(|s| format!(" within {:?}", s))
        .unwrap_or_default()
}

impl From<config::ConfigError> for DbafsError {
    fn from(err: config::ConfigError) -> Self {
        DbafsError::Config(err.to_string())
    }
}

impl DbafsError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        DbafsError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}
