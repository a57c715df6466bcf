//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, then a TOML file, then
//! `DBAFS__*` environment variables (`__` separates nested keys, e.g.
//! `DBAFS__LOGGING__LEVEL=debug`).

pub mod facade;
pub mod merge {
    pub mod merge_policy;
    pub mod service;
}
pub mod paths {
    pub mod xdg_root;
}
pub mod sources {
    pub mod environment;
    pub mod global_file;
}

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;

use crate::dbafs::{DbafsOptions, DEFAULT_NO_SYNC_MARKER};
use crate::error::DbafsError;
use crate::logging::LoggingConfig;
use crate::path;
use crate::types::Features;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbafsConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sled database holding every mount's records. `None` uses the XDG data
    /// directory.
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    #[serde(default)]
    pub mounts: Vec<MountConfig>,
}

impl DbafsConfig {
    /// Check everything deserialization cannot: paths, feature names,
    /// duplicate prefixes and store names.
    pub fn validate(&self) -> Result<(), DbafsError> {
        let mut prefixes = Vec::new();
        let mut names = Vec::new();
        for mount in &self.mounts {
            let prefix = path::normalize(&mount.prefix)?;
            if prefixes.contains(&prefix) {
                return Err(DbafsError::Config(format!(
                    "mount prefix {:?} is configured more than once",
                    prefix
                )));
            }
            let name = mount.store_name()?;
            if names.contains(&name) {
                return Err(DbafsError::Config(format!(
                    "store name {:?} is used by more than one mount",
                    name
                )));
            }
            mount.features()?;
            prefixes.push(prefix);
            names.push(name);
        }
        Ok(())
    }

    pub fn resolved_store_path(&self) -> Result<PathBuf, DbafsError> {
        match &self.store_path {
            Some(p) => Ok(p.clone()),
            None => xdg::default_store_path(),
        }
    }
}

/// One mount: a local directory exposed at `prefix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Mount point inside the manager namespace; `""` is the root.
    #[serde(default)]
    pub prefix: String,

    /// Directory on disk backing the mount.
    pub root: PathBuf,

    /// Feature names: last_modified, file_size, mime_type, extra_metadata.
    #[serde(default = "default_features")]
    pub features: Vec<String>,

    /// Files above this size (bytes) are not tracked.
    #[serde(default)]
    pub max_file_size: Option<u64>,

    /// Marker file excluding a directory from syncing; empty disables it.
    #[serde(default = "default_no_sync_marker")]
    pub no_sync_marker: String,

    /// Record tree name inside the store; derived from the prefix if unset.
    #[serde(default)]
    pub store_name: Option<String>,
}

fn default_features() -> Vec<String> {
    vec!["extra_metadata".to_string()]
}

fn default_no_sync_marker() -> String {
    DEFAULT_NO_SYNC_MARKER.to_string()
}

impl MountConfig {
    pub fn new(prefix: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            root: root.into(),
            features: default_features(),
            max_file_size: None,
            no_sync_marker: default_no_sync_marker(),
            store_name: None,
        }
    }

    pub fn features(&self) -> Result<Features, DbafsError> {
        let mut features = Features::NONE;
        for name in &self.features {
            features |= Features::from_name(name).ok_or_else(|| {
                DbafsError::Config(format!(
                    "unknown feature {:?} for mount {:?}",
                    name, self.prefix
                ))
            })?;
        }
        Ok(features)
    }

    pub fn store_name(&self) -> Result<String, DbafsError> {
        if let Some(name) = &self.store_name {
            return Ok(name.clone());
        }
        let prefix = path::normalize(&self.prefix)?;
        if prefix.is_empty() {
            Ok("root".to_string())
        } else {
            Ok(prefix)
        }
    }

    pub fn options(&self) -> Result<DbafsOptions, DbafsError> {
        Ok(DbafsOptions {
            features: self.features()?,
            max_file_size: self.max_file_size,
            no_sync_marker: Some(self.no_sync_marker.clone()).filter(|m| !m.is_empty()),
        })
    }
}
