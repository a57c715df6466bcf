//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::DbafsConfig;
use crate::error::DbafsError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global config file and environment.
    pub fn load() -> Result<DbafsConfig, DbafsError> {
        validated(MergeService::load()?)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<DbafsConfig, DbafsError> {
        validated(MergeService::load_from_file(path)?)
    }

    /// Load configuration from TOML text.
    pub fn load_from_str(toml: &str) -> Result<DbafsConfig, DbafsError> {
        validated(MergeService::load_from_str(toml)?)
    }

    /// Create default configuration.
    pub fn default() -> DbafsConfig {
        DbafsConfig::default()
    }
}

fn validated(config: DbafsConfig) -> Result<DbafsConfig, DbafsError> {
    config.validate()?;
    Ok(config)
}
