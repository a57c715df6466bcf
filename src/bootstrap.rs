//! Build a manager from configuration
//!
//! Every configured mount gets its own record tree in one sled database, a
//! `LocalStorage` over its root directory and a BLAKE3 hash provider.

use crate::config::{DbafsConfig, MountConfig};
use crate::dbafs::Dbafs;
use crate::error::{DbafsError, StorageError};
use crate::manager::DbafsManager;
use crate::store::SledRecordStore;
use crate::tree::{Blake3HashProvider, LocalStorage};
use std::sync::Arc;
use tracing::info;

pub fn build_manager(config: &DbafsConfig) -> Result<DbafsManager, DbafsError> {
    config.validate()?;
    let store_path = config.resolved_store_path()?;
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent).map_err(StorageError::from)?;
    }
    let db = sled::open(&store_path).map_err(StorageError::from)?;
    info!(store = %store_path.display(), mounts = config.mounts.len(), "Opened record store");

    build_manager_with_db(config, &db)
}

/// Same as `build_manager`, on an already open database.
pub fn build_manager_with_db(
    config: &DbafsConfig,
    db: &sled::Db,
) -> Result<DbafsManager, DbafsError> {
    let mut manager = DbafsManager::new();
    for mount in &config.mounts {
        let dbafs = build_mount(mount, db)?;
        manager.register(Arc::new(dbafs), &mount.prefix)?;
    }
    Ok(manager)
}

fn build_mount(mount: &MountConfig, db: &sled::Db) -> Result<Dbafs, DbafsError> {
    let records = SledRecordStore::new(db, &mount.store_name()?)?;
    let storage = LocalStorage::new(&mount.root)?;
    let hasher = Blake3HashProvider::new(storage.root());
    Ok(Dbafs::new(
        Arc::new(records),
        Arc::new(storage),
        Arc::new(hasher),
        mount.options()?,
    ))
}
