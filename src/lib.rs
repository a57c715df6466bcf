//! DBAFS: database-assisted file system reconciliation
//!
//! Keeps a record store in step with a hierarchical storage tree. Changes are
//! detected by content hash (directories hash their children's names and
//! hashes), moves keep their record and UUID, and several mounts compose into
//! one namespace through `DbafsManager`.

pub mod bootstrap;
pub mod changeset;
pub mod config;
pub mod dbafs;
pub mod error;
pub mod logging;
pub mod manager;
pub mod path;
pub mod store;
pub mod tree;
pub mod types;
pub mod views;

pub use changeset::{ChangeSet, CreateItem, UpdateAttributes};
pub use dbafs::{Dbafs, DbafsMount, DbafsOptions, SyncMode};
pub use error::{DbafsError, StorageError};
pub use manager::{DbafsManager, MountInfo};
pub use types::{ExtraMetadata, Features, Hash, ResourceType, Timestamp};
pub use views::FilesystemItem;
