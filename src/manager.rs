//! Mount composition
//!
//! `DbafsManager` stitches mounts at nested or disjoint prefixes into one
//! namespace. Reads are routed to the most specific mount covering a path;
//! syncs fan out to every intersecting mount and fold into one ChangeSet.

use crate::changeset::ChangeSet;
use crate::dbafs::{DbafsMount, Scope, ScopeDepth, ScopeSet, SyncMode};
use crate::error::DbafsError;
use crate::path;
use crate::types::{ExtraMetadata, Features, Timestamp};
use crate::views::FilesystemItem;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Read-only description of a registered mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub prefix: String,
    pub features: Features,
}

struct Mount {
    prefix: String,
    dbafs: Arc<dyn DbafsMount>,
}

impl Mount {
    fn features(&self) -> Features {
        self.dbafs.supported_features()
    }
}

#[derive(Default)]
pub struct DbafsManager {
    /// Ascending by prefix.
    mounts: Vec<Mount>,
}

impl DbafsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mount at `prefix`.
    ///
    /// A mount nested inside another one must support every feature of the
    /// enclosing mount.
    pub fn register(&mut self, dbafs: Arc<dyn DbafsMount>, prefix: &str) -> Result<(), DbafsError> {
        let prefix = path::normalize(prefix)?;
        let features = dbafs.supported_features();

        // Most specific first, so the nearest conflicting mount is reported.
        for mount in self.mounts.iter().rev() {
            if mount.prefix == prefix {
                return Err(DbafsError::Config(format!(
                    "a mount is already registered at {:?}",
                    prefix
                )));
            }
            if path::is_base_path(&mount.prefix, &prefix) {
                check_monotonic(mount.features(), &mount.prefix, features, &prefix)?;
            } else if path::is_base_path(&prefix, &mount.prefix) {
                check_monotonic(features, &prefix, mount.features(), &mount.prefix)?;
            }
        }

        info!(prefix = %prefix, features = %features, "Registered mount");
        let at = self.mounts.partition_point(|m| m.prefix < prefix);
        self.mounts.insert(at, Mount { prefix, dbafs });
        Ok(())
    }

    pub fn mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .iter()
            .map(|m| MountInfo {
                prefix: m.prefix.clone(),
                features: m.features(),
            })
            .collect()
    }

    /// `true` if a registered mount covers `path` once `.` and `..` segments
    /// are resolved.
    pub fn matches(&self, path: &str) -> bool {
        match path::normalize(path) {
            Ok(normalized) => self
                .mounts
                .iter()
                .any(|m| path::is_base_path(&m.prefix, &normalized)),
            Err(_) => false,
        }
    }

    /// Covering mounts, most specific first, with `path` made relative to each.
    fn covering<'a>(&'a self, path: &'a str) -> impl Iterator<Item = (&'a Mount, &'a str)> + 'a {
        self.mounts
            .iter()
            .rev()
            .filter_map(move |m| path::make_relative(path, &m.prefix).map(|rel| (m, rel)))
    }

    /// The mount holding the record for `path`. A mount root is recorded, if
    /// at all, by an enclosing mount.
    fn owner<'a>(&'a self, path: &'a str) -> Option<(&'a Mount, &'a str)> {
        self.covering(path).find(|(_, rel)| !rel.is_empty())
    }

    fn item(&self, path: &str) -> Result<Option<(Features, FilesystemItem)>, DbafsError> {
        let path = path::normalize(path)?;
        match self.owner(&path) {
            Some((mount, rel)) => Ok(mount
                .dbafs
                .get_record(rel)?
                .map(|item| (mount.features(), item))),
            None => Ok(None),
        }
    }

    pub fn has(&self, path: &str) -> Result<bool, DbafsError> {
        Ok(self.item(path)?.is_some())
    }

    pub fn file_exists(&self, path: &str) -> Result<bool, DbafsError> {
        Ok(self.item(path)?.is_some_and(|(_, item)| item.is_file))
    }

    pub fn directory_exists(&self, path: &str) -> Result<bool, DbafsError> {
        Ok(self.item(path)?.is_some_and(|(_, item)| item.is_directory()))
    }

    /// Record of `path` as seen through the manager, with its full path.
    pub fn get_record(&self, path: &str) -> Result<Option<FilesystemItem>, DbafsError> {
        let normalized = path::normalize(path)?;
        Ok(self.item(&normalized)?.map(|(_, mut item)| {
            item.path = normalized;
            item
        }))
    }

    /// Attribute of the owning mount's record, `None` without a lookup if the
    /// mount does not guarantee `feature`.
    fn attribute<T>(
        &self,
        path: &str,
        feature: Features,
        get: impl FnOnce(FilesystemItem) -> Option<T>,
    ) -> Result<Option<T>, DbafsError> {
        let path = path::normalize(path)?;
        let Some((mount, rel)) = self.owner(&path) else {
            return Ok(None);
        };
        if !mount.features().contains(feature) {
            return Ok(None);
        }
        Ok(mount.dbafs.get_record(rel)?.and_then(get))
    }

    pub fn get_last_modified(&self, path: &str) -> Result<Option<Timestamp>, DbafsError> {
        self.attribute(path, Features::LAST_MODIFIED, |item| item.last_modified)
    }

    pub fn get_file_size(&self, path: &str) -> Result<Option<u64>, DbafsError> {
        self.attribute(path, Features::FILE_SIZE, |item| item.file_size)
    }

    pub fn get_mime_type(&self, path: &str) -> Result<Option<String>, DbafsError> {
        self.attribute(path, Features::MIME_TYPE, |item| item.mime_type)
    }

    /// Metadata contributed by every mount covering `path`. Two mounts
    /// defining the same key is an error.
    pub fn get_extra_metadata(&self, path: &str) -> Result<ExtraMetadata, DbafsError> {
        let path = path::normalize(path)?;
        let mut merged = ExtraMetadata::new();
        let mut conflicts = Vec::new();

        for (mount, rel) in self.covering(&path) {
            if rel.is_empty() || !mount.features().contains(Features::EXTRA_METADATA) {
                continue;
            }
            let Some(item) = mount.dbafs.get_record(rel)? else {
                continue;
            };
            for (key, value) in item.extra_metadata {
                if merged.contains_key(&key) {
                    conflicts.push(key);
                } else {
                    merged.insert(key, value);
                }
            }
        }

        if conflicts.is_empty() {
            Ok(merged)
        } else {
            conflicts.sort();
            conflicts.dedup();
            Err(DbafsError::MetadataConflict {
                keys: conflicts,
                path,
            })
        }
    }

    /// Store metadata on the most specific mount holding a record for `path`.
    pub fn set_extra_metadata(&self, path: &str, data: ExtraMetadata) -> Result<(), DbafsError> {
        let path = path::normalize(path)?;
        for (mount, rel) in self.covering(&path) {
            if rel.is_empty() {
                continue;
            }
            match mount.dbafs.set_extra_metadata(rel, data.clone()) {
                Ok(()) => return Ok(()),
                Err(DbafsError::RecordNotFound(_)) | Err(DbafsError::Unsupported { .. }) => {
                    debug!(
                        prefix = %mount.prefix,
                        path = %path,
                        "Mount cannot store metadata, trying enclosing mount"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(DbafsError::RecordNotFound(path))
    }

    /// Full path of the resource with `uuid`. With `within`, only resources
    /// inside that path are considered.
    pub fn resolve_uuid(&self, uuid: &Uuid, within: Option<&str>) -> Result<String, DbafsError> {
        let within = within.map(path::normalize).transpose()?;
        for mount in self.mounts.iter().rev() {
            if let Some(constraint) = &within {
                let intersects = path::is_base_path(constraint, &mount.prefix)
                    || path::is_base_path(&mount.prefix, constraint);
                if !intersects {
                    continue;
                }
            }
            let Some(rel) = mount.dbafs.get_path_from_uuid(uuid)? else {
                continue;
            };
            let full = path::join(&mount.prefix, &rel);
            if within.as_deref().map_or(true, |c| path::is_base_path(c, &full)) {
                return Ok(full);
            }
        }
        Err(DbafsError::UuidNotFound {
            uuid: *uuid,
            scope: within,
        })
    }

    /// Entries below `path`, manager-relative. Deep listings include mounts
    /// nested inside `path` (most specific first); the covering mount's
    /// entries follow. Paths listed twice keep their first occurrence.
    pub fn list_contents(&self, path: &str, deep: bool) -> Result<Vec<FilesystemItem>, DbafsError> {
        let path = path::normalize(path)?;
        let mut listed: IndexMap<String, FilesystemItem> = IndexMap::new();
        let mut push = |items: Vec<FilesystemItem>, prefix: &str| {
            for item in items {
                let item = item.with_prefix(prefix);
                listed.entry(item.path.clone()).or_insert(item);
            }
        };

        if deep {
            let mut nested: Vec<&Mount> = self
                .mounts
                .iter()
                .filter(|m| m.prefix != path && path::is_base_path(&path, &m.prefix))
                .collect();
            nested.sort_by(|a, b| {
                path::depth(&b.prefix)
                    .cmp(&path::depth(&a.prefix))
                    .then_with(|| a.prefix.cmp(&b.prefix))
            });
            for mount in nested {
                push(mount.dbafs.get_records("", true)?, &mount.prefix);
            }
        }

        if let Some((mount, rel)) = self.covering(&path).next() {
            push(mount.dbafs.get_records(rel, deep)?, &mount.prefix);
        }
        Ok(listed.into_values().collect())
    }

    /// Sync every mount intersecting `scopes` (all mounts without scopes) and
    /// merge the results in ascending prefix order.
    pub fn sync(&self, scopes: &[&str], mode: SyncMode) -> Result<ChangeSet, DbafsError> {
        let scopes = ScopeSet::parse(scopes)?;
        let mut result = ChangeSet::empty();

        for mount in &self.mounts {
            let relative = mount_scopes(&scopes, &mount.prefix);
            if relative.is_empty() {
                continue;
            }
            let expressions: Vec<String> = relative.iter().map(Scope::expression).collect();
            let expressions: Vec<&str> = expressions.iter().map(String::as_str).collect();
            debug!(prefix = %mount.prefix, scopes = ?expressions, "Syncing mount");

            let changes = mount.dbafs.sync(&expressions, mode)?;
            result = result.with_other(&changes, &mount.prefix);
        }

        info!(changes = %result, mounts = self.mounts.len(), "Manager sync finished");
        Ok(result)
    }
}

fn check_monotonic(
    ancestor_features: Features,
    ancestor: &str,
    nested_features: Features,
    nested: &str,
) -> Result<(), DbafsError> {
    let missing = ancestor_features.missing_from(nested_features);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DbafsError::FeatureViolation {
            missing,
            nested: nested.to_string(),
            ancestor: ancestor.to_string(),
        })
    }
}

/// Scopes translated to be relative to the mount at `prefix`.
fn mount_scopes(scopes: &ScopeSet, prefix: &str) -> Vec<Scope> {
    scopes
        .scopes()
        .iter()
        .filter_map(|scope| {
            if let Some(rel) = path::make_relative(&scope.path, prefix) {
                return Some(Scope {
                    path: rel.to_string(),
                    depth: scope.depth,
                });
            }
            let encloses = path::is_base_path(&scope.path, prefix);
            (encloses && scope.depth == ScopeDepth::Deep).then(|| Scope::deep(""))
        })
        .collect()
}
