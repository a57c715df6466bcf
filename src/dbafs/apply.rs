//! Translation of a ChangeSet into a record batch

use super::scan::Snapshot;
use crate::changeset::ChangeSet;
use crate::store::{Record, RecordBatch, RecordStore, RecordUpdate};
use crate::tree::StorageEntry;
use crate::types::{ExtraMetadata, Features, Timestamp};

/// Attributes a mount records for an entry, gated by its features.
struct Tracked {
    last_modified: Option<Timestamp>,
    file_size: Option<u64>,
    mime_type: Option<String>,
}

impl Tracked {
    fn of(entry: Option<&StorageEntry>, features: Features) -> Self {
        let Some(entry) = entry else {
            return Self {
                last_modified: None,
                file_size: None,
                mime_type: None,
            };
        };
        Self {
            last_modified: entry
                .last_modified
                .filter(|_| features.contains(Features::LAST_MODIFIED)),
            file_size: entry
                .file_size
                .filter(|_| entry.is_file() && features.contains(Features::FILE_SIZE)),
            mime_type: entry
                .mime_type
                .clone()
                .filter(|_| features.contains(Features::MIME_TYPE)),
        }
    }
}

pub(crate) fn build_batch(
    changes: &ChangeSet,
    snapshot: &Snapshot,
    features: Features,
    store: &dyn RecordStore,
) -> RecordBatch {
    let deletes = changes.items_to_delete().keys().cloned().collect();

    let updates = changes
        .items_to_update(features.contains(Features::LAST_MODIFIED))
        .into_iter()
        .map(|(path, attributes)| {
            let target = attributes.path.as_deref().unwrap_or(path.as_str());
            let tracked = Tracked::of(snapshot.entries.get(target), features);
            RecordUpdate {
                new_path: attributes.path.clone(),
                hash: attributes.hash,
                last_modified: attributes.last_modified,
                file_size: tracked.file_size,
                mime_type: tracked.mime_type,
                path,
            }
        })
        .collect();

    let creates = changes
        .items_to_create()
        .iter()
        .map(|item| {
            let tracked = Tracked::of(snapshot.entries.get(&item.path), features);
            Record {
                path: item.path.clone(),
                uuid: store.next_uuid(),
                hash: item.hash.clone(),
                resource_type: item.resource_type,
                last_modified: tracked.last_modified,
                file_size: tracked.file_size,
                mime_type: tracked.mime_type,
                extra_metadata: ExtraMetadata::new(),
            }
        })
        .collect();

    RecordBatch {
        deletes,
        updates,
        creates,
    }
}
