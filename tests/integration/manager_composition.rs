use dbafs::store::MemoryRecordStore;
use dbafs::tree::MemoryStorage;
use dbafs::{
    Dbafs, DbafsError, DbafsManager, DbafsMount, DbafsOptions, ExtraMetadata, Features, SyncMode,
};
use serde_json::json;
use std::sync::Arc;

fn mount(files: &[(&str, &str)], features: Features) -> (Arc<MemoryStorage>, Arc<Dbafs>) {
    let storage = Arc::new(MemoryStorage::with_files(files.iter().copied()));
    let dbafs = Arc::new(Dbafs::new(
        Arc::new(MemoryRecordStore::new()),
        storage.clone(),
        storage.clone(),
        DbafsOptions {
            features,
            ..DbafsOptions::default()
        },
    ));
    (storage, dbafs)
}

/// files at the root, uploads nested one level, thumbnails nested two levels.
fn manager() -> (DbafsManager, Vec<Arc<MemoryStorage>>) {
    let base = Features::EXTRA_METADATA;
    let (root_storage, root) = mount(&[("index.md", "I"), ("uploads/.keep", "K")], base);
    let (uploads_storage, uploads) = mount(
        &[("2024/photo.jpg", "P"), ("readme.txt", "R")],
        base | Features::FILE_SIZE,
    );
    let (thumbs_storage, thumbs) = mount(
        &[("photo_small.jpg", "S")],
        base | Features::FILE_SIZE | Features::LAST_MODIFIED,
    );

    let mut manager = DbafsManager::new();
    manager.register(uploads, "uploads").unwrap();
    manager.register(root, "").unwrap();
    manager.register(thumbs, "uploads/thumbs").unwrap();
    manager.sync(&[], SyncMode::Apply).unwrap();
    (manager, vec![root_storage, uploads_storage, thumbs_storage])
}

#[test]
fn mounts_are_listed_in_prefix_order() {
    let (manager, _) = manager();
    let prefixes: Vec<String> = manager.mounts().into_iter().map(|m| m.prefix).collect();
    assert_eq!(prefixes, vec!["", "uploads", "uploads/thumbs"]);
}

#[test]
fn nested_mount_must_keep_ancestor_features() {
    let (mut manager, _) = manager();
    let (_, weak) = mount(&[], Features::NONE);
    let err = manager.register(weak, "uploads/thumbs/tiny").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("uploads/thumbs/tiny"), "{message}");
    assert!(message.contains("\"uploads/thumbs\""), "{message}");
    assert!(message.contains("last_modified"), "{message}");
}

#[test]
fn manager_sync_covers_every_mount() {
    let (manager, _) = manager();
    assert!(manager.file_exists("index.md").unwrap());
    assert!(manager.file_exists("uploads/2024/photo.jpg").unwrap());
    assert!(manager.file_exists("uploads/thumbs/photo_small.jpg").unwrap());
    assert!(manager.directory_exists("uploads/2024").unwrap());
    assert!(!manager.file_exists("uploads/2024").unwrap());
}

#[test]
fn scoped_manager_sync_reaches_only_intersecting_mounts() {
    let (manager, storages) = manager();
    storages[0].add_file("new.md", "N");
    storages[1].add_file("2024/other.jpg", "O");
    storages[2].add_file("other_small.jpg", "OS");

    let changes = manager.sync(&["uploads/2024/**"], SyncMode::DryRun).unwrap();
    let created: Vec<&str> = changes.items_to_create().iter().map(|i| i.path.as_str()).collect();
    assert_eq!(created, vec!["uploads/2024/other.jpg"]);

    let changes = manager.sync(&["uploads/**"], SyncMode::DryRun).unwrap();
    let created: Vec<&str> = changes.items_to_create().iter().map(|i| i.path.as_str()).collect();
    assert_eq!(created, vec!["uploads/2024/other.jpg", "uploads/thumbs/other_small.jpg"]);

    let changes = manager.sync(&[], SyncMode::DryRun).unwrap();
    assert_eq!(changes.items_to_create().len(), 3);
    assert_eq!(changes.items_to_create()[0].path, "new.md");
}

#[test]
fn attributes_follow_the_owning_mount() {
    let (manager, _) = manager();
    assert_eq!(manager.get_file_size("uploads/readme.txt").unwrap(), Some(1));
    assert_eq!(manager.get_file_size("index.md").unwrap(), None);
    assert_eq!(manager.get_last_modified("uploads/readme.txt").unwrap(), None);
    assert_eq!(manager.get_file_size("uploads/missing").unwrap(), None);
}

#[test]
fn metadata_aggregates_across_mounts() {
    let (manager, _) = manager();
    let data: ExtraMetadata = [("alt".to_string(), json!("A photo"))].into_iter().collect();
    manager.set_extra_metadata("uploads/2024/photo.jpg", data.clone()).unwrap();
    assert_eq!(manager.get_extra_metadata("uploads/2024/photo.jpg").unwrap(), data);

    // The uploads directory itself is recorded by the root mount.
    let folder: ExtraMetadata = [("public".to_string(), json!(true))].into_iter().collect();
    manager.set_extra_metadata("uploads", folder.clone()).unwrap();
    assert_eq!(manager.get_extra_metadata("uploads").unwrap(), folder);
}

#[test]
fn metadata_from_outer_and_nested_mount_is_merged() {
    let (_, root) = mount(&[("uploads/readme.txt", "R")], Features::EXTRA_METADATA);
    let (_, uploads) = mount(&[("readme.txt", "R")], Features::EXTRA_METADATA);
    let mut manager = DbafsManager::new();
    manager.register(root.clone(), "").unwrap();
    manager.register(uploads.clone(), "uploads").unwrap();
    manager.sync(&[], SyncMode::Apply).unwrap();

    let outer: ExtraMetadata = [("license".to_string(), json!("CC-BY"))].into_iter().collect();
    let inner: ExtraMetadata = [("caption".to_string(), json!("Read me"))].into_iter().collect();
    root.set_extra_metadata("uploads/readme.txt", outer).unwrap();
    uploads.set_extra_metadata("readme.txt", inner).unwrap();

    let merged = manager.get_extra_metadata("uploads/readme.txt").unwrap();
    let expected: ExtraMetadata = [
        ("caption".to_string(), json!("Read me")),
        ("license".to_string(), json!("CC-BY")),
    ]
    .into_iter()
    .collect();
    assert_eq!(merged, expected);
}

#[test]
fn uuid_resolution_is_prefixed_and_constrained() {
    let (manager, storages) = manager();
    let item = manager.get_record("uploads/thumbs/photo_small.jpg").unwrap().unwrap();
    let uuid = item.uuid.unwrap();

    storages[2].rename("photo_small.jpg", "sizes/small.jpg");
    manager.sync(&["uploads/thumbs/**"], SyncMode::Apply).unwrap();

    assert_eq!(
        manager.resolve_uuid(&uuid, None).unwrap(),
        "uploads/thumbs/sizes/small.jpg"
    );
    assert_eq!(
        manager.resolve_uuid(&uuid, Some("uploads")).unwrap(),
        "uploads/thumbs/sizes/small.jpg"
    );
    assert!(matches!(
        manager.resolve_uuid(&uuid, Some("uploads/2024")),
        Err(DbafsError::UuidNotFound { .. })
    ));
}

#[test]
fn deep_listing_puts_nested_mounts_first() {
    let (manager, _) = manager();
    let paths: Vec<String> = manager
        .list_contents("uploads", true)
        .unwrap()
        .into_iter()
        .map(|i| i.path)
        .collect();
    assert_eq!(
        paths,
        vec![
            "uploads/thumbs/photo_small.jpg",
            "uploads/2024",
            "uploads/2024/photo.jpg",
            "uploads/readme.txt",
        ]
    );
}
