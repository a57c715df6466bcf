use dbafs::store::{RecordStore, SledRecordStore};
use dbafs::tree::{content_hash, Blake3HashProvider, LocalStorage};
use dbafs::{Dbafs, DbafsMount, DbafsOptions, Features, SyncMode};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn open(root: &Path, store: &Path, options: DbafsOptions) -> Dbafs {
    let storage = LocalStorage::new(root).unwrap();
    let hasher = Blake3HashProvider::new(storage.root());
    let records = SledRecordStore::open(store, "files").unwrap();
    Dbafs::new(Arc::new(records), Arc::new(storage), Arc::new(hasher), options)
}

fn write(root: &Path, rel: &str, contents: &str) {
    let full = root.join(rel);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, contents).unwrap();
}

#[test]
fn records_survive_reopening_the_store() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let store = temp.path().join("store");
    write(&root, "notes/today.md", "hello");
    write(&root, "readme.txt", "read me");

    let uuid = {
        let dbafs = open(&root, &store, DbafsOptions::default());
        let changes = dbafs.sync(&[], SyncMode::Apply).unwrap();
        assert_eq!(changes.items_to_create().len(), 3);
        let record = dbafs.records().get("notes/today.md").unwrap().unwrap();
        assert_eq!(record.hash, content_hash(b"hello"));
        record.uuid
    };

    fs::rename(root.join("notes"), root.join("journal")).unwrap();
    let dbafs = open(&root, &store, DbafsOptions::default());
    let changes = dbafs.sync(&[], SyncMode::Apply).unwrap();
    let updates = changes.items_to_update(false);
    assert_eq!(updates["notes"].path.as_deref(), Some("journal"));
    assert_eq!(updates["notes/today.md"].path.as_deref(), Some("journal/today.md"));
    assert!(changes.items_to_delete().is_empty());

    assert_eq!(
        dbafs.get_path_from_uuid(&uuid).unwrap().as_deref(),
        Some("journal/today.md")
    );
    assert!(dbafs.sync(&[], SyncMode::DryRun).unwrap().is_empty(true));
}

#[test]
fn content_edits_are_detected_by_hash() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    write(&root, "a/b.txt", "one");
    let dbafs = open(&root, &temp.path().join("store"), DbafsOptions::default());
    dbafs.sync(&[], SyncMode::Apply).unwrap();

    write(&root, "a/b.txt", "two");
    let changes = dbafs.sync(&[], SyncMode::Apply).unwrap();
    let updates = changes.items_to_update(false);
    assert_eq!(updates["a/b.txt"].hash.as_deref(), Some(content_hash(b"two").as_str()));
    assert!(updates["a"].hash.is_some());
}

#[test]
fn nosync_marker_and_size_limit_apply_on_disk() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    write(&root, "public/page.html", "<p>");
    write(&root, "private/.nosync", "");
    write(&root, "private/secret.txt", "s");
    write(&root, "big.bin", &"x".repeat(64));

    let options = DbafsOptions {
        features: Features::EXTRA_METADATA | Features::FILE_SIZE,
        max_file_size: Some(32),
        ..DbafsOptions::default()
    };
    let dbafs = open(&root, &temp.path().join("store"), options);
    let changes = dbafs.sync(&[], SyncMode::Apply).unwrap();
    let created: Vec<&str> = changes.items_to_create().iter().map(|i| i.path.as_str()).collect();
    assert_eq!(created, vec!["public", "public/page.html"]);

    let page = dbafs.get_record("public/page.html").unwrap().unwrap();
    assert_eq!(page.file_size, Some(3));

    // Removing the marker brings the directory back.
    fs::remove_file(root.join("private/.nosync")).unwrap();
    let changes = dbafs.sync(&[], SyncMode::DryRun).unwrap();
    let created: Vec<&str> = changes.items_to_create().iter().map(|i| i.path.as_str()).collect();
    assert_eq!(created, vec!["private", "private/secret.txt"]);
}
