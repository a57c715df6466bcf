use dbafs::store::{MemoryRecordStore, RecordStore};
use dbafs::tree::MemoryStorage;
use dbafs::{Dbafs, DbafsMount, DbafsOptions, SyncMode};
use std::sync::Arc;
use std::thread;

fn mount() -> (Arc<MemoryStorage>, Arc<MemoryRecordStore>, Arc<Dbafs>) {
    let storage = Arc::new(MemoryStorage::with_files([
        ("docs/a.md", "A"),
        ("docs/b.md", "B"),
        ("media/logo.png", "L"),
    ]));
    let records = Arc::new(MemoryRecordStore::new());
    let dbafs = Arc::new(Dbafs::new(
        records.clone(),
        storage.clone(),
        storage.clone(),
        DbafsOptions::default(),
    ));
    dbafs.sync(&[], SyncMode::Apply).unwrap();
    (storage, records, dbafs)
}

#[test]
fn parallel_syncs_apply_each_change_once() {
    let (storage, records, dbafs) = mount();
    storage.rename("docs/a.md", "archive/a.md");
    storage.add_file("media/banner.png", "N");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dbafs = dbafs.clone();
            thread::spawn(move || dbafs.sync(&[], SyncMode::Apply).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Syncs are serialized: one of them sees the changes, the rest see none.
    let non_empty: Vec<_> = results.iter().filter(|c| !c.is_empty(true)).collect();
    assert_eq!(non_empty.len(), 1);
    let created: Vec<&str> = non_empty[0]
        .items_to_create()
        .iter()
        .map(|i| i.path.as_str())
        .collect();
    assert_eq!(created, vec!["archive", "media/banner.png"]);

    assert!(records.get("docs/a.md").unwrap().is_none());
    assert!(records.get("archive/a.md").unwrap().is_some());
    assert!(dbafs.sync(&[], SyncMode::DryRun).unwrap().is_empty(true));
}

#[test]
fn reads_during_sync_see_old_or_new_state() {
    let (storage, _records, dbafs) = mount();
    let uuid = dbafs.get_record("docs/b.md").unwrap().unwrap().uuid.unwrap();
    storage.rename("docs", "notes");

    let writer = {
        let dbafs = dbafs.clone();
        thread::spawn(move || dbafs.sync(&[], SyncMode::Apply).unwrap())
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let dbafs = dbafs.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let path = dbafs.get_path_from_uuid(&uuid).unwrap();
                    assert!(matches!(
                        path.as_deref(),
                        Some("docs/b.md") | Some("notes/b.md")
                    ));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(
        dbafs.get_path_from_uuid(&uuid).unwrap().as_deref(),
        Some("notes/b.md")
    );
}

#[test]
fn disjoint_scopes_sync_from_several_threads() {
    let (storage, records, dbafs) = mount();
    storage.set_hash("docs/a.md", "A2");
    storage.set_hash("media/logo.png", "L2");

    let handles: Vec<_> = ["docs/**", "media/**"]
        .into_iter()
        .map(|scope| {
            let dbafs = dbafs.clone();
            thread::spawn(move || dbafs.sync(&[scope], SyncMode::Apply).unwrap())
        })
        .collect();
    for handle in handles {
        let changes = handle.join().unwrap();
        assert_eq!(changes.items_to_update(false).len(), 2);
    }

    assert_eq!(records.get("docs/a.md").unwrap().unwrap().hash, "A2");
    assert_eq!(records.get("media/logo.png").unwrap().unwrap().hash, "L2");
    assert!(dbafs.sync(&[], SyncMode::DryRun).unwrap().is_empty(true));
}
