use dbafs::store::{MemoryRecordStore, RecordScope, RecordStore};
use dbafs::tree::{MemoryStorage, Storage};
use dbafs::{Dbafs, DbafsMount, DbafsOptions, ResourceType, SyncMode};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Edit {
    Remove(usize),
    Rehash(usize, u8),
    MoveFile(usize, String, u8),
    MoveDir(usize, u8),
}

fn dir_path() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["d1", "d2", "d3"]), 1..=3)
        .prop_map(|s| s.join("/"))
}

fn file_tree() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::vec(
        (dir_path(), prop::sample::select(vec!["f1", "f2", "f3", "f4"]), 1u8..=3),
        1..12,
    )
    .prop_map(|files| {
        files
            .into_iter()
            .map(|(dir, name, hash)| (format!("{dir}/{name}"), format!("h{hash}")))
            .collect()
    })
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        any::<usize>().prop_map(Edit::Remove),
        (any::<usize>(), 1u8..=3).prop_map(|(i, h)| Edit::Rehash(i, h)),
        (any::<usize>(), dir_path(), 1u8..=3).prop_map(|(i, d, n)| Edit::MoveFile(i, d, n)),
        (any::<usize>(), 1u8..=2).prop_map(|(i, n)| Edit::MoveDir(i, n)),
    ]
}

/// One scope expression: deep, shallow, a plain directory or a file path.
fn scope() -> impl Strategy<Value = String> {
    (dir_path(), 0u8..4).prop_map(|(dir, kind)| match kind {
        0 => format!("{dir}/**"),
        1 => format!("{dir}/*"),
        2 => dir,
        _ => format!("{dir}/f1"),
    })
}

/// Roots of the scopes that take in their whole subtree.
fn deep_roots(scopes: &[String]) -> Vec<String> {
    scopes
        .iter()
        .filter(|s| !s.ends_with("/*"))
        .map(|s| s.trim_end_matches("/**").to_string())
        .collect()
}

fn under(root: &str, path: &str) -> bool {
    path == root || path.starts_with(&format!("{root}/"))
}

fn paths_of(storage: &MemoryStorage, resource_type: ResourceType) -> Vec<String> {
    storage
        .list("", true)
        .unwrap()
        .into_iter()
        .filter(|e| e.resource_type == resource_type)
        .map(|e| e.path)
        .collect()
}

fn exists(storage: &MemoryStorage, path: &str) -> bool {
    storage.stat(path).unwrap().is_some()
}

fn apply_edit(storage: &MemoryStorage, edit: &Edit) {
    match edit {
        Edit::Remove(i) => {
            let files = paths_of(storage, ResourceType::File);
            if !files.is_empty() {
                storage.remove(&files[i % files.len()]);
            }
        }
        Edit::Rehash(i, hash) => {
            let files = paths_of(storage, ResourceType::File);
            if !files.is_empty() {
                storage.set_hash(&files[i % files.len()], &format!("h{hash}"));
            }
        }
        Edit::MoveFile(i, dir, name) => {
            let files = paths_of(storage, ResourceType::File);
            let target = format!("{dir}/r{name}");
            if !files.is_empty() && !exists(storage, &target) {
                storage.rename(&files[i % files.len()], &target);
            }
        }
        Edit::MoveDir(i, name) => {
            let dirs = paths_of(storage, ResourceType::Directory);
            let target = format!("m{name}");
            if !dirs.is_empty() && !exists(storage, &target) {
                let source = &dirs[i % dirs.len()];
                if !source.starts_with('m') {
                    storage.rename(source, &target);
                }
            }
        }
    }
}

fn mount(files: &BTreeMap<String, String>) -> (Arc<MemoryStorage>, Arc<MemoryRecordStore>, Dbafs) {
    let storage = Arc::new(MemoryStorage::with_files(
        files.iter().map(|(p, h)| (p.as_str(), h.as_str())),
    ));
    let records = Arc::new(MemoryRecordStore::new());
    let dbafs = Dbafs::new(
        records.clone(),
        storage.clone(),
        storage.clone(),
        DbafsOptions::default(),
    );
    (storage, records, dbafs)
}

fn stored(records: &MemoryRecordStore) -> BTreeSet<String> {
    records
        .fetch(&[RecordScope::Subtree(String::new())])
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// After applying a sync the store mirrors storage and a second sync
    /// finds nothing to do.
    #[test]
    fn prop_apply_converges(files in file_tree(), edits in prop::collection::vec(edit(), 0..8)) {
        let (storage, records, dbafs) = mount(&files);
        dbafs.sync(&[], SyncMode::Apply).unwrap();

        for edit in &edits {
            apply_edit(&storage, edit);
        }
        dbafs.sync(&[], SyncMode::Apply).unwrap();

        let on_storage: BTreeSet<String> = storage
            .list("", true)
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        prop_assert_eq!(stored(&records), on_storage);
        prop_assert!(dbafs.sync(&[], SyncMode::DryRun).unwrap().is_empty(true));
    }

    /// A scoped sync leaves a store where every record hangs off a recorded
    /// directory, repeating it finds nothing, and a full sync afterwards has
    /// nothing left to change inside the deep scopes.
    #[test]
    fn prop_scoped_apply_is_consistent(
        files in file_tree(),
        edits in prop::collection::vec(edit(), 0..8),
        scopes in prop::collection::vec(scope(), 1..4),
    ) {
        let (storage, records, dbafs) = mount(&files);
        dbafs.sync(&[], SyncMode::Apply).unwrap();
        for edit in &edits {
            apply_edit(&storage, edit);
        }

        let expressions: Vec<&str> = scopes.iter().map(String::as_str).collect();
        dbafs.sync(&expressions, SyncMode::Apply).unwrap();

        let all = records.fetch(&[RecordScope::Subtree(String::new())]).unwrap();
        let dirs: BTreeSet<&str> = all
            .iter()
            .filter(|r| r.resource_type == ResourceType::Directory)
            .map(|r| r.path.as_str())
            .collect();
        for record in &all {
            if let Some((parent, _)) = record.path.rsplit_once('/') {
                prop_assert!(dirs.contains(parent), "{} has no parent record", record.path);
            }
        }

        prop_assert!(dbafs.sync(&expressions, SyncMode::DryRun).unwrap().is_empty(true));

        let rest = dbafs.sync(&[], SyncMode::DryRun).unwrap();
        let mut touched: Vec<String> =
            rest.items_to_create().iter().map(|c| c.path.clone()).collect();
        for (old, attributes) in rest.items_to_update(false) {
            touched.push(old);
            touched.extend(attributes.path);
        }
        touched.extend(rest.items_to_delete().keys().cloned());

        let roots = deep_roots(&scopes);
        for p in &touched {
            prop_assert!(
                !roots.iter().any(|root| under(root, p)),
                "{} changed again although a deep scope covered it",
                p
            );
        }
    }

    /// Renaming files with distinct contents never loses a record identity.
    #[test]
    fn prop_renames_keep_identities(
        dirs in prop::collection::btree_set(dir_path(), 1..6),
        targets in prop::collection::vec(dir_path(), 1..6),
    ) {
        let files: BTreeMap<String, String> = dirs
            .iter()
            .map(|d| (format!("{d}/f1"), format!("content of {d}")))
            .collect();
        let (storage, records, dbafs) = mount(&files);
        dbafs.sync(&[], SyncMode::Apply).unwrap();
        let uuids_before: BTreeSet<_> = files
            .keys()
            .map(|p| records.get(p).unwrap().unwrap().uuid)
            .collect();

        for (n, (source, target_dir)) in files.keys().zip(&targets).enumerate() {
            let target = format!("{target_dir}/r{n}");
            if !exists(&storage, &target) {
                storage.rename(source, &target);
            }
        }

        let changes = dbafs.sync(&[], SyncMode::Apply).unwrap();
        prop_assert!(changes
            .items_to_delete()
            .values()
            .all(|t| *t == ResourceType::Directory));
        prop_assert!(changes
            .items_to_create()
            .iter()
            .all(|c| c.resource_type == ResourceType::Directory));

        let uuids_after: BTreeSet<_> = paths_of(&storage, ResourceType::File)
            .iter()
            .map(|p| records.get(p).unwrap().unwrap().uuid)
            .collect();
        prop_assert_eq!(uuids_before, uuids_after);
    }
}
