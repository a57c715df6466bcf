//! Classification of stored records against a storage snapshot
//!
//! Every path in scope ends up in exactly one bucket: unchanged, updated,
//! moved, deleted or created. A path whose resource type changed is the one
//! exception: unless a move claims either side it is deleted and created.

use super::scan::Snapshot;
use super::scope::ScopeSet;
use crate::changeset::{ChangeSet, CreateItem, UpdateAttributes};
use crate::path;
use crate::store::Record;
use crate::types::{Hash, ResourceType, Timestamp};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

type Candidate = (ResourceType, Hash);

pub(crate) fn compute(
    scopes: &ScopeSet,
    in_scope: &BTreeMap<String, Record>,
    context: &BTreeMap<String, Record>,
    snapshot: &Snapshot,
    track_last_modified: bool,
) -> ChangeSet {
    let mut updates: BTreeMap<String, UpdateAttributes> = BTreeMap::new();
    let mut removed: BTreeMap<String, Candidate> = BTreeMap::new();
    let mut added: BTreeMap<String, Candidate> = BTreeMap::new();
    let mut timestamps: BTreeMap<String, Timestamp> = BTreeMap::new();

    for (p, record) in in_scope {
        let Some(entry) = snapshot.entries.get(p) else {
            removed.insert(p.clone(), (record.resource_type, record.hash.clone()));
            continue;
        };
        if entry.resource_type != record.resource_type {
            removed.insert(p.clone(), (record.resource_type, record.hash.clone()));
            continue;
        }
        if let Some((_, hash)) = snapshot.current(p) {
            if hash != record.hash {
                updates.insert(p.clone(), UpdateAttributes::rehashed(hash));
            }
        }
        if track_last_modified {
            if let Some(ts) = changed_timestamp(record, entry.last_modified) {
                timestamps.insert(p.clone(), ts);
            }
        }
    }

    for p in snapshot.entries.keys() {
        let Some((resource_type, hash)) = snapshot.current(p) else {
            continue;
        };
        let known = in_scope
            .get(p)
            .is_some_and(|record| record.resource_type == resource_type);
        if !known {
            added.insert(p.clone(), (resource_type, hash.to_string()));
        }
    }

    let moves = pair_moves(&removed, &added);
    for (old, new) in &moves {
        updates.insert(old.clone(), UpdateAttributes::moved_to(new.clone()));
        if track_last_modified {
            let current = snapshot.entries.get(new).and_then(|e| e.last_modified);
            if let Some(ts) = in_scope.get(old).and_then(|r| changed_timestamp(r, current)) {
                timestamps.insert(old.clone(), ts);
            }
        }
    }
    let moved_to: BTreeSet<&String> = moves.values().collect();

    // Cascade directories outside the scopes only ever change hash.
    for (p, record) in context {
        if record.resource_type != ResourceType::Directory || scopes.covers(p) {
            continue;
        }
        if let Some(hash) = snapshot.hashes.get(p) {
            if *hash != record.hash {
                updates.insert(p.clone(), UpdateAttributes::rehashed(hash.clone()));
            }
        }
    }

    let items_to_create: Vec<CreateItem> = added
        .into_iter()
        .filter(|(p, _)| !moved_to.contains(p))
        .map(|(path, (resource_type, hash))| CreateItem {
            hash,
            path,
            resource_type,
        })
        .collect();
    let items_to_delete: IndexMap<String, ResourceType> = removed
        .into_iter()
        .filter(|(p, _)| !moves.contains_key(p))
        .map(|(p, (resource_type, _))| (p, resource_type))
        .collect();

    ChangeSet::new(
        items_to_create,
        updates.into_iter().collect(),
        items_to_delete,
        timestamps.into_iter().collect(),
    )
}

fn changed_timestamp(record: &Record, current: Option<Timestamp>) -> Option<Timestamp> {
    match current {
        Some(ts) if record.last_modified != Some(ts) => Some(ts),
        _ => None,
    }
}

/// Pair removed paths with added paths of the same type and hash, 1:1.
///
/// Removed paths are visited shallowest first. Below a directory that was
/// already paired, the path at the same relative location wins; otherwise a
/// candidate with the same file name; otherwise the remaining candidates are
/// handed out in ascending path order.
pub(crate) fn pair_moves(
    removed: &BTreeMap<String, Candidate>,
    added: &BTreeMap<String, Candidate>,
) -> BTreeMap<String, String> {
    let mut pool: BTreeMap<&Candidate, BTreeSet<&str>> = BTreeMap::new();
    for (p, candidate) in added {
        pool.entry(candidate).or_default().insert(p.as_str());
    }

    let mut levels: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for p in removed.keys() {
        levels.entry(path::depth(p)).or_default().push(p.as_str());
    }

    let mut pairs: BTreeMap<String, String> = BTreeMap::new();
    let mut directory_moves: BTreeMap<&str, &str> = BTreeMap::new();

    for olds in levels.values() {
        let mut leftovers = Vec::new();
        for &old in olds {
            let candidate = &removed[old];
            let Some(available) = pool.get_mut(candidate) else {
                continue;
            };
            let under_moved = path::ancestors(old).into_iter().find_map(|ancestor| {
                let target = directory_moves.get(ancestor)?;
                let rest = path::make_relative(old, ancestor)?;
                Some(path::join(target, rest))
            });
            let chosen = under_moved
                .and_then(|target| available.get(target.as_str()).copied())
                .or_else(|| {
                    available
                        .iter()
                        .find(|new| path::file_name(new) == path::file_name(old))
                        .copied()
                });
            match chosen {
                Some(new) => {
                    available.remove(new);
                    pairs.insert(old.to_string(), new.to_string());
                    if candidate.0 == ResourceType::Directory {
                        directory_moves.insert(old, new);
                    }
                }
                None => leftovers.push(old),
            }
        }
        for old in leftovers {
            let candidate = &removed[old];
            let Some(available) = pool.get_mut(candidate) else {
                continue;
            };
            if let Some(new) = available.pop_first() {
                pairs.insert(old.to_string(), new.to_string());
                if candidate.0 == ResourceType::Directory {
                    directory_moves.insert(old, new);
                }
            }
        }
    }
    pairs
}
