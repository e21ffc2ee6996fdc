use std::collections::{BTreeMap, BTreeSet};

use crate::clock::Comparison;
use crate::commit;
use crate::error::Result;
use crate::location_states::LocationStates;
use crate::repository_state::{RepositoryFileState, RepositoryState};
use crate::working_directory::WorkingDirectory;

pub type Conflicts = BTreeMap<String, (RepositoryFileState, RepositoryFileState)>;

/// Pairwise-merges `local` against `remote`, following the table in
/// SPEC_FULL.md §4.6. Never mutates either input; the caller applies
/// `merged` via `overwrite` only when `conflicts` is empty.
pub fn merge(local: &RepositoryState, remote: &RepositoryState, merger_id: &str) -> (Conflicts, RepositoryState) {
    let mut conflicts = Conflicts::new();
    let mut merged = RepositoryState::new();

    let paths: BTreeSet<&str> = local.paths().chain(remote.paths()).collect();
    for path in paths {
        match (local.get(path), remote.get(path)) {
            (Some(l), None) => merged.set(l.clone()),
            (None, Some(r)) => merged.set(r.clone()),
            (Some(l), Some(r)) => match l.clock.compare(&r.clock) {
                Comparison::Less => merged.set(r.clone()),
                Comparison::Greater | Comparison::Equal => merged.set(l.clone()),
                Comparison::Concurrent => {
                    if l.digest == r.digest && l.wipe == r.wipe {
                        let mut winner = l.clone();
                        winner.clock = l.clock.join(&r.clock).tick(merger_id);
                        merged.set(winner);
                    } else {
                        conflicts.insert(path.to_string(), (l.clone(), r.clone()));
                    }
                }
            },
            (None, None) => unreachable!("path came from one of the two state sets"),
        }
    }

    (conflicts, merged)
}

/// After a conflict-free merge, renames local files that occupy a wiped
/// path's name onto the live sibling with the same digest, so long as that
/// sibling name isn't already taken locally. Returns the paths renamed.
pub fn auto_rename(wd: &WorkingDirectory, repo_state: &RepositoryState) -> Result<Vec<(String, String)>> {
    let mut renamed = Vec::new();
    let mut used_targets: BTreeSet<String> = BTreeSet::new();

    for (path, entry) in repo_state.iter() {
        if !entry.wipe || !wd.contains(path) {
            continue;
        }
        let Some(digest) = &entry.digest else {
            continue;
        };
        let target = repo_state.iter().find_map(|(other_path, other_entry)| {
            if other_path == path || other_entry.wipe || other_entry.digest.as_deref() != Some(digest.as_str()) {
                return None;
            }
            if wd.contains(other_path) || used_targets.contains(other_path) {
                return None;
            }
            Some(other_path.to_string())
        });
        if let Some(target) = target {
            wd.rename(path, &target)?;
            used_targets.insert(target.clone());
            renamed.push((path.to_string(), target));
        }
    }
    Ok(renamed)
}

/// Drives a conflict-free merge through to completion: adopts `merged` into
/// `repo_state`, runs the auto-rename fixup, and re-commits so the rename is
/// reflected in local state.
pub fn apply_merge(
    local_id: &str,
    wd: &WorkingDirectory,
    loc_states: &mut LocationStates,
    repo_state: &mut RepositoryState,
    merged: RepositoryState,
) -> Result<()> {
    repo_state.overwrite(&merged);
    auto_rename(wd, repo_state)?;
    commit::commit(local_id, wd, loc_states, repo_state)?;
    Ok(())
}
