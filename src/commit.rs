use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::file_state::FileState;
use crate::location_states::LocationStates;
use crate::repository_state::RepositoryState;
use crate::working_directory::WorkingDirectory;

/// Scans the working directory, updates `loc_states` and `repo_state` for
/// every path that changed, and reports whether anything did.
///
/// Persistence is the caller's job (§5: LocationStates before RepositoryState)
/// so a crash between the two leaves only a stale-but-recoverable
/// RepositoryState.
pub fn commit(
    local_id: &str,
    wd: &WorkingDirectory,
    loc_states: &mut LocationStates,
    repo_state: &mut RepositoryState,
) -> Result<bool> {
    let mut paths: BTreeSet<String> = wd.enumerate()?;
    paths.extend(loc_states.paths_of(local_id));

    let mut previous: BTreeMap<String, FileState> = BTreeMap::new();
    let mut wd_states: BTreeMap<String, FileState> = BTreeMap::new();
    for path in &paths {
        let recorded = loc_states.get_file_state(local_id, path);
        if wd.maybe_modified(&recorded) {
            let scanned = wd.scan(path)?;
            previous.insert(path.clone(), recorded);
            wd_states.insert(path.clone(), scanned);
        }
    }

    let mut any_change = false;
    for path in &paths {
        let Some(new_state) = wd_states.get(path).cloned() else {
            continue;
        };
        let mut new_state = new_state;

        if !loc_states.update_file_state(local_id, new_state.clone()) {
            continue;
        }

        if !new_state.exists() {
            if let Some(prev_digest) = previous.get(path).and_then(|p| p.digest.clone()) {
                for other in &paths {
                    if other == path {
                        continue;
                    }
                    let Some(other_prev) = previous.get(other) else {
                        continue;
                    };
                    let Some(other_new) = wd_states.get(other) else {
                        continue;
                    };
                    if !other_prev.exists() && other_new.exists() && other_new.digest.as_deref() == Some(prev_digest.as_str()) {
                        new_state.wipe = true;
                        new_state.digest = Some(prev_digest);
                        break;
                    }
                }
            }
        }

        repo_state.update_file_state(&new_state, local_id, loc_states.clock_of(local_id) + 1);
        any_change = true;
    }

    Ok(any_change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Ruleset;
    use std::sync::Arc;

    fn setup(dir: &std::path::Path) -> WorkingDirectory {
        let ruleset = Ruleset::load(dir).unwrap();
        WorkingDirectory::new(dir.to_path_buf(), Arc::new(ruleset), "blake3")
    }

    #[test]
    fn first_commit_records_new_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let wd = setup(dir.path());
        let mut loc = LocationStates::new();
        let mut repo = RepositoryState::new();
        let changed = commit("loc-a", &wd, &mut loc, &mut repo).unwrap();
        assert!(changed);
        assert!(repo.get("a.txt").unwrap().digest.is_some());
    }

    #[test]
    fn second_commit_with_no_changes_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let wd = setup(dir.path());
        let mut loc = LocationStates::new();
        let mut repo = RepositoryState::new();
        commit("loc-a", &wd, &mut loc, &mut repo).unwrap();
        let changed_again = commit("loc-a", &wd, &mut loc, &mut repo).unwrap();
        assert!(!changed_again);
    }

    #[test]
    fn deleting_only_copy_retains_path_with_wipe() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let wd = setup(dir.path());
        let mut loc = LocationStates::new();
        let mut repo = RepositoryState::new();
        commit("loc-a", &wd, &mut loc, &mut repo).unwrap();
        let prior_digest = repo.get("a.txt").unwrap().digest.clone();

        std::fs::remove_file(dir.path().join("a.txt")).unwrap();
        commit("loc-a", &wd, &mut loc, &mut repo).unwrap();

        let entry = repo.get("a.txt").unwrap();
        assert!(entry.wipe);
        assert_eq!(entry.digest, prior_digest);
    }

    #[test]
    fn rename_on_disk_marks_source_wiped_and_target_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), b"data").unwrap();
        let wd = setup(dir.path());
        let mut loc = LocationStates::new();
        let mut repo = RepositoryState::new();
        commit("loc-a", &wd, &mut loc, &mut repo).unwrap();
        let digest = repo.get("old.txt").unwrap().digest.clone();

        std::fs::rename(dir.path().join("old.txt"), dir.path().join("new.txt")).unwrap();
        commit("loc-a", &wd, &mut loc, &mut repo).unwrap();

        let old_entry = repo.get("old.txt").unwrap();
        assert!(old_entry.wipe);
        assert_eq!(old_entry.digest, digest);
        let new_entry = repo.get("new.txt").unwrap();
        assert!(!new_entry.wipe);
        assert_eq!(new_entry.digest, digest);
    }

    #[test]
    fn empty_directory_commit_reports_no_change() {
        let dir = tempfile::tempdir().unwrap();
        let wd = setup(dir.path());
        let mut loc = LocationStates::new();
        let mut repo = RepositoryState::new();
        let changed = commit("loc-a", &wd, &mut loc, &mut repo).unwrap();
        assert!(!changed);
        assert!(repo.is_empty());
    }
}
