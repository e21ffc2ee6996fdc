use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::file_state::FileState;
use crate::persist;

/// One location's self-reported view of its own files, as last heard by this
/// repository. `clock` is a scalar, not the vector clock in
/// [`crate::repository_state::RepositoryFileState`]: it totally orders
/// successive snapshots *of this one location*, so that merging third-party
/// copies of location L's state converges on the newest one seen anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationState {
    pub location_id: String,
    #[serde(default)]
    pub clock: u64,
    pub last_modification: DateTime<Utc>,
    #[serde(default)]
    pub files: BTreeMap<String, FileState>,
    /// Set when *this* repository changed the location's own files; causes
    /// `save_dir` to advance `clock` before writing.
    #[serde(skip, default)]
    dirty: bool,
    /// Set when the in-memory entry disagrees with what's on disk, whether
    /// or not it's locally dirty (e.g. a third party's snapshot adopted via
    /// `merge_from`, whose own clock must be persisted verbatim).
    #[serde(skip, default)]
    needs_write: bool,
}

impl LocationState {
    fn new(location_id: impl Into<String>) -> Self {
        Self {
            location_id: location_id.into(),
            clock: 0,
            last_modification: Utc::now(),
            files: BTreeMap::new(),
            dirty: false,
            needs_write: false,
        }
    }
}

/// Map `{location_id -> LocationState}`, persisted as one file per location
/// under `location_states/<id>`.
#[derive(Debug, Default)]
pub struct LocationStates {
    entries: HashMap<String, LocationState>,
}

impl LocationStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an already-built `{location_id -> LocationState}` map, used to
    /// hold a remote's entries fetched one-location-file-at-a-time.
    pub fn from_entries(entries: HashMap<String, LocationState>) -> Self {
        Self { entries }
    }

    /// Returns the recorded state for `(loc, path)`, or a fresh absent state
    /// carrying `path` if nothing has ever been recorded.
    pub fn get_file_state(&self, loc: &str, path: &str) -> FileState {
        self.entries
            .get(loc)
            .and_then(|ls| ls.files.get(path))
            .cloned()
            .unwrap_or_else(|| FileState::absent(path))
    }

    /// Writes `new` for `(loc, new.path)` if it differs by content from what
    /// is recorded; marks `loc` dirty and bumps `last_modification`. Returns
    /// whether anything changed.
    pub fn update_file_state(&mut self, loc: &str, new: FileState) -> bool {
        let entry = self
            .entries
            .entry(loc.to_string())
            .or_insert_with(|| LocationState::new(loc));
        let changed = match entry.files.get(&new.path) {
            Some(existing) => existing.contents_different(&new),
            None => true,
        };
        if !changed {
            return false;
        }
        entry.files.insert(new.path.clone(), new);
        entry.last_modification = Utc::now();
        entry.dirty = true;
        entry.needs_write = true;
        true
    }

    /// Adopts `remote`'s entry for each location whose scalar clock strictly
    /// exceeds what is locally known. Ties keep the local copy (idempotent).
    /// An adopted entry is someone else's snapshot, not a local change: it is
    /// written out on the next `save_dir` with its clock untouched, never
    /// bumped as if this repository had originated it.
    pub fn merge_from(&mut self, remote: &LocationStates) {
        for (loc, state) in &remote.entries {
            let adopt = match self.entries.get(loc) {
                None => true,
                Some(local) => local.clock < state.clock,
            };
            if adopt {
                let mut adopted = state.clone();
                adopted.needs_write = true;
                self.entries.insert(loc.clone(), adopted);
            }
        }
    }

    pub fn clock_of(&self, loc: &str) -> u64 {
        self.entries.get(loc).map(|ls| ls.clock).unwrap_or(0)
    }

    pub fn paths_of(&self, loc: &str) -> BTreeSet<String> {
        self.entries
            .get(loc)
            .map(|ls| ls.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, loc: &str) -> Option<&LocationState> {
        self.entries.get(loc)
    }

    /// Loads every file directly under `dir`, one per location.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut entries = HashMap::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let state: LocationState = persist::read(&entry.path())?;
                entries.insert(state.location_id.clone(), state);
            }
        }
        Ok(Self { entries })
    }

    /// Persists every location that needs it: a locally dirty one has its
    /// scalar clock advanced first; one only adopted from a remote via
    /// `merge_from` is written verbatim, clock untouched. Locations that are
    /// neither are left alone on disk.
    pub fn save_dir(&mut self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        for (loc, state) in self.entries.iter_mut() {
            if !state.dirty && !state.needs_write {
                continue;
            }
            if state.dirty {
                state.clock += 1;
            }
            let path: PathBuf = dir.join(loc);
            persist::write_atomic(&path, state)?;
            state.dirty = false;
            state.needs_write = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_file_state_is_absent() {
        let ls = LocationStates::new();
        let fs = ls.get_file_state("loc-a", "a.txt");
        assert!(!fs.exists());
        assert_eq!(fs.path, "a.txt");
    }

    #[test]
    fn update_file_state_is_a_noop_when_unchanged() {
        let mut ls = LocationStates::new();
        let fs = FileState {
            path: "a.txt".into(),
            digest: Some("blake3:aa".into()),
            size: Some(1),
            mtime: Some(1),
            wipe: false,
        };
        assert!(ls.update_file_state("loc-a", fs.clone()));
        assert!(!ls.update_file_state("loc-a", fs));
    }

    #[test]
    fn merge_from_keeps_local_on_tie() {
        let mut local = LocationStates::new();
        local.update_file_state(
            "loc-a",
            FileState {
                path: "a.txt".into(),
                digest: Some("blake3:local".into()),
                size: Some(1),
                mtime: Some(1),
                wipe: false,
            },
        );
        local.entries.get_mut("loc-a").unwrap().clock = 5;

        let mut remote = LocationStates::new();
        remote.update_file_state(
            "loc-a",
            FileState {
                path: "a.txt".into(),
                digest: Some("blake3:remote".into()),
                size: Some(1),
                mtime: Some(1),
                wipe: false,
            },
        );
        remote.entries.get_mut("loc-a").unwrap().clock = 5;

        local.merge_from(&remote);
        assert_eq!(
            local.get_file_state("loc-a", "a.txt").digest,
            Some("blake3:local".into())
        );
    }

    #[test]
    fn merge_from_adopts_strictly_newer_clock() {
        let mut local = LocationStates::new();
        local.update_file_state(
            "loc-a",
            FileState {
                path: "a.txt".into(),
                digest: Some("blake3:old".into()),
                size: Some(1),
                mtime: Some(1),
                wipe: false,
            },
        );
        local.entries.get_mut("loc-a").unwrap().clock = 1;

        let mut remote = LocationStates::new();
        remote.update_file_state(
            "loc-a",
            FileState {
                path: "a.txt".into(),
                digest: Some("blake3:new".into()),
                size: Some(1),
                mtime: Some(1),
                wipe: false,
            },
        );
        remote.entries.get_mut("loc-a").unwrap().clock = 2;

        local.merge_from(&remote);
        assert_eq!(
            local.get_file_state("loc-a", "a.txt").digest,
            Some("blake3:new".into())
        );
    }

    #[test]
    fn merged_entry_with_no_local_changes_is_still_written_to_disk() {
        let mut local = LocationStates::new();
        let mut remote = LocationStates::new();
        remote.update_file_state(
            "loc-a",
            FileState {
                path: "a.txt".into(),
                digest: Some("blake3:aa".into()),
                size: Some(1),
                mtime: Some(1),
                wipe: false,
            },
        );
        remote.entries.get_mut("loc-a").unwrap().clock = 7;

        local.merge_from(&remote);
        let dir = tempfile::tempdir().unwrap();
        local.save_dir(dir.path()).unwrap();

        assert!(dir.path().join("loc-a").exists());
        let loaded = LocationStates::load_dir(dir.path()).unwrap();
        assert_eq!(loaded.clock_of("loc-a"), 7);
        assert_eq!(
            loaded.get_file_state("loc-a", "a.txt").digest,
            Some("blake3:aa".into())
        );
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut ls = LocationStates::new();
        ls.update_file_state(
            "loc-a",
            FileState {
                path: "a.txt".into(),
                digest: Some("blake3:aa".into()),
                size: Some(1),
                mtime: Some(1),
                wipe: false,
            },
        );
        ls.save_dir(dir.path()).unwrap();
        let loaded = LocationStates::load_dir(dir.path()).unwrap();
        assert_eq!(loaded.clock_of("loc-a"), 1);
        assert_eq!(
            loaded.get_file_state("loc-a", "a.txt").digest,
            Some("blake3:aa".into())
        );
    }
}
