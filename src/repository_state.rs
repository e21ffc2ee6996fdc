use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::Result;
use crate::file_state::FileState;
use crate::persist;

/// Authoritative, repository-wide fact about one path: what digest it should
/// resolve to, the causal stamp of the decision that produced that fact, and
/// whether the path is retired (wiped) pending a rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFileState {
    pub path: String,
    pub digest: Option<String>,
    #[serde(default)]
    pub clock: Clock,
    #[serde(default)]
    pub wipe: bool,
}

impl RepositoryFileState {
    pub fn blank(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digest: None,
            clock: Clock::new(),
            wipe: false,
        }
    }
}

/// Map `{path -> RepositoryFileState}`: "what should exist under this name."
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryState {
    files: BTreeMap<String, RepositoryFileState>,
}

impl RepositoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&RepositoryFileState> {
        self.files.get(path)
    }

    pub fn set(&mut self, state: RepositoryFileState) {
        self.files.insert(state.path.clone(), state);
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RepositoryFileState)> {
        self.files.iter().map(|(p, s)| (p.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Replaces every entry with a deep copy of `other`.
    pub fn overwrite(&mut self, other: &RepositoryState) {
        self.files = other.files.clone();
    }

    /// Applies a commit's decision for one path. A no-op when `(digest,
    /// wipe)` already match what is recorded; otherwise stamps the new
    /// `(digest, wipe)` pair with `loc`'s clock advanced to `new_clock_value`.
    pub fn update_file_state(&mut self, new_file_state: &FileState, loc: &str, new_clock_value: u64) {
        let entry = self
            .files
            .entry(new_file_state.path.clone())
            .or_insert_with(|| RepositoryFileState::blank(new_file_state.path.clone()));
        if entry.digest == new_file_state.digest && entry.wipe == new_file_state.wipe {
            return;
        }
        entry.digest = new_file_state.digest.clone();
        entry.wipe = new_file_state.wipe;
        entry.clock.set(loc, new_clock_value);
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        persist::read(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_atomic(path, self)
    }
}
