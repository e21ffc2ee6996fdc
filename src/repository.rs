//! The facade every caller (CLI, tests, embedders) talks to. A `Repository`
//! owns one working directory plus its `.harmony` control directory and
//! wires CommitEngine/MergeEngine/Connector together per §4.8.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::commit;
use crate::config::{RepositoryConfig, Settings};
use crate::connector::{self, Connector};
use crate::error::{ErrorKind, Result};
use crate::location_states::LocationStates;
use crate::merge::{self, Conflicts};
use crate::remotes::Remotes;
use crate::repository_state::RepositoryState;
use crate::rules::Ruleset;
use crate::working_directory::WorkingDirectory;

pub const HARMONY_DIR: &str = ".harmony";

const CONFIG_FILE: &str = "config";
const REMOTES_FILE: &str = "remotes";
const RULES_FILE: &str = "rules";
const REPOSITORY_STATE_FILE: &str = "repository_state";
const LOCATION_STATES_DIR: &str = "location_states";

/// A `{path -> FileStatus}` entry, the explicit status shape `get_file_stats`
/// hands back. Named fields rather than a dynamic attribute bag, per §4.8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub exists_in_repository: bool,
    pub exists_in_location_state: bool,
    pub exists_in_workdir: bool,
    pub maybe_modified: bool,
    pub is_most_recent: bool,
}

pub struct Repository {
    harmony_dir: PathBuf,
    config: RepositoryConfig,
    settings: Settings,
    wd: WorkingDirectory,
    loc_states: LocationStates,
    repo_state: RepositoryState,
    remotes: Remotes,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("harmony_dir", &self.harmony_dir)
            .field("config", &self.config)
            .field("settings", &self.settings)
            .field("loc_states", &self.loc_states)
            .field("repo_state", &self.repo_state)
            .field("remotes", &self.remotes)
            .finish()
    }
}

impl Repository {
    /// Creates a fresh control directory at `working_dir/.harmony`, mints a
    /// location id, and persists empty state stores. Fails if one already
    /// exists.
    pub fn init(working_dir: &Path, name: Option<&str>, settings: Settings) -> Result<Self> {
        let harmony_dir = working_dir.join(HARMONY_DIR);
        if harmony_dir.exists() {
            return Err(ErrorKind::AlreadyInitialized(working_dir.to_path_buf()));
        }
        std::fs::create_dir_all(&harmony_dir)?;

        let config = RepositoryConfig {
            id: Uuid::new_v4().to_string(),
            name: name.map(str::to_string).unwrap_or_else(|| generate_name(working_dir)),
        };

        let ruleset = Ruleset::default_for_init(working_dir)?;
        Ruleset::write_default(working_dir)?;
        persist_rules_snapshot(&harmony_dir, working_dir)?;

        let wd = WorkingDirectory::new(
            working_dir.to_path_buf(),
            Arc::new(ruleset),
            settings.digest_algo.clone(),
        );

        let mut repo = Self {
            harmony_dir,
            config,
            settings,
            wd,
            loc_states: LocationStates::new(),
            repo_state: RepositoryState::new(),
            remotes: Remotes::new(),
        };
        repo.persist_all()?;
        Ok(repo)
    }

    /// Rehydrates every component from an existing `.harmony` directory.
    pub fn load(harmony_dir: &Path, settings: Settings) -> Result<Self> {
        if !harmony_dir.is_dir() {
            return Err(ErrorKind::NotARepository(harmony_dir.to_path_buf()));
        }
        let working_dir = harmony_dir
            .parent()
            .ok_or_else(|| ErrorKind::NotARepository(harmony_dir.to_path_buf()))?
            .to_path_buf();

        let config = RepositoryConfig::load(&harmony_dir.join(CONFIG_FILE))?;
        let ruleset = Ruleset::load(&working_dir)?;
        let wd = WorkingDirectory::new(working_dir, Arc::new(ruleset), settings.digest_algo.clone());
        let loc_states = LocationStates::load_dir(&harmony_dir.join(LOCATION_STATES_DIR))?;
        let repo_state = RepositoryState::load(&harmony_dir.join(REPOSITORY_STATE_FILE))?;
        let remotes = Remotes::load(&harmony_dir.join(REMOTES_FILE))?;

        Ok(Self {
            harmony_dir: harmony_dir.to_path_buf(),
            config,
            settings,
            wd,
            loc_states,
            repo_state,
            remotes,
        })
    }

    /// Walks upward from `starting_dir` looking for a `.harmony` directory,
    /// stopping at the first filesystem boundary crossed.
    pub fn find(starting_dir: &Path, settings: Settings) -> Result<Self> {
        let mut current = starting_dir
            .canonicalize()
            .unwrap_or_else(|_| starting_dir.to_path_buf());
        let starting_device = device_id(&current);

        loop {
            let candidate = current.join(HARMONY_DIR);
            if candidate.is_dir() {
                return Self::load(&candidate, settings);
            }
            let Some(parent) = current.parent() else {
                return Err(ErrorKind::NotARepository(starting_dir.to_path_buf()));
            };
            if device_id(parent) != starting_device {
                return Err(ErrorKind::NotARepository(starting_dir.to_path_buf()));
            }
            current = parent.to_path_buf();
        }
    }

    /// `init`s a fresh repository at `target_dir`, learns the source peer's
    /// identity, records it as a remote, and pulls its state.
    pub async fn clone(
        target_dir: &Path,
        source_uri: &str,
        name: Option<&str>,
        settings: Settings,
    ) -> Result<(Self, Conflicts)> {
        let mut repo = Self::init(target_dir, name, settings)?;
        let connector = connector::connect(source_uri)?;
        let source_config = fetch_remote_config(connector.as_ref()).await?;

        repo.remotes.add("origin", source_uri)?;
        repo.remotes.learn_id("origin", &source_config.id);
        repo.persist_remotes()?;

        let conflicts = repo.pull_state("origin").await?;
        Ok((repo, conflicts))
    }

    pub fn commit(&mut self) -> Result<bool> {
        let changed = commit::commit(
            &self.config.id,
            &self.wd,
            &mut self.loc_states,
            &mut self.repo_state,
        )?;
        self.persist_state()?;
        Ok(changed)
    }

    pub async fn pull_state(&mut self, remote_spec: &str) -> Result<Conflicts> {
        let uri = self.remotes.resolve_location(remote_spec);
        let connector = connector::connect(&uri)?;

        let metadata = connector
            .fetch_metadata_files(&[REPOSITORY_STATE_FILE.to_string()])
            .await?;
        let remote_repo_state = match metadata.get(REPOSITORY_STATE_FILE) {
            Some(path) => RepositoryState::load(path)?,
            None => RepositoryState::new(),
        };

        let remote_loc_states =
            fetch_remote_location_states(connector.as_ref(), &self.loc_states, &remote_repo_state).await?;
        self.loc_states.merge_from(&remote_loc_states);
        self.loc_states.save_dir(&self.harmony_dir.join(LOCATION_STATES_DIR))?;

        let (conflicts, merged) = merge::merge(&self.repo_state, &remote_repo_state, &self.config.id);
        if conflicts.is_empty() {
            merge::apply_merge(&self.config.id, &self.wd, &mut self.loc_states, &mut self.repo_state, merged)?;
            self.persist_state()?;
        }
        Ok(conflicts)
    }

    pub async fn pull_file(&mut self, path: &str, remote_spec: &str) -> Result<()> {
        let uri = self.remotes.resolve_location(remote_spec);
        let connector = connector::connect(&uri)?;
        connector
            .fetch_payload_files(&[path.to_string()], &self.wd.root)
            .await?;
        self.commit()?;
        Ok(())
    }

    pub fn add_remote(&mut self, name: &str, location: &str) -> Result<()> {
        self.remotes.add(name, location)?;
        self.persist_remotes()
    }

    pub fn remove_remote(&mut self, name: &str) -> Result<()> {
        self.remotes.remove(name)?;
        self.persist_remotes()
    }

    pub fn get_remotes(&self) -> Vec<&crate::remotes::Remote> {
        self.remotes.list()
    }

    /// One [`FileStatus`] for every path known to any of the three sources.
    pub fn get_file_stats(&self) -> std::collections::BTreeMap<String, FileStatus> {
        let mut paths: std::collections::BTreeSet<String> = self.repo_state.paths().map(str::to_string).collect();
        paths.extend(self.loc_states.paths_of(&self.config.id));
        paths.extend(self.wd.enumerate().unwrap_or_default());

        let mut out = std::collections::BTreeMap::new();
        for path in paths {
            let repo_entry = self.repo_state.get(&path);
            let local_state = self.loc_states.get_file_state(&self.config.id, &path);
            let exists_in_workdir = self.wd.contains(&path);
            let maybe_modified = self.wd.maybe_modified(&local_state);

            // "Most recent" means this location's own record already matches
            // what the repository considers authoritative for the path.
            let is_most_recent = match repo_entry {
                Some(entry) => entry.digest == local_state.digest && entry.wipe == !local_state.exists(),
                None => !local_state.exists(),
            };

            out.insert(
                path,
                FileStatus {
                    exists_in_repository: repo_entry.map(|e| !e.wipe).unwrap_or(false),
                    exists_in_location_state: local_state.exists(),
                    exists_in_workdir,
                    maybe_modified,
                    is_most_recent,
                },
            );
        }
        out
    }

    /// First eight hex characters of the location id, log/display only.
    pub fn short_id(&self) -> &str {
        let id = self.config.id.as_str();
        let stripped_len = id.chars().filter(|c| *c != '-').count().min(8);
        &id[..shortest_prefix_len(id, stripped_len)]
    }

    pub fn working_dir(&self) -> &Path {
        &self.wd.root
    }

    pub fn harmony_dir(&self) -> &Path {
        &self.harmony_dir
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn persist_all(&mut self) -> Result<()> {
        self.config.save(&self.harmony_dir.join(CONFIG_FILE))?;
        self.persist_remotes()?;
        self.persist_state()
    }

    fn persist_remotes(&self) -> Result<()> {
        self.remotes.save(&self.harmony_dir.join(REMOTES_FILE))
    }

    fn persist_state(&mut self) -> Result<()> {
        self.loc_states.save_dir(&self.harmony_dir.join(LOCATION_STATES_DIR))?;
        self.repo_state.save(&self.harmony_dir.join(REPOSITORY_STATE_FILE))
    }
}

fn shortest_prefix_len(s: &str, wanted_non_hyphen: usize) -> usize {
    let mut seen = 0;
    for (idx, c) in s.char_indices() {
        if seen == wanted_non_hyphen {
            return idx;
        }
        if c != '-' {
            seen += 1;
        }
    }
    s.len()
}

async fn fetch_remote_config(connector: &dyn Connector) -> Result<RepositoryConfig> {
    let files = connector
        .fetch_metadata_files(&[CONFIG_FILE.to_string()])
        .await?;
    let path = files
        .get(CONFIG_FILE)
        .ok_or_else(|| ErrorKind::RemoteUnreachable("remote has no config file".to_string()))?;
    RepositoryConfig::load(path)
}

/// The connector contract has no directory-listing operation, so the set of
/// location ids worth fetching is derived rather than enumerated: every
/// location already known locally, plus every location named by a vector
/// clock component in the remote's RepositoryState (that is who
/// contributed to some path's current value, whether or not we've heard of
/// them before).
async fn fetch_remote_location_states(
    connector: &dyn Connector,
    local: &LocationStates,
    remote_repo_state: &RepositoryState,
) -> Result<LocationStates> {
    let mut known_locations: Vec<String> = local.locations().map(str::to_string).collect();
    for (_, entry) in remote_repo_state.iter() {
        known_locations.extend(entry.clock.locations().map(str::to_string));
    }
    known_locations.sort();
    known_locations.dedup();

    let relative_paths: Vec<String> = known_locations
        .iter()
        .map(|loc| format!("{LOCATION_STATES_DIR}/{loc}"))
        .collect();
    if relative_paths.is_empty() {
        return Ok(LocationStates::new());
    }
    let files = connector.fetch_metadata_files(&relative_paths).await?;

    let mut entries = std::collections::HashMap::new();
    for path in files.values() {
        if let Ok(state) = crate::persist::read::<crate::location_states::LocationState>(path) {
            entries.insert(state.location_id.clone(), state);
        }
    }
    Ok(LocationStates::from_entries(entries))
}

fn persist_rules_snapshot(harmony_dir: &Path, working_dir: &Path) -> Result<()> {
    let lines = Ruleset::builtin_and_custom_lines(working_dir)?;
    crate::persist::write_atomic(&harmony_dir.join(RULES_FILE), &lines)
}

/// Falls back to the working directory's own basename when no name is
/// given; avoids pulling in a hostname-lookup dependency for what is purely
/// a cosmetic default.
fn generate_name(working_dir: &Path) -> String {
    working_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "harmony-repository".to_string())
}

#[cfg(unix)]
fn device_id(path: &Path) -> u64 {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).map(|m| m.dev()).unwrap_or(0)
}

#[cfg(not(unix))]
fn device_id(_path: &Path) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_control_directory_and_identity() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), Some("mine"), Settings::default()).unwrap();
        assert!(dir.path().join(HARMONY_DIR).is_dir());
        assert_eq!(repo.config().name, "mine");
        assert!(!repo.config().id.is_empty());
    }

    #[test]
    fn init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path(), None, Settings::default()).unwrap();
        let err = Repository::init(dir.path(), None, Settings::default()).unwrap_err();
        assert!(matches!(err, ErrorKind::AlreadyInitialized(_)));
    }

    #[test]
    fn load_round_trips_persisted_identity() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), Some("mine"), Settings::default()).unwrap();
        let id = repo.config().id.clone();
        drop(repo);

        let loaded = Repository::load(&dir.path().join(HARMONY_DIR), Settings::default()).unwrap();
        assert_eq!(loaded.config().id, id);
        assert_eq!(loaded.config().name, "mine");
    }

    #[test]
    fn find_walks_upward_from_a_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path(), None, Settings::default()).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = Repository::find(&nested, Settings::default()).unwrap();
        assert_eq!(found.working_dir().canonicalize().unwrap(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn find_fails_outside_any_repository() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::find(dir.path(), Settings::default()).unwrap_err();
        assert!(matches!(err, ErrorKind::NotARepository(_)));
    }

    #[test]
    fn commit_then_status_reports_file_as_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path(), None, Settings::default()).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let changed = repo.commit().unwrap();
        assert!(changed);

        let stats = repo.get_file_stats();
        let status = stats.get("a.txt").unwrap();
        assert!(status.exists_in_repository);
        assert!(status.exists_in_workdir);
        assert!(status.is_most_recent);
    }

    #[test]
    fn short_id_is_eight_hex_characters_without_hyphens() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path(), None, Settings::default()).unwrap();
        let short = repo.short_id();
        assert_eq!(short.chars().filter(|c| *c != '-').count(), 8);
        assert!(repo.config().id.starts_with(short.chars().next().unwrap()));
    }

    #[test]
    fn add_and_remove_remote_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path(), None, Settings::default()).unwrap();
        repo.add_remote("origin", "file:///tmp/other").unwrap();
        assert_eq!(repo.get_remotes().len(), 1);
        repo.remove_remote("origin").unwrap();
        assert!(repo.get_remotes().is_empty());
    }
}
