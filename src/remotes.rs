use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, Result};
use crate::persist;

/// One known peer. `id` is learned lazily: a remote added by name only
/// (before ever being contacted) gains its id once `clone`/`pull_state`
/// reads the peer's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remote {
    pub name: Option<String>,
    pub id: Option<String>,
    pub location: String,
}

/// Directory of known peers, indexed both by name and by id so a caller can
/// resolve a remote spec regardless of which one they know.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Remotes {
    #[serde(default)]
    by_name: HashMap<String, Remote>,
    #[serde(default)]
    by_id: HashMap<String, Remote>,
}

impl Remotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, location: &str) -> Result<()> {
        if self.by_name.contains_key(name) {
            return Err(ErrorKind::RemoteExists(name.to_string()));
        }
        let remote = Remote {
            name: Some(name.to_string()),
            id: None,
            location: location.to_string(),
        };
        self.by_name.insert(name.to_string(), remote);
        Ok(())
    }

    /// Called once a peer's own id becomes known (after first contact), so
    /// future lookups by id succeed too.
    pub fn learn_id(&mut self, name: &str, id: &str) {
        if let Some(remote) = self.by_name.get_mut(name) {
            remote.id = Some(id.to_string());
            self.by_id.insert(id.to_string(), remote.clone());
        }
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        let remote = self
            .by_name
            .remove(name)
            .ok_or_else(|| ErrorKind::UnknownRemote(name.to_string()))?;
        if let Some(id) = &remote.id {
            self.by_id.remove(id);
        }
        Ok(())
    }

    /// Resolves a remote spec that may be a registered name, a registered
    /// id, or a raw URI (returned verbatim if it matches neither index).
    pub fn resolve_location(&self, spec: &str) -> String {
        if let Some(r) = self.by_name.get(spec) {
            return r.location.clone();
        }
        if let Some(r) = self.by_id.get(spec) {
            return r.location.clone();
        }
        spec.to_string()
    }

    pub fn list(&self) -> Vec<&Remote> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for r in self.by_name.values().chain(self.by_id.values()) {
            let key = r.name.clone().or_else(|| r.id.clone()).unwrap_or_default();
            if seen.insert(key) {
                out.push(r);
            }
        }
        out
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adding_duplicate_name_fails() {
        let mut r = Remotes::new();
        r.add("origin", "file:///tmp/a").unwrap();
        assert!(r.add("origin", "file:///tmp/b").is_err());
    }

    #[test]
    fn resolve_falls_back_to_raw_spec() {
        let r = Remotes::new();
        assert_eq!(r.resolve_location("file:///tmp/a"), "file:///tmp/a");
    }

    #[test]
    fn learn_id_makes_remote_resolvable_by_id() {
        let mut r = Remotes::new();
        r.add("origin", "file:///tmp/a").unwrap();
        r.learn_id("origin", "loc-123");
        assert_eq!(r.resolve_location("loc-123"), "file:///tmp/a");
    }

    #[test]
    fn remove_unknown_remote_fails() {
        let mut r = Remotes::new();
        assert!(r.remove("nope").is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remotes");
        let mut r = Remotes::new();
        r.add("origin", "file:///tmp/a").unwrap();
        r.save(&path).unwrap();
        let loaded = Remotes::load(&path).unwrap();
        assert_eq!(loaded.resolve_location("origin"), "file:///tmp/a");
    }
}
