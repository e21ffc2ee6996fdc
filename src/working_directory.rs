use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use walkdir::WalkDir;

use crate::error::Result;
use crate::file_state::FileState;
use crate::hashers;
use crate::rules::Committable;

/// Filesystem adapter: enumeration, digest/mtime probing and the rename
/// primitive the auto-rename driver uses. Everything the core sees about the
/// actual filesystem passes through here.
pub struct WorkingDirectory {
    pub root: PathBuf,
    ruleset: Arc<dyn Committable>,
    digest_algo: String,
}

impl WorkingDirectory {
    pub fn new(root: PathBuf, ruleset: Arc<dyn Committable>, digest_algo: impl Into<String>) -> Self {
        Self {
            root,
            ruleset,
            digest_algo: digest_algo.into(),
        }
    }

    /// Repository-relative, forward-slash, `.`/`..`-free form of an absolute
    /// or relative filesystem path under the root.
    pub fn normalize(&self, path: &Path) -> Option<String> {
        let rel = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                std::path::Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
                std::path::Component::CurDir => {}
                std::path::Component::ParentDir => return None,
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Every committable path currently present on disk, normalized.
    pub fn enumerate(&self) -> Result<std::collections::BTreeSet<String>> {
        let mut out = std::collections::BTreeSet::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = self.normalize(entry.path()) else {
                continue;
            };
            if self.ruleset.committable(Path::new(&relative)) {
                out.insert(relative);
            }
        }
        Ok(out)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.absolute(path).exists()
    }

    /// See SPEC_FULL.md §4.4: existence-change, size-change, or a strictly
    /// newer mtime all count as modified; a recorded mtime *ahead* of the
    /// observed one is clock skew, logged and treated as modified too.
    pub fn maybe_modified(&self, file_state: &FileState) -> bool {
        let existed_before = file_state.exists();
        let abs = self.absolute(&file_state.path);
        let metadata = std::fs::metadata(&abs).ok();
        let exists_now = metadata.is_some();

        if !existed_before && !exists_now {
            return false;
        }
        if existed_before != exists_now {
            return true;
        }

        let metadata = metadata.expect("exists_now implies metadata present");
        let size_now = metadata.len();
        let mtime_now = mtime_secs(&metadata);

        if Some(size_now) != file_state.size {
            return true;
        }
        match file_state.mtime {
            Some(recorded) if recorded > mtime_now => {
                crate::logging::warn(format!(
                    "mtime skew: recorded {recorded} is ahead of observed {mtime_now} for {}",
                    file_state.path
                ));
                true
            }
            Some(recorded) => mtime_now > recorded,
            None => true,
        }
    }

    /// Computes a fresh [`FileState`] for `path` as it exists on disk right
    /// now; always returns with `wipe = false`.
    pub fn scan(&self, path: &str) -> Result<FileState> {
        let abs = self.absolute(path);
        let Ok(metadata) = std::fs::metadata(&abs) else {
            return Ok(FileState::absent(path));
        };
        let digest = hashers::digest_file(&abs, &self.digest_algo)?;
        Ok(FileState {
            path: path.to_string(),
            digest: Some(digest),
            size: Some(metadata.len()),
            mtime: Some(mtime_secs(&metadata)),
            wipe: false,
        })
    }

    /// Atomic rename within the working directory; creates the target's
    /// parent directories if needed.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_abs = self.absolute(from);
        let to_abs = self.absolute(to);
        if let Some(parent) = to_abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&from_abs, &to_abs)?;
        Ok(())
    }
}

fn mtime_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
