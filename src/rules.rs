//! Default implementation of the `committable(path) -> bool` contract.
//!
//! The core accepts any [`Ruleset`] implementation via the
//! [`Committable`] trait; this module is only the shipped default, built on
//! gitignore-syntax matching the way the harmony control directory and
//! common editor/VCS noise are excluded by every comparable tool.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{ErrorKind, Result};
use crate::repository::HARMONY_DIR;

const BUILTIN_IGNORE_LINES: &[&str] = &[".harmony/**", "*~", "*.swp", "*.bak", ".DS_Store"];

pub const RULES_FILE_NAME: &str = ".harmonyignore";

/// A predicate deciding whether a path participates in `commit`/`enumerate`.
pub trait Committable: Send + Sync {
    fn committable(&self, relative_path: &Path) -> bool;
}

/// gitignore-syntax default: a fixed built-in pattern set plus whatever the
/// working directory's `.harmonyignore` file adds.
#[derive(Clone)]
pub struct Ruleset {
    matcher: Gitignore,
}

impl Ruleset {
    /// Builds the default ruleset for a working directory root, reading its
    /// `.harmonyignore` file if present.
    pub fn load(working_dir: &Path) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(working_dir);
        for line in BUILTIN_IGNORE_LINES {
            builder.add_line(None, line).map_err(|e| ErrorKind::CorruptState {
                path: working_dir.to_path_buf(),
                reason: format!("add built-in ignore line {line}: {e}"),
            })?;
        }
        let custom_path = working_dir.join(RULES_FILE_NAME);
        if custom_path.exists() {
            for line in read_lines(&custom_path)? {
                builder.add_line(None, &line).map_err(|e| ErrorKind::CorruptState {
                    path: custom_path.clone(),
                    reason: format!("add {RULES_FILE_NAME} line {line}: {e}"),
                })?;
            }
        }
        let matcher = builder.build().map_err(|e| ErrorKind::CorruptState {
            path: working_dir.to_path_buf(),
            reason: format!("build ignore matcher: {e}"),
        })?;
        Ok(Self { matcher })
    }

    /// An empty ruleset that still always excludes the control directory;
    /// used by `init` before any `.harmonyignore` file can exist.
    pub fn default_for_init(working_dir: &Path) -> Result<Self> {
        Self::load(working_dir)
    }

    /// Persists the default pattern set as a hand-editable file. `init`
    /// calls this once; the file is never rewritten automatically afterward.
    pub fn write_default(working_dir: &Path) -> Result<()> {
        let path = working_dir.join(RULES_FILE_NAME);
        if path.exists() {
            return Ok(());
        }
        let mut contents = String::from("# Harmony ignore rules (gitignore syntax).\n");
        contents.push_str(&format!("{}/**\n", HARMONY_DIR));
        fs::write(path, contents)?;
        Ok(())
    }

    /// The full effective pattern list (built-ins plus `.harmonyignore`),
    /// for the `.harmony/rules` on-disk snapshot. Not re-parsed on load; the
    /// snapshot is a record, not the active source of truth.
    pub fn builtin_and_custom_lines(working_dir: &Path) -> Result<Vec<String>> {
        let mut lines: Vec<String> = BUILTIN_IGNORE_LINES.iter().map(|s| s.to_string()).collect();
        let custom_path = working_dir.join(RULES_FILE_NAME);
        if custom_path.exists() {
            lines.extend(read_lines(&custom_path)?);
        }
        Ok(lines)
    }
}

impl Committable for Ruleset {
    fn committable(&self, relative_path: &Path) -> bool {
        !self
            .matcher
            .matched_path_or_any_parents(relative_path, false)
            .is_ignore()
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(path)?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        out.push(trimmed.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harmony_control_directory_is_never_committable() {
        let dir = tempfile::tempdir().unwrap();
        let rs = Ruleset::load(dir.path()).unwrap();
        assert!(!rs.committable(Path::new(".harmony/config")));
        assert!(!rs.committable(Path::new(".harmony/repository_state")));
    }

    #[test]
    fn ordinary_files_are_committable() {
        let dir = tempfile::tempdir().unwrap();
        let rs = Ruleset::load(dir.path()).unwrap();
        assert!(rs.committable(Path::new("notes.txt")));
    }

    #[test]
    fn custom_ignore_file_is_honored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(RULES_FILE_NAME), "*.secret\n").unwrap();
        let rs = Ruleset::load(dir.path()).unwrap();
        assert!(!rs.committable(Path::new("keys.secret")));
        assert!(rs.committable(Path::new("keys.txt")));
    }

    #[test]
    fn editor_swap_files_are_ignored_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let rs = Ruleset::load(dir.path()).unwrap();
        assert!(!rs.committable(Path::new("notes.txt~")));
        assert!(!rs.committable(Path::new(".DS_Store")));
    }
}
