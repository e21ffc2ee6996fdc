//! Atomic write-and-rename persistence shared by every on-disk state store.

use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Serialize `value` to YAML and write it to `path` atomically: write to a
/// sibling temp file first, then rename into place, so a crash mid-write
/// never leaves a truncated state file behind.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = serde_yaml::to_string(value).map_err(|e| crate::error::ErrorKind::CorruptState {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read<T: for<'de> serde::Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&data).map_err(|e| crate::error::ErrorKind::CorruptState {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
