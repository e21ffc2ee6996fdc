use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{ErrorKind, Result};
use crate::repository::HARMONY_DIR;

use super::{Connector, ConnectorFactory};

/// Transport for `file://` URIs and bare absolute paths. Local files need no
/// staging: both metadata and payload fetches hand back paths directly on
/// the same filesystem rather than copying into a temp directory first.
pub struct LocalConnector {
    root: PathBuf,
}

impl LocalConnector {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(uri: &str) -> PathBuf {
        let stripped = uri.strip_prefix("file://").unwrap_or(uri);
        PathBuf::from(stripped)
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn fetch_metadata_files(
        &self,
        relative_paths: &[String],
    ) -> Result<HashMap<String, PathBuf>> {
        let mut out = HashMap::new();
        for rel in relative_paths {
            let source = self.root.join(HARMONY_DIR).join(rel);
            if !source.exists() {
                return Err(ErrorKind::RemoteUnreachable(format!(
                    "missing metadata file: {}",
                    source.display()
                )));
            }
            out.insert(rel.clone(), source);
        }
        Ok(out)
    }

    async fn fetch_payload_files(&self, relative_paths: &[String], destination_dir: &Path) -> Result<()> {
        for rel in relative_paths {
            let source = self.root.join(rel);
            let target = destination_dir.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&source, &target)?;
        }
        Ok(())
    }
}

pub(super) struct LocalFactory;

impl ConnectorFactory for LocalFactory {
    fn priority(&self) -> i32 {
        100
    }

    fn is_valid(&self, uri: &str) -> bool {
        uri.starts_with("file://") || Path::new(uri).is_absolute()
    }

    fn open(&self, uri: &str) -> Result<Box<dyn Connector>> {
        Ok(Box::new(LocalConnector::new(LocalConnector::resolve(uri))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_metadata_files_returns_direct_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".harmony")).unwrap();
        std::fs::write(dir.path().join(".harmony/config"), b"id: x\n").unwrap();
        let conn = LocalConnector::new(dir.path().to_path_buf());
        let files = conn
            .fetch_metadata_files(&["config".to_string()])
            .await
            .unwrap();
        assert_eq!(files["config"], dir.path().join(".harmony/config"));
    }

    #[tokio::test]
    async fn fetch_payload_files_copies_into_destination() {
        let source_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("a.txt"), b"hello").unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let conn = LocalConnector::new(source_dir.path().to_path_buf());
        conn.fetch_payload_files(&["a.txt".to_string()], dest_dir.path())
            .await
            .unwrap();
        let contents = std::fs::read(dest_dir.path().join("a.txt")).unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn factory_recognizes_file_scheme_and_absolute_paths() {
        let f = LocalFactory;
        assert!(f.is_valid("file:///tmp/repo"));
        assert!(f.is_valid("/tmp/repo"));
        assert!(!f.is_valid("ssh://host/path"));
    }
}
