//! Content transport. The core only ever speaks to a remote through this
//! trait; the two baseline transports below are reference implementations
//! selected by URI scheme, not the only legal ones.

mod local;
mod ssh;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{ErrorKind, Result};

pub use local::LocalConnector;
pub use ssh::SshConnector;

/// A transport to exactly one remote, opened for the duration of one
/// operation. Scoped acquisition: construction opens whatever resource the
/// transport needs, `Drop` (or simply going out of scope) releases it.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Downloads the named files from the remote's `.harmony/` tree,
    /// returning where each one landed locally (possibly a temp path).
    async fn fetch_metadata_files(
        &self,
        relative_paths: &[String],
    ) -> Result<HashMap<String, PathBuf>>;

    /// Downloads the named payload files into `destination_dir` at the same
    /// relative paths.
    async fn fetch_payload_files(&self, relative_paths: &[String], destination_dir: &Path) -> Result<()>;
}

/// A factory that knows whether it can handle a given URI and, if so, opens
/// a [`Connector`] for it.
trait ConnectorFactory: Send + Sync {
    /// Higher wins when more than one factory matches the same URI.
    fn priority(&self) -> i32;
    fn is_valid(&self, uri: &str) -> bool;
    fn open(&self, uri: &str) -> Result<Box<dyn Connector>>;
}

/// Opens a [`Connector`] for `uri`, trying registered transports in
/// descending priority order and picking the first one that recognizes the
/// URI's scheme.
pub fn connect(uri: &str) -> Result<Box<dyn Connector>> {
    let mut factories: Vec<Box<dyn ConnectorFactory>> =
        vec![Box::new(ssh::SshFactory), Box::new(local::LocalFactory)];
    factories.sort_by_key(|f| std::cmp::Reverse(f.priority()));
    for factory in &factories {
        if factory.is_valid(uri) {
            return factory.open(uri);
        }
    }
    Err(ErrorKind::ProtocolMismatch(uri.to_string()))
}
