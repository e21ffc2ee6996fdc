use std::path::PathBuf;

use thiserror::Error;

/// Structured failure modes for the Harmony core.
///
/// Internal plumbing propagates these with `anyhow::Context` layered on top at
/// process boundaries; the CLI prints `{kind}: {message}` and maps the kind to
/// an exit code.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("not a repository: {0}")]
    NotARepository(PathBuf),

    #[error("already initialized: {0}")]
    AlreadyInitialized(PathBuf),

    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("no transport recognizes uri: {0}")]
    ProtocolMismatch(String),

    #[error("corrupt state at {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("merge conflicts on {0} path(s)")]
    MergeConflict(usize),

    #[error("io failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("unknown remote: {0}")]
    UnknownRemote(String),

    #[error("remote already exists: {0}")]
    RemoteExists(String),
}

pub type Result<T> = std::result::Result<T, ErrorKind>;
