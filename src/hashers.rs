//! Content digests, formatted as `"algo:hex"` per the on-disk contract.
//!
//! Digests are computed by streaming the file through a bounded buffer so
//! that arbitrarily large files never require full buffering in memory.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::Sha1;
use sha2::Sha256;

use crate::error::{ErrorKind, Result};

/// Size of the read buffer used while streaming a file through a hasher.
pub const BLOCK_SIZE: usize = 1024 * 1024;

pub const DEFAULT_ALGO: &str = "blake3";

enum Hasher {
    Blake3(blake3::Hasher),
    Sha256(Sha256),
    Sha1(Sha1),
}

impl Hasher {
    fn new(algo: &str) -> Result<Self> {
        match algo {
            "blake3" => Ok(Hasher::Blake3(blake3::Hasher::new())),
            "sha256" => Ok(Hasher::Sha256(Sha256::default())),
            "sha1" => Ok(Hasher::Sha1(Sha1::default())),
            other => Err(ErrorKind::CorruptState {
                path: Path::new(other).to_path_buf(),
                reason: format!("unknown digest algorithm: {other}"),
            }),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        use sha2::Digest as _;
        match self {
            Hasher::Blake3(h) => {
                h.update(chunk);
            }
            Hasher::Sha256(h) => h.update(chunk),
            Hasher::Sha1(h) => {
                use sha1::Digest as _;
                h.update(chunk);
            }
        }
    }

    fn finish_hex(self) -> String {
        use sha2::Digest as _;
        match self {
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => {
                use sha1::Digest as _;
                hex::encode(h.finalize())
            }
        }
    }
}

/// Compute `"algo:hex"` for the file at `path`, streaming it in
/// [`BLOCK_SIZE`] chunks.
pub fn digest_file(path: &Path, algo: &str) -> Result<String> {
    let mut hasher = Hasher::new(algo)?;
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{algo}:{}", hasher.finish_hex()))
}

/// Split a `"algo:hex"` digest into its two parts, if well formed.
pub fn split(digest: &str) -> Option<(&str, &str)> {
    digest.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn digest_carries_algo_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello").unwrap();
        let d = digest_file(&path, "blake3").unwrap();
        let (algo, hex) = split(&d).unwrap();
        assert_eq!(algo, "blake3");
        assert!(!hex.is_empty());
    }

    #[test]
    fn same_bytes_same_digest() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"identical content").unwrap();
        std::fs::write(&b, b"identical content").unwrap();
        assert_eq!(
            digest_file(&a, "sha256").unwrap(),
            digest_file(&b, "sha256").unwrap()
        );
    }

    #[test]
    fn large_file_streams_in_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        let chunk = vec![7u8; BLOCK_SIZE];
        for _ in 0..3 {
            f.write_all(&chunk).unwrap();
        }
        let d = digest_file(&path, "blake3").unwrap();
        assert!(d.starts_with("blake3:"));
    }

    #[test]
    fn unknown_algo_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"x").unwrap();
        assert!(digest_file(&path, "md17").is_err());
    }
}
