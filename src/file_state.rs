use serde::{Deserialize, Serialize};

/// One location's observation of a single path.
///
/// `digest` and `size` are both `None` or both `Some` (§3 invariant). `wipe`
/// marks the path as intentionally emptied here: a deletion, or the source
/// side of a rename whose target has not yet been confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub digest: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<i64>,
    #[serde(default)]
    pub wipe: bool,
}

impl FileState {
    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            digest: None,
            size: None,
            mtime: None,
            wipe: false,
        }
    }

    pub fn exists(&self) -> bool {
        self.size.is_some()
    }

    /// `true` when the recorded facts about *content* differ: existence,
    /// digest or size. Does not compare `wipe` or `mtime`.
    pub fn contents_different(&self, other: &FileState) -> bool {
        self.exists() != other.exists() || self.digest != other.digest || self.size != other.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_state_has_no_size_or_digest() {
        let fs = FileState::absent("a.txt");
        assert!(!fs.exists());
        assert!(fs.digest.is_none());
    }

    #[test]
    fn contents_different_ignores_wipe_and_mtime() {
        let mut a = FileState {
            path: "a.txt".into(),
            digest: Some("blake3:aa".into()),
            size: Some(1),
            mtime: Some(1),
            wipe: false,
        };
        let mut b = a.clone();
        b.wipe = true;
        b.mtime = Some(999);
        assert!(!a.contents_different(&b));
        a.size = Some(2);
        assert!(a.contents_different(&b));
    }
}
