//! The Harmony-directory `config` file (`{id, name}`) and the small set of
//! process-level knobs layered from CLI flag > env var > default (§13).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hashers;
use crate::persist;

/// Persisted repository identity. This is not a place for user preferences;
/// see [`Settings`] for everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub id: String,
    pub name: String,
}

impl RepositoryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        persist::read(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        persist::write_atomic(path, self)
    }
}

/// Process-level knobs that are not part of the persisted repository
/// identity: the digest algorithm used for newly observed files, whether to
/// take the advisory directory lock, and the network operation timeout.
#[derive(Debug, Clone)]
pub struct Settings {
    pub digest_algo: String,
    pub take_lock: bool,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            digest_algo: hashers::DEFAULT_ALGO.to_string(),
            take_lock: true,
            timeout_secs: 30,
        }
    }
}

/// Overrides supplied on the command line; `None` defers to the environment
/// variable, and failing that, the compiled-in default.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub digest_algo: Option<String>,
    pub no_lock: bool,
    pub timeout_secs: Option<u64>,
}

impl Settings {
    pub fn resolve(overrides: SettingsOverrides) -> Self {
        let defaults = Settings::default();
        let digest_algo = overrides
            .digest_algo
            .or_else(|| std::env::var("HARMONY_DIGEST_ALGO").ok())
            .unwrap_or(defaults.digest_algo);
        let take_lock = if overrides.no_lock {
            false
        } else {
            !env_flag_set("HARMONY_NO_LOCK")
        };
        let timeout_secs = overrides
            .timeout_secs
            .or_else(|| {
                std::env::var("HARMONY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(defaults.timeout_secs);
        Self {
            digest_algo,
            take_lock,
            timeout_secs,
        }
    }
}

fn env_flag_set(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        key: &'static str,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            std::env::set_var(key, value);
            Self { key }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            std::env::remove_var(self.key);
        }
    }

    #[test]
    fn flag_overrides_env_and_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::set("HARMONY_DIGEST_ALGO", "sha256");
        let settings = Settings::resolve(SettingsOverrides {
            digest_algo: Some("sha1".to_string()),
            ..Default::default()
        });
        assert_eq!(settings.digest_algo, "sha1");
    }

    #[test]
    fn env_overrides_default_when_no_flag() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::set("HARMONY_DIGEST_ALGO", "sha256");
        let settings = Settings::resolve(SettingsOverrides::default());
        assert_eq!(settings.digest_algo, "sha256");
    }

    #[test]
    fn default_digest_algo_when_nothing_set() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::remove_var("HARMONY_DIGEST_ALGO");
        let settings = Settings::resolve(SettingsOverrides::default());
        assert_eq!(settings.digest_algo, hashers::DEFAULT_ALGO);
    }

    #[test]
    fn no_lock_flag_disables_lock() {
        let settings = Settings::resolve(SettingsOverrides {
            no_lock: true,
            ..Default::default()
        });
        assert!(!settings.take_lock);
    }

    #[test]
    fn config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        let cfg = RepositoryConfig {
            id: "loc-123".into(),
            name: "my-repo".into(),
        };
        cfg.save(&path).unwrap();
        let loaded = RepositoryConfig::load(&path).unwrap();
        assert_eq!(loaded.id, "loc-123");
        assert_eq!(loaded.name, "my-repo");
    }
}
