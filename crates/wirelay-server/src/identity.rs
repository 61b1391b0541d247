//! Persistent nickname↔public-key bindings.
//!
//! A nickname is bound to the first public key it authenticates with and is
//! immutable afterwards; later logins must present the same key. The store
//! is one newline-delimited file of `<nickname> <base64-key>` records,
//! replaced atomically on save (write a sibling temp file, rename over the
//! target).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use wirelay_core::{Error, Result};

/// Outcome of presenting a nickname/key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The nickname was unknown and is now bound to this key.
    Bound,
    /// The nickname was already bound to exactly this key.
    Known,
}

/// Nickname registry backed by a flat file.
pub struct IdentityStore {
    path: PathBuf,
    bindings: Mutex<BTreeMap<String, String>>,
}

impl IdentityStore {
    /// Load the store from `path`.
    ///
    /// A missing file yields an empty store; malformed lines are skipped.
    /// Any other read error is returned and is fatal at startup.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut bindings = BTreeMap::new();

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                for line in contents.lines() {
                    match line.split_once(' ') {
                        Some((nickname, key)) if !nickname.is_empty() && !key.is_empty() => {
                            bindings.insert(nickname.to_string(), key.to_string());
                        }
                        _ => {
                            if !line.trim().is_empty() {
                                warn!(line, "skipping malformed identity record");
                            }
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "identity store not found, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        debug!(count = bindings.len(), path = %path.display(), "identity store loaded");
        Ok(Self {
            path,
            bindings: Mutex::new(bindings),
        })
    }

    /// Bind `nickname` to `key_b64`, or verify an existing binding.
    ///
    /// Returns [`RegisterOutcome::Bound`] for a first presentation,
    /// [`RegisterOutcome::Known`] for a matching re-presentation, and
    /// `Error::NicknameConflict` when the nickname is held by another key.
    pub fn register_or_check(&self, nickname: &str, key_b64: &str) -> Result<RegisterOutcome> {
        let mut bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        match bindings.get(nickname) {
            Some(existing) if existing == key_b64 => Ok(RegisterOutcome::Known),
            Some(_) => Err(Error::NicknameConflict {
                nickname: nickname.to_string(),
            }),
            None => {
                bindings.insert(nickname.to_string(), key_b64.to_string());
                Ok(RegisterOutcome::Bound)
            }
        }
    }

    /// Persist the store: write `<path>.tmp`, then rename over the target.
    ///
    /// Callers log a failure but keep the in-memory binding; a save error
    /// never fails an authentication that already succeeded.
    pub async fn save(&self) -> Result<()> {
        let contents = {
            let bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
            let mut out = String::with_capacity(bindings.len() * 64);
            for (nickname, key) in bindings.iter() {
                out.push_str(nickname);
                out.push(' ');
                out.push_str(key);
                out.push('\n');
            }
            out
        };

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Number of bindings currently held.
    pub fn len(&self) -> usize {
        self.bindings.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> IdentityStore {
        IdentityStore::load(dir.path().join("nicks.db")).unwrap()
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.is_empty());
    }

    #[test]
    fn first_presentation_binds() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert_eq!(
            store.register_or_check("alice", "KEY1").unwrap(),
            RegisterOutcome::Bound
        );
        assert_eq!(
            store.register_or_check("alice", "KEY1").unwrap(),
            RegisterOutcome::Known
        );
    }

    #[test]
    fn different_key_conflicts() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.register_or_check("alice", "KEY1").unwrap();
        let err = store.register_or_check("alice", "KEY2").unwrap_err();
        assert!(matches!(err, Error::NicknameConflict { nickname } if nickname == "alice"));
        // The original binding survives the refused attempt.
        assert_eq!(
            store.register_or_check("alice", "KEY1").unwrap(),
            RegisterOutcome::Known
        );
    }

    #[test]
    fn nicknames_are_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.register_or_check("alice", "KEY1").unwrap();
        assert_eq!(
            store.register_or_check("Alice", "KEY2").unwrap(),
            RegisterOutcome::Bound
        );
    }

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nicks.db");

        let store = IdentityStore::load(&path).unwrap();
        store.register_or_check("alice", "KEY1").unwrap();
        store.register_or_check("bob", "KEY2").unwrap();
        store.save().await.unwrap();

        let reloaded = IdentityStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.register_or_check("alice", "KEY1").unwrap(),
            RegisterOutcome::Known
        );
        assert!(reloaded.register_or_check("bob", "OTHER").is_err());
    }

    #[tokio::test]
    async fn save_replaces_atomically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nicks.db");
        // No space, so this can never load as a binding; it must be gone
        // after the rename, not merged into the new contents.
        std::fs::write(&path, "stale-garbage\n").unwrap();

        let store = IdentityStore::load(&path).unwrap();
        store.register_or_check("carol", "KEY3").unwrap();
        store.save().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "carol KEY3\n");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nicks.db");
        std::fs::write(&path, "alice KEY1\ngarbage-without-space\n\nbob KEY2\n").unwrap();

        let store = IdentityStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
    }
}
