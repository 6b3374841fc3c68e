//! Keyed JSON-record storage.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::warn;

use crate::error::AuthResult;

/// Minimal keyed string storage. Pure read/write; no protocol knowledge.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AuthResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> AuthResult<()>;
    fn remove(&self, key: &str) -> AuthResult<()>;
}

/// File-backed store: one JSON object file holding every key.
///
/// Every write serializes the whole map back to disk, so a record is either
/// fully present or fully absent; there are no partial writes to recover
/// from on the next load.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`. An unreadable or corrupt file
    /// starts the store empty rather than failing the caller.
    pub fn open(path: impl Into<PathBuf>) -> AuthResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), "discarding corrupt state file: {e}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn flush(&self, entries: &HashMap<String, String>) -> AuthResult<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.entries.read().expect("state lock").get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> AuthResult<()> {
        let mut entries = self.entries.write().expect("state lock");
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        let mut entries = self.entries.write().expect("state lock");
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.entries.read().expect("state lock").get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> AuthResult<()> {
        self.entries
            .write()
            .expect("state lock")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AuthResult<()> {
        self.entries.write().expect("state lock").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal-state.json");

        let store = FileStore::open(&path).unwrap();
        store.put("k", "v").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn file_store_remove_deletes_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal-state.json");

        let store = FileStore::open(&path).unwrap();
        store.put("k", "v").unwrap();
        store.remove("k").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap(), None);
    }

    #[test]
    fn corrupt_state_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal-state.json");
        std::fs::write(&path, "{{{not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
