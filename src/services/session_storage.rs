// src/services/session_storage.rs
//! Session-scoped key/value storage backing the token cache's durable mirror

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

/// Keys the token cache mirrors its snapshot under
pub const ACCESS_TOKEN_KEY: &str = "google_access_token";
pub const REFRESH_TOKEN_KEY: &str = "google_refresh_token";
pub const EXPIRES_AT_KEY: &str = "google_expires_at";
pub const LAST_FETCHED_KEY: &str = "google_last_fetched";

pub const SNAPSHOT_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    EXPIRES_AT_KEY,
    LAST_FETCHED_KEY,
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String key/value storage that outlives a single cache instance
pub trait SessionStorage: Send + Sync + 'static {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Process-local storage. Clones share the same map, so a cache rebuilt on a clone
/// behaves like a page reload within the same session.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items().remove(key);
        Ok(())
    }
}

/// JSON-file storage for command-line consumers; the file plays the role of the tab session
#[derive(Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl FileSessionStorage {
    /// Open the session file, starting empty when it is missing or unreadable
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let items = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt session file");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        debug!(path = %path.display(), entries = items.len(), "Opened session storage file");
        Self {
            path,
            items: Mutex::new(items),
        }
    }

    /// Replace the file atomically; it holds a refresh token, so it is owner-only on Unix
    fn persist(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let contents = serde_json::to_string(items)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.insert(key.to_string(), value.to_string());
        self.persist(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if items.remove(key).is_some() {
            self.persist(&items)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_clones_share_state() {
        let storage = MemorySessionStorage::new();
        let reloaded = storage.clone();

        storage.set_item(ACCESS_TOKEN_KEY, "A1").unwrap();
        assert_eq!(reloaded.get_item(ACCESS_TOKEN_KEY).as_deref(), Some("A1"));

        reloaded.remove_item(ACCESS_TOKEN_KEY).unwrap();
        assert_eq!(storage.get_item(ACCESS_TOKEN_KEY), None);
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("tokens.json");

        let storage = FileSessionStorage::open(&path);
        storage.set_item(REFRESH_TOKEN_KEY, "R1").unwrap();
        storage.set_item(EXPIRES_AT_KEY, "1700000000").unwrap();
        storage.remove_item(EXPIRES_AT_KEY).unwrap();

        let reopened = FileSessionStorage::open(&path);
        assert_eq!(reopened.get_item(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
        assert_eq!(reopened.get_item(EXPIRES_AT_KEY), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_owner_only_and_leaves_no_temp_files() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let storage = FileSessionStorage::open(&path);
        storage.set_item(REFRESH_TOKEN_KEY, "R1").unwrap();
        storage.set_item(ACCESS_TOKEN_KEY, "A1").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("tokens.json")]);

        let reopened = FileSessionStorage::open(&path);
        assert_eq!(reopened.get_item(REFRESH_TOKEN_KEY).as_deref(), Some("R1"));
    }

    #[test]
    fn test_file_storage_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileSessionStorage::open(&path);
        assert_eq!(storage.get_item(ACCESS_TOKEN_KEY), None);
    }
}
