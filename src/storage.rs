use crate::error::StorageError;
use crate::events::Transcript;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Key-value store scoped to one chat session
pub trait SessionStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// In-process store; lives exactly as long as the process.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a per-session directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::io_error(key)(err)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(Self::io_error(key))?;

        // Write-then-rename so a reader never sees half a transcript
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(Self::io_error(key))?;
        fs::rename(&tmp, &path).map_err(Self::io_error(key))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Self::io_error(key)(err)),
        }
    }
}

/// The transcript's view of a [`SessionStore`]: one key, JSON encoded
pub struct TranscriptStore<S> {
    store: S,
    key: String,
}

impl<S: SessionStore> TranscriptStore<S> {
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Load the persisted transcript.
    ///
    /// Content that does not parse is dropped: the key is removed and the
    /// caller starts from an empty history.
    pub fn load(&mut self) -> Result<Option<Transcript>, StorageError> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(None);
        };

        match Transcript::from_json(&raw) {
            Ok(transcript) => {
                debug!(key = %self.key, turns = transcript.len(), "Loaded transcript");
                Ok(Some(transcript))
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "Discarding unreadable transcript");
                self.store.remove(&self.key)?;
                Ok(None)
            }
        }
    }

    pub fn save(&mut self, transcript: &Transcript) -> Result<(), StorageError> {
        // Serializing a list of plain strings cannot fail
        let raw = transcript.to_json().unwrap_or_else(|_| "[]".to_string());
        self.store.set(&self.key, &raw)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.store.remove(&self.key)
    }
}
