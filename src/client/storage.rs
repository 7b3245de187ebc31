//! Token storage for the client session
//!
//! The token pair lives in exactly one place, behind [`SessionStore`]. Feature
//! code never touches it directly; the session manager is the only writer.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The token pair held by a logged-in client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session file is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session store lock poisoned")]
    Poisoned,
}

/// Persistent home of the token pair
pub trait SessionStore: Send + Sync + 'static {
    /// Current tokens, `None` when logged out
    fn load(&self) -> Result<Option<SessionTokens>, StorageError>;

    /// Replace the whole pair
    fn save(&self, tokens: &SessionTokens) -> Result<(), StorageError>;

    /// Overwrite only the access token. Does nothing when no session is
    /// stored, so a cleared session is never brought back.
    fn set_access_token(&self, access_token: &str) -> Result<(), StorageError>;

    /// Drop all session state
    fn clear(&self) -> Result<(), StorageError>;
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    tokens: RwLock<Option<SessionTokens>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionTokens>, StorageError> {
        let tokens = self.tokens.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tokens.clone())
    }

    fn save(&self, tokens: &SessionTokens) -> Result<(), StorageError> {
        let mut slot = self.tokens.write().map_err(|_| StorageError::Poisoned)?;
        *slot = Some(tokens.clone());
        Ok(())
    }

    fn set_access_token(&self, access_token: &str) -> Result<(), StorageError> {
        let mut slot = self.tokens.write().map_err(|_| StorageError::Poisoned)?;
        if let Some(tokens) = slot.as_mut() {
            tokens.access_token = access_token.to_string();
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut slot = self.tokens.write().map_err(|_| StorageError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}

/// JSON file store that survives restarts
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // serializes read-modify-write of the file
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<SessionTokens>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, tokens: &SessionTokens) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(tokens)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<SessionTokens>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.read()
    }

    fn save(&self, tokens: &SessionTokens) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.write(tokens)
    }

    fn set_access_token(&self, access_token: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        match self.read()? {
            Some(mut tokens) => {
                tokens.access_token = access_token.to_string();
                self.write(&tokens)
            }
            None => Ok(()),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
