//! services/client/src/adapters/token_store.rs
//!
//! Implementations of the `TokenStore` port: an in-memory store for tests and
//! short-lived processes, and a JSON file store that survives restarts.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use mediauth_core::domain::CredentialPair;
use mediauth_core::ports::{PortError, PortResult, TokenStore};
use serde::{Deserialize, Serialize};
use tracing::warn;

//=========================================================================================
// In-Memory Store
//=========================================================================================

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> PortResult<Option<CredentialPair>> {
        Ok(self.pair.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, pair: &CredentialPair) -> PortResult<()> {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
        Ok(())
    }

    fn replace_access(&self, refresh: &str, access: &str) -> PortResult<bool> {
        let mut slot = self.pair.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(pair) if pair.refresh == refresh => {
                pair.access = access.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn clear(&self) -> PortResult<()> {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

//=========================================================================================
// File Store
//=========================================================================================

/// On-disk shape. Both keys are optional so a half-written pair can be detected.
#[derive(Serialize, Deserialize, Default)]
struct StoredTokens {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Keeps the pair in a small JSON file. Writes go through a temporary file and
/// a rename, so readers never observe a partial pair.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> PortResult<Option<CredentialPair>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage(e)),
        };
        let stored: StoredTokens = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %self.path.display(), "discarding unreadable token file: {}", e);
                self.remove()?;
                return Ok(None);
            }
        };
        match (stored.access_token, stored.refresh_token) {
            (Some(access), Some(refresh)) => Ok(Some(CredentialPair { access, refresh })),
            (None, None) => Ok(None),
            _ => {
                warn!(path = %self.path.display(), "discarding incomplete token pair");
                self.remove()?;
                Ok(None)
            }
        }
    }

    fn write(&self, pair: &CredentialPair) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        let stored = StoredTokens {
            access_token: Some(pair.access.clone()),
            refresh_token: Some(pair.refresh.clone()),
        };
        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json).map_err(storage)?;
        fs::rename(&staging, &self.path).map_err(storage)
    }

    fn remove(&self) -> PortResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage(e)),
        }
    }
}

fn storage(e: std::io::Error) -> PortError {
    PortError::Storage(e.to_string())
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> PortResult<Option<CredentialPair>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read()
    }

    fn save(&self, pair: &CredentialPair) -> PortResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(pair)
    }

    fn replace_access(&self, refresh: &str, access: &str) -> PortResult<bool> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match self.read()? {
            Some(pair) if pair.refresh == refresh => {
                self.write(&CredentialPair::new(access, pair.refresh))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn clear(&self) -> PortResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove()
    }
}
