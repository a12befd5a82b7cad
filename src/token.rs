//! Bearer-token "local storage".
//!
//! DESIGN
//! ======
//! The token lives under the fixed key [`TOKEN_KEY`] in a small key/value
//! store. The file-backed store keeps a JSON object on disk so that other
//! keys written by other tools survive a token write. The request
//! interceptor only ever reads; writes come from explicit caller actions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::ApiError;

/// Storage key the bearer token is kept under.
pub const TOKEN_KEY: &str = "token";

/// Persistent storage for the bearer token.
pub trait TokenStore: Send + Sync {
    /// Current token, or `None` if nothing is stored.
    fn load(&self) -> Result<Option<String>, ApiError>;

    fn store(&self, token: &str) -> Result<(), ApiError>;

    fn clear(&self) -> Result<(), ApiError>;
}

// =============================================================================
// IN-MEMORY
// =============================================================================

/// Token storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self { token: Mutex::new(Some(token.to_owned())) }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, ApiError> {
        self.token
            .lock()
            .map_err(|_| ApiError::Storage("token mutex poisoned".into()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, ApiError> {
        Ok(self.slot()?.clone())
    }

    fn store(&self, token: &str) -> Result<(), ApiError> {
        *self.slot()? = Some(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), ApiError> {
        *self.slot()? = None;
        Ok(())
    }
}

// =============================================================================
// FILE-BACKED
// =============================================================================

/// Token storage backed by a JSON object file.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, serde_json::Value>, ApiError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(storage_error(&self.path, &e)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| storage_error(&self.path, &e))
    }

    fn write_entries(&self, entries: &BTreeMap<String, serde_json::Value>) -> Result<(), ApiError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(parent, &e))?;
        }
        let rendered = serde_json::to_string_pretty(entries).map_err(|e| storage_error(&self.path, &e))?;
        std::fs::write(&self.path, rendered).map_err(|e| storage_error(&self.path, &e))
    }

    fn update<F>(&self, apply: F) -> Result<(), ApiError>
    where
        F: FnOnce(&mut BTreeMap<String, serde_json::Value>),
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ApiError::Storage("storage write lock poisoned".into()))?;
        let mut entries = self.read_entries()?;
        apply(&mut entries);
        self.write_entries(&entries)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, ApiError> {
        let entries = self.read_entries()?;
        Ok(entries
            .get(TOKEN_KEY)
            .and_then(serde_json::Value::as_str)
            .filter(|token| !token.is_empty())
            .map(ToOwned::to_owned))
    }

    fn store(&self, token: &str) -> Result<(), ApiError> {
        self.update(|entries| {
            entries.insert(TOKEN_KEY.to_owned(), serde_json::Value::String(token.to_owned()));
        })
    }

    fn clear(&self) -> Result<(), ApiError> {
        self.update(|entries| {
            entries.remove(TOKEN_KEY);
        })
    }
}

fn storage_error(path: &Path, err: &dyn std::fmt::Display) -> ApiError {
    ApiError::Storage(format!("{}: {err}", path.display()))
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
