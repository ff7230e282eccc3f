//! Persistence for cached credentials.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::{DriveError, Result};
use crate::models::Credential;

/// Load/save abstraction over the credential cache.
///
/// The file-backed implementation is used in production; embedders and tests
/// can supply their own to keep authorization off the filesystem.
pub trait CredentialStore: Send + Sync {
    /// Load the cached credential, if any.
    fn load(&self) -> Result<Option<Credential>>;

    /// Persist a credential, overwriting prior contents.
    fn save(&self, credential: &Credential) -> Result<()>;
}

/// Credential cache stored as a JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable token cache, ignoring");
                return Ok(None);
            }
        };
        match serde_json::from_str(&content) {
            Ok(credential) => {
                debug!(path = %self.path.display(), "loaded cached credential");
                Ok(Some(credential))
            }
            Err(e) => {
                // A corrupt cache routes authorization to the consent flow.
                warn!(path = %self.path.display(), error = %e, "malformed token cache, ignoring");
                Ok(None)
            }
        }
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| DriveError::Authorization(format!("could not encode token cache: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| {
            DriveError::Authorization(format!(
                "could not write token cache {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!(path = %self.path.display(), "persisted credential");
        Ok(())
    }
}

/// In-process credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out holding `credential`.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>> {
        Ok(self.inner.lock().expect("store lock poisoned").clone())
    }

    fn save(&self, credential: &Credential) -> Result<()> {
        *self.inner.lock().expect("store lock poisoned") = Some(credential.clone());
        Ok(())
    }
}
