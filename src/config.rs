//! Construction-time configuration for [`crate::DriveClient`].

use std::path::PathBuf;
use std::time::Duration;

/// Base URL for Google Drive API v3.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google OAuth2 authorization endpoint.
pub const AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google Drive API scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// File name of the OAuth client secret inside the credentials directory.
const CLIENT_SECRET_FILE: &str = "credentials.json";

/// File name of the cached credential inside the credentials directory.
const TOKEN_CACHE_FILE: &str = "token.json";

/// How long the interactive consent flow waits for the browser redirect.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for a [`crate::DriveClient`].
///
/// `credentials_dir` must contain a `credentials.json` client secret; the
/// `token.json` credential cache is created next to it on first
/// authorization. The endpoint fields default to the public Google URLs and
/// exist so tests can point the client at a local server.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Directory holding the client secret and the token cache.
    pub credentials_dir: PathBuf,
    /// Id of the folder whose files are listed.
    pub folder_id: String,
    /// Base URL of the Drive v3 API.
    pub api_base_url: String,
    /// OAuth2 authorization endpoint opened by the consent flow.
    pub auth_url: String,
    /// Token endpoint override. When `None`, the client secret's `token_uri`
    /// is used.
    pub token_url: Option<String>,
    /// OAuth scopes requested during consent.
    pub scopes: Vec<String>,
    /// Loopback port for the consent callback. 0 picks an ephemeral port.
    pub redirect_port: u16,
    /// Upper bound on the interactive consent wait.
    pub consent_timeout: Duration,
}

impl DriveConfig {
    /// Create a configuration with the default Google endpoints and scope.
    pub fn new<P: Into<PathBuf>, S: Into<String>>(credentials_dir: P, folder_id: S) -> Self {
        Self {
            credentials_dir: credentials_dir.into(),
            folder_id: folder_id.into(),
            api_base_url: DRIVE_API_BASE.to_string(),
            auth_url: AUTH_URI.to_string(),
            token_url: None,
            scopes: vec![DRIVE_SCOPE.to_string()],
            redirect_port: 0,
            consent_timeout: CONSENT_TIMEOUT,
        }
    }

    /// Path of the client secret file.
    pub fn client_secret_path(&self) -> PathBuf {
        self.credentials_dir.join(CLIENT_SECRET_FILE)
    }

    /// Path of the token cache file.
    pub fn token_cache_path(&self) -> PathBuf {
        self.credentials_dir.join(TOKEN_CACHE_FILE)
    }

    /// Override the Drive API base URL.
    pub fn with_api_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Override the token endpoint.
    pub fn with_token_url<S: Into<String>>(mut self, url: S) -> Self {
        self.token_url = Some(url.into());
        self
    }
}
