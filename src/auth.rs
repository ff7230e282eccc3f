//! OAuth2 authorization for the Drive API.
//!
//! [`Authorizer`] produces a usable credential from, in order: the in-memory
//! cache, the credential store, a refresh-token grant, or an interactive
//! consent flow. Freshly obtained credentials are written back to the store.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::DriveConfig;
use crate::error::{DriveError, Result};
use crate::models::{ClientSecret, ClientSecretFile, Credential, TokenResponse};
use crate::store::CredentialStore;

/// Page served to the browser once the redirect has been captured.
const CONSENT_DONE_PAGE: &str = "<html><body><p>Authorization received. You may close this window.</p></body></html>";

/// A way of obtaining a brand-new credential with user involvement.
///
/// The production implementation is [`InstalledAppFlow`]; tests substitute
/// their own.
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    /// Run the flow to completion and return the granted credential.
    async fn run(&self, secret: &ClientSecret) -> Result<Credential>;
}

/// Sources and maintains the authorization credential.
pub struct Authorizer {
    config: DriveConfig,
    store: Arc<dyn CredentialStore>,
    consent: Arc<dyn ConsentFlow>,
    http: Client,
    cached: RwLock<Option<Credential>>,
}

impl Authorizer {
    pub fn new(
        config: DriveConfig,
        store: Arc<dyn CredentialStore>,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        Self {
            config,
            store,
            consent,
            http: Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Return a usable, non-expired credential.
    ///
    /// A valid cached or stored credential is returned as-is. An expired
    /// stored credential with a refresh token is refreshed with a single
    /// token request; anything else goes through the consent flow. Either
    /// way the fresh credential is persisted before it is returned.
    pub async fn authorize(&self) -> Result<Credential> {
        {
            let cached = self.cached.read().await;
            if let Some(credential) = cached.as_ref() {
                if !credential.is_expired() {
                    return Ok(credential.clone());
                }
            }
        }

        let stored = self.store.load()?;
        if let Some(credential) = stored.as_ref() {
            if !credential.is_expired() {
                *self.cached.write().await = Some(credential.clone());
                return Ok(credential.clone());
            }
        }

        let secret = self.load_client_secret()?;

        let fresh = match stored {
            Some(credential) if credential.refresh_token.is_some() => {
                info!("cached credential expired, refreshing");
                self.refresh(&credential, &secret).await?
            }
            _ => {
                info!("no usable cached credential, starting consent flow");
                self.consent.run(&secret).await?
            }
        };

        self.store.save(&fresh)?;
        *self.cached.write().await = Some(fresh.clone());
        Ok(fresh)
    }

    /// Bearer token of a usable credential.
    pub async fn access_token(&self) -> Result<String> {
        Ok(self.authorize().await?.access_token)
    }

    fn load_client_secret(&self) -> Result<ClientSecret> {
        let path = self.config.client_secret_path();
        let content = fs::read_to_string(&path).map_err(|e| {
            DriveError::Authorization(format!(
                "could not read client secret {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: ClientSecretFile = serde_json::from_str(&content).map_err(|e| {
            DriveError::Authorization(format!(
                "malformed client secret {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(file.installed)
    }

    fn token_url(&self, secret: &ClientSecret) -> String {
        self.config
            .token_url
            .clone()
            .unwrap_or_else(|| secret.token_uri.clone())
    }

    /// Exchange the refresh token for a new access token. One attempt only.
    async fn refresh(&self, credential: &Credential, secret: &ClientSecret) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| DriveError::Authorization("credential has no refresh token".to_string()))?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &secret.client_id),
            ("client_secret", &secret.client_secret),
        ];

        let response = self
            .http
            .post(self.token_url(secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| DriveError::Authorization(format!("token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Authorization(format!(
                "token refresh rejected ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DriveError::Authorization(format!("invalid token response: {}", e)))?;

        debug!(expires_in = token.expires_in, "refreshed access token");

        // The endpoint usually omits the refresh token here. Keep the old one.
        Ok(Credential::new(
            token.access_token,
            token.refresh_token.or_else(|| Some(refresh_token.to_string())),
            token.expires_in,
        ))
    }
}

/// Interactive consent flow for installed applications.
///
/// Prints an authorization URL, waits for the browser redirect on a loopback
/// listener and exchanges the returned code for a credential. Blocks the
/// caller until the user grants access or the timeout elapses.
pub struct InstalledAppFlow {
    auth_url: String,
    token_url: Option<String>,
    scopes: Vec<String>,
    redirect_port: u16,
    timeout: Duration,
    http: Client,
}

impl InstalledAppFlow {
    pub fn from_config(config: &DriveConfig) -> Self {
        Self {
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            scopes: config.scopes.clone(),
            redirect_port: config.redirect_port,
            timeout: config.consent_timeout,
            http: Client::new(),
        }
    }

    fn consent_url(&self, secret: &ClientSecret, redirect_uri: &str, state: &str) -> Result<Url> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| DriveError::Authorization(format!("invalid auth URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &secret.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }

    /// Accept one connection and pull `code` and `state` out of the request
    /// line, answering the browser with a small confirmation page.
    pub async fn wait_for_redirect(listener: &TcpListener) -> Result<(String, String)> {
        let (stream, addr) = listener
            .accept()
            .await
            .map_err(|e| DriveError::Authorization(format!("callback accept failed: {}", e)))?;
        debug!(peer = %addr, "consent callback connected");
        Self::read_redirect(stream).await
    }

    async fn read_redirect(stream: TcpStream) -> Result<(String, String)> {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .await
            .map_err(|e| DriveError::Authorization(format!("callback read failed: {}", e)))?;

        // Request line looks like: GET /?state=..&code=.. HTTP/1.1
        let path = request_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| DriveError::Authorization("malformed callback request".to_string()))?;
        let url = Url::parse(&format!("http://127.0.0.1{}", path))
            .map_err(|e| DriveError::Authorization(format!("malformed callback query: {}", e)))?;

        let mut code = None;
        let mut state = None;
        let mut denial = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => denial = Some(value.into_owned()),
                _ => {}
            }
        }

        let mut stream = reader.into_inner();
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            CONSENT_DONE_PAGE.len(),
            CONSENT_DONE_PAGE
        );
        // Best effort; the grant matters more than the goodbye page.
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            warn!(error = %e, "could not answer consent callback");
        }
        let _ = stream.shutdown().await;

        if let Some(reason) = denial {
            return Err(DriveError::Authorization(format!("consent denied: {}", reason)));
        }
        let code = code
            .ok_or_else(|| DriveError::Authorization("callback missing authorization code".to_string()))?;
        let state = state
            .ok_or_else(|| DriveError::Authorization("callback missing state parameter".to_string()))?;
        Ok((code, state))
    }

    /// Exchange an authorization code for a credential.
    pub async fn exchange_code(
        &self,
        secret: &ClientSecret,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &secret.client_id),
            ("client_secret", &secret.client_secret),
        ];

        let token_url = self
            .token_url
            .clone()
            .unwrap_or_else(|| secret.token_uri.clone());

        let response = self
            .http
            .post(token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DriveError::Authorization(format!("code exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Authorization(format!(
                "code exchange rejected ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DriveError::Authorization(format!("invalid token response: {}", e)))?;

        info!(expires_in = token.expires_in, "consent flow obtained credential");

        Ok(Credential::new(
            token.access_token,
            token.refresh_token,
            token.expires_in,
        ))
    }

    fn random_state() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }
}

#[async_trait]
impl ConsentFlow for InstalledAppFlow {
    async fn run(&self, secret: &ClientSecret) -> Result<Credential> {
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port))
            .await
            .map_err(|e| DriveError::Authorization(format!("could not bind callback listener: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| DriveError::Authorization(format!("callback listener has no address: {}", e)))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{}", port);

        let state = Self::random_state();
        let url = self.consent_url(secret, &redirect_uri, &state)?;

        println!("Open this URL in your browser to grant access:");
        println!("{}", url);

        let (code, returned_state) = timeout(self.timeout, Self::wait_for_redirect(&listener))
            .await
            .map_err(|_| DriveError::Authorization("consent flow timed out".to_string()))??;

        if returned_state != state {
            warn!("consent callback state mismatch");
            return Err(DriveError::Authorization(
                "state parameter mismatch in consent callback".to_string(),
            ));
        }

        self.exchange_code(secret, &code, &redirect_uri).await
    }
}
