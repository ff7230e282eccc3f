//! Tests for the authorization state machine with a fake consent flow and a
//! mocked token endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mockito::Matcher;
use serde_json::json;
use tempfile::TempDir;

use drive_fetch::models::ClientSecret;
use drive_fetch::{
    Authorizer, ConsentFlow, Credential, CredentialStore, DriveConfig, DriveError,
    FileCredentialStore, MemoryCredentialStore,
};

/// Consent flow double handing out a fixed credential and counting calls.
struct FakeConsent {
    credential: Credential,
    calls: AtomicUsize,
}

impl FakeConsent {
    fn new(credential: Credential) -> Arc<Self> {
        Arc::new(Self {
            credential,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ConsentFlow for FakeConsent {
    async fn run(&self, _secret: &ClientSecret) -> drive_fetch::Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.credential.clone())
    }
}

fn write_client_secret(dir: &TempDir) {
    let secret = json!({
        "installed": {
            "client_id": "id.apps.googleusercontent.com",
            "client_secret": "shhh",
            "auth_uri": "https://accounts.google.com/o/oauth2/v2/auth",
            "token_uri": "https://oauth2.googleapis.com/token"
        }
    });
    std::fs::write(dir.path().join("credentials.json"), secret.to_string()).unwrap();
}

fn valid_credential() -> Credential {
    Credential::new("cached-token".to_string(), Some("old-refresh".to_string()), 3600)
}

fn expired_credential(refresh_token: Option<&str>) -> Credential {
    Credential {
        access_token: "stale-token".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: 1,
    }
}

fn config_for(dir: &TempDir, token_url: &str) -> DriveConfig {
    DriveConfig::new(dir.path(), "folder123").with_token_url(token_url)
}

mod authorize {
    use super::*;

    #[tokio::test]
    async fn test_valid_cached_credential_needs_no_network_or_consent() {
        let mut server = mockito::Server::new_async().await;
        let token_endpoint = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryCredentialStore::with_credential(valid_credential()));
        let consent = FakeConsent::new(valid_credential());
        let authorizer = Authorizer::new(
            config_for(&dir, &format!("{}/token", server.url())),
            store.clone() as Arc<dyn CredentialStore>,
            consent.clone() as Arc<dyn ConsentFlow>,
        );

        let first = authorizer.authorize().await.unwrap();
        let second = authorizer.authorize().await.unwrap();

        assert_eq!(first.access_token, "cached-token");
        assert_eq!(second.access_token, "cached-token");
        assert_eq!(consent.calls(), 0);
        token_endpoint.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_credential_refreshes_exactly_once_and_persists() {
        let mut server = mockito::Server::new_async().await;
        let token_endpoint = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "old-refresh".into()),
                Matcher::UrlEncoded("client_id".into(), "id.apps.googleusercontent.com".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(json!({"access_token": "fresh-token", "expires_in": 3600}).to_string())
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        write_client_secret(&dir);

        let store = Arc::new(MemoryCredentialStore::with_credential(expired_credential(
            Some("old-refresh"),
        )));
        let consent = FakeConsent::new(valid_credential());
        let authorizer = Authorizer::new(
            config_for(&dir, &format!("{}/token", server.url())),
            store.clone() as Arc<dyn CredentialStore>,
            consent.clone() as Arc<dyn ConsentFlow>,
        );

        let credential = authorizer.authorize().await.unwrap();

        token_endpoint.assert_async().await;
        assert_eq!(credential.access_token, "fresh-token");
        // The endpoint omitted a refresh token, so the old one survives.
        assert_eq!(credential.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(consent.calls(), 0);

        let persisted = store.load().unwrap().unwrap();
        assert_eq!(persisted.access_token, "fresh-token");
    }

    #[tokio::test]
    async fn test_rejected_refresh_is_authorization_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(json!({"error": "invalid_grant"}).to_string())
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        write_client_secret(&dir);

        let store = Arc::new(MemoryCredentialStore::with_credential(expired_credential(
            Some("revoked-refresh"),
        )));
        let consent = FakeConsent::new(valid_credential());
        let authorizer = Authorizer::new(
            config_for(&dir, &format!("{}/token", server.url())),
            store as Arc<dyn CredentialStore>,
            consent as Arc<dyn ConsentFlow>,
        );

        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(err, DriveError::Authorization(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn test_no_cached_credential_runs_consent_and_persists() {
        let dir = TempDir::new().unwrap();
        write_client_secret(&dir);

        let store = Arc::new(MemoryCredentialStore::new());
        let consent = FakeConsent::new(Credential::new(
            "granted-token".to_string(),
            Some("granted-refresh".to_string()),
            3600,
        ));
        let authorizer = Authorizer::new(
            DriveConfig::new(dir.path(), "folder123"),
            store.clone() as Arc<dyn CredentialStore>,
            consent.clone() as Arc<dyn ConsentFlow>,
        );

        let credential = authorizer.authorize().await.unwrap();

        assert_eq!(credential.access_token, "granted-token");
        assert_eq!(consent.calls(), 1);
        let persisted = store.load().unwrap().unwrap();
        assert_eq!(persisted.access_token, "granted-token");

        // The second call is served from the in-memory credential.
        authorizer.authorize().await.unwrap();
        assert_eq!(consent.calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_runs_consent() {
        let dir = TempDir::new().unwrap();
        write_client_secret(&dir);

        let store = Arc::new(MemoryCredentialStore::with_credential(expired_credential(None)));
        let consent = FakeConsent::new(valid_credential());
        let authorizer = Authorizer::new(
            DriveConfig::new(dir.path(), "folder123"),
            store as Arc<dyn CredentialStore>,
            consent.clone() as Arc<dyn ConsentFlow>,
        );

        authorizer.authorize().await.unwrap();
        assert_eq!(consent.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_client_secret_is_authorization_error() {
        let dir = TempDir::new().unwrap();

        let store = Arc::new(MemoryCredentialStore::new());
        let consent = FakeConsent::new(valid_credential());
        let authorizer = Authorizer::new(
            DriveConfig::new(dir.path(), "folder123"),
            store as Arc<dyn CredentialStore>,
            consent.clone() as Arc<dyn ConsentFlow>,
        );

        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(err, DriveError::Authorization(_)));
        assert!(err.to_string().contains("credentials.json"));
        assert_eq!(consent.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_client_secret_is_authorization_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("credentials.json"), "not valid json").unwrap();

        let store = Arc::new(MemoryCredentialStore::new());
        let consent = FakeConsent::new(valid_credential());
        let authorizer = Authorizer::new(
            DriveConfig::new(dir.path(), "folder123"),
            store as Arc<dyn CredentialStore>,
            consent as Arc<dyn ConsentFlow>,
        );

        let err = authorizer.authorize().await.unwrap_err();
        assert!(matches!(err, DriveError::Authorization(_)));
    }
}

mod file_store {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("token.json"));

        assert!(store.load().unwrap().is_none());

        let credential = valid_credential();
        store.save(&credential).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, credential.access_token);
        assert_eq!(loaded.refresh_token, credential.refresh_token);
        assert_eq!(loaded.expires_at, credential.expires_at);
    }

    #[test]
    fn test_malformed_cache_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "definitely not a credential").unwrap();

        let store = FileCredentialStore::new(path);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_overwrites_prior_contents() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(dir.path().join("token.json"));

        store
            .save(&Credential::new("first".to_string(), None, 3600))
            .unwrap();
        store
            .save(&Credential::new("second".to_string(), None, 3600))
            .unwrap();

        assert_eq!(store.load().unwrap().unwrap().access_token, "second");
    }
}
