//! Google Drive client for folder listing and tabular file retrieval.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::{Client, Response};
use tracing::{debug, info};

use crate::auth::{Authorizer, ConsentFlow, InstalledAppFlow};
use crate::config::DriveConfig;
use crate::error::{DriveError, Result};
use crate::models::{ApiErrorResponse, Credential, FileListResponse, FileMetadata};
use crate::store::{CredentialStore, FileCredentialStore};
use crate::table::DataTable;

/// Results requested per file-listing page.
const PAGE_SIZE: &str = "100";

/// Client for a single Google Drive folder.
///
/// Authorizes lazily on first use; the credential comes from the token cache
/// when possible and from a refresh or interactive consent flow otherwise.
pub struct DriveClient {
    config: DriveConfig,
    authorizer: Authorizer,
    http: Client,
}

impl DriveClient {
    /// Create a client backed by the file credential store and the
    /// interactive consent flow.
    pub fn new(config: DriveConfig) -> Self {
        let store = Arc::new(FileCredentialStore::new(config.token_cache_path()));
        let consent = Arc::new(InstalledAppFlow::from_config(&config));
        Self::with_components(config, store, consent)
    }

    /// Create a client with injected credential store and consent flow.
    pub fn with_components(
        config: DriveConfig,
        store: Arc<dyn CredentialStore>,
        consent: Arc<dyn ConsentFlow>,
    ) -> Self {
        let authorizer = Authorizer::new(config.clone(), store, consent);
        Self {
            config,
            authorizer,
            http: Client::new(),
        }
    }

    /// Ensure a usable credential exists and return it.
    pub async fn authorize(&self) -> Result<Credential> {
        self.authorizer.authorize().await
    }

    /// Map of file name to file id for every file in the configured folder.
    ///
    /// Pages through the listing endpoint following the continuation token.
    /// When two files share a name the later entry wins.
    pub async fn list_files(&self) -> Result<HashMap<String, String>> {
        let token = self.authorizer.access_token().await?;
        let query = format!("'{}' in parents", self.config.folder_id);

        let mut files = HashMap::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let mut request = self
                .http
                .get(format!("{}/files", self.config.api_base_url))
                .bearer_auth(&token)
                .query(&[
                    ("q", query.as_str()),
                    ("pageSize", PAGE_SIZE),
                    ("fields", "nextPageToken, files(id, name)"),
                ]);

            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| DriveError::List(format!("page request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(DriveError::List(Self::api_message(response).await));
            }

            let page: FileListResponse = response
                .json()
                .await
                .map_err(|e| DriveError::List(format!("invalid listing response: {}", e)))?;

            pages += 1;
            for file in page.files {
                files.insert(file.name, file.id);
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(folder = %self.config.folder_id, pages, files = files.len(), "listed folder");
        Ok(files)
    }

    /// Download a file and parse it as CSV into a [`DataTable`].
    ///
    /// The body is fetched in chunks; after each chunk a progress line is
    /// written to stdout.
    pub async fn get_file(&self, file_id: &str) -> Result<DataTable> {
        let token = self.authorizer.access_token().await?;

        let metadata = self.file_metadata(&token, file_id).await?;
        debug!(id = %file_id, name = %metadata.name, size = ?metadata.size, "starting download");

        let response = self
            .http
            .get(format!("{}/files/{}", self.config.api_base_url, file_id))
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| DriveError::Download(format!("media request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DriveError::Download(Self::api_message(response).await));
        }

        let total = metadata.size.or_else(|| response.content_length());
        let mut body: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| DriveError::Download(format!("chunk read failed: {}", e)))?;
            body.extend_from_slice(&chunk);

            if let Some(total) = total.filter(|t| *t > 0) {
                let pct = (body.len() as u64 * 100 / total).min(100);
                println!("Download {}%. {}", pct, file_id);
            }
        }

        DataTable::from_csv(&body)
    }

    /// Fetch name and size for a file id.
    async fn file_metadata(&self, token: &str, file_id: &str) -> Result<FileMetadata> {
        let response = self
            .http
            .get(format!("{}/files/{}", self.config.api_base_url, file_id))
            .bearer_auth(token)
            .query(&[("fields", "id, name, size")])
            .send()
            .await
            .map_err(|e| DriveError::Download(format!("metadata request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DriveError::Download(Self::api_message(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| DriveError::Download(format!("invalid metadata response: {}", e)))
    }

    /// Render a failed response as "status: message", preferring the
    /// structured error body when the API provides one.
    async fn api_message(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(api) => format!("{}: {}", api.error.code, api.error.message),
            Err(_) => format!("{}: {}", status.as_u16(), body),
        }
    }
}
