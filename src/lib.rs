//! drive_fetch - Authorization and tabular file retrieval from Google Drive.
//!
//! This library provides functionality to:
//! - Authorize against the Drive API, caching the credential locally and
//!   refreshing or re-running consent as needed
//! - List the files of a Drive folder as a name-to-id map
//! - Download a file by id and parse it as CSV into a [`DataTable`]
//!
//! # Example
//!
//! ```no_run
//! use drive_fetch::{DriveClient, DriveConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DriveConfig::new("/path/to/credentials-dir", "folder-id");
//!     let client = DriveClient::new(config);
//!
//!     let files = client.list_files().await?;
//!     for (name, id) in &files {
//!         println!("{}\t{}", name, id);
//!     }
//!
//!     if let Some(id) = files.get("report.csv") {
//!         let table = client.get_file(id).await?;
//!         println!("{:?} rows", table.shape().0);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod table;

// Re-exports for convenience
pub use auth::{Authorizer, ConsentFlow, InstalledAppFlow};
pub use client::DriveClient;
pub use config::DriveConfig;
pub use error::{DriveError, Result};
pub use models::Credential;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use table::DataTable;
