//! Error types for the drive_fetch crate.

use thiserror::Error;

/// Errors that can occur while authorizing against or fetching from Google Drive.
///
/// Every failure in the crate maps to one of these four categories, and all of
/// them propagate immediately to the caller. There is no retry layer.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Missing or malformed client secret, a failed or timed-out consent
    /// flow, a rejected token refresh, or a token cache that could not be
    /// written back.
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// A page request against the file-listing endpoint failed.
    #[error("File listing failed: {0}")]
    List(String),

    /// The provider rejected the download or the file id is unknown.
    #[error("Download failed: {0}")]
    Download(String),

    /// Downloaded bytes were not valid UTF-8 or not well-formed CSV.
    #[error("Failed to parse file content: {0}")]
    Parse(String),
}

/// Result type alias for DriveError.
pub type Result<T> = std::result::Result<T, DriveError>;
