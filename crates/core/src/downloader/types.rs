//! Types shared by the download-client adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Shared status vocabulary every backend's native states reduce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloading,
    Paused,
    Completed,
    Seeding,
    Error,
}

/// One transfer as reported by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    /// Backend-native identifier (info hash, numeric id, nzo id).
    pub id: String,
    /// Content hash, when the backend exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub name: String,
    pub status: DownloadStatus,
    /// Completion fraction in `0.0..=1.0`.
    pub progress: f64,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
    /// Path on the download client's host where the content lands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
}

/// Result of an add call, after post-add verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedDownload {
    /// Backend-native identifier for follow-up calls.
    pub id: String,
    pub hash: Option<String>,
    pub name: Option<String>,
}

/// Parameters for adding one transfer.
#[derive(Debug, Clone)]
pub struct AddRequest {
    /// Download link: `.torrent`/`.nzb` URL or magnet URI.
    pub link: String,
    /// Display name hint (the release title).
    pub name: Option<String>,
    pub category: Option<String>,
    pub add_paused: bool,
}

/// Errors that can occur talking to a download client.
#[derive(Debug, Error)]
pub enum DownloadClientError {
    #[error("unsafe URL blocked: {0}")]
    UnsafeUrl(String),

    #[error("Download client connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Download client authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Download client API error: {0}")]
    ApiError(String),

    #[error("Download not found: {0}")]
    NotFound(String),

    #[error("Invalid transfer file: {0}")]
    InvalidFile(String),

    #[error("Too many redirects (gave up after {0} hops)")]
    TooManyRedirects(u32),

    #[error("Request timeout")]
    Timeout,
}

/// Map a transport error onto the shared error vocabulary.
pub(crate) fn request_error(e: reqwest::Error) -> DownloadClientError {
    if e.is_timeout() {
        DownloadClientError::Timeout
    } else if e.is_connect() {
        DownloadClientError::ConnectionFailed(e.to_string())
    } else {
        DownloadClientError::ApiError(e.to_string())
    }
}

impl From<crate::safenet::SafeNetError> for DownloadClientError {
    fn from(e: crate::safenet::SafeNetError) -> Self {
        use crate::safenet::SafeNetError;
        match e {
            SafeNetError::Timeout => DownloadClientError::Timeout,
            SafeNetError::UnsafeAddress { .. } => DownloadClientError::UnsafeUrl(e.to_string()),
            SafeNetError::Http(msg) => DownloadClientError::ConnectionFailed(msg),
            other => DownloadClientError::ConnectionFailed(other.to_string()),
        }
    }
}

/// One download-client backend behind a protocol-specific adapter.
///
/// Every implementation funnels outbound calls through the safe-network
/// layer and refuses unsafe targets before any network attempt.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Add a transfer with the shared magnet/URL/file fallback flow.
    async fn add_download(&self, request: &AddRequest)
        -> Result<AddedDownload, DownloadClientError>;

    /// Shared-vocabulary status of one transfer.
    async fn get_status(&self, id: &str) -> Result<DownloadStatus, DownloadClientError> {
        Ok(self.get_details(id).await?.status)
    }

    async fn get_details(&self, id: &str) -> Result<DownloadItem, DownloadClientError>;

    /// All transfers the backend currently tracks in this client's category.
    async fn list_active(&self) -> Result<Vec<DownloadItem>, DownloadClientError>;

    async fn pause(&self, id: &str) -> Result<(), DownloadClientError>;

    async fn resume(&self, id: &str) -> Result<(), DownloadClientError>;

    async fn remove(&self, id: &str, delete_files: bool) -> Result<(), DownloadClientError>;

    async fn test_connection(&self) -> Result<(), DownloadClientError>;

    /// Free bytes on the backend's download volume.
    async fn free_space(&self) -> Result<u64, DownloadClientError>;
}
