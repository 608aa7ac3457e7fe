//! Types for the indexer search system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{Indexer, IndexerProtocol};

/// Which acquisition path a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadType {
    Torrent,
    Usenet,
}

impl From<IndexerProtocol> for DownloadType {
    fn from(protocol: IndexerProtocol) -> Self {
        match protocol {
            IndexerProtocol::Torznab => DownloadType::Torrent,
            IndexerProtocol::Newznab => DownloadType::Usenet,
        }
    }
}

/// Query parameters for an indexer search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text search query.
    pub query: String,
    /// Optional category codes to restrict the search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<u32>>,
    /// Maximum results to return after the global sort (default: 100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Offset into the globally sorted result set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// A normalized search hit. Ephemeral: produced per search, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseCandidate {
    /// Unique id within the owning indexer.
    pub guid: String,
    pub title: String,
    /// Download link (`.torrent`/`.nzb` URL or magnet URI).
    pub link: String,
    /// Human-facing details page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    /// Torrent health metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leechers: Option<u32>,
    /// Usenet health metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grabs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub indexer_id: i64,
    pub indexer_name: String,
    #[serde(default)]
    pub categories: Vec<u32>,
    pub download_type: DownloadType,
}

/// A category advertised by an indexer's capability endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsCategory {
    pub id: u32,
    pub name: String,
}

/// Errors that can occur during indexer operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("unsafe URL blocked: {0}")]
    UnsafeUrl(String),

    #[error("Indexer connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Indexer API error: {0}")]
    ApiError(String),

    #[error("Malformed indexer response: {0}")]
    Protocol(String),

    #[error("Request timeout")]
    Timeout,
}

impl From<crate::safenet::SafeNetError> for SearchError {
    fn from(e: crate::safenet::SafeNetError) -> Self {
        use crate::safenet::SafeNetError;
        match e {
            SafeNetError::Timeout => SearchError::Timeout,
            SafeNetError::UnsafeAddress { .. } => SearchError::UnsafeUrl(e.to_string()),
            SafeNetError::Http(msg) => SearchError::ConnectionFailed(msg),
            other => SearchError::ConnectionFailed(other.to_string()),
        }
    }
}

/// One external release index behind a protocol-specific client.
#[async_trait]
pub trait IndexerSearchClient: Send + Sync {
    fn protocol(&self) -> IndexerProtocol;

    /// Query a single indexer and normalize its response.
    async fn search(
        &self,
        indexer: &Indexer,
        request: &SearchRequest,
    ) -> Result<Vec<ReleaseCandidate>, SearchError>;

    /// Probe the capability endpoint; failures surface as messages, never panics.
    async fn test_connection(&self, indexer: &Indexer) -> Result<(), SearchError>;

    /// Fetch the categories the indexer advertises.
    async fn fetch_categories(&self, indexer: &Indexer) -> Result<Vec<CapsCategory>, SearchError>;
}
