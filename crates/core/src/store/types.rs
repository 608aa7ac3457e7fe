//! Domain types exchanged with the external storage collaborator.
//!
//! These entities are owned by the external store; this crate reads them and
//! writes back narrow status/timestamp mutations only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a game in the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Wanted but not yet acquired.
    Wanted,
    /// A download is in flight.
    Downloading,
    /// Downloaded, not yet imported.
    Owned,
    /// Imported into the library.
    Completed,
}

/// Release-date state computed by the release-update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseState {
    /// Release date is in the future (or unknown).
    Upcoming,
    /// Release date has passed.
    Released,
    /// Release date slipped past the first-observed date beyond the threshold.
    Delayed,
}

/// A game tracked by the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub title: String,
    /// Platform name as stored (e.g. "PlayStation 2"), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// External metadata-catalog id, if linked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<i64>,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    /// Release date as first observed, for delay detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen_release_date: Option<DateTime<Utc>>,
    pub release_state: ReleaseState,
}

/// Wire protocol an indexer speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexerProtocol {
    Torznab,
    Newznab,
}

/// A configured external release index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indexer {
    pub id: i64,
    pub name: String,
    /// Base API URL (e.g. "https://indexer.example/api").
    pub base_url: String,
    pub api_key: String,
    pub protocol: IndexerProtocol,
    pub enabled: bool,
    /// Lower value = searched/preferred first.
    pub priority: i32,
    /// Category allow-list sent with every search. Empty = no restriction.
    #[serde(default)]
    pub categories: Vec<u32>,
}

/// Transfer protocol of a download-client backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadProtocol {
    Torrent,
    Usenet,
}

/// The closed set of supported download-client backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloaderKind {
    QBittorrent,
    Transmission,
    Deluge,
    Sabnzbd,
    Nzbget,
}

impl DownloaderKind {
    /// Transfer protocol this backend handles.
    pub fn protocol(&self) -> DownloadProtocol {
        match self {
            DownloaderKind::QBittorrent
            | DownloaderKind::Transmission
            | DownloaderKind::Deluge => DownloadProtocol::Torrent,
            DownloaderKind::Sabnzbd | DownloaderKind::Nzbget => DownloadProtocol::Usenet,
        }
    }
}

/// A configured download-client backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Downloader {
    pub id: i64,
    pub name: String,
    pub kind: DownloaderKind,
    /// Base URL including scheme, host, port and any path prefix.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Category/label applied to added transfers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Add transfers in a paused state.
    #[serde(default)]
    pub add_paused: bool,
    /// Remove the transfer from the backend once imported.
    #[serde(default)]
    pub remove_completed: bool,
    pub enabled: bool,
    /// Lower value = tried first when auto-grabbing.
    pub priority: i32,
    /// Free-form backend-specific settings.
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// Lifecycle status of a tracked download.
///
/// Transitions are validated via [`TrackedDownloadStatus::can_transition`];
/// callers must reject anything the table does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedDownloadStatus {
    Downloading,
    Paused,
    Failed,
    Completed,
    Unpacking,
    ManualReviewRequired,
    CompletedPendingImport,
    Imported,
    Error,
}

impl TrackedDownloadStatus {
    /// Whether the backend still needs to be polled for this status.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TrackedDownloadStatus::Downloading | TrackedDownloadStatus::Paused
        )
    }

    /// Validated transition table for the download lifecycle.
    pub fn can_transition(&self, next: TrackedDownloadStatus) -> bool {
        use TrackedDownloadStatus::*;
        matches!(
            (self, next),
            (Downloading, Paused)
                | (Downloading, Failed)
                | (Downloading, Completed)
                | (Paused, Downloading)
                | (Paused, Failed)
                | (Paused, Completed)
                | (Completed, Unpacking)
                | (Completed, ManualReviewRequired)
                | (Completed, CompletedPendingImport)
                | (Completed, Error)
                | (Unpacking, ManualReviewRequired)
                | (Unpacking, CompletedPendingImport)
                | (Unpacking, Error)
                | (ManualReviewRequired, CompletedPendingImport)
                | (ManualReviewRequired, Error)
                | (CompletedPendingImport, Imported)
                | (CompletedPendingImport, Error)
        )
    }

    /// String tag used by the store and notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedDownloadStatus::Downloading => "downloading",
            TrackedDownloadStatus::Paused => "paused",
            TrackedDownloadStatus::Failed => "failed",
            TrackedDownloadStatus::Completed => "completed",
            TrackedDownloadStatus::Unpacking => "unpacking",
            TrackedDownloadStatus::ManualReviewRequired => "manual_review_required",
            TrackedDownloadStatus::CompletedPendingImport => "completed_pending_import",
            TrackedDownloadStatus::Imported => "imported",
            TrackedDownloadStatus::Error => "error",
        }
    }
}

/// This system's record of one in-flight or completed transfer tied to a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDownload {
    pub id: i64,
    pub game_id: i64,
    pub downloader_id: i64,
    pub protocol: DownloadProtocol,
    /// Backend-assigned hash (torrent) or queue id (usenet).
    pub hash: String,
    pub title: String,
    pub status: TrackedDownloadStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-user automatic search behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAutoSearchPolicy {
    pub user_id: i64,
    pub auto_search: bool,
    pub auto_download: bool,
    /// Minimum hours between auto-search runs for this user.
    pub interval_hours: u32,
    /// Search for games whose release state is upcoming/delayed too.
    pub include_unreleased: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Serialized download-filter rule blob, validated before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_blob: Option<serde_json::Value>,
}

/// A user-facing notification delivered through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Target user; None = broadcast to all users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: Option<i64>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}
