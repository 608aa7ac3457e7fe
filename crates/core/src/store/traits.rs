//! External collaborator boundaries.
//!
//! Persistence, the metadata catalog and the organization service all live
//! outside this crate; these traits are the entire surface this core is
//! allowed to touch. No ad hoc queries - narrow accessors and mutators only.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{
    Downloader, Game, GameStatus, Indexer, Notification, ReleaseState, TrackedDownload,
    TrackedDownloadStatus, UserAutoSearchPolicy,
};

/// Errors surfaced by the storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// The persistent store for games, indexers, downloaders and tracking state.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_enabled_indexers(&self) -> Result<Vec<Indexer>, StoreError>;

    async fn list_enabled_downloaders(&self) -> Result<Vec<Downloader>, StoreError>;

    async fn get_downloader(&self, id: i64) -> Result<Downloader, StoreError>;

    async fn list_games(&self) -> Result<Vec<Game>, StoreError>;

    async fn list_games_by_status(&self, status: GameStatus) -> Result<Vec<Game>, StoreError>;

    async fn get_game(&self, id: i64) -> Result<Game, StoreError>;

    async fn update_game_status(&self, game_id: i64, status: GameStatus) -> Result<(), StoreError>;

    /// Write back refreshed release metadata for a game.
    async fn update_game_release(
        &self,
        game_id: i64,
        release_date: Option<DateTime<Utc>>,
        first_seen_release_date: Option<DateTime<Utc>>,
        release_state: ReleaseState,
    ) -> Result<(), StoreError>;

    /// Tracked downloads still worth polling (downloading or paused).
    async fn list_active_downloads(&self) -> Result<Vec<TrackedDownload>, StoreError>;

    async fn get_tracked_download(&self, id: i64) -> Result<TrackedDownload, StoreError>;

    /// Record a new tracked download, returning its store-assigned id.
    async fn add_tracked_download(&self, download: TrackedDownload) -> Result<i64, StoreError>;

    async fn update_download_status(
        &self,
        id: i64,
        status: TrackedDownloadStatus,
    ) -> Result<(), StoreError>;

    async fn list_auto_search_policies(&self) -> Result<Vec<UserAutoSearchPolicy>, StoreError>;

    async fn set_policy_last_run(
        &self,
        user_id: i64,
        last_run: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Fire-and-forget notification delivery.
    async fn add_notification(&self, notification: Notification) -> Result<(), StoreError>;

    /// Seen-set for the third-party listing check, keyed by (game, release).
    async fn has_seen_listing(&self, game_id: i64, release_key: &str)
        -> Result<bool, StoreError>;

    async fn mark_listing_seen(&self, game_id: i64, release_key: &str) -> Result<(), StoreError>;
}

/// Errors surfaced by the metadata catalog collaborator.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Catalog API error: {0}")]
    ApiError(String),
}

/// External game-info catalog: batch release-date lookups by external id.
#[async_trait]
pub trait MetadataCatalog: Send + Sync {
    /// Current release timestamps for the given external ids. Ids the catalog
    /// does not know are simply absent from the result.
    async fn release_dates(
        &self,
        external_ids: &[i64],
    ) -> Result<HashMap<i64, Option<DateTime<Utc>>>, CatalogError>;
}

/// Errors surfaced by the organization service collaborator.
#[derive(Debug, Error)]
pub enum OrganizerError {
    #[error("Organizer unavailable: {0}")]
    Unavailable(String),

    #[error("Organizer API error: {0}")]
    ApiError(String),
}

/// Optional external library-organization service (structured imports).
///
/// Absence degrades to a logged warning, never a hard failure.
#[async_trait]
pub trait OrganizerService: Send + Sync {
    async fn is_available(&self) -> bool;

    async fn trigger_rescan(&self, platform_slug: &str) -> Result<(), OrganizerError>;
}
