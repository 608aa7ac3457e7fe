//! In-memory mock of the storage collaborator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::{
    Downloader, Game, GameStatus, Indexer, Notification, ReleaseState, Store, StoreError,
    TrackedDownload, TrackedDownloadStatus, UserAutoSearchPolicy,
};

#[derive(Debug, Default)]
struct State {
    indexers: Vec<Indexer>,
    downloaders: Vec<Downloader>,
    games: HashMap<i64, Game>,
    downloads: HashMap<i64, TrackedDownload>,
    policies: Vec<UserAutoSearchPolicy>,
    notifications: Vec<Notification>,
    listing_seen: HashSet<(i64, String)>,
    next_download_id: i64,
}

/// Mock implementation of the [`Store`] trait.
///
/// Seed state through the `add_*` helpers, run the component under test,
/// then assert on `notifications()` / `downloads()` / `game()`.
#[derive(Debug, Default)]
pub struct MockStore {
    state: Arc<RwLock<State>>,
    /// If set, every store call fails with this message.
    fail_with: Arc<RwLock<Option<String>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_indexer(&self, indexer: Indexer) {
        self.state.write().await.indexers.push(indexer);
    }

    pub async fn add_downloader(&self, downloader: Downloader) {
        self.state.write().await.downloaders.push(downloader);
    }

    pub async fn add_game(&self, game: Game) {
        self.state.write().await.games.insert(game.id, game);
    }

    pub async fn add_policy(&self, policy: UserAutoSearchPolicy) {
        self.state.write().await.policies.push(policy);
    }

    /// Seed a tracked download with a fixed id.
    pub async fn add_download(&self, download: TrackedDownload) {
        let mut state = self.state.write().await;
        state.next_download_id = state.next_download_id.max(download.id);
        state.downloads.insert(download.id, download);
    }

    /// Make every subsequent store call fail.
    pub async fn fail_with(&self, message: &str) {
        *self.fail_with.write().await = Some(message.to_string());
    }

    pub async fn game(&self, id: i64) -> Option<Game> {
        self.state.read().await.games.get(&id).cloned()
    }

    pub async fn download(&self, id: i64) -> Option<TrackedDownload> {
        self.state.read().await.downloads.get(&id).cloned()
    }

    pub async fn downloads(&self) -> Vec<TrackedDownload> {
        self.state.read().await.downloads.values().cloned().collect()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.read().await.notifications.clone()
    }

    pub async fn policies(&self) -> Vec<UserAutoSearchPolicy> {
        self.state.read().await.policies.clone()
    }

    async fn check_failure(&self) -> Result<(), StoreError> {
        match self.fail_with.read().await.as_ref() {
            Some(message) => Err(StoreError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Store for MockStore {
    async fn list_enabled_indexers(&self) -> Result<Vec<Indexer>, StoreError> {
        self.check_failure().await?;
        Ok(self
            .state
            .read()
            .await
            .indexers
            .iter()
            .filter(|i| i.enabled)
            .cloned()
            .collect())
    }

    async fn list_enabled_downloaders(&self) -> Result<Vec<Downloader>, StoreError> {
        self.check_failure().await?;
        Ok(self
            .state
            .read()
            .await
            .downloaders
            .iter()
            .filter(|d| d.enabled)
            .cloned()
            .collect())
    }

    async fn get_downloader(&self, id: i64) -> Result<Downloader, StoreError> {
        self.check_failure().await?;
        self.state
            .read()
            .await
            .downloaders
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("downloader {id}")))
    }

    async fn list_games(&self) -> Result<Vec<Game>, StoreError> {
        self.check_failure().await?;
        Ok(self.state.read().await.games.values().cloned().collect())
    }

    async fn list_games_by_status(&self, status: GameStatus) -> Result<Vec<Game>, StoreError> {
        self.check_failure().await?;
        Ok(self
            .state
            .read()
            .await
            .games
            .values()
            .filter(|g| g.status == status)
            .cloned()
            .collect())
    }

    async fn get_game(&self, id: i64) -> Result<Game, StoreError> {
        self.check_failure().await?;
        self.state
            .read()
            .await
            .games
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("game {id}")))
    }

    async fn update_game_status(&self, game_id: i64, status: GameStatus) -> Result<(), StoreError> {
        self.check_failure().await?;
        let mut state = self.state.write().await;
        let game = state
            .games
            .get_mut(&game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        game.status = status;
        Ok(())
    }

    async fn update_game_release(
        &self,
        game_id: i64,
        release_date: Option<DateTime<Utc>>,
        first_seen_release_date: Option<DateTime<Utc>>,
        release_state: ReleaseState,
    ) -> Result<(), StoreError> {
        self.check_failure().await?;
        let mut state = self.state.write().await;
        let game = state
            .games
            .get_mut(&game_id)
            .ok_or_else(|| StoreError::NotFound(format!("game {game_id}")))?;
        game.release_date = release_date;
        game.first_seen_release_date = first_seen_release_date;
        game.release_state = release_state;
        Ok(())
    }

    async fn list_active_downloads(&self) -> Result<Vec<TrackedDownload>, StoreError> {
        self.check_failure().await?;
        Ok(self
            .state
            .read()
            .await
            .downloads
            .values()
            .filter(|d| d.status.is_active())
            .cloned()
            .collect())
    }

    async fn get_tracked_download(&self, id: i64) -> Result<TrackedDownload, StoreError> {
        self.check_failure().await?;
        self.state
            .read()
            .await
            .downloads
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("download {id}")))
    }

    async fn add_tracked_download(&self, mut download: TrackedDownload) -> Result<i64, StoreError> {
        self.check_failure().await?;
        let mut state = self.state.write().await;
        state.next_download_id += 1;
        download.id = state.next_download_id;
        let id = download.id;
        state.downloads.insert(id, download);
        Ok(id)
    }

    async fn update_download_status(
        &self,
        id: i64,
        status: TrackedDownloadStatus,
    ) -> Result<(), StoreError> {
        self.check_failure().await?;
        let mut state = self.state.write().await;
        let download = state
            .downloads
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("download {id}")))?;
        download.status = status;
        Ok(())
    }

    async fn list_auto_search_policies(&self) -> Result<Vec<UserAutoSearchPolicy>, StoreError> {
        self.check_failure().await?;
        Ok(self.state.read().await.policies.clone())
    }

    async fn set_policy_last_run(
        &self,
        user_id: i64,
        last_run: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_failure().await?;
        let mut state = self.state.write().await;
        let policy = state
            .policies
            .iter_mut()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("policy for user {user_id}")))?;
        policy.last_run = Some(last_run);
        Ok(())
    }

    async fn add_notification(&self, notification: Notification) -> Result<(), StoreError> {
        self.check_failure().await?;
        self.state.write().await.notifications.push(notification);
        Ok(())
    }

    async fn has_seen_listing(
        &self,
        game_id: i64,
        release_key: &str,
    ) -> Result<bool, StoreError> {
        self.check_failure().await?;
        Ok(self
            .state
            .read()
            .await
            .listing_seen
            .contains(&(game_id, release_key.to_string())))
    }

    async fn mark_listing_seen(&self, game_id: i64, release_key: &str) -> Result<(), StoreError> {
        self.check_failure().await?;
        self.state
            .write()
            .await
            .listing_seen
            .insert((game_id, release_key.to_string()));
        Ok(())
    }
}
