//! Scene-listing check (six-hour loop).
//!
//! Polls a third-party "newest releases" listing and matches every entry
//! against the wanted games in one pass. The listing service is rate-limited
//! by a shared token bucket; a cycle that cannot acquire a token is skipped
//! rather than queued. Each (game, release) pair notifies at most once.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::{Game, GameStatus, Notification, Store};

use super::config::SchedulerConfig;
use super::matching::listing_matches;
use super::rate_limiter::TokenBucket;
use super::types::SchedulerError;

/// One entry from the third-party release listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedRelease {
    /// Stable identifier used for per-game dedup.
    pub key: String,
    pub title: String,
}

/// Third-party newest-releases listing. Injected so tests can fake the feed.
#[async_trait]
pub trait ListingService: Send + Sync {
    /// Fetch up to `window` most recent releases, newest first.
    async fn newest_releases(&self, window: u32) -> Result<Vec<ListedRelease>, SchedulerError>;
}

pub struct ListingCheck {
    store: Arc<dyn Store>,
    listing: Arc<dyn ListingService>,
    bucket: Arc<Mutex<TokenBucket>>,
    config: SchedulerConfig,
}

impl ListingCheck {
    pub fn new(
        store: Arc<dyn Store>,
        listing: Arc<dyn ListingService>,
        bucket: Arc<Mutex<TokenBucket>>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            listing,
            bucket,
            config,
        }
    }

    pub async fn run_cycle(&self) -> Result<(), SchedulerError> {
        let wanted = self.store.list_games_by_status(GameStatus::Wanted).await?;
        if wanted.is_empty() {
            return Ok(());
        }

        // Quota applies per request, not per wanted game. When the bucket is
        // empty the whole cycle is skipped; the next one retries.
        if let Err(wait) = self.bucket.lock().await.try_acquire() {
            debug!(wait_secs = wait.as_secs(), "Listing quota exhausted, skipping cycle");
            return Ok(());
        }

        let releases = self
            .listing
            .newest_releases(self.config.listing_window)
            .await?;
        debug!(
            releases = releases.len(),
            wanted = wanted.len(),
            "Listing fetched"
        );

        for release in &releases {
            for game in &wanted {
                if !listing_matches(&game.title, &release.title) {
                    continue;
                }
                if let Err(e) = self.notify_once(game, release).await {
                    warn!(game = %game.title, error = %e, "Listing notification failed");
                }
            }
        }

        Ok(())
    }

    async fn notify_once(
        &self,
        game: &Game,
        release: &ListedRelease,
    ) -> Result<(), SchedulerError> {
        if self.store.has_seen_listing(game.id, &release.key).await? {
            return Ok(());
        }
        // Marking first keeps a notification failure from repeating forever.
        self.store.mark_listing_seen(game.id, &release.key).await?;

        info!(game = %game.title, release = %release.title, "Wanted game spotted in listing");
        let notification = Notification::new(
            None,
            "Release spotted",
            format!("'{}' matches wanted game {}", release.title, game.title),
        );
        self.store.add_notification(notification).await?;
        Ok(())
    }
}
