//! Per-user automatic search (hourly loop).
//!
//! Each user's policy gates the run (interval elapsed, auto_search on). For
//! every eligible wanted game the aggregated search runs once, hits are
//! re-filtered locally and classified, and an unambiguous main release is
//! auto-grabbed when the policy allows it. Ambiguity and update releases
//! become notifications instead of downloads.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::downloader::AddRequest;
use crate::indexer::{DownloadType, ReleaseCandidate, SearchAggregator, SearchRequest};
use crate::rules::DownloadRules;
use crate::store::{
    DownloadProtocol, Downloader, Game, GameStatus, Notification, ReleaseState, Store,
    TrackedDownload, TrackedDownloadStatus, UserAutoSearchPolicy,
};

use super::download_check::ClientFactory;
use super::matching::{classify_hit, title_matches, HitKind};
use super::types::SchedulerError;

pub struct AutoSearch {
    store: Arc<dyn Store>,
    aggregator: Arc<SearchAggregator>,
    factory: Arc<dyn ClientFactory>,
}

/// Whether a policy is due to run at `now`.
fn policy_due(policy: &UserAutoSearchPolicy, now: DateTime<Utc>) -> bool {
    if !policy.auto_search {
        return false;
    }
    match policy.last_run {
        None => true,
        Some(last) => now - last >= Duration::hours(i64::from(policy.interval_hours)),
    }
}

/// Whether a wanted game may be searched for under this policy.
fn game_eligible(game: &Game, policy: &UserAutoSearchPolicy) -> bool {
    match game.release_state {
        ReleaseState::Released => true,
        ReleaseState::Upcoming | ReleaseState::Delayed => policy.include_unreleased,
    }
}

fn compatible(download_type: DownloadType, protocol: DownloadProtocol) -> bool {
    matches!(
        (download_type, protocol),
        (DownloadType::Torrent, DownloadProtocol::Torrent)
            | (DownloadType::Usenet, DownloadProtocol::Usenet)
    )
}

impl AutoSearch {
    pub fn new(
        store: Arc<dyn Store>,
        aggregator: Arc<SearchAggregator>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            store,
            aggregator,
            factory,
        }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let policies = self.store.list_auto_search_policies().await?;
        for policy in policies {
            if !policy_due(&policy, now) {
                continue;
            }
            if let Err(e) = self.run_for_user(&policy).await {
                warn!(user_id = policy.user_id, error = %e, "Auto-search run failed");
            }
            // The interval gate advances even when nothing was searchable,
            // otherwise an empty library would re-run every cycle.
            if let Err(e) = self
                .store
                .set_policy_last_run(policy.user_id, now)
                .await
            {
                warn!(user_id = policy.user_id, error = %e, "Failed to record auto-search run");
            }
        }
        Ok(())
    }

    async fn run_for_user(&self, policy: &UserAutoSearchPolicy) -> Result<(), SchedulerError> {
        let wanted = self.store.list_games_by_status(GameStatus::Wanted).await?;
        let eligible: Vec<Game> = wanted
            .into_iter()
            .filter(|g| game_eligible(g, policy))
            .collect();
        if eligible.is_empty() {
            return Ok(());
        }

        let rules = DownloadRules::from_blob(policy.rules_blob.as_ref());
        debug!(
            user_id = policy.user_id,
            games = eligible.len(),
            "Auto-search starting"
        );

        for game in eligible {
            if let Err(e) = self.search_game(policy, &game, &rules).await {
                warn!(game = %game.title, error = %e, "Auto-search for game failed");
            }
        }
        Ok(())
    }

    async fn search_game(
        &self,
        policy: &UserAutoSearchPolicy,
        game: &Game,
        rules: &DownloadRules,
    ) -> Result<(), SchedulerError> {
        let request = SearchRequest {
            query: game.title.clone(),
            ..Default::default()
        };
        let result = self.aggregator.search_all(&request).await?;

        // Indexer relevance is not trusted; everything is re-filtered here.
        let mut mains: Vec<ReleaseCandidate> = Vec::new();
        let mut updates: Vec<ReleaseCandidate> = Vec::new();
        for candidate in result.items {
            if !title_matches(&game.title, &candidate.title) || !rules.passes(&candidate) {
                continue;
            }
            match classify_hit(&game.title, &candidate.title) {
                HitKind::Main => mains.push(candidate),
                HitKind::Update => updates.push(candidate),
                HitKind::Dlc | HitKind::Extra => {}
            }
        }

        if !updates.is_empty() {
            self.notify(
                policy.user_id,
                "Updates available",
                format!(
                    "{} update release(s) found for {}",
                    updates.len(),
                    game.title
                ),
            )
            .await;
        }

        match mains.len() {
            0 => {
                debug!(game = %game.title, "No main release found");
            }
            1 if policy.auto_download => {
                self.grab(policy, game, &mains[0]).await?;
            }
            1 => {
                self.notify(
                    policy.user_id,
                    "Release found",
                    format!("'{}' found for {}", mains[0].title, game.title),
                )
                .await;
            }
            n => {
                self.notify(
                    policy.user_id,
                    "Multiple releases found",
                    format!(
                        "{} main releases found for {}, choose one manually",
                        n, game.title
                    ),
                )
                .await;
            }
        }
        Ok(())
    }

    /// Add the candidate through the first compatible downloader that takes it,
    /// in priority order.
    async fn grab(
        &self,
        policy: &UserAutoSearchPolicy,
        game: &Game,
        candidate: &ReleaseCandidate,
    ) -> Result<(), SchedulerError> {
        let mut downloaders: Vec<Downloader> = self
            .store
            .list_enabled_downloaders()
            .await?
            .into_iter()
            .filter(|d| compatible(candidate.download_type, d.kind.protocol()))
            .collect();
        downloaders.sort_by_key(|d| d.priority);

        if downloaders.is_empty() {
            warn!(game = %game.title, "No compatible downloader configured");
            self.notify(
                policy.user_id,
                "Grab failed",
                format!("No compatible download client for '{}'", candidate.title),
            )
            .await;
            return Ok(());
        }

        for config in downloaders {
            let downloader_id = config.id;
            let request = AddRequest {
                link: candidate.link.clone(),
                name: Some(candidate.title.clone()),
                category: config.category.clone(),
                add_paused: config.add_paused,
            };
            let client = self.factory.client_for(config);

            match client.add_download(&request).await {
                Ok(added) => {
                    info!(
                        game = %game.title,
                        release = %candidate.title,
                        client = client.name(),
                        "Release grabbed"
                    );
                    let protocol = match candidate.download_type {
                        DownloadType::Torrent => DownloadProtocol::Torrent,
                        DownloadType::Usenet => DownloadProtocol::Usenet,
                    };
                    let tracked = TrackedDownload {
                        id: 0,
                        game_id: game.id,
                        downloader_id,
                        protocol,
                        hash: added.hash.clone().unwrap_or(added.id.clone()),
                        title: candidate.title.clone(),
                        status: TrackedDownloadStatus::Downloading,
                        created_at: Utc::now(),
                    };
                    self.store.add_tracked_download(tracked).await?;
                    self.store
                        .update_game_status(game.id, GameStatus::Downloading)
                        .await?;
                    self.notify(
                        policy.user_id,
                        "Download started",
                        format!("'{}' sent to {}", candidate.title, client.name()),
                    )
                    .await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        client = client.name(),
                        release = %candidate.title,
                        error = %e,
                        "Add failed, trying next downloader"
                    );
                }
            }
        }

        self.notify(
            policy.user_id,
            "Grab failed",
            format!("Every download client rejected '{}'", candidate.title),
        )
        .await;
        Ok(())
    }

    async fn notify(&self, user_id: i64, title: &str, body: String) {
        let notification = Notification::new(Some(user_id), title, body);
        if let Err(e) = self.store.add_notification(notification).await {
            warn!(user_id, error = %e, "Failed to deliver notification");
        }
    }
}
