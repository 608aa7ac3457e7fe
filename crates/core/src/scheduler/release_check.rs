//! Release-update check (daily loop).
//!
//! Batch-fetches current release dates from the metadata catalog, computes
//! each game's release-state transition and notifies on transitions into
//! released or delayed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::store::{Game, MetadataCatalog, Notification, ReleaseState, Store};

use super::config::SchedulerConfig;
use super::types::SchedulerError;

pub struct ReleaseCheck {
    store: Arc<dyn Store>,
    catalog: Arc<dyn MetadataCatalog>,
    config: SchedulerConfig,
}

/// Release state for a game given its current dates.
///
/// Released once the date has passed; delayed when the date slipped more
/// than the threshold past the first-observed date; upcoming otherwise
/// (including when the date is unknown).
pub fn compute_release_state(
    release_date: Option<DateTime<Utc>>,
    first_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    delay_threshold_days: i64,
) -> ReleaseState {
    let Some(date) = release_date else {
        return ReleaseState::Upcoming;
    };
    if date <= now {
        return ReleaseState::Released;
    }
    if let Some(first) = first_seen {
        if date - first > Duration::days(delay_threshold_days) {
            return ReleaseState::Delayed;
        }
    }
    ReleaseState::Upcoming
}

impl ReleaseCheck {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn MetadataCatalog>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let games: Vec<Game> = self
            .store
            .list_games()
            .await?
            .into_iter()
            .filter(|g| g.external_id.is_some())
            .collect();
        if games.is_empty() {
            return Ok(());
        }

        let external_ids: Vec<i64> = games.iter().filter_map(|g| g.external_id).collect();
        let dates = self.catalog.release_dates(&external_ids).await?;
        debug!(games = games.len(), resolved = dates.len(), "Release check fetched dates");

        for game in games {
            let Some(external_id) = game.external_id else {
                continue;
            };
            // Ids the catalog does not know keep their stored dates.
            let Some(&release_date) = dates.get(&external_id) else {
                continue;
            };

            let first_seen = game.first_seen_release_date.or(release_date);
            let new_state = compute_release_state(
                release_date,
                first_seen,
                now,
                self.config.delay_threshold_days,
            );

            if let Err(e) = self
                .store
                .update_game_release(game.id, release_date, first_seen, new_state)
                .await
            {
                warn!(game = %game.title, error = %e, "Failed to persist release update");
                continue;
            }

            if new_state != game.release_state {
                info!(
                    game = %game.title,
                    from = ?game.release_state,
                    to = ?new_state,
                    "Release state changed"
                );
                match new_state {
                    ReleaseState::Released => {
                        self.notify(&game, "Game released", "is now released").await;
                    }
                    ReleaseState::Delayed => {
                        self.notify(&game, "Game delayed", "has been delayed").await;
                    }
                    ReleaseState::Upcoming => {}
                }
            }
        }

        Ok(())
    }

    async fn notify(&self, game: &Game, title: &str, verb: &str) {
        let notification =
            Notification::new(None, title, format!("{} {}", game.title, verb));
        if let Err(e) = self.store.add_notification(notification).await {
            warn!(game = %game.title, error = %e, "Failed to deliver notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_state_released_when_date_passed() {
        assert_eq!(
            compute_release_state(Some(day(1)), Some(day(1)), day(10), 7),
            ReleaseState::Released
        );
        // Exactly now counts as released.
        assert_eq!(
            compute_release_state(Some(day(10)), Some(day(10)), day(10), 7),
            ReleaseState::Released
        );
    }

    #[test]
    fn test_state_delayed_beyond_threshold() {
        assert_eq!(
            compute_release_state(Some(day(20)), Some(day(2)), day(1), 7),
            ReleaseState::Delayed
        );
        // Slip inside the threshold is still upcoming.
        assert_eq!(
            compute_release_state(Some(day(8)), Some(day(2)), day(1), 7),
            ReleaseState::Upcoming
        );
    }

    #[test]
    fn test_state_unknown_date_is_upcoming() {
        assert_eq!(
            compute_release_state(None, None, day(1), 7),
            ReleaseState::Upcoming
        );
    }
}
