//! Download-status check (per-minute loop).
//!
//! Groups active TrackedDownloads by owning downloader, lists that backend's
//! transfers once, and reconciles each download by hash. Status transitions
//! go through the validated table; anything the table rejects is logged and
//! skipped, never silently overwritten.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::downloader::{DownloadClient, DownloadItem, DownloadStatus};
use crate::safenet::SafetyPolicy;
use crate::store::{
    Downloader, GameStatus, Notification, Store, TrackedDownload, TrackedDownloadStatus,
};

use super::types::SchedulerError;

/// Builds adapter instances per configured backend. Injected so tests can
/// substitute mock clients.
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, config: Downloader) -> Arc<dyn DownloadClient>;
}

pub struct DefaultClientFactory {
    policy: SafetyPolicy,
}

impl DefaultClientFactory {
    pub fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }
}

impl ClientFactory for DefaultClientFactory {
    fn client_for(&self, config: Downloader) -> Arc<dyn DownloadClient> {
        crate::downloader::client_for(config, self.policy)
    }
}

/// The one place the vanished-download assumption lives.
///
/// A transfer missing from the backend's active list is assumed to have
/// finished and been removed (by the backend or by the user). The returned
/// message explicitly flags the assumption so a user who actually cancelled
/// the download can intervene.
pub fn resolve_vanished(download: &TrackedDownload) -> (TrackedDownloadStatus, String) {
    (
        TrackedDownloadStatus::Completed,
        format!(
            "'{}' was no longer present on the download client and is assumed \
             to have completed. If it was cancelled instead, re-add it manually.",
            download.title
        ),
    )
}

pub struct DownloadCheck {
    store: Arc<dyn Store>,
    factory: Arc<dyn ClientFactory>,
}

impl DownloadCheck {
    pub fn new(store: Arc<dyn Store>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { store, factory }
    }

    pub async fn run_cycle(&self) -> Result<(), SchedulerError> {
        let active = self.store.list_active_downloads().await?;
        if active.is_empty() {
            return Ok(());
        }

        let mut by_downloader: HashMap<i64, Vec<TrackedDownload>> = HashMap::new();
        for download in active {
            by_downloader
                .entry(download.downloader_id)
                .or_default()
                .push(download);
        }

        for (downloader_id, downloads) in by_downloader {
            let config = match self.store.get_downloader(downloader_id).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(downloader_id, error = %e, "Unknown downloader for active downloads");
                    continue;
                }
            };
            let client = self.factory.client_for(config);

            // One list call per downloader per cycle.
            let items = match client.list_active().await {
                Ok(items) => items,
                Err(e) => {
                    warn!(client = client.name(), error = %e, "Failed to list transfers");
                    continue;
                }
            };
            let by_id: HashMap<String, &DownloadItem> = items
                .iter()
                .flat_map(|i| {
                    let mut keys = vec![(i.id.to_lowercase(), i)];
                    if let Some(hash) = &i.hash {
                        keys.push((hash.to_lowercase(), i));
                    }
                    keys
                })
                .collect();

            debug!(
                client = client.name(),
                tracked = downloads.len(),
                listed = items.len(),
                "Reconciling downloads"
            );

            for download in downloads {
                match by_id.get(&download.hash.to_lowercase()) {
                    Some(item) => self.reconcile_present(&download, item).await,
                    None => self.reconcile_vanished(&download).await,
                }
            }
        }

        Ok(())
    }

    async fn reconcile_present(&self, download: &TrackedDownload, item: &DownloadItem) {
        let next = match item.status {
            DownloadStatus::Completed | DownloadStatus::Seeding => {
                Some(TrackedDownloadStatus::Completed)
            }
            _ if item.progress >= 1.0 => Some(TrackedDownloadStatus::Completed),
            DownloadStatus::Error => Some(TrackedDownloadStatus::Failed),
            DownloadStatus::Paused => Some(TrackedDownloadStatus::Paused),
            DownloadStatus::Downloading => Some(TrackedDownloadStatus::Downloading),
        };
        let Some(next) = next else { return };
        if next == download.status {
            return;
        }

        if let Err(e) = self.transition(download, next).await {
            warn!(download = %download.title, error = %e, "Skipping status update");
            return;
        }

        match next {
            TrackedDownloadStatus::Completed => {
                info!(download = %download.title, "Download completed");
                self.set_game_owned(download).await;
                self.notify(
                    download,
                    "Download completed",
                    format!("'{}' finished downloading", download.title),
                )
                .await;
            }
            TrackedDownloadStatus::Failed => {
                warn!(download = %download.title, "Download failed");
                self.notify(
                    download,
                    "Download failed",
                    format!("'{}' failed on the download client", download.title),
                )
                .await;
            }
            _ => {}
        }
    }

    async fn reconcile_vanished(&self, download: &TrackedDownload) {
        let (next, explanation) = resolve_vanished(download);
        if let Err(e) = self.transition(download, next).await {
            warn!(download = %download.title, error = %e, "Skipping vanished-download update");
            return;
        }
        info!(download = %download.title, "Download vanished from backend, assumed completed");
        self.set_game_owned(download).await;
        self.notify(download, "Download assumed completed", explanation)
            .await;
    }

    /// Validated transition; rejected moves surface as `InvalidTransition`.
    async fn transition(
        &self,
        download: &TrackedDownload,
        next: TrackedDownloadStatus,
    ) -> Result<(), SchedulerError> {
        if !download.status.can_transition(next) {
            return Err(SchedulerError::InvalidTransition {
                from: download.status,
                to: next,
            });
        }
        self.store.update_download_status(download.id, next).await?;
        Ok(())
    }

    async fn set_game_owned(&self, download: &TrackedDownload) {
        if let Err(e) = self
            .store
            .update_game_status(download.game_id, GameStatus::Owned)
            .await
        {
            warn!(game_id = download.game_id, error = %e, "Failed to mark game owned");
        }
    }

    async fn notify(&self, download: &TrackedDownload, title: &str, body: String) {
        let notification = Notification::new(None, title, body);
        if let Err(e) = self.store.add_notification(notification).await {
            warn!(download = %download.title, error = %e, "Failed to deliver notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::store::DownloadProtocol;

    fn tracked(status: TrackedDownloadStatus) -> TrackedDownload {
        TrackedDownload {
            id: 1,
            game_id: 2,
            downloader_id: 3,
            protocol: DownloadProtocol::Torrent,
            hash: "abc123".to_string(),
            title: "Some Game".to_string(),
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_resolve_vanished_assumes_completed() {
        let download = tracked(TrackedDownloadStatus::Downloading);
        let (status, message) = resolve_vanished(&download);
        assert_eq!(status, TrackedDownloadStatus::Completed);
        assert!(message.contains("assumed"));
        assert!(message.contains("Some Game"));
    }
}
