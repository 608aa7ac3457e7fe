//! Import manager state machine.
//!
//! Drives a completed TrackedDownload through path mapping, optional archive
//! extraction, strategy planning and the final filesystem move. Every status
//! write goes through the validated transition table. Plans the strategy is
//! not confident about park the download in manual review without touching
//! the filesystem; a human-confirmed plan re-enters through
//! [`ImportManager::confirm_manual`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::metrics::IMPORTS_TOTAL;
use crate::scheduler::ClientFactory;
use crate::store::{
    Game, GameStatus, Notification, OrganizerService, Store, TrackedDownload,
    TrackedDownloadStatus,
};

use super::config::ImportConfig;
use super::path_map::map_remote_path;
use super::strategy::plan_import;
use super::types::{ImportError, ImportPlan, ImportStrategyKind};
use super::unpack::{is_archive, unpack_archive};

pub struct ImportManager {
    store: Arc<dyn Store>,
    organizer: Option<Arc<dyn OrganizerService>>,
    factory: Arc<dyn ClientFactory>,
    config: ImportConfig,
}

impl ImportManager {
    pub fn new(
        store: Arc<dyn Store>,
        organizer: Option<Arc<dyn OrganizerService>>,
        factory: Arc<dyn ClientFactory>,
        config: ImportConfig,
    ) -> Self {
        Self {
            store,
            organizer,
            factory,
            config,
        }
    }

    /// Process one download that has reached `completed`.
    pub async fn process(&self, download_id: i64) -> Result<(), ImportError> {
        let download = self.store.get_tracked_download(download_id).await?;

        if !self.config.enabled {
            debug!(download = %download.title, "Post-processing disabled, leaving download completed");
            return Ok(());
        }

        match self.run(&download).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(download_id, &e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, download: &TrackedDownload) -> Result<(), ImportError> {
        let game = self.store.get_game(download.game_id).await?;

        let mut source = self.resolve_source(download).await?;
        let mut current = download.status;

        if self.config.auto_unpack && is_archive(&source) {
            self.transition(download.id, current, TrackedDownloadStatus::Unpacking)
                .await?;
            current = TrackedDownloadStatus::Unpacking;
            info!(download = %download.title, source = %source.display(), "Unpacking archive");
            source = unpack_archive(&source).await?;
        }

        let plan = plan_import(&self.config, &game, &source);
        if plan.needs_review {
            let reason = plan
                .review_reason
                .clone()
                .unwrap_or_else(|| "Import needs manual review".to_string());
            self.transition(
                download.id,
                current,
                TrackedDownloadStatus::ManualReviewRequired,
            )
            .await?;
            warn!(download = %download.title, reason = %reason, "Import parked for manual review");
            IMPORTS_TOTAL.with_label_values(&["manual_review"]).inc();
            self.notify(
                "Import needs review",
                format!("'{}' was not imported: {}", download.title, reason),
            )
            .await;
            return Ok(());
        }

        self.execute(download, current, &game, &plan).await
    }

    /// Re-entry point for a human-confirmed plan.
    ///
    /// The caller may omit the source path; it is then re-resolved through
    /// the download client.
    pub async fn confirm_manual(
        &self,
        download_id: i64,
        mut plan: ImportPlan,
    ) -> Result<(), ImportError> {
        let download = self.store.get_tracked_download(download_id).await?;
        if download.status != TrackedDownloadStatus::ManualReviewRequired {
            return Err(ImportError::InvalidTransition {
                from: download.status,
                to: TrackedDownloadStatus::CompletedPendingImport,
            });
        }

        if plan.source.as_os_str().is_empty() || !plan.source.exists() {
            plan.source = self.resolve_source(&download).await?;
        }
        plan.needs_review = false;

        let game = self.store.get_game(download.game_id).await?;
        match self.execute(&download, download.status, &game, &plan).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail(download_id, &e).await;
                Err(e)
            }
        }
    }

    /// Execute a confident plan: move/copy, mark imported, flip the game to
    /// completed, best-effort rescan for structured imports.
    async fn execute(
        &self,
        download: &TrackedDownload,
        current: TrackedDownloadStatus,
        game: &Game,
        plan: &ImportPlan,
    ) -> Result<(), ImportError> {
        self.transition(
            download.id,
            current,
            TrackedDownloadStatus::CompletedPendingImport,
        )
        .await?;

        place(plan, self.config.overwrite).await?;

        self.transition(
            download.id,
            TrackedDownloadStatus::CompletedPendingImport,
            TrackedDownloadStatus::Imported,
        )
        .await?;
        self.store
            .update_game_status(game.id, GameStatus::Completed)
            .await?;

        info!(
            download = %download.title,
            destination = %plan.destination.display(),
            "Import complete"
        );
        IMPORTS_TOTAL.with_label_values(&["imported"]).inc();
        self.notify(
            "Import complete",
            format!(
                "'{}' imported to {}",
                download.title,
                plan.destination.display()
            ),
        )
        .await;

        if plan.strategy == ImportStrategyKind::Romm {
            if let Some(slug) = plan.platform_slug.as_deref() {
                self.rescan(slug).await;
            }
        }

        Ok(())
    }

    /// Where the downloaded data lives locally, via the backend-reported
    /// path and the remote→local mapping table.
    async fn resolve_source(&self, download: &TrackedDownload) -> Result<PathBuf, ImportError> {
        let config = self.store.get_downloader(download.downloader_id).await?;
        let client = self.factory.client_for(config);
        let details = client.get_details(&download.hash).await?;
        let Some(remote) = details.remote_path else {
            return Err(ImportError::SourceMissing(PathBuf::from(format!(
                "<no path reported for {}>",
                download.title
            ))));
        };
        Ok(map_remote_path(&self.config.path_mappings, &remote))
    }

    async fn transition(
        &self,
        download_id: i64,
        from: TrackedDownloadStatus,
        to: TrackedDownloadStatus,
    ) -> Result<(), ImportError> {
        if !from.can_transition(to) {
            return Err(ImportError::InvalidTransition { from, to });
        }
        self.store.update_download_status(download_id, to).await?;
        Ok(())
    }

    /// Mark the download errored (when the table allows it) and tell the user.
    async fn fail(&self, download_id: i64, error: &ImportError) {
        IMPORTS_TOTAL.with_label_values(&["error"]).inc();
        let Ok(download) = self.store.get_tracked_download(download_id).await else {
            return;
        };
        if download.status.can_transition(TrackedDownloadStatus::Error) {
            if let Err(e) = self
                .store
                .update_download_status(download_id, TrackedDownloadStatus::Error)
                .await
            {
                warn!(download = %download.title, error = %e, "Failed to record import error");
            }
        }
        self.notify(
            "Import failed",
            format!("'{}' failed to import: {}", download.title, error),
        )
        .await;
    }

    async fn rescan(&self, platform_slug: &str) {
        let Some(organizer) = &self.organizer else {
            debug!("No organizer configured, skipping rescan");
            return;
        };
        if !organizer.is_available().await {
            warn!(platform = platform_slug, "Organizer unavailable, skipping rescan");
            return;
        }
        if let Err(e) = organizer.trigger_rescan(platform_slug).await {
            warn!(platform = platform_slug, error = %e, "Library rescan failed");
        }
    }

    async fn notify(&self, title: &str, body: String) {
        if let Err(e) = self
            .store
            .add_notification(Notification::new(None, title, body))
            .await
        {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
}

/// Carry out a plan's filesystem action.
///
/// `delete_source` makes it a move (rename with copy+delete fallback for
/// cross-filesystem moves), otherwise a copy. Blocking work runs off the
/// async runtime.
async fn place(plan: &ImportPlan, overwrite: bool) -> Result<(), ImportError> {
    let plan = plan.clone();
    tokio::task::spawn_blocking(move || place_blocking(&plan, overwrite))
        .await
        .map_err(|e| ImportError::Unpack(format!("Import task panicked: {e}")))?
}

fn place_blocking(plan: &ImportPlan, overwrite: bool) -> Result<(), ImportError> {
    if !plan.source.exists() {
        return Err(ImportError::SourceMissing(plan.source.clone()));
    }

    if plan.destination.exists() {
        if !overwrite {
            return Err(ImportError::Io {
                path: plan.destination.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "destination exists",
                ),
            });
        }
        remove_any(&plan.destination)?;
    }

    if let Some(parent) = plan.destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ImportError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    if plan.delete_source {
        match std::fs::rename(&plan.source, &plan.destination) {
            Ok(()) => Ok(()),
            // Cross-filesystem moves fail with EXDEV (18 on Linux).
            Err(e)
                if e.kind() == std::io::ErrorKind::CrossesDevices
                    || e.raw_os_error() == Some(18) =>
            {
                copy_any(&plan.source, &plan.destination)?;
                remove_any(&plan.source)
            }
            Err(e) => Err(ImportError::Io {
                path: plan.source.clone(),
                source: e,
            }),
        }
    } else {
        copy_any(&plan.source, &plan.destination)
    }
}

fn copy_any(source: &Path, destination: &Path) -> Result<(), ImportError> {
    let io_err = |path: &Path, e: std::io::Error| ImportError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    if source.is_dir() {
        std::fs::create_dir_all(destination).map_err(|e| io_err(destination, e))?;
        for entry in std::fs::read_dir(source).map_err(|e| io_err(source, e))? {
            let entry = entry.map_err(|e| io_err(source, e))?;
            copy_any(&entry.path(), &destination.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        std::fs::copy(source, destination)
            .map(|_| ())
            .map_err(|e| io_err(source, e))
    }
}

fn remove_any(path: &Path) -> Result<(), ImportError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| ImportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
