//! Scheduler runner.
//!
//! Owns the four reconciliation loops as background tasks:
//! - Release-update check (daily) - catalog-bound
//! - Download-status check (per minute) - one list call per backend
//! - Auto-search (hourly, per-user gated)
//! - Third-party listing check (six-hourly, rate-limited)
//!
//! Each loop runs on its own interval and shuts down on the shared broadcast
//! signal. A failed cycle is logged and counted; the loop keeps running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::metrics::RECONCILE_CYCLES;
use crate::store::{GameStatus, Store};

use super::auto_search::AutoSearch;
use super::download_check::DownloadCheck;
use super::listing_check::ListingCheck;
use super::release_check::ReleaseCheck;
use super::types::SchedulerStatus;

pub struct Scheduler {
    store: Arc<dyn Store>,
    release_check: Arc<ReleaseCheck>,
    download_check: Arc<DownloadCheck>,
    auto_search: Arc<AutoSearch>,
    listing_check: Arc<ListingCheck>,

    release_interval: Duration,
    download_interval: Duration,
    auto_search_interval: Duration,
    listing_interval: Duration,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        release_check: Arc<ReleaseCheck>,
        download_check: Arc<DownloadCheck>,
        auto_search: Arc<AutoSearch>,
        listing_check: Arc<ListingCheck>,
        config: &super::config::SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            store,
            release_check,
            download_check,
            auto_search,
            listing_check,
            release_interval: Duration::from_secs(config.release_check_interval_secs),
            download_interval: Duration::from_secs(config.download_check_interval_secs),
            auto_search_interval: Duration::from_secs(config.auto_search_interval_secs),
            listing_interval: Duration::from_secs(config.listing_check_interval_secs),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the scheduler (spawns the four background loops).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!("Starting scheduler");

        self.spawn_release_loop();
        self.spawn_download_loop();
        self.spawn_auto_search_loop();
        self.spawn_listing_loop();

        info!("Scheduler started");
    }

    /// Stop the scheduler gracefully.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(Duration::from_millis(500)).await;
        info!("Scheduler stopped");
    }

    /// Current runtime snapshot.
    pub async fn status(&self) -> SchedulerStatus {
        let active_downloads = self
            .store
            .list_active_downloads()
            .await
            .map(|d| d.len())
            .unwrap_or(0);
        let wanted_games = self
            .store
            .list_games_by_status(GameStatus::Wanted)
            .await
            .map(|g| g.len())
            .unwrap_or(0);

        SchedulerStatus {
            running: self.running.load(Ordering::Relaxed),
            active_downloads,
            wanted_games,
        }
    }

    fn spawn_release_loop(&self) {
        let running = Arc::clone(&self.running);
        let check = Arc::clone(&self.release_check);
        let interval = self.release_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Release check loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Release check loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        record_cycle("release", check.run_cycle(Utc::now()).await);
                    }
                }
            }
            info!("Release check loop stopped");
        });
    }

    fn spawn_download_loop(&self) {
        let running = Arc::clone(&self.running);
        let check = Arc::clone(&self.download_check);
        let interval = self.download_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Download check loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Download check loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        record_cycle("download", check.run_cycle().await);
                    }
                }
            }
            info!("Download check loop stopped");
        });
    }

    fn spawn_auto_search_loop(&self) {
        let running = Arc::clone(&self.running);
        let check = Arc::clone(&self.auto_search);
        let interval = self.auto_search_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Auto-search loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Auto-search loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        record_cycle("auto_search", check.run_cycle(Utc::now()).await);
                    }
                }
            }
            info!("Auto-search loop stopped");
        });
    }

    fn spawn_listing_loop(&self) {
        let running = Arc::clone(&self.running);
        let check = Arc::clone(&self.listing_check);
        let interval = self.listing_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Listing check loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Listing check loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        record_cycle("listing", check.run_cycle().await);
                    }
                }
            }
            info!("Listing check loop stopped");
        });
    }
}

fn record_cycle(name: &str, result: Result<(), super::types::SchedulerError>) {
    match result {
        Ok(()) => RECONCILE_CYCLES.with_label_values(&[name, "ok"]).inc(),
        Err(e) => {
            warn!(r#loop = name, error = %e, "Reconciliation cycle failed");
            RECONCILE_CYCLES.with_label_values(&[name, "error"]).inc();
        }
    }
}
