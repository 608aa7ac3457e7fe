//! Scheduler types and errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::TrackedDownloadStatus;

/// Errors raised inside a reconciliation cycle.
///
/// Per-item failures are logged and skipped; these only abort the current
/// cycle when they occur before the per-item loop starts.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Catalog(#[from] crate::store::CatalogError),

    #[error(transparent)]
    Search(#[from] crate::indexer::SearchError),

    #[error(transparent)]
    DownloadClient(#[from] crate::downloader::DownloadClientError),

    #[error("Invalid download status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: TrackedDownloadStatus,
        to: TrackedDownloadStatus,
    },
}

/// Snapshot of the scheduler's runtime state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub active_downloads: usize,
    pub wanted_games: usize,
}
