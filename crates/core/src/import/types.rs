//! Types and errors for the import manager.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::TrackedDownloadStatus;

/// Which placement strategy an import uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStrategyKind {
    /// Generic per-title folder under the library root.
    Pc,
    /// Structured per-platform layout under the rom root.
    Romm,
}

/// A proposed (or human-confirmed) import.
///
/// `needs_review` plans carry a reason and cause no filesystem action; the
/// manager parks the download in manual review instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportPlan {
    pub strategy: ImportStrategyKind,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,
    pub delete_source: bool,
    /// Platform slug for the post-import rescan (structured strategy only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_slug: Option<String>,
}

/// Errors raised by the import manager.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    DownloadClient(#[from] crate::downloader::DownloadClientError),

    #[error("Source path not found: {0}")]
    SourceMissing(PathBuf),

    #[error("Archive extraction failed: {0}")]
    Unpack(String),

    #[error("Filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid download status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: TrackedDownloadStatus,
        to: TrackedDownloadStatus,
    },
}
