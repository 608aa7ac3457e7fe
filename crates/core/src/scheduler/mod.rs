//! Background reconciliation.
//!
//! Four periodic loops keep the library, the indexers and the download
//! clients in agreement: release-date updates, download-status polling,
//! per-user automatic search, and a rate-limited third-party listing watch.

mod auto_search;
mod config;
mod download_check;
mod listing_check;
mod matching;
mod rate_limiter;
mod release_check;
mod runner;
mod types;

pub use auto_search::AutoSearch;
pub use config::SchedulerConfig;
pub use download_check::{resolve_vanished, ClientFactory, DefaultClientFactory, DownloadCheck};
pub use listing_check::{ListedRelease, ListingCheck, ListingService};
pub use matching::{classify_hit, listing_matches, normalize_title, title_matches, HitKind};
pub use rate_limiter::TokenBucket;
pub use release_check::{compute_release_state, ReleaseCheck};
pub use runner::Scheduler;
pub use types::{SchedulerError, SchedulerStatus};
