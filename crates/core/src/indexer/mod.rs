//! Indexer search: torznab/newznab clients and the multi-indexer aggregator.

mod aggregator;
mod categories;
mod client;
mod types;
mod xml;

pub use aggregator::{AggregateSearchResult, SearchAggregator};
pub use categories::matches_requested;
pub use client::{NewznabClient, TorznabClient};
pub use types::{
    CapsCategory, DownloadType, IndexerSearchClient, ReleaseCandidate, SearchError, SearchRequest,
};
