//! Multi-indexer search aggregation.
//!
//! Fans a query out to every enabled indexer concurrently, merges the
//! normalized results, sorts newest-first and paginates the combined set.
//! One failing indexer becomes an error-list entry; it never aborts the rest.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::safenet::SafetyPolicy;
use crate::store::{Indexer, IndexerProtocol, Store, StoreError};

use super::client::{NewznabClient, TorznabClient};
use super::types::{IndexerSearchClient, ReleaseCandidate, SearchRequest};

const DEFAULT_LIMIT: u32 = 100;

/// Combined result of a fan-out search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSearchResult {
    /// Globally sorted, paginated items.
    pub items: Vec<ReleaseCandidate>,
    /// Total matches before pagination.
    pub total: usize,
    /// Per-indexer failures ("name: message").
    pub errors: Vec<String>,
}

/// Fans queries out across all enabled indexers.
pub struct SearchAggregator {
    store: Arc<dyn Store>,
    torznab: Arc<dyn IndexerSearchClient>,
    newznab: Arc<dyn IndexerSearchClient>,
}

impl SearchAggregator {
    pub fn new(store: Arc<dyn Store>, policy: SafetyPolicy) -> Self {
        Self {
            store,
            torznab: Arc::new(TorznabClient::new(policy)),
            newznab: Arc::new(NewznabClient::new(policy)),
        }
    }

    /// Construct with injected protocol clients (tests).
    pub fn with_clients(
        store: Arc<dyn Store>,
        torznab: Arc<dyn IndexerSearchClient>,
        newznab: Arc<dyn IndexerSearchClient>,
    ) -> Self {
        Self {
            store,
            torznab,
            newznab,
        }
    }

    fn client_for(&self, indexer: &Indexer) -> Arc<dyn IndexerSearchClient> {
        match indexer.protocol {
            IndexerProtocol::Torznab => Arc::clone(&self.torznab),
            IndexerProtocol::Newznab => Arc::clone(&self.newznab),
        }
    }

    /// Search all enabled indexers and merge the results.
    pub async fn search_all(
        &self,
        request: &SearchRequest,
    ) -> Result<AggregateSearchResult, StoreError> {
        let mut indexers = self.store.list_enabled_indexers().await?;

        if indexers.is_empty() {
            return Ok(AggregateSearchResult {
                items: vec![],
                total: 0,
                errors: vec!["No indexers configured".to_string()],
            });
        }

        indexers.sort_by_key(|i| i.priority);

        debug!(
            indexers = indexers.len(),
            query = %request.query,
            "Starting parallel search"
        );

        let searches = indexers.iter().map(|indexer| {
            let client = self.client_for(indexer);
            async move {
                let result = client.search(indexer, request).await;
                (indexer, result)
            }
        });

        let mut merged: Vec<ReleaseCandidate> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for (indexer, result) in join_all(searches).await {
            match result {
                Ok(mut candidates) => {
                    crate::metrics::SEARCHES_TOTAL
                        .with_label_values(&[&indexer.name, "ok"])
                        .inc();
                    for candidate in &mut candidates {
                        if candidate.info_url.is_none() {
                            candidate.info_url = Some(synthesize_info_url(indexer, candidate));
                        }
                    }
                    merged.append(&mut candidates);
                }
                Err(e) => {
                    crate::metrics::SEARCHES_TOTAL
                        .with_label_values(&[&indexer.name, "error"])
                        .inc();
                    warn!(indexer = %indexer.name, error = %e, "Indexer search failed");
                    errors.push(format!("{}: {}", indexer.name, e));
                }
            }
        }

        // Global sort before pagination: newest first, undated items last.
        merged.sort_by(|a, b| b.published.cmp(&a.published));

        let total = merged.len();
        let offset = request.offset.unwrap_or(0) as usize;
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT) as usize;
        let items: Vec<ReleaseCandidate> =
            merged.into_iter().skip(offset).take(limit).collect();

        debug!(total, returned = items.len(), errors = errors.len(), "Search complete");

        Ok(AggregateSearchResult {
            items,
            total,
            errors,
        })
    }
}

/// Details link for items whose feed omitted one.
fn synthesize_info_url(indexer: &Indexer, candidate: &ReleaseCandidate) -> String {
    format!(
        "{}/details/{}",
        indexer.base_url.trim_end_matches('/'),
        urlencoding::encode(&candidate.guid)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::DownloadType;
    use crate::testing::{MockIndexerClient, MockStore};
    use chrono::{TimeZone, Utc};

    fn indexer(id: i64, protocol: IndexerProtocol) -> Indexer {
        Indexer {
            id,
            name: format!("idx{id}"),
            base_url: format!("https://idx{id}.example/api"),
            api_key: "k".to_string(),
            protocol,
            enabled: true,
            priority: 0,
            categories: vec![],
        }
    }

    fn candidate(guid: &str, day: u32, download_type: DownloadType) -> ReleaseCandidate {
        ReleaseCandidate {
            guid: guid.to_string(),
            title: format!("Game {guid}"),
            link: format!("https://example/dl/{guid}"),
            info_url: None,
            published: Some(Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()),
            size_bytes: 1,
            seeders: None,
            leechers: None,
            grabs: None,
            age_days: None,
            poster: None,
            group: None,
            indexer_id: 0,
            indexer_name: String::new(),
            categories: vec![],
            download_type,
        }
    }

    #[tokio::test]
    async fn test_no_indexers_configured() {
        let store = Arc::new(MockStore::new());
        let aggregator = SearchAggregator::with_clients(
            store,
            Arc::new(MockIndexerClient::new(IndexerProtocol::Torznab)),
            Arc::new(MockIndexerClient::new(IndexerProtocol::Newznab)),
        );

        let result = aggregator
            .search_all(&SearchRequest {
                query: "anything".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(result.items.is_empty());
        assert_eq!(result.total, 0);
        assert_eq!(result.errors, vec!["No indexers configured".to_string()]);
    }

    #[tokio::test]
    async fn test_merge_sorts_newest_first_across_protocols() {
        let store = Arc::new(MockStore::new());
        store.add_indexer(indexer(1, IndexerProtocol::Torznab)).await;
        store.add_indexer(indexer(2, IndexerProtocol::Newznab)).await;

        let torznab = Arc::new(MockIndexerClient::new(IndexerProtocol::Torznab));
        torznab
            .set_results(vec![candidate("t1", 10, DownloadType::Torrent)])
            .await;
        let newznab = Arc::new(MockIndexerClient::new(IndexerProtocol::Newznab));
        newznab
            .set_results(vec![candidate("n1", 11, DownloadType::Usenet)])
            .await;

        let aggregator = SearchAggregator::with_clients(store, torznab, newznab);
        let result = aggregator
            .search_all(&SearchRequest {
                query: "game".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.total, 2);
        assert!(result.errors.is_empty());
        // Usenet hit is a day newer and must come first.
        assert_eq!(result.items[0].guid, "n1");
        assert_eq!(result.items[0].download_type, DownloadType::Usenet);
        assert_eq!(result.items[1].guid, "t1");
        assert_eq!(result.items[1].download_type, DownloadType::Torrent);
    }

    #[tokio::test]
    async fn test_one_indexer_failure_does_not_abort_others() {
        let store = Arc::new(MockStore::new());
        store.add_indexer(indexer(1, IndexerProtocol::Torznab)).await;
        store.add_indexer(indexer(2, IndexerProtocol::Newznab)).await;

        let torznab = Arc::new(MockIndexerClient::new(IndexerProtocol::Torznab));
        torznab
            .set_results(vec![candidate("t1", 10, DownloadType::Torrent)])
            .await;
        let newznab = Arc::new(MockIndexerClient::new(IndexerProtocol::Newznab));
        newznab.fail_with("connection refused").await;

        let aggregator = SearchAggregator::with_clients(store, torznab, newznab);
        let result = aggregator
            .search_all(&SearchRequest {
                query: "game".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.items.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("idx2:"));
    }

    #[tokio::test]
    async fn test_pagination_after_global_sort() {
        let store = Arc::new(MockStore::new());
        store.add_indexer(indexer(1, IndexerProtocol::Torznab)).await;

        let torznab = Arc::new(MockIndexerClient::new(IndexerProtocol::Torznab));
        torznab
            .set_results(vec![
                candidate("a", 1, DownloadType::Torrent),
                candidate("b", 5, DownloadType::Torrent),
                candidate("c", 3, DownloadType::Torrent),
            ])
            .await;

        let aggregator = SearchAggregator::with_clients(
            store,
            torznab,
            Arc::new(MockIndexerClient::new(IndexerProtocol::Newznab)),
        );
        let result = aggregator
            .search_all(&SearchRequest {
                query: "game".to_string(),
                categories: None,
                limit: Some(1),
                offset: Some(1),
            })
            .await
            .unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.items.len(), 1);
        // Sorted b(5), c(3), a(1); offset 1 -> c.
        assert_eq!(result.items[0].guid, "c");
    }

    #[tokio::test]
    async fn test_info_url_synthesized_when_missing() {
        let store = Arc::new(MockStore::new());
        store.add_indexer(indexer(1, IndexerProtocol::Torznab)).await;

        let torznab = Arc::new(MockIndexerClient::new(IndexerProtocol::Torznab));
        torznab
            .set_results(vec![candidate("guid-9", 2, DownloadType::Torrent)])
            .await;

        let aggregator = SearchAggregator::with_clients(
            store,
            torznab,
            Arc::new(MockIndexerClient::new(IndexerProtocol::Newznab)),
        );
        let result = aggregator
            .search_all(&SearchRequest {
                query: "game".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            result.items[0].info_url.as_deref(),
            Some("https://idx1.example/api/details/guid-9")
        );
    }
}
