//! Mock indexer search client.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::indexer::{
    CapsCategory, IndexerSearchClient, ReleaseCandidate, SearchError, SearchRequest,
};
use crate::store::{Indexer, IndexerProtocol};

/// Mock implementation of [`IndexerSearchClient`].
///
/// Returns canned candidates (or a canned failure) and records every search
/// request for assertions.
#[derive(Debug)]
pub struct MockIndexerClient {
    protocol: IndexerProtocol,
    results: Arc<RwLock<Vec<ReleaseCandidate>>>,
    error: Arc<RwLock<Option<String>>>,
    searches: Arc<RwLock<Vec<SearchRequest>>>,
    categories: Arc<RwLock<Vec<CapsCategory>>>,
}

impl MockIndexerClient {
    pub fn new(protocol: IndexerProtocol) -> Self {
        Self {
            protocol,
            results: Arc::new(RwLock::new(Vec::new())),
            error: Arc::new(RwLock::new(None)),
            searches: Arc::new(RwLock::new(Vec::new())),
            categories: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn set_results(&self, results: Vec<ReleaseCandidate>) {
        *self.results.write().await = results;
        *self.error.write().await = None;
    }

    /// Make every search fail with this message.
    pub async fn fail_with(&self, message: &str) {
        *self.error.write().await = Some(message.to_string());
    }

    pub async fn set_categories(&self, categories: Vec<CapsCategory>) {
        *self.categories.write().await = categories;
    }

    /// Every search request made so far.
    pub async fn searches(&self) -> Vec<SearchRequest> {
        self.searches.read().await.clone()
    }

    pub async fn search_count(&self) -> usize {
        self.searches.read().await.len()
    }
}

#[async_trait]
impl IndexerSearchClient for MockIndexerClient {
    fn protocol(&self) -> IndexerProtocol {
        self.protocol
    }

    async fn search(
        &self,
        _indexer: &Indexer,
        request: &SearchRequest,
    ) -> Result<Vec<ReleaseCandidate>, SearchError> {
        self.searches.write().await.push(request.clone());
        if let Some(message) = self.error.read().await.as_ref() {
            return Err(SearchError::ConnectionFailed(message.clone()));
        }
        Ok(self.results.read().await.clone())
    }

    async fn test_connection(&self, _indexer: &Indexer) -> Result<(), SearchError> {
        match self.error.read().await.as_ref() {
            Some(message) => Err(SearchError::ConnectionFailed(message.clone())),
            None => Ok(()),
        }
    }

    async fn fetch_categories(
        &self,
        _indexer: &Indexer,
    ) -> Result<Vec<CapsCategory>, SearchError> {
        Ok(self.categories.read().await.clone())
    }
}
