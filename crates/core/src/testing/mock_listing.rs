//! Mock third-party listing service.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::scheduler::{ListedRelease, ListingService, SchedulerError};
use crate::store::StoreError;

/// Mock implementation of [`ListingService`].
#[derive(Debug, Default)]
pub struct MockListingService {
    releases: Arc<RwLock<Vec<ListedRelease>>>,
    error: Arc<RwLock<Option<String>>>,
    calls: Arc<RwLock<Vec<u32>>>,
}

impl MockListingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_releases(&self, releases: Vec<ListedRelease>) {
        *self.releases.write().await = releases;
    }

    pub async fn fail_with(&self, message: &str) {
        *self.error.write().await = Some(message.to_string());
    }

    /// Window sizes of the fetches made so far.
    pub async fn calls(&self) -> Vec<u32> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ListingService for MockListingService {
    async fn newest_releases(&self, window: u32) -> Result<Vec<ListedRelease>, SchedulerError> {
        self.calls.write().await.push(window);
        if let Some(message) = self.error.read().await.as_ref() {
            return Err(SchedulerError::Store(StoreError::Backend(message.clone())));
        }
        let releases = self.releases.read().await;
        Ok(releases.iter().take(window as usize).cloned().collect())
    }
}
