//! Mock download client and client factory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::downloader::{
    AddRequest, AddedDownload, DownloadClient, DownloadClientError, DownloadItem, DownloadStatus,
};
use crate::scheduler::ClientFactory;
use crate::store::Downloader;

/// Mock implementation of the [`DownloadClient`] trait.
///
/// Seed transfers with `set_item`, drive them with `set_progress` /
/// `complete` / `vanish`, and assert on `added()` afterwards.
#[derive(Debug, Default)]
pub struct MockDownloadClient {
    items: Arc<RwLock<HashMap<String, DownloadItem>>>,
    added: Arc<RwLock<Vec<AddRequest>>>,
    /// If set, the next add_download fails with this error message.
    add_error: Arc<RwLock<Option<String>>>,
    hash_counter: Arc<RwLock<u32>>,
}

impl MockDownloadClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_item(&self, item: DownloadItem) {
        self.items.write().await.insert(item.id.clone(), item);
    }

    pub async fn set_progress(&self, id: &str, progress: f64) {
        if let Some(item) = self.items.write().await.get_mut(id) {
            item.progress = progress;
            if progress >= 1.0 {
                item.status = DownloadStatus::Completed;
            }
        }
    }

    pub async fn complete(&self, id: &str) {
        self.set_progress(id, 1.0).await;
    }

    /// Drop a transfer from the active list (simulates external removal).
    pub async fn vanish(&self, id: &str) {
        self.items.write().await.remove(id);
    }

    pub async fn fail_next_add(&self, message: &str) {
        *self.add_error.write().await = Some(message.to_string());
    }

    /// Recorded add_download requests.
    pub async fn added(&self) -> Vec<AddRequest> {
        self.added.read().await.clone()
    }
}

#[async_trait]
impl DownloadClient for MockDownloadClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn add_download(
        &self,
        request: &AddRequest,
    ) -> Result<AddedDownload, DownloadClientError> {
        if let Some(message) = self.add_error.write().await.take() {
            return Err(DownloadClientError::ApiError(message));
        }
        self.added.write().await.push(request.clone());

        let hash = {
            let mut counter = self.hash_counter.write().await;
            *counter += 1;
            format!("{:040x}", *counter)
        };
        let item = DownloadItem {
            id: hash.clone(),
            hash: Some(hash.clone()),
            name: request.name.clone().unwrap_or_else(|| "transfer".to_string()),
            status: if request.add_paused {
                DownloadStatus::Paused
            } else {
                DownloadStatus::Downloading
            },
            progress: 0.0,
            size_bytes: 0,
            added_at: Some(chrono::Utc::now()),
            remote_path: None,
        };
        self.items.write().await.insert(hash.clone(), item);

        Ok(AddedDownload {
            id: hash.clone(),
            hash: Some(hash),
            name: request.name.clone(),
        })
    }

    async fn get_details(&self, id: &str) -> Result<DownloadItem, DownloadClientError> {
        self.items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DownloadClientError::NotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        Ok(self.items.read().await.values().cloned().collect())
    }

    async fn pause(&self, id: &str) -> Result<(), DownloadClientError> {
        if let Some(item) = self.items.write().await.get_mut(id) {
            item.status = DownloadStatus::Paused;
        }
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), DownloadClientError> {
        if let Some(item) = self.items.write().await.get_mut(id) {
            item.status = DownloadStatus::Downloading;
        }
        Ok(())
    }

    async fn remove(&self, id: &str, _delete_files: bool) -> Result<(), DownloadClientError> {
        self.items.write().await.remove(id);
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        Ok(())
    }

    async fn free_space(&self) -> Result<u64, DownloadClientError> {
        Ok(1 << 40)
    }
}

/// [`ClientFactory`] that hands out the same mock client for every backend.
pub struct MockClientFactory {
    client: Arc<MockDownloadClient>,
}

impl MockClientFactory {
    pub fn new(client: Arc<MockDownloadClient>) -> Self {
        Self { client }
    }
}

impl ClientFactory for MockClientFactory {
    fn client_for(&self, _config: Downloader) -> Arc<dyn DownloadClient> {
        Arc::clone(&self.client) as Arc<dyn DownloadClient>
    }
}
