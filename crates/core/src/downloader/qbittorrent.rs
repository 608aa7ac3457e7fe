//! qBittorrent adapter (session-cookie REST, `/api/v2`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{multipart, Client};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::safenet::{SafeHttpClient, SafetyPolicy};
use crate::store::Downloader;

use super::fetch::{add_download_with_fallback, AddBackend, TransferKind};
use super::types::{
    request_error, AddRequest, AddedDownload, DownloadClient, DownloadClientError, DownloadItem,
    DownloadStatus,
};

const TIMEOUT: Duration = Duration::from_secs(30);

pub struct QBittorrentClient {
    client: Client,
    net: SafeHttpClient,
    config: Downloader,
    /// Set once a login has succeeded; cleared on 403.
    authenticated: Arc<RwLock<bool>>,
}

impl QBittorrentClient {
    pub fn new(config: Downloader, policy: SafetyPolicy) -> Self {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            net: SafeHttpClient::new(policy, TIMEOUT),
            config,
            authenticated: Arc::new(RwLock::new(false)),
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    /// Reject unsafe client targets before any network attempt.
    async fn guard(&self) -> Result<(), DownloadClientError> {
        self.net.check(&self.config.url).await?;
        Ok(())
    }

    async fn login(&self) -> Result<(), DownloadClientError> {
        self.guard().await?;
        let url = format!("{}/api/v2/auth/login", self.base_url());
        let params = [
            ("username", self.config.username.as_deref().unwrap_or("")),
            ("password", self.config.password.as_deref().unwrap_or("")),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!(client = %self.config.name, "qBittorrent login successful");
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(DownloadClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(DownloadClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), DownloadClientError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    async fn get(&self, endpoint: &str) -> Result<String, DownloadClientError> {
        self.guard().await?;
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self.client.get(&url).send().await.map_err(request_error)?;

        if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            let response = self.client.get(&url).send().await.map_err(request_error)?;
            return read_ok(response).await;
        }

        read_ok(response).await
    }

    async fn post_form(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<String, DownloadClientError> {
        self.guard().await?;
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self
            .client
            .post(&url)
            .form(params)
            .send()
            .await
            .map_err(request_error)?;

        if response.status().as_u16() == 403 {
            warn!("qBittorrent session expired, re-authenticating");
            *self.authenticated.write().await = false;
            self.login().await?;
            let response = self
                .client
                .post(&url)
                .form(params)
                .send()
                .await
                .map_err(request_error)?;
            return read_ok(response).await;
        }

        read_ok(response).await
    }

    async fn post_multipart(
        &self,
        endpoint: &str,
        form: multipart::Form,
    ) -> Result<String, DownloadClientError> {
        self.guard().await?;
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        read_ok(response).await
    }

    fn add_form(&self, request: &AddRequest) -> multipart::Form {
        let mut form = multipart::Form::new();
        if let Some(cat) = request.category.as_ref().or(self.config.category.as_ref()) {
            form = form.text("category", cat.clone());
        }
        form
    }

    async fn fetch_items(&self, query: &str) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let response = self.get(&format!("/api/v2/torrents/info{query}")).await?;
        let torrents: Vec<QbTorrent> = serde_json::from_str(&response)
            .map_err(|e| DownloadClientError::ApiError(format!("Failed to parse response: {e}")))?;
        Ok(torrents.into_iter().map(QbTorrent::into_item).collect())
    }
}

async fn read_ok(response: reqwest::Response) -> Result<String, DownloadClientError> {
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadClientError::ApiError(format!("HTTP {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| DownloadClientError::ApiError(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct QbTorrent {
    hash: String,
    name: String,
    state: String,
    progress: f64,
    size: i64,
    added_on: i64,
    save_path: String,
}

impl QbTorrent {
    fn into_item(self) -> DownloadItem {
        let hash = self.hash.to_lowercase();
        DownloadItem {
            id: hash.clone(),
            hash: Some(hash),
            name: self.name,
            status: map_qb_state(&self.state, self.progress),
            progress: self.progress.clamp(0.0, 1.0),
            size_bytes: self.size.max(0) as u64,
            added_at: (self.added_on > 0)
                .then(|| Utc.timestamp_opt(self.added_on, 0).single())
                .flatten(),
            remote_path: (!self.save_path.is_empty()).then_some(self.save_path),
        }
    }
}

/// Reduce qBittorrent's native state strings to the shared vocabulary.
fn map_qb_state(state: &str, progress: f64) -> DownloadStatus {
    match state {
        "downloading" | "forcedDL" | "metaDL" | "allocating" | "stalledDL" | "queuedDL"
        | "checkingDL" => DownloadStatus::Downloading,
        "pausedDL" | "stoppedDL" => DownloadStatus::Paused,
        "uploading" | "forcedUP" | "stalledUP" | "queuedUP" => DownloadStatus::Seeding,
        "pausedUP" | "stoppedUP" | "checkingUP" => DownloadStatus::Completed,
        "error" | "missingFiles" => DownloadStatus::Error,
        _ if progress >= 1.0 => DownloadStatus::Completed,
        _ => DownloadStatus::Downloading,
    }
}

#[async_trait]
impl AddBackend for QBittorrentClient {
    async fn add_url(
        &self,
        url: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let form = self.add_form(request).text("urls", url.to_string());
        self.post_multipart("/api/v2/torrents/add", form).await?;
        // qBittorrent never returns an id; the shared flow reconciles it.
        Ok(None)
    }

    async fn add_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/x-bittorrent")
            .map_err(|e| DownloadClientError::InvalidFile(e.to_string()))?;
        let form = self.add_form(request).part("torrents", part);
        self.post_multipart("/api/v2/torrents/add", form).await?;
        Ok(None)
    }

    async fn recent_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        self.list_active().await
    }

    async fn apply_post_add(&self, added: &AddedDownload) -> Result<(), DownloadClientError> {
        if self.config.add_paused {
            self.pause(&added.id).await?;
        } else if self.config.settings.get("force_start").and_then(|v| v.as_bool())
            == Some(true)
        {
            self.post_form(
                "/api/v2/torrents/setForceStart",
                &[("hashes", added.id.as_str()), ("value", "true")],
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadClient for QBittorrentClient {
    fn name(&self) -> &'static str {
        "qbittorrent"
    }

    async fn add_download(
        &self,
        request: &AddRequest,
    ) -> Result<AddedDownload, DownloadClientError> {
        self.guard().await?;
        add_download_with_fallback(self, &self.net, TransferKind::Torrent, request).await
    }

    async fn get_details(&self, id: &str) -> Result<DownloadItem, DownloadClientError> {
        let hash = id.to_lowercase();
        self.fetch_items(&format!("?hashes={hash}"))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DownloadClientError::NotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let query = match self.config.category.as_deref() {
            Some(cat) => format!("?category={}", urlencoding::encode(cat)),
            None => String::new(),
        };
        self.fetch_items(&query).await
    }

    async fn pause(&self, id: &str) -> Result<(), DownloadClientError> {
        self.post_form("/api/v2/torrents/pause", &[("hashes", &id.to_lowercase())])
            .await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), DownloadClientError> {
        self.post_form("/api/v2/torrents/resume", &[("hashes", &id.to_lowercase())])
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, delete_files: bool) -> Result<(), DownloadClientError> {
        self.post_form(
            "/api/v2/torrents/delete",
            &[
                ("hashes", id.to_lowercase().as_str()),
                ("deleteFiles", if delete_files { "true" } else { "false" }),
            ],
        )
        .await?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        self.get("/api/v2/app/version").await?;
        Ok(())
    }

    async fn free_space(&self) -> Result<u64, DownloadClientError> {
        #[derive(Deserialize)]
        struct MainData {
            server_state: ServerState,
        }
        #[derive(Deserialize)]
        struct ServerState {
            free_space_on_disk: i64,
        }

        let response = self.get("/api/v2/sync/maindata").await?;
        let data: MainData = serde_json::from_str(&response)
            .map_err(|e| DownloadClientError::ApiError(format!("Failed to parse response: {e}")))?;
        Ok(data.server_state.free_space_on_disk.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_qb_state_downloading() {
        assert_eq!(map_qb_state("downloading", 0.2), DownloadStatus::Downloading);
        assert_eq!(map_qb_state("forcedDL", 0.2), DownloadStatus::Downloading);
        assert_eq!(map_qb_state("metaDL", 0.0), DownloadStatus::Downloading);
        assert_eq!(map_qb_state("stalledDL", 0.4), DownloadStatus::Downloading);
        assert_eq!(map_qb_state("queuedDL", 0.0), DownloadStatus::Downloading);
    }

    #[test]
    fn test_map_qb_state_paused_vs_completed() {
        assert_eq!(map_qb_state("pausedDL", 0.5), DownloadStatus::Paused);
        assert_eq!(map_qb_state("stoppedDL", 0.5), DownloadStatus::Paused);
        // Paused after completion means the payload is fully present.
        assert_eq!(map_qb_state("pausedUP", 1.0), DownloadStatus::Completed);
        assert_eq!(map_qb_state("checkingUP", 1.0), DownloadStatus::Completed);
    }

    #[test]
    fn test_map_qb_state_seeding_and_error() {
        assert_eq!(map_qb_state("uploading", 1.0), DownloadStatus::Seeding);
        assert_eq!(map_qb_state("forcedUP", 1.0), DownloadStatus::Seeding);
        assert_eq!(map_qb_state("error", 0.3), DownloadStatus::Error);
        assert_eq!(map_qb_state("missingFiles", 1.0), DownloadStatus::Error);
    }

    #[test]
    fn test_map_qb_state_unknown_falls_back_on_progress() {
        assert_eq!(map_qb_state("somethingNew", 1.0), DownloadStatus::Completed);
        assert_eq!(map_qb_state("somethingNew", 0.1), DownloadStatus::Downloading);
    }

    #[test]
    fn test_qb_torrent_into_item() {
        let qb = QbTorrent {
            hash: "ABC123".to_string(),
            name: "Some Game".to_string(),
            state: "downloading".to_string(),
            progress: 0.5,
            size: 1_000_000,
            added_on: 1703980800,
            save_path: "/downloads".to_string(),
        };

        let item = qb.into_item();
        assert_eq!(item.id, "abc123");
        assert_eq!(item.hash.as_deref(), Some("abc123"));
        assert_eq!(item.status, DownloadStatus::Downloading);
        assert_eq!(item.size_bytes, 1_000_000);
        assert!(item.added_at.is_some());
        assert_eq!(item.remote_path.as_deref(), Some("/downloads"));
    }
}
