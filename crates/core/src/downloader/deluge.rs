//! Deluge adapter (JSON-RPC over `/json`, password login, cookie session).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::safenet::{SafeHttpClient, SafetyPolicy};
use crate::store::Downloader;

use super::fetch::{add_download_with_fallback, AddBackend, TransferKind};
use super::types::{
    request_error, AddRequest, AddedDownload, DownloadClient, DownloadClientError, DownloadItem,
    DownloadStatus,
};

const TIMEOUT: Duration = Duration::from_secs(30);

const UI_FIELDS: &[&str] = &[
    "name",
    "hash",
    "progress",
    "state",
    "total_size",
    "time_added",
    "save_path",
];

pub struct DelugeClient {
    client: Client,
    net: SafeHttpClient,
    config: Downloader,
    authenticated: AtomicBool,
    request_id: AtomicU64,
}

impl DelugeClient {
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
            authenticated: AtomicBool::new(false),
            request_id: AtomicU64::new(1),
        }
    }

    fn json_url(&self) -> String {
        format!("{}/json", self.config.url.trim_end_matches('/'))
    }

    async fn guard(&self) -> Result<(), DownloadClientError> {
        self.net.check(&self.config.url).await?;
        Ok(())
    }

    async fn rpc_raw(&self, method: &str, params: Value) -> Result<Value, DownloadClientError> {
        let body = json!({
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });
        let response = self
            .client
            .post(self.json_url())
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadClientError::ApiError(format!("HTTP {status}")));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| DownloadClientError::ApiError(e.to_string()))?;
        if let Some(error) = envelope.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(DownloadClientError::ApiError(format!(
                "Deluge RPC failed: {message}"
            )));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn login(&self) -> Result<(), DownloadClientError> {
        let password = self.config.password.as_deref().unwrap_or("");
        let result = self.rpc_raw("auth.login", json!([password])).await?;
        if result.as_bool() == Some(true) {
            debug!(client = %self.config.name, "Deluge login successful");
            self.authenticated.store(true, Ordering::Relaxed);
            Ok(())
        } else {
            Err(DownloadClientError::AuthenticationFailed(
                "Invalid password".to_string(),
            ))
        }
    }

    /// Authenticated RPC call; re-login once on a dropped session.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, DownloadClientError> {
        self.guard().await?;
        if !self.authenticated.load(Ordering::Relaxed) {
            self.login().await?;
        }

        match self.rpc_raw(method, params.clone()).await {
            Err(DownloadClientError::ApiError(msg)) if msg.contains("Not authenticated") => {
                warn!("Deluge session expired, re-authenticating");
                self.authenticated.store(false, Ordering::Relaxed);
                self.login().await?;
                self.rpc_raw(method, params).await
            }
            other => other,
        }
    }

    // Labels need the Label plugin and are applied post-add instead.
    fn add_options(&self) -> Value {
        let mut options = json!({});
        if self.config.add_paused {
            options["add_paused"] = json!(true);
        }
        options
    }

    fn item_from_ui(hash: &str, torrent: &Value) -> DownloadItem {
        let progress = torrent
            .get("progress")
            .and_then(|p| p.as_f64())
            .unwrap_or(0.0)
            / 100.0;
        let state = torrent.get("state").and_then(|s| s.as_str()).unwrap_or("");
        DownloadItem {
            id: hash.to_lowercase(),
            hash: Some(hash.to_lowercase()),
            name: torrent
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string(),
            status: map_deluge_state(state, progress),
            progress: progress.clamp(0.0, 1.0),
            size_bytes: torrent
                .get("total_size")
                .and_then(|s| s.as_i64())
                .unwrap_or(0)
                .max(0) as u64,
            added_at: torrent
                .get("time_added")
                .and_then(|t| t.as_f64())
                .filter(|&t| t > 0.0)
                .and_then(|t| Utc.timestamp_opt(t as i64, 0).single()),
            remote_path: torrent
                .get("save_path")
                .and_then(|p| p.as_str())
                .filter(|p| !p.is_empty())
                .map(String::from),
        }
    }

    async fn fetch_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let result = self
            .rpc("web.update_ui", json!([UI_FIELDS, {}]))
            .await?;
        let torrents = result
            .get("torrents")
            .and_then(|t| t.as_object())
            .cloned()
            .unwrap_or_default();
        Ok(torrents
            .iter()
            .map(|(hash, torrent)| Self::item_from_ui(hash, torrent))
            .collect())
    }
}

/// Reduce Deluge's state strings to the shared vocabulary.
fn map_deluge_state(state: &str, progress: f64) -> DownloadStatus {
    match state {
        "Downloading" | "Allocating" | "Checking" | "Moving" | "Queued" => {
            DownloadStatus::Downloading
        }
        "Paused" if progress >= 1.0 => DownloadStatus::Completed,
        "Paused" => DownloadStatus::Paused,
        "Seeding" => DownloadStatus::Seeding,
        "Error" => DownloadStatus::Error,
        _ if progress >= 1.0 => DownloadStatus::Completed,
        _ => DownloadStatus::Downloading,
    }
}

#[async_trait]
impl AddBackend for DelugeClient {
    async fn add_url(
        &self,
        url: &str,
        _request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let options = self.add_options();
        let (method, params) = if super::fetch::is_magnet(url) {
            ("core.add_torrent_magnet", json!([url, options]))
        } else {
            ("core.add_torrent_url", json!([url, options]))
        };
        let result = self.rpc(method, params).await?;
        Ok(result.as_str().map(|hash| AddedDownload {
            id: hash.to_lowercase(),
            hash: Some(hash.to_lowercase()),
            name: None,
        }))
    }

    async fn add_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        _request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let options = self.add_options();
        let result = self
            .rpc(
                "core.add_torrent_file",
                json!([filename, BASE64.encode(&bytes), options]),
            )
            .await?;
        Ok(result.as_str().map(|hash| AddedDownload {
            id: hash.to_lowercase(),
            hash: Some(hash.to_lowercase()),
            name: None,
        }))
    }

    async fn recent_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        self.list_active().await
    }

    async fn apply_post_add(&self, added: &AddedDownload) -> Result<(), DownloadClientError> {
        if let Some(label) = self.config.category.as_deref() {
            // Requires the Label plugin; failure is not fatal to the add.
            if let Err(e) = self
                .rpc("label.set_torrent", json!([added.id, label]))
                .await
            {
                debug!(error = %e, "Deluge label assignment failed");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadClient for DelugeClient {
    fn name(&self) -> &'static str {
        "deluge"
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
        self.fetch_items()
            .await?
            .into_iter()
            .find(|i| i.id == hash)
            .ok_or_else(|| DownloadClientError::NotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        self.fetch_items().await
    }

    async fn pause(&self, id: &str) -> Result<(), DownloadClientError> {
        self.rpc("core.pause_torrent", json!([[id.to_lowercase()]]))
            .await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), DownloadClientError> {
        self.rpc("core.resume_torrent", json!([[id.to_lowercase()]]))
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, delete_files: bool) -> Result<(), DownloadClientError> {
        self.rpc(
            "core.remove_torrent",
            json!([id.to_lowercase(), delete_files]),
        )
        .await?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        self.rpc("web.connected", json!([])).await?;
        Ok(())
    }

    async fn free_space(&self) -> Result<u64, DownloadClientError> {
        let result = self.rpc("core.get_free_space", json!([])).await?;
        Ok(result.as_i64().unwrap_or(0).max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_deluge_state_active() {
        assert_eq!(map_deluge_state("Downloading", 0.5), DownloadStatus::Downloading);
        assert_eq!(map_deluge_state("Queued", 0.0), DownloadStatus::Downloading);
        assert_eq!(map_deluge_state("Checking", 0.9), DownloadStatus::Downloading);
        assert_eq!(map_deluge_state("Seeding", 1.0), DownloadStatus::Seeding);
    }

    #[test]
    fn test_map_deluge_state_paused_vs_completed() {
        assert_eq!(map_deluge_state("Paused", 0.3), DownloadStatus::Paused);
        assert_eq!(map_deluge_state("Paused", 1.0), DownloadStatus::Completed);
    }

    #[test]
    fn test_map_deluge_state_error_and_unknown() {
        assert_eq!(map_deluge_state("Error", 0.5), DownloadStatus::Error);
        assert_eq!(map_deluge_state("Odd", 1.0), DownloadStatus::Completed);
        assert_eq!(map_deluge_state("Odd", 0.1), DownloadStatus::Downloading);
    }

    #[test]
    fn test_item_from_ui_percent_scale() {
        let torrent = json!({
            "name": "Some Game",
            "progress": 42.5,
            "state": "Downloading",
            "total_size": 4096,
            "time_added": 1703980800.0,
            "save_path": "/downloads"
        });
        let item = DelugeClient::item_from_ui("ABCDEF", &torrent);
        assert_eq!(item.id, "abcdef");
        assert!((item.progress - 0.425).abs() < 1e-9);
        assert_eq!(item.status, DownloadStatus::Downloading);
        assert_eq!(item.size_bytes, 4096);
        assert!(item.added_at.is_some());
    }
}
