//! NZBGet adapter (JSON-RPC over `/jsonrpc`, basic-auth, usenet).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde_json::{json, Value};

use crate::safenet::{SafeHttpClient, SafetyPolicy};
use crate::store::Downloader;

use super::fetch::{add_download_with_fallback, AddBackend, TransferKind};
use super::types::{
    request_error, AddRequest, AddedDownload, DownloadClient, DownloadClientError, DownloadItem,
    DownloadStatus,
};

const TIMEOUT: Duration = Duration::from_secs(30);

pub struct NzbgetClient {
    client: Client,
    net: SafeHttpClient,
    config: Downloader,
    request_id: AtomicU64,
}

impl NzbgetClient {
    pub fn new(config: Downloader, policy: SafetyPolicy) -> Self {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            net: SafeHttpClient::new(policy, TIMEOUT),
            config,
            request_id: AtomicU64::new(1),
        }
    }

    fn rpc_url(&self) -> String {
        format!("{}/jsonrpc", self.config.url.trim_end_matches('/'))
    }

    async fn guard(&self) -> Result<(), DownloadClientError> {
        self.net.check(&self.config.url).await?;
        Ok(())
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, DownloadClientError> {
        self.guard().await?;

        let body = json!({
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });
        let mut request = self.client.post(self.rpc_url()).json(&body);
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        if status.as_u16() == 401 {
            return Err(DownloadClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ));
        }
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
                "NZBGet RPC failed: {message}"
            )));
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    /// `append(NZBFilename, Content, Category, Priority, AddToTop, AddPaused,
    /// DupeKey, DupeScore, DupeMode)`; Content is a URL or base64 file data.
    async fn append(
        &self,
        filename: &str,
        content: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let category = request
            .category
            .as_deref()
            .or(self.config.category.as_deref())
            .unwrap_or("");
        let result = self
            .rpc(
                "append",
                json!([
                    filename,
                    content,
                    category,
                    0,
                    false,
                    self.config.add_paused,
                    "",
                    0,
                    "SCORE"
                ]),
            )
            .await?;

        let id = result.as_i64().unwrap_or(0);
        if id <= 0 {
            return Err(DownloadClientError::ApiError(
                "NZBGet rejected the NZB".to_string(),
            ));
        }
        Ok(Some(AddedDownload {
            id: id.to_string(),
            hash: None,
            name: request.name.clone(),
        }))
    }

    async fn queue_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let result = self.rpc("listgroups", json!([])).await?;
        let groups = result.as_array().cloned().unwrap_or_default();
        Ok(groups.iter().map(group_to_item).collect())
    }

    async fn history_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let result = self.rpc("history", json!([false])).await?;
        let entries = result.as_array().cloned().unwrap_or_default();
        Ok(entries.iter().map(history_to_item).collect())
    }
}

fn i64_field(value: &Value, key: &str) -> i64 {
    value.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Reduce a queue group's status to the shared vocabulary.
fn map_group_status(status: &str) -> DownloadStatus {
    match status {
        "PAUSED" => DownloadStatus::Paused,
        s if s.starts_with("PP_") => DownloadStatus::Downloading,
        "DOWNLOADING" | "QUEUED" | "FETCHING" | "LOADING_PARS" | "VERIFYING_SOURCES"
        | "REPAIRING" | "VERIFYING_REPAIRED" | "UNPACKING" | "MOVING" | "EXECUTING_SCRIPT"
        | "POST_UNPACK_RENAMING" => DownloadStatus::Downloading,
        _ => DownloadStatus::Downloading,
    }
}

/// Reduce a history entry's `SUCCESS/...`-shaped status.
fn map_history_status(status: &str) -> DownloadStatus {
    if status.starts_with("SUCCESS") {
        DownloadStatus::Completed
    } else if status.starts_with("FAILURE") || status.starts_with("DELETED") {
        DownloadStatus::Error
    } else {
        // WARNING/* means completed with repairable issues.
        DownloadStatus::Completed
    }
}

fn group_to_item(group: &Value) -> DownloadItem {
    let size_mb = i64_field(group, "FileSizeMB").max(0);
    let remaining_mb = i64_field(group, "RemainingSizeMB").max(0);
    let progress = if size_mb > 0 {
        1.0 - (remaining_mb as f64 / size_mb as f64)
    } else {
        0.0
    };
    DownloadItem {
        id: i64_field(group, "NZBID").to_string(),
        hash: None,
        name: str_field(group, "NZBName").to_string(),
        status: map_group_status(str_field(group, "Status")),
        progress: progress.clamp(0.0, 1.0),
        size_bytes: (size_mb as u64) * 1024 * 1024,
        added_at: None,
        remote_path: Some(str_field(group, "DestDir").to_string()).filter(|d| !d.is_empty()),
    }
}

fn history_to_item(entry: &Value) -> DownloadItem {
    let status = map_history_status(str_field(entry, "Status"));
    DownloadItem {
        id: i64_field(entry, "NZBID").to_string(),
        hash: None,
        name: str_field(entry, "Name").to_string(),
        status,
        progress: if status == DownloadStatus::Completed {
            1.0
        } else {
            0.0
        },
        size_bytes: (i64_field(entry, "FileSizeMB").max(0) as u64) * 1024 * 1024,
        added_at: None,
        remote_path: Some(str_field(entry, "DestDir").to_string()).filter(|d| !d.is_empty()),
    }
}

#[async_trait]
impl AddBackend for NzbgetClient {
    async fn add_url(
        &self,
        url: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let filename = request.name.as_deref().unwrap_or("download.nzb");
        self.append(filename, url, request).await
    }

    async fn add_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        self.append(filename, &BASE64.encode(&bytes), request).await
    }

    async fn recent_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        self.queue_items().await
    }
}

#[async_trait]
impl DownloadClient for NzbgetClient {
    fn name(&self) -> &'static str {
        "nzbget"
    }

    async fn add_download(
        &self,
        request: &AddRequest,
    ) -> Result<AddedDownload, DownloadClientError> {
        self.guard().await?;
        add_download_with_fallback(self, &self.net, TransferKind::Usenet, request).await
    }

    async fn get_details(&self, id: &str) -> Result<DownloadItem, DownloadClientError> {
        if let Some(item) = self.queue_items().await?.into_iter().find(|i| i.id == id) {
            return Ok(item);
        }
        self.history_items()
            .await?
            .into_iter()
            .find(|i| i.id == id)
            .ok_or_else(|| DownloadClientError::NotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let mut items = self.queue_items().await?;
        items.extend(self.history_items().await?);
        Ok(items)
    }

    async fn pause(&self, id: &str) -> Result<(), DownloadClientError> {
        let id = parse_id(id)?;
        self.rpc("editqueue", json!(["GroupPause", "", [id]]))
            .await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), DownloadClientError> {
        let id = parse_id(id)?;
        self.rpc("editqueue", json!(["GroupResume", "", [id]]))
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, delete_files: bool) -> Result<(), DownloadClientError> {
        let id = parse_id(id)?;
        let command = if delete_files {
            "GroupDelete"
        } else {
            "GroupFinalDelete"
        };
        self.rpc("editqueue", json!([command, "", [id]])).await?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        self.rpc("version", json!([])).await?;
        Ok(())
    }

    async fn free_space(&self) -> Result<u64, DownloadClientError> {
        let status = self.rpc("status", json!([])).await?;
        let lo = i64_field(&status, "FreeDiskSpaceLo") as u64;
        let hi = i64_field(&status, "FreeDiskSpaceHi") as u64;
        Ok((hi << 32) | (lo & 0xffff_ffff))
    }
}

fn parse_id(id: &str) -> Result<i64, DownloadClientError> {
    id.parse::<i64>()
        .map_err(|_| DownloadClientError::NotFound(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_group_status() {
        assert_eq!(map_group_status("DOWNLOADING"), DownloadStatus::Downloading);
        assert_eq!(map_group_status("QUEUED"), DownloadStatus::Downloading);
        assert_eq!(map_group_status("PP_QUEUED"), DownloadStatus::Downloading);
        assert_eq!(map_group_status("UNPACKING"), DownloadStatus::Downloading);
        assert_eq!(map_group_status("PAUSED"), DownloadStatus::Paused);
    }

    #[test]
    fn test_map_history_status() {
        assert_eq!(map_history_status("SUCCESS/ALL"), DownloadStatus::Completed);
        assert_eq!(map_history_status("SUCCESS/UNPACK"), DownloadStatus::Completed);
        assert_eq!(map_history_status("FAILURE/PAR"), DownloadStatus::Error);
        assert_eq!(map_history_status("DELETED/MANUAL"), DownloadStatus::Error);
        assert_eq!(map_history_status("WARNING/REPAIRABLE"), DownloadStatus::Completed);
    }

    #[test]
    fn test_group_to_item_progress_from_remaining() {
        let group = json!({
            "NZBID": 12,
            "NZBName": "Some.Game-GROUP",
            "Status": "DOWNLOADING",
            "FileSizeMB": 1000,
            "RemainingSizeMB": 250,
            "DestDir": "/downloads/intermediate"
        });
        let item = group_to_item(&group);
        assert_eq!(item.id, "12");
        assert!((item.progress - 0.75).abs() < 1e-9);
        assert_eq!(item.size_bytes, 1000 * 1024 * 1024);
        assert_eq!(item.status, DownloadStatus::Downloading);
    }

    #[test]
    fn test_history_to_item() {
        let entry = json!({
            "NZBID": 13,
            "Name": "Some.Game-GROUP",
            "Status": "SUCCESS/ALL",
            "FileSizeMB": 500,
            "DestDir": "/downloads/complete/Some.Game-GROUP"
        });
        let item = history_to_item(&entry);
        assert_eq!(item.status, DownloadStatus::Completed);
        assert!((item.progress - 1.0).abs() < 1e-9);
        assert_eq!(
            item.remote_path.as_deref(),
            Some("/downloads/complete/Some.Game-GROUP")
        );
    }

    #[test]
    fn test_free_space_combines_halves() {
        let lo: u64 = 0x8000_0000;
        let hi: u64 = 2;
        assert_eq!((hi << 32) | (lo & 0xffff_ffff), 0x2_8000_0000);
    }
}
