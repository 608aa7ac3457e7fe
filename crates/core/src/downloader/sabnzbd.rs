//! SABnzbd adapter (api-key REST, usenet).
//!
//! One endpoint, `{url}/api?mode=...&output=json&apikey=...`; active
//! transfers live in the queue, finished ones move to the history, so both
//! are consulted when looking an item up.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{multipart, Client};
use serde_json::Value;

use crate::safenet::{SafeHttpClient, SafetyPolicy};
use crate::store::Downloader;

use super::fetch::{add_download_with_fallback, AddBackend, TransferKind};
use super::types::{
    request_error, AddRequest, AddedDownload, DownloadClient, DownloadClientError, DownloadItem,
    DownloadStatus,
};

const TIMEOUT: Duration = Duration::from_secs(30);

pub struct SabnzbdClient {
    client: Client,
    net: SafeHttpClient,
    config: Downloader,
}

impl SabnzbdClient {
    pub fn new(config: Downloader, policy: SafetyPolicy) -> Self {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            net: SafeHttpClient::new(policy, TIMEOUT),
            config,
        }
    }

    async fn guard(&self) -> Result<(), DownloadClientError> {
        self.net.check(&self.config.url).await?;
        Ok(())
    }

    fn api_url(&self, mode: &str, extra: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}/api?mode={}&output=json&apikey={}",
            self.config.url.trim_end_matches('/'),
            mode,
            urlencoding::encode(self.config.api_key.as_deref().unwrap_or("")),
        );
        for (key, value) in extra {
            url.push_str(&format!("&{}={}", key, urlencoding::encode(value)));
        }
        url
    }

    async fn call(&self, mode: &str, extra: &[(&str, &str)]) -> Result<Value, DownloadClientError> {
        self.guard().await?;
        let response = self
            .client
            .get(self.api_url(mode, extra))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadClientError::ApiError(format!("HTTP {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| DownloadClientError::ApiError(e.to_string()))?;
        check_api_error(&body)?;
        Ok(body)
    }

    async fn queue_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let body = self.call("queue", &[]).await?;
        let slots = body
            .pointer("/queue/slots")
            .and_then(|s| s.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(slots.iter().map(queue_slot_to_item).collect())
    }

    async fn history_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let body = self.call("history", &[("limit", "50")]).await?;
        let slots = body
            .pointer("/history/slots")
            .and_then(|s| s.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(slots.iter().map(history_slot_to_item).collect())
    }
}

fn check_api_error(body: &Value) -> Result<(), DownloadClientError> {
    if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
        if error.to_lowercase().contains("api key") {
            return Err(DownloadClientError::AuthenticationFailed(error.to_string()));
        }
        return Err(DownloadClientError::ApiError(error.to_string()));
    }
    if body.get("status").and_then(|s| s.as_bool()) == Some(false) {
        return Err(DownloadClientError::ApiError(
            "SABnzbd rejected the request".to_string(),
        ));
    }
    Ok(())
}

fn str_field<'a>(slot: &'a Value, key: &str) -> &'a str {
    slot.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

/// Reduce SABnzbd's status strings to the shared vocabulary.
fn map_sab_status(status: &str) -> DownloadStatus {
    match status {
        "Downloading" | "Queued" | "Grabbing" | "Fetching" | "Extracting" | "Verifying"
        | "Repairing" | "Running" | "Moving" => DownloadStatus::Downloading,
        "Paused" => DownloadStatus::Paused,
        "Completed" => DownloadStatus::Completed,
        "Failed" => DownloadStatus::Error,
        _ => DownloadStatus::Downloading,
    }
}

fn queue_slot_to_item(slot: &Value) -> DownloadItem {
    let percentage = str_field(slot, "percentage").parse::<f64>().unwrap_or(0.0);
    let mb = str_field(slot, "mb").parse::<f64>().unwrap_or(0.0);
    DownloadItem {
        id: str_field(slot, "nzo_id").to_string(),
        hash: None,
        name: str_field(slot, "filename").to_string(),
        status: map_sab_status(str_field(slot, "status")),
        progress: (percentage / 100.0).clamp(0.0, 1.0),
        size_bytes: (mb * 1024.0 * 1024.0) as u64,
        added_at: None,
        remote_path: None,
    }
}

fn history_slot_to_item(slot: &Value) -> DownloadItem {
    let status = map_sab_status(str_field(slot, "status"));
    DownloadItem {
        id: str_field(slot, "nzo_id").to_string(),
        hash: None,
        name: str_field(slot, "name").to_string(),
        status,
        progress: if status == DownloadStatus::Completed {
            1.0
        } else {
            0.0
        },
        size_bytes: slot.get("bytes").and_then(|b| b.as_i64()).unwrap_or(0).max(0) as u64,
        added_at: slot
            .get("completed")
            .and_then(|c| c.as_i64())
            .filter(|&c| c > 0)
            .and_then(|c| Utc.timestamp_opt(c, 0).single()),
        remote_path: Some(str_field(slot, "storage").to_string()).filter(|s| !s.is_empty()),
    }
}

fn added_from_nzo_ids(body: &Value, name: Option<&str>) -> Option<AddedDownload> {
    let id = body
        .get("nzo_ids")
        .and_then(|ids| ids.as_array())
        .and_then(|ids| ids.first())
        .and_then(|id| id.as_str())?;
    Some(AddedDownload {
        id: id.to_string(),
        hash: None,
        name: name.map(String::from),
    })
}

#[async_trait]
impl AddBackend for SabnzbdClient {
    async fn add_url(
        &self,
        url: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let mut extra = vec![("name", url)];
        let category = request.category.as_deref().or(self.config.category.as_deref());
        if let Some(cat) = category {
            extra.push(("cat", cat));
        }
        if let Some(name) = request.name.as_deref() {
            extra.push(("nzbname", name));
        }
        let body = self.call("addurl", &extra).await?;
        Ok(added_from_nzo_ids(&body, request.name.as_deref()))
    }

    async fn add_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        self.guard().await?;

        let part = multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/x-nzb")
            .map_err(|e| DownloadClientError::InvalidFile(e.to_string()))?;
        let mut form = multipart::Form::new().part("name", part);
        if let Some(cat) = request.category.as_deref().or(self.config.category.as_deref()) {
            form = form.text("cat", cat.to_string());
        }

        let response = self
            .client
            .post(self.api_url("addfile", &[]))
            .multipart(form)
            .send()
            .await
            .map_err(request_error)?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| DownloadClientError::ApiError(e.to_string()))?;
        check_api_error(&body)?;
        Ok(added_from_nzo_ids(&body, request.name.as_deref()))
    }

    async fn recent_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        self.queue_items().await
    }

    async fn apply_post_add(&self, added: &AddedDownload) -> Result<(), DownloadClientError> {
        if self.config.add_paused {
            self.pause(&added.id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadClient for SabnzbdClient {
    fn name(&self) -> &'static str {
        "sabnzbd"
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
        // Finished items are only visible in the history.
        let mut items = self.queue_items().await?;
        items.extend(self.history_items().await?);
        Ok(items)
    }

    async fn pause(&self, id: &str) -> Result<(), DownloadClientError> {
        self.call("queue", &[("name", "pause"), ("value", id)])
            .await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), DownloadClientError> {
        self.call("queue", &[("name", "resume"), ("value", id)])
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, delete_files: bool) -> Result<(), DownloadClientError> {
        let del = if delete_files { "1" } else { "0" };
        // The item may be in either the queue or the history.
        self.call(
            "queue",
            &[("name", "delete"), ("value", id), ("del_files", del)],
        )
        .await
        .ok();
        self.call(
            "history",
            &[("name", "delete"), ("value", id), ("del_files", del)],
        )
        .await?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        self.call("version", &[]).await?;
        Ok(())
    }

    async fn free_space(&self) -> Result<u64, DownloadClientError> {
        let body = self.call("queue", &[]).await?;
        let gb = body
            .pointer("/queue/diskspace1")
            .and_then(|d| d.as_str())
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok((gb * 1024.0 * 1024.0 * 1024.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_sab_status() {
        assert_eq!(map_sab_status("Downloading"), DownloadStatus::Downloading);
        assert_eq!(map_sab_status("Queued"), DownloadStatus::Downloading);
        assert_eq!(map_sab_status("Extracting"), DownloadStatus::Downloading);
        assert_eq!(map_sab_status("Paused"), DownloadStatus::Paused);
        assert_eq!(map_sab_status("Completed"), DownloadStatus::Completed);
        assert_eq!(map_sab_status("Failed"), DownloadStatus::Error);
        assert_eq!(map_sab_status("Propagating"), DownloadStatus::Downloading);
    }

    #[test]
    fn test_queue_slot_to_item_percent_scale() {
        let slot = json!({
            "nzo_id": "SABnzbd_nzo_1",
            "filename": "Some.Game-GROUP",
            "status": "Downloading",
            "percentage": "42",
            "mb": "500.0"
        });
        let item = queue_slot_to_item(&slot);
        assert_eq!(item.id, "SABnzbd_nzo_1");
        assert!((item.progress - 0.42).abs() < 1e-9);
        assert_eq!(item.size_bytes, 500 * 1024 * 1024);
        assert_eq!(item.status, DownloadStatus::Downloading);
    }

    #[test]
    fn test_history_slot_to_item() {
        let slot = json!({
            "nzo_id": "SABnzbd_nzo_2",
            "name": "Some.Game-GROUP",
            "status": "Completed",
            "bytes": 1024,
            "completed": 1703980800,
            "storage": "/downloads/complete/Some.Game-GROUP"
        });
        let item = history_slot_to_item(&slot);
        assert_eq!(item.status, DownloadStatus::Completed);
        assert!((item.progress - 1.0).abs() < 1e-9);
        assert_eq!(
            item.remote_path.as_deref(),
            Some("/downloads/complete/Some.Game-GROUP")
        );
    }

    #[test]
    fn test_added_from_nzo_ids() {
        let body = json!({ "status": true, "nzo_ids": ["SABnzbd_nzo_9"] });
        let added = added_from_nzo_ids(&body, Some("Some Game")).unwrap();
        assert_eq!(added.id, "SABnzbd_nzo_9");
        assert_eq!(added.name.as_deref(), Some("Some Game"));
        assert!(added_from_nzo_ids(&json!({"status": true}), None).is_none());
    }

    #[test]
    fn test_check_api_error_bad_key() {
        let body = json!({ "error": "API Key Incorrect" });
        assert!(matches!(
            check_api_error(&body),
            Err(DownloadClientError::AuthenticationFailed(_))
        ));
    }
}
