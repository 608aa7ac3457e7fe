//! Transmission adapter (stateless JSON-RPC with CSRF-token handshake).
//!
//! Every call may be answered with HTTP 409 carrying a fresh
//! `X-Transmission-Session-Id`; the call is then retried once with the new
//! token. The token is cached between calls but never assumed valid.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::safenet::{SafeHttpClient, SafetyPolicy};
use crate::store::Downloader;

use super::fetch::{add_download_with_fallback, AddBackend, TransferKind};
use super::types::{
    request_error, AddRequest, AddedDownload, DownloadClient, DownloadClientError, DownloadItem,
    DownloadStatus,
};

const TIMEOUT: Duration = Duration::from_secs(30);
const SESSION_HEADER: &str = "X-Transmission-Session-Id";

const TORRENT_FIELDS: &[&str] = &[
    "id",
    "hashString",
    "name",
    "status",
    "percentDone",
    "totalSize",
    "addedDate",
    "downloadDir",
    "error",
];

pub struct TransmissionClient {
    client: Client,
    net: SafeHttpClient,
    config: Downloader,
    session_id: Arc<RwLock<Option<String>>>,
}

impl TransmissionClient {
    pub fn new(config: Downloader, policy: SafetyPolicy) -> Self {
        let client = Client::builder()
            .timeout(TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            net: SafeHttpClient::new(policy, TIMEOUT),
            config,
            session_id: Arc::new(RwLock::new(None)),
        }
    }

    fn rpc_url(&self) -> String {
        format!("{}/transmission/rpc", self.config.url.trim_end_matches('/'))
    }

    async fn guard(&self) -> Result<(), DownloadClientError> {
        self.net.check(&self.config.url).await?;
        Ok(())
    }

    async fn send_once(
        &self,
        body: &Value,
        session_id: Option<&str>,
    ) -> Result<reqwest::Response, DownloadClientError> {
        let mut request = self.client.post(self.rpc_url()).json(body);
        if let Some(id) = session_id {
            request = request.header(SESSION_HEADER, id);
        }
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            request = request.basic_auth(user, Some(pass));
        }
        request.send().await.map_err(request_error)
    }

    /// Issue an RPC call, renegotiating the session token on 409.
    async fn rpc(&self, method: &str, arguments: Value) -> Result<Value, DownloadClientError> {
        self.guard().await?;

        let body = json!({ "method": method, "arguments": arguments });
        let session_id = self.session_id.read().await.clone();
        let mut response = self.send_once(&body, session_id.as_deref()).await?;

        if response.status().as_u16() == 409 {
            let new_id = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
                .ok_or_else(|| {
                    DownloadClientError::ApiError("409 without session id header".to_string())
                })?;
            debug!("Transmission session renegotiated");
            *self.session_id.write().await = Some(new_id.clone());
            response = self.send_once(&body, Some(&new_id)).await?;
        }

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
        let result = envelope.get("result").and_then(|r| r.as_str()).unwrap_or("");
        if result != "success" {
            return Err(DownloadClientError::ApiError(format!(
                "Transmission RPC failed: {result}"
            )));
        }
        Ok(envelope.get("arguments").cloned().unwrap_or(Value::Null))
    }

    fn added_from_response(arguments: &Value) -> Option<AddedDownload> {
        let torrent = arguments
            .get("torrent-added")
            .or_else(|| arguments.get("torrent-duplicate"))?;
        Some(AddedDownload {
            id: torrent.get("id")?.to_string(),
            hash: torrent
                .get("hashString")
                .and_then(|h| h.as_str())
                .map(|h| h.to_lowercase()),
            name: torrent
                .get("name")
                .and_then(|n| n.as_str())
                .map(String::from),
        })
    }

    async fn fetch_items(&self, ids: Option<Value>) -> Result<Vec<DownloadItem>, DownloadClientError> {
        let mut arguments = json!({ "fields": TORRENT_FIELDS });
        if let Some(ids) = ids {
            arguments["ids"] = ids;
        }
        let result = self.rpc("torrent-get", arguments).await?;
        let torrents: Vec<TrTorrent> =
            serde_json::from_value(result.get("torrents").cloned().unwrap_or(Value::Null))
                .map_err(|e| {
                    DownloadClientError::ApiError(format!("Failed to parse response: {e}"))
                })?;
        Ok(torrents.into_iter().map(TrTorrent::into_item).collect())
    }

    fn id_value(id: &str) -> Value {
        // Numeric ids travel as numbers; hashes as strings.
        match id.parse::<i64>() {
            Ok(n) => json!([n]),
            Err(_) => json!([id]),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrTorrent {
    id: i64,
    hash_string: String,
    name: String,
    status: i64,
    percent_done: f64,
    total_size: i64,
    added_date: i64,
    download_dir: Option<String>,
    #[serde(default)]
    error: i64,
}

impl TrTorrent {
    fn into_item(self) -> DownloadItem {
        DownloadItem {
            id: self.id.to_string(),
            hash: Some(self.hash_string.to_lowercase()),
            name: self.name,
            status: map_tr_status(self.status, self.percent_done, self.error),
            progress: self.percent_done.clamp(0.0, 1.0),
            size_bytes: self.total_size.max(0) as u64,
            added_at: (self.added_date > 0)
                .then(|| Utc.timestamp_opt(self.added_date, 0).single())
                .flatten(),
            remote_path: self.download_dir.filter(|d| !d.is_empty()),
        }
    }
}

/// Reduce Transmission's numeric status codes to the shared vocabulary.
///
/// 0 stopped, 1/2 check, 3/4 download, 5/6 seed.
fn map_tr_status(status: i64, percent_done: f64, error: i64) -> DownloadStatus {
    if error != 0 {
        return DownloadStatus::Error;
    }
    match status {
        0 if percent_done >= 1.0 => DownloadStatus::Completed,
        0 => DownloadStatus::Paused,
        1 | 2 | 3 | 4 => DownloadStatus::Downloading,
        5 | 6 => DownloadStatus::Seeding,
        _ => DownloadStatus::Error,
    }
}

#[async_trait]
impl AddBackend for TransmissionClient {
    async fn add_url(
        &self,
        url: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let mut arguments = json!({ "filename": url });
        if let Some(label) = request.category.as_ref().or(self.config.category.as_ref()) {
            arguments["labels"] = json!([label]);
        }
        let result = self.rpc("torrent-add", arguments).await?;
        Ok(Self::added_from_response(&result))
    }

    async fn add_file(
        &self,
        bytes: Vec<u8>,
        _filename: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError> {
        let mut arguments = json!({ "metainfo": BASE64.encode(&bytes) });
        if let Some(label) = request.category.as_ref().or(self.config.category.as_ref()) {
            arguments["labels"] = json!([label]);
        }
        let result = self.rpc("torrent-add", arguments).await?;
        Ok(Self::added_from_response(&result))
    }

    async fn recent_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        self.list_active().await
    }

    async fn apply_post_add(&self, added: &AddedDownload) -> Result<(), DownloadClientError> {
        if self.config.add_paused {
            self.pause(&added.id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadClient for TransmissionClient {
    fn name(&self) -> &'static str {
        "transmission"
    }

    async fn add_download(
        &self,
        request: &AddRequest,
    ) -> Result<AddedDownload, DownloadClientError> {
        self.guard().await?;
        add_download_with_fallback(self, &self.net, TransferKind::Torrent, request).await
    }

    async fn get_details(&self, id: &str) -> Result<DownloadItem, DownloadClientError> {
        self.fetch_items(Some(Self::id_value(id)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DownloadClientError::NotFound(id.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
        self.fetch_items(None).await
    }

    async fn pause(&self, id: &str) -> Result<(), DownloadClientError> {
        self.rpc("torrent-stop", json!({ "ids": Self::id_value(id) }))
            .await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> Result<(), DownloadClientError> {
        self.rpc("torrent-start", json!({ "ids": Self::id_value(id) }))
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str, delete_files: bool) -> Result<(), DownloadClientError> {
        self.rpc(
            "torrent-remove",
            json!({ "ids": Self::id_value(id), "delete-local-data": delete_files }),
        )
        .await?;
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), DownloadClientError> {
        self.rpc("session-get", json!({})).await?;
        Ok(())
    }

    async fn free_space(&self) -> Result<u64, DownloadClientError> {
        let session = self.rpc("session-get", json!({})).await?;
        let download_dir = session
            .get("download-dir")
            .and_then(|d| d.as_str())
            .unwrap_or("/");
        let result = self
            .rpc("free-space", json!({ "path": download_dir }))
            .await?;
        Ok(result
            .get("size-bytes")
            .and_then(|s| s.as_i64())
            .unwrap_or(0)
            .max(0) as u64)
    }
}
