//! Shared add-download fallback flow.
//!
//! Every backend adds transfers through the same shape: magnet URIs go
//! straight to the backend; plain URLs are first offered to the backend for
//! a server-side fetch; when that fails the file is fetched client-side
//! (following redirects by hand, each hop re-validated) and uploaded raw.
//! Only the wire format of the individual calls differs per backend.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use tracing::{debug, warn};

use crate::safenet::SafeHttpClient;

use super::torrent_file::parse_torrent_meta;
use super::types::{AddRequest, AddedDownload, DownloadClientError, DownloadItem};

const MAX_REDIRECTS: u32 = 5;

/// Whether a link is a magnet URI.
pub fn is_magnet(link: &str) -> bool {
    link.len() >= 7 && link[..7].eq_ignore_ascii_case("magnet:")
}

/// Extract the info hash from a magnet URI (`xt=urn:btih:HASH`).
pub fn extract_hash_from_magnet(magnet: &str) -> Option<String> {
    let (_, query) = magnet.split_once('?')?;
    for param in query.split('&') {
        if let Some(value) = param.strip_prefix("xt=urn:btih:") {
            return Some(value.to_lowercase());
        }
    }
    None
}

/// Outcome of client-side link resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedLink {
    /// A redirect hop landed on a magnet URI.
    Magnet(String),
    File {
        bytes: Vec<u8>,
        filename: Option<String>,
    },
}

/// Resolve a redirect Location against the URL that issued it.
fn resolve_location(base: &str, location: &str) -> Result<String, DownloadClientError> {
    let base = reqwest::Url::parse(base)
        .map_err(|e| DownloadClientError::ApiError(format!("Invalid redirect base: {e}")))?;
    let resolved = base
        .join(location)
        .map_err(|e| DownloadClientError::ApiError(format!("Invalid redirect target: {e}")))?;
    Ok(resolved.to_string())
}

/// Last path segment of a URL, as a filename hint.
fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?.to_string();
    if name.is_empty() {
        None
    } else {
        Some(urlencoding::decode(&name).map(|s| s.into_owned()).unwrap_or(name))
    }
}

/// Fetch a download link client-side, following redirects by hand.
///
/// Every hop goes through the safe client and is re-validated. Relative
/// Location headers resolve against the prior URL; a magnet target switches
/// the flow to magnet-add; more than [`MAX_REDIRECTS`] hops is a hard
/// failure. An HTTP 400 on a URL containing a literal `+` is retried once
/// with `+` rewritten to `%20` (a common encoding mismatch in indexer links).
pub async fn resolve_link(
    net: &SafeHttpClient,
    link: &str,
) -> Result<FetchedLink, DownloadClientError> {
    let mut url = link.to_string();
    let mut hops = 0u32;
    let mut retried_plus = false;

    loop {
        if is_magnet(&url) {
            return Ok(FetchedLink::Magnet(url));
        }

        let response = net.get(&url).await?;
        let status = response.status();

        if status.is_redirection() {
            hops += 1;
            if hops > MAX_REDIRECTS {
                warn!(link, "Redirect cap exceeded");
                return Err(DownloadClientError::TooManyRedirects(MAX_REDIRECTS));
            }
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    DownloadClientError::ApiError("Redirect without Location header".to_string())
                })?;
            if is_magnet(location) {
                return Ok(FetchedLink::Magnet(location.to_string()));
            }
            url = resolve_location(&url, location)?;
            debug!(hops, %url, "Following redirect");
            continue;
        }

        if status.as_u16() == 400 && !retried_plus && url.contains('+') {
            retried_plus = true;
            url = url.replace('+', "%20");
            debug!(%url, "Retrying HTTP 400 with rewritten spaces");
            continue;
        }

        if !status.is_success() {
            return Err(DownloadClientError::ApiError(format!(
                "HTTP {} fetching transfer file",
                status
            )));
        }

        let filename = filename_from_url(&url);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadClientError::ConnectionFailed(e.to_string()))?
            .to_vec();
        return Ok(FetchedLink::File { bytes, filename });
    }
}

/// The three backend-supplied primitives the shared add flow is built on.
///
/// `add_url`/`add_file` return `Ok(None)` when the backend accepted the
/// transfer but did not return an identifier synchronously; the shared flow
/// then recovers the id from the recent-items list.
#[async_trait]
pub trait AddBackend: Send + Sync {
    async fn add_url(
        &self,
        url: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError>;

    async fn add_file(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        request: &AddRequest,
    ) -> Result<Option<AddedDownload>, DownloadClientError>;

    async fn recent_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError>;

    /// Backend-specific post-add behavior (force-start, pause) applied as a
    /// separate follow-up call, never baked into the add itself.
    async fn apply_post_add(&self, _added: &AddedDownload) -> Result<(), DownloadClientError> {
        Ok(())
    }
}

/// Whether the transfer file should be parsed as a torrent for hash/name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Torrent,
    Usenet,
}

/// Shared add flow: magnet direct, server-side URL add, client-side fetch.
pub async fn add_download_with_fallback(
    backend: &dyn AddBackend,
    net: &SafeHttpClient,
    kind: TransferKind,
    request: &AddRequest,
) -> Result<AddedDownload, DownloadClientError> {
    if is_magnet(&request.link) {
        let added = backend.add_url(&request.link, request).await?;
        let hash = extract_hash_from_magnet(&request.link);
        return finish_add(backend, added, hash, request.name.clone()).await;
    }

    // Some backends fetch the URL server-side; try that first.
    match backend.add_url(&request.link, request).await {
        Ok(added) => return finish_add(backend, added, None, request.name.clone()).await,
        Err(e) => {
            debug!(error = %e, link = %request.link, "Server-side add failed, fetching client-side");
        }
    }

    match resolve_link(net, &request.link).await? {
        FetchedLink::Magnet(uri) => {
            let hash = extract_hash_from_magnet(&uri);
            let added = backend.add_url(&uri, request).await?;
            finish_add(backend, added, hash, request.name.clone()).await
        }
        FetchedLink::File { bytes, filename } => {
            let (hash, parsed_name) = match kind {
                TransferKind::Torrent => {
                    let meta = parse_torrent_meta(&bytes)?;
                    (Some(meta.hash), meta.name)
                }
                TransferKind::Usenet => (None, None),
            };
            let filename = filename.unwrap_or_else(|| match kind {
                TransferKind::Torrent => "transfer.torrent".to_string(),
                TransferKind::Usenet => "transfer.nzb".to_string(),
            });
            let added = backend.add_file(bytes, &filename, request).await?;
            finish_add(
                backend,
                added,
                hash,
                parsed_name.or_else(|| request.name.clone()),
            )
            .await
        }
    }
}

/// Verify the add and apply post-add behavior.
///
/// Backends that return no identifier synchronously are reconciled against
/// their recent-items list, matching by hash when known, by recency
/// otherwise.
async fn finish_add(
    backend: &dyn AddBackend,
    added: Option<AddedDownload>,
    hash: Option<String>,
    name: Option<String>,
) -> Result<AddedDownload, DownloadClientError> {
    let added = match added {
        Some(mut added) => {
            if added.hash.is_none() {
                added.hash = hash;
            }
            if added.name.is_none() {
                added.name = name;
            }
            added
        }
        None => {
            let items = backend.recent_items().await?;
            let by_hash = hash.as_deref().and_then(|h| {
                items
                    .iter()
                    .find(|i| i.hash.as_deref().is_some_and(|ih| ih.eq_ignore_ascii_case(h)))
                    .cloned()
            });
            let found = by_hash
                .or_else(|| items.into_iter().max_by_key(|i| i.added_at))
                .ok_or_else(|| {
                    DownloadClientError::ApiError(
                        "Transfer accepted but not visible in backend list".to_string(),
                    )
                })?;
            AddedDownload {
                id: found.id,
                hash: found.hash.or(hash),
                name: Some(found.name).filter(|n| !n.is_empty()).or(name),
            }
        }
    };

    backend.apply_post_add(&added).await?;
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::types::DownloadStatus;
    use crate::safenet::SafetyPolicy;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_is_magnet_case_insensitive() {
        assert!(is_magnet("magnet:?xt=urn:btih:abc"));
        assert!(is_magnet("MAGNET:?xt=urn:btih:abc"));
        assert!(!is_magnet("https://indexer.example/dl/1.torrent"));
        assert!(!is_magnet("mag"));
    }

    #[test]
    fn test_extract_hash_from_magnet() {
        let magnet = "magnet:?xt=urn:btih:ABC123DEF456&dn=Test";
        assert_eq!(
            extract_hash_from_magnet(magnet),
            Some("abc123def456".to_string())
        );
        assert_eq!(extract_hash_from_magnet("magnet:?dn=Test"), None);
        assert_eq!(extract_hash_from_magnet("not a magnet"), None);
    }

    #[test]
    fn test_resolve_location_relative() {
        assert_eq!(
            resolve_location("https://idx.example/api/dl?id=1", "/files/a.torrent").unwrap(),
            "https://idx.example/files/a.torrent"
        );
        assert_eq!(
            resolve_location("https://idx.example/api/dl", "b.torrent").unwrap(),
            "https://idx.example/api/b.torrent"
        );
    }

    #[test]
    fn test_resolve_location_absolute() {
        assert_eq!(
            resolve_location("https://idx.example/dl", "https://mirror.example/a.torrent")
                .unwrap(),
            "https://mirror.example/a.torrent"
        );
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://idx.example/dl/my%20game.torrent").as_deref(),
            Some("my game.torrent")
        );
        assert_eq!(filename_from_url("https://idx.example/"), None);
    }

    struct FakeBackend {
        add_url_result: Mutex<Option<Result<Option<AddedDownload>, DownloadClientError>>>,
        items: Vec<DownloadItem>,
        urls_seen: Mutex<Vec<String>>,
        post_add_applied: Mutex<bool>,
    }

    impl FakeBackend {
        fn new(
            add_url_result: Result<Option<AddedDownload>, DownloadClientError>,
            items: Vec<DownloadItem>,
        ) -> Self {
            Self {
                add_url_result: Mutex::new(Some(add_url_result)),
                items,
                urls_seen: Mutex::new(Vec::new()),
                post_add_applied: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl AddBackend for FakeBackend {
        async fn add_url(
            &self,
            url: &str,
            _request: &AddRequest,
        ) -> Result<Option<AddedDownload>, DownloadClientError> {
            self.urls_seen.lock().unwrap().push(url.to_string());
            self.add_url_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Ok(None))
        }

        async fn add_file(
            &self,
            _bytes: Vec<u8>,
            _filename: &str,
            _request: &AddRequest,
        ) -> Result<Option<AddedDownload>, DownloadClientError> {
            Ok(None)
        }

        async fn recent_items(&self) -> Result<Vec<DownloadItem>, DownloadClientError> {
            Ok(self.items.clone())
        }

        async fn apply_post_add(
            &self,
            _added: &AddedDownload,
        ) -> Result<(), DownloadClientError> {
            *self.post_add_applied.lock().unwrap() = true;
            Ok(())
        }
    }

    fn item(id: &str, hash: Option<&str>, day: u32) -> DownloadItem {
        DownloadItem {
            id: id.to_string(),
            hash: hash.map(|h| h.to_string()),
            name: format!("item {id}"),
            status: DownloadStatus::Downloading,
            progress: 0.0,
            size_bytes: 1,
            added_at: Some(Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()),
            remote_path: None,
        }
    }

    fn net() -> SafeHttpClient {
        SafeHttpClient::new(SafetyPolicy::default(), Duration::from_secs(1))
    }

    fn request(link: &str) -> AddRequest {
        AddRequest {
            link: link.to_string(),
            name: Some("Some Game".to_string()),
            category: None,
            add_paused: false,
        }
    }

    #[tokio::test]
    async fn test_magnet_added_directly() {
        let backend = FakeBackend::new(
            Ok(Some(AddedDownload {
                id: "abc123".to_string(),
                hash: None,
                name: None,
            })),
            vec![],
        );

        let added = add_download_with_fallback(
            &backend,
            &net(),
            TransferKind::Torrent,
            &request("magnet:?xt=urn:btih:ABC123&dn=Game"),
        )
        .await
        .unwrap();

        assert_eq!(added.id, "abc123");
        // Hash back-filled from the magnet itself.
        assert_eq!(added.hash.as_deref(), Some("abc123"));
        assert_eq!(backend.urls_seen.lock().unwrap().len(), 1);
        assert!(*backend.post_add_applied.lock().unwrap());
    }

    #[tokio::test]
    async fn test_missing_id_recovered_by_hash() {
        let backend = FakeBackend::new(
            Ok(None),
            vec![
                item("1", Some("ffff"), 2),
                item("2", Some("ABC123"), 1),
            ],
        );

        let added = add_download_with_fallback(
            &backend,
            &net(),
            TransferKind::Torrent,
            &request("magnet:?xt=urn:btih:abc123"),
        )
        .await
        .unwrap();

        // Hash match wins over recency.
        assert_eq!(added.id, "2");
    }

    #[tokio::test]
    async fn test_missing_id_recovered_by_recency() {
        let backend = FakeBackend::new(
            Ok(None),
            vec![item("old", None, 1), item("new", None, 9)],
        );

        let added = add_download_with_fallback(
            &backend,
            &net(),
            TransferKind::Torrent,
            &request("magnet:?dn=NoHash"),
        )
        .await
        .unwrap();

        assert_eq!(added.id, "new");
    }

    #[tokio::test]
    async fn test_missing_id_with_empty_backend_list_fails() {
        let backend = FakeBackend::new(Ok(None), vec![]);

        let err = add_download_with_fallback(
            &backend,
            &net(),
            TransferKind::Torrent,
            &request("magnet:?xt=urn:btih:abc123"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DownloadClientError::ApiError(_)));
    }
}
