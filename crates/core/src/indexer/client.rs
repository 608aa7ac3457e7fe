//! Torznab and newznab search clients.
//!
//! The two protocols are sibling XML dialects sharing one request shape;
//! the clients differ only in which namespaced attrs they read and which
//! download type they tag results with.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::safenet::{SafeHttpClient, SafetyPolicy};
use crate::store::{Indexer, IndexerProtocol};

use super::categories::matches_requested;
use super::types::{
    CapsCategory, DownloadType, IndexerSearchClient, ReleaseCandidate, SearchError, SearchRequest,
};
use super::xml::{parse_caps, parse_feed, FeedItem};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const CAPS_TIMEOUT: Duration = Duration::from_secs(10);

/// Torrent-index client (torznab dialect).
pub struct TorznabClient {
    search_net: SafeHttpClient,
    caps_net: SafeHttpClient,
}

/// Usenet-index client (newznab dialect).
pub struct NewznabClient {
    search_net: SafeHttpClient,
    caps_net: SafeHttpClient,
}

impl TorznabClient {
    pub fn new(policy: SafetyPolicy) -> Self {
        Self {
            search_net: SafeHttpClient::new(policy, SEARCH_TIMEOUT),
            caps_net: SafeHttpClient::new(policy, CAPS_TIMEOUT),
        }
    }
}

impl NewznabClient {
    pub fn new(policy: SafetyPolicy) -> Self {
        Self {
            search_net: SafeHttpClient::new(policy, SEARCH_TIMEOUT),
            caps_net: SafeHttpClient::new(policy, CAPS_TIMEOUT),
        }
    }
}

/// Build the `?t=search` URL for an indexer.
fn build_search_url(indexer: &Indexer, request: &SearchRequest) -> String {
    let mut url = format!(
        "{}?t=search&apikey={}&q={}&extended=1",
        indexer.base_url.trim_end_matches('/'),
        urlencoding::encode(&indexer.api_key),
        urlencoding::encode(&request.query)
    );

    // Request-level categories win over the indexer's configured allow-list.
    let categories = request
        .categories
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(&indexer.categories);
    if !categories.is_empty() {
        let joined = categories
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        url.push_str(&format!("&cat={}", joined));
    }

    if let Some(limit) = request.limit {
        url.push_str(&format!("&limit={}", limit));
    }
    if let Some(offset) = request.offset {
        url.push_str(&format!("&offset={}", offset));
    }

    url
}

/// Parse a feed date, tolerating the formats indexers actually emit.
fn parse_feed_date(date_str: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            DateTime::parse_from_rfc3339(date_str)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// Fetch and parse a search feed for one indexer.
async fn fetch_feed(
    net: &SafeHttpClient,
    indexer: &Indexer,
    request: &SearchRequest,
) -> Result<Vec<FeedItem>, SearchError> {
    let url = build_search_url(indexer, request);
    debug!(indexer = %indexer.name, "Searching indexer");

    let timer = crate::metrics::SEARCH_DURATION
        .with_label_values(&[&indexer.name])
        .start_timer();
    let response = net.get(&url).await?;
    timer.observe_duration();

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SearchError::ApiError(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SearchError::ConnectionFailed(e.to_string()))?;

    let items = parse_feed(&body)?;

    // Server-side category filtering is advisory; enforce it locally too.
    let requested = request
        .categories
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(&indexer.categories);
    Ok(items
        .into_iter()
        .filter(|item| matches_requested(requested, &item.all_categories()))
        .collect())
}

/// Fields shared by both dialects.
fn base_candidate(
    item: &FeedItem,
    indexer: &Indexer,
    download_type: DownloadType,
) -> Option<ReleaseCandidate> {
    let link = item
        .enclosure_url
        .clone()
        .or_else(|| item.link.clone())?;
    let guid = item
        .guid
        .clone()
        .or_else(|| item.link.clone())?;

    let size_bytes = item
        .attr("size")
        .and_then(|v| v.parse::<u64>().ok())
        .or(item.enclosure_length)
        .unwrap_or(0);

    Some(ReleaseCandidate {
        guid,
        title: item.title.clone(),
        link,
        info_url: item.comments.clone(),
        published: item.pub_date.as_deref().and_then(parse_feed_date),
        size_bytes,
        seeders: None,
        leechers: None,
        grabs: None,
        age_days: None,
        poster: None,
        group: None,
        indexer_id: indexer.id,
        indexer_name: indexer.name.clone(),
        categories: item.all_categories(),
        download_type,
    })
}

fn torznab_candidate(item: &FeedItem, indexer: &Indexer) -> Option<ReleaseCandidate> {
    let mut candidate = base_candidate(item, indexer, DownloadType::Torrent)?;

    let seeders = item.attr("seeders").and_then(|v| v.parse::<u32>().ok());
    let peers = item.attr("peers").and_then(|v| v.parse::<u32>().ok());
    candidate.seeders = seeders;
    candidate.leechers = item
        .attr("leechers")
        .and_then(|v| v.parse::<u32>().ok())
        .or_else(|| match (peers, seeders) {
            (Some(p), Some(s)) => Some(p.saturating_sub(s)),
            _ => None,
        });

    Some(candidate)
}

fn newznab_candidate(item: &FeedItem, indexer: &Indexer) -> Option<ReleaseCandidate> {
    let mut candidate = base_candidate(item, indexer, DownloadType::Usenet)?;

    candidate.grabs = item.attr("grabs").and_then(|v| v.parse::<u32>().ok());
    candidate.poster = item.attr("poster").map(|v| v.to_string());
    candidate.group = item.attr("group").map(|v| v.to_string());
    candidate.age_days = candidate
        .published
        .map(|p| Utc::now().signed_duration_since(p).num_days().max(0) as u32);

    Some(candidate)
}

async fn fetch_caps(
    net: &SafeHttpClient,
    indexer: &Indexer,
) -> Result<Vec<CapsCategory>, SearchError> {
    let url = format!(
        "{}?t=caps&apikey={}",
        indexer.base_url.trim_end_matches('/'),
        urlencoding::encode(&indexer.api_key)
    );

    let response = net.get(&url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::ApiError(format!("HTTP {}", status)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| SearchError::ConnectionFailed(e.to_string()))?;
    parse_caps(&body)
}

#[async_trait]
impl IndexerSearchClient for TorznabClient {
    fn protocol(&self) -> IndexerProtocol {
        IndexerProtocol::Torznab
    }

    async fn search(
        &self,
        indexer: &Indexer,
        request: &SearchRequest,
    ) -> Result<Vec<ReleaseCandidate>, SearchError> {
        let items = fetch_feed(&self.search_net, indexer, request).await?;
        Ok(items
            .iter()
            .filter_map(|item| torznab_candidate(item, indexer))
            .collect())
    }

    async fn test_connection(&self, indexer: &Indexer) -> Result<(), SearchError> {
        fetch_caps(&self.caps_net, indexer).await.map(|_| ())
    }

    async fn fetch_categories(&self, indexer: &Indexer) -> Result<Vec<CapsCategory>, SearchError> {
        fetch_caps(&self.caps_net, indexer).await
    }
}

#[async_trait]
impl IndexerSearchClient for NewznabClient {
    fn protocol(&self) -> IndexerProtocol {
        IndexerProtocol::Newznab
    }

    async fn search(
        &self,
        indexer: &Indexer,
        request: &SearchRequest,
    ) -> Result<Vec<ReleaseCandidate>, SearchError> {
        let items = fetch_feed(&self.search_net, indexer, request).await?;
        Ok(items
            .iter()
            .filter_map(|item| newznab_candidate(item, indexer))
            .collect())
    }

    async fn test_connection(&self, indexer: &Indexer) -> Result<(), SearchError> {
        fetch_caps(&self.caps_net, indexer).await.map(|_| ())
    }

    async fn fetch_categories(&self, indexer: &Indexer) -> Result<Vec<CapsCategory>, SearchError> {
        fetch_caps(&self.caps_net, indexer).await
    }
}
