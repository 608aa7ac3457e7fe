//! SSRF-guarded HTTP client.
//!
//! `safe_get` re-validates the destination at call time and, for plain HTTP,
//! pins the connection to the validated address: the request is sent to the
//! IP directly with the original hostname carried in the Host header, so a
//! second DNS lookup between validation and connection cannot be exploited.
//! TLS requests keep the hostname (certificate validation requires it) but
//! still validate before connecting.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::header::HOST;
use reqwest::{Client, Response};
use tracing::debug;

use super::check::resolve_safe;
use super::types::{SafeNetError, SafeTarget, SafetyPolicy};

/// HTTP client whose every request is gated by address validation.
///
/// Redirects are never followed automatically; callers that need them must
/// re-validate each hop themselves (see the downloader fetch fallback).
#[derive(Clone)]
pub struct SafeHttpClient {
    client: Client,
    policy: SafetyPolicy,
}

impl SafeHttpClient {
    pub fn new(policy: SafetyPolicy, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");
        Self { client, policy }
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    /// Validate a destination without issuing a request.
    pub async fn check(&self, url: &str) -> Result<SafeTarget, SafeNetError> {
        resolve_safe(url, &self.policy).await
    }

    /// GET a URL with validation-then-pinning semantics.
    pub async fn get(&self, url: &str) -> Result<Response, SafeNetError> {
        let target = self.check(url).await?;

        let request = if target.scheme == "http" {
            let pinned = pin_url(url, &target)?;
            debug!(host = %target.host, addr = %target.addr, "Pinning plain-HTTP request");
            self.client.get(pinned).header(HOST, host_header(&target))
        } else {
            self.client.get(url)
        };

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                SafeNetError::Timeout
            } else {
                SafeNetError::Http(e.to_string())
            }
        })
    }
}

/// Rewrite a URL's host to the validated address.
fn pin_url(url: &str, target: &SafeTarget) -> Result<reqwest::Url, SafeNetError> {
    let mut pinned =
        reqwest::Url::parse(url).map_err(|e| SafeNetError::InvalidUrl(e.to_string()))?;
    pinned
        .set_ip_host(target.addr)
        .map_err(|_| SafeNetError::InvalidUrl("cannot pin host".to_string()))?;
    Ok(pinned)
}

/// Host header value preserving the original hostname (with non-default port).
fn host_header(target: &SafeTarget) -> String {
    let default_port = if target.scheme == "https" { 443 } else { 80 };
    if target.port == default_port {
        target.host.clone()
    } else {
        format!("{}:{}", target.host, target.port)
    }
}
