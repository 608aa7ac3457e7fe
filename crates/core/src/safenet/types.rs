//! Types for the safe-network layer.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by address validation and safe requests.
///
/// Every variant fails closed: a URL that cannot be proven safe is rejected.
#[derive(Debug, Error)]
pub enum SafeNetError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("DNS resolution failed for {host}: {reason}")]
    DnsFailed { host: String, reason: String },

    #[error("DNS returned no addresses for {0}")]
    NoAddresses(String),

    #[error("unsafe URL blocked: {host} resolves to {addr}")]
    UnsafeAddress { host: String, addr: IpAddr },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timeout")]
    Timeout,
}

/// Controls which address classes are considered safe.
///
/// Metadata and link-local ranges are rejected unconditionally; this policy
/// only governs private/loopback ranges, which are allowed by default because
/// the system is expected to reach self-hosted backends on a private network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SafetyPolicy {
    /// Allow RFC1918, loopback and unique-local destinations.
    pub allow_private: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            allow_private: true,
        }
    }
}

impl SafetyPolicy {
    /// Policy that also rejects private and loopback ranges.
    pub fn strict() -> Self {
        Self {
            allow_private: false,
        }
    }
}

/// A destination whose every resolved address passed validation.
#[derive(Debug, Clone)]
pub struct SafeTarget {
    /// Scheme of the original URL ("http" or "https").
    pub scheme: String,
    /// Original hostname (preserved for Host headers and TLS).
    pub host: String,
    pub port: u16,
    /// The validated address the connection is pinned to.
    pub addr: IpAddr,
}
