use serde::{Deserialize, Serialize};

use crate::import::ImportConfig;
use crate::safenet::SafetyPolicy;
use crate::scheduler::SchedulerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub import: ImportConfig,
    /// Third-party newest-releases listing service (optional).
    #[serde(default)]
    pub listing: Option<ListingConfig>,
}

/// Outbound network policy and timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Allow destinations on private/loopback ranges (typical home-lab
    /// setups run indexers and download clients there).
    #[serde(default = "default_true")]
    pub allow_private: bool,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl NetworkConfig {
    /// Address-validation policy derived from this config.
    pub fn policy(&self) -> SafetyPolicy {
        if self.allow_private {
            SafetyPolicy::default()
        } else {
            SafetyPolicy::strict()
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            allow_private: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

/// Third-party listing service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListingConfig {
    /// Listing API base URL
    pub url: String,
    pub api_key: String,
    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_listing_timeout")]
    pub timeout_secs: u64,
}

fn default_listing_timeout() -> u64 {
    10
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub network: NetworkConfig,
    pub scheduler: SchedulerConfig,
    pub import: ImportConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<SanitizedListingConfig>,
}

/// Sanitized listing config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedListingConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            network: config.network.clone(),
            scheduler: config.scheduler.clone(),
            import: config.import.clone(),
            listing: config.listing.as_ref().map(|l| SanitizedListingConfig {
                url: l.url.clone(),
                api_key_configured: !l.api_key.is_empty(),
                timeout_secs: l.timeout_secs,
            }),
        }
    }
}
