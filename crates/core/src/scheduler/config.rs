//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Intervals and thresholds for the four reconciliation loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Release-update check interval (daily).
    pub release_check_interval_secs: u64,
    /// Download-status check interval.
    pub download_check_interval_secs: u64,
    /// Auto-search check interval (per-user gating applies on top).
    pub auto_search_interval_secs: u64,
    /// Third-party listing check interval.
    pub listing_check_interval_secs: u64,
    /// Days a release date may slip past the first-observed date before the
    /// game is flagged delayed.
    pub delay_threshold_days: i64,
    /// Newest remote releases fetched per listing check.
    pub listing_window: u32,
    /// Listing service quota, requests per minute.
    pub listing_rate_limit_rpm: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            release_check_interval_secs: 86_400,
            download_check_interval_secs: 60,
            auto_search_interval_secs: 3_600,
            listing_check_interval_secs: 21_600,
            delay_threshold_days: 7,
            listing_window: 100,
            listing_rate_limit_rpm: 4,
        }
    }
}
