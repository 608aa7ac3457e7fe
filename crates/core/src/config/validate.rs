use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Scheduler intervals and listing window are non-zero
/// - Listing section, when present, has a URL and API key
/// - Import roots are set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let scheduler = &config.scheduler;
    if scheduler.release_check_interval_secs == 0
        || scheduler.download_check_interval_secs == 0
        || scheduler.auto_search_interval_secs == 0
        || scheduler.listing_check_interval_secs == 0
    {
        return Err(ConfigError::ValidationError(
            "scheduler intervals cannot be 0".to_string(),
        ));
    }
    if scheduler.listing_window == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.listing_window cannot be 0".to_string(),
        ));
    }
    if scheduler.listing_rate_limit_rpm == 0 {
        return Err(ConfigError::ValidationError(
            "scheduler.listing_rate_limit_rpm cannot be 0".to_string(),
        ));
    }

    if let Some(listing) = &config.listing {
        if listing.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "listing.url cannot be empty".to_string(),
            ));
        }
        if listing.api_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "listing.api_key cannot be empty".to_string(),
            ));
        }
    }

    if config.import.enabled {
        if config.import.library_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "import.library_root cannot be empty".to_string(),
            ));
        }
        if config.import.romm_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "import.romm_root cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}
