pub mod config;
pub mod downloader;
pub mod import;
pub mod indexer;
pub mod metrics;
pub mod rules;
pub mod safenet;
pub mod scheduler;
pub mod store;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
