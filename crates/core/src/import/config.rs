//! Configuration for the import manager.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One remote→local path translation entry.
///
/// Download clients report paths from their own filesystem view; when they
/// run on another host (or in a container) those paths must be rewritten to
/// where this process sees the same data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    /// Path prefix as the download client reports it.
    pub remote: String,
    /// Equivalent local prefix.
    pub local: PathBuf,
}

/// Configuration for post-download processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Master switch; disabled means downloads stop at `completed`.
    pub enabled: bool,
    /// Extract recognized archives before importing.
    pub auto_unpack: bool,
    /// Allow replacing an existing file at the destination.
    pub overwrite: bool,
    /// Remove the source after a successful import.
    pub delete_source: bool,
    /// Root of the generic PC game library.
    pub library_root: PathBuf,
    /// Root of the structured (per-platform) rom library.
    pub romm_root: PathBuf,
    /// Remote→local prefix translations, longest prefix wins.
    pub path_mappings: Vec<PathMapping>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_unpack: true,
            overwrite: false,
            delete_source: false,
            library_root: PathBuf::from("/data/library"),
            romm_root: PathBuf::from("/data/roms"),
            path_mappings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert!(config.enabled);
        assert!(config.auto_unpack);
        assert!(!config.overwrite);
        assert!(!config.delete_source);
        assert!(config.path_mappings.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ImportConfig = toml::from_str(
            r#"
            auto_unpack = false

            [[path_mappings]]
            remote = "/downloads"
            local = "/mnt/downloads"
            "#,
        )
        .unwrap();
        assert!(config.enabled);
        assert!(!config.auto_unpack);
        assert_eq!(config.path_mappings.len(), 1);
        assert_eq!(config.path_mappings[0].remote, "/downloads");
    }
}
