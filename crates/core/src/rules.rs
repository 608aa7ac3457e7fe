//! Download-filter rules.
//!
//! User-configured filter rules arrive from the store as a serialized blob.
//! The blob is validated before use; anything malformed or out of bounds
//! falls back to defaults with a warning rather than failing the search.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::indexer::ReleaseCandidate;

/// Sort order applied to filtered candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Newest publish date first.
    Date,
    /// Most seeders first (usenet results sort by grabs).
    Seeders,
    /// Largest first.
    Size,
}

/// Validated download-filter rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRules {
    /// Torrent results below this seeder count are dropped.
    #[serde(default)]
    pub min_seeders: u32,
    #[serde(default = "default_sort_key")]
    pub sort_key: SortKey,
    /// Category codes shown to the user. Empty = all.
    #[serde(default)]
    pub visible_categories: Vec<u32>,
}

fn default_sort_key() -> SortKey {
    SortKey::Date
}

impl Default for DownloadRules {
    fn default() -> Self {
        Self {
            min_seeders: 0,
            sort_key: SortKey::Date,
            visible_categories: Vec::new(),
        }
    }
}

impl DownloadRules {
    /// Parse a stored rule blob, falling back to defaults when invalid.
    pub fn from_blob(blob: Option<&serde_json::Value>) -> Self {
        let Some(value) = blob else {
            return Self::default();
        };

        match serde_json::from_value::<DownloadRules>(value.clone()) {
            Ok(rules) => {
                if rules.min_seeders > 10_000 {
                    warn!(
                        min_seeders = rules.min_seeders,
                        "Implausible min_seeders in rule blob, using defaults"
                    );
                    return Self::default();
                }
                rules
            }
            Err(e) => {
                warn!(error = %e, "Invalid download rule blob, using defaults");
                Self::default()
            }
        }
    }

    /// Whether a candidate passes the seeder floor.
    ///
    /// Usenet results carry no seeder metric and always pass.
    pub fn passes(&self, candidate: &ReleaseCandidate) -> bool {
        match candidate.seeders {
            Some(seeders) => seeders >= self.min_seeders,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{DownloadType, ReleaseCandidate};

    fn candidate(seeders: Option<u32>) -> ReleaseCandidate {
        ReleaseCandidate {
            guid: "g1".to_string(),
            title: "A Game".to_string(),
            link: "http://indexer.example/dl/1".to_string(),
            info_url: None,
            published: None,
            size_bytes: 0,
            seeders,
            leechers: None,
            grabs: None,
            age_days: None,
            poster: None,
            group: None,
            indexer_id: 1,
            indexer_name: "idx".to_string(),
            categories: vec![],
            download_type: DownloadType::Torrent,
        }
    }

    #[test]
    fn test_from_blob_none_is_default() {
        assert_eq!(DownloadRules::from_blob(None), DownloadRules::default());
    }

    #[test]
    fn test_from_blob_valid() {
        let blob = serde_json::json!({
            "min_seeders": 5,
            "sort_key": "seeders",
            "visible_categories": [4000, 4050]
        });
        let rules = DownloadRules::from_blob(Some(&blob));
        assert_eq!(rules.min_seeders, 5);
        assert_eq!(rules.sort_key, SortKey::Seeders);
        assert_eq!(rules.visible_categories, vec![4000, 4050]);
    }

    #[test]
    fn test_from_blob_invalid_falls_back() {
        let blob = serde_json::json!({"min_seeders": "lots", "sort_key": 12});
        assert_eq!(DownloadRules::from_blob(Some(&blob)), DownloadRules::default());

        let blob = serde_json::json!("not even an object");
        assert_eq!(DownloadRules::from_blob(Some(&blob)), DownloadRules::default());
    }

    #[test]
    fn test_from_blob_out_of_bounds_falls_back() {
        let blob = serde_json::json!({"min_seeders": 999_999});
        assert_eq!(DownloadRules::from_blob(Some(&blob)), DownloadRules::default());
    }

    #[test]
    fn test_passes_min_seeders() {
        let rules = DownloadRules {
            min_seeders: 3,
            ..Default::default()
        };
        assert!(rules.passes(&candidate(Some(3))));
        assert!(!rules.passes(&candidate(Some(2))));
        // Usenet candidates have no seeder metric.
        assert!(rules.passes(&candidate(None)));
    }
}
