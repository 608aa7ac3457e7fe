//! Remote→local path translation.

use std::path::PathBuf;

use super::config::PathMapping;

/// Translate a path as reported by a download client into a local path.
///
/// The longest matching remote prefix wins; a path no mapping covers is used
/// as-is (client and importer sharing a filesystem view).
pub fn map_remote_path(mappings: &[PathMapping], remote: &str) -> PathBuf {
    let mut best: Option<&PathMapping> = None;
    for mapping in mappings {
        if !remote.starts_with(&mapping.remote) {
            continue;
        }
        // Prefix must end on a path boundary.
        let rest = &remote[mapping.remote.len()..];
        if !(rest.is_empty() || rest.starts_with('/') || mapping.remote.ends_with('/')) {
            continue;
        }
        if best.map_or(true, |b| mapping.remote.len() > b.remote.len()) {
            best = Some(mapping);
        }
    }

    match best {
        Some(mapping) => {
            let rest = remote[mapping.remote.len()..].trim_start_matches('/');
            if rest.is_empty() {
                mapping.local.clone()
            } else {
                mapping.local.join(rest)
            }
        }
        None => PathBuf::from(remote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(remote: &str, local: &str) -> PathMapping {
        PathMapping {
            remote: remote.to_string(),
            local: PathBuf::from(local),
        }
    }

    #[test]
    fn test_unmapped_path_passes_through() {
        assert_eq!(
            map_remote_path(&[], "/downloads/game.zip"),
            PathBuf::from("/downloads/game.zip")
        );
    }

    #[test]
    fn test_simple_prefix_rewrite() {
        let mappings = vec![mapping("/downloads", "/mnt/nas/downloads")];
        assert_eq!(
            map_remote_path(&mappings, "/downloads/game.zip"),
            PathBuf::from("/mnt/nas/downloads/game.zip")
        );
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mappings = vec![
            mapping("/downloads", "/mnt/a"),
            mapping("/downloads/games", "/mnt/b"),
        ];
        assert_eq!(
            map_remote_path(&mappings, "/downloads/games/x.zip"),
            PathBuf::from("/mnt/b/x.zip")
        );
        assert_eq!(
            map_remote_path(&mappings, "/downloads/other/x.zip"),
            PathBuf::from("/mnt/a/other/x.zip")
        );
    }

    #[test]
    fn test_prefix_respects_path_boundary() {
        // "/downloads2" must not match the "/downloads" mapping.
        let mappings = vec![mapping("/downloads", "/mnt/a")];
        assert_eq!(
            map_remote_path(&mappings, "/downloads2/x.zip"),
            PathBuf::from("/downloads2/x.zip")
        );
    }

    #[test]
    fn test_exact_prefix_match() {
        let mappings = vec![mapping("/downloads", "/mnt/a")];
        assert_eq!(map_remote_path(&mappings, "/downloads"), PathBuf::from("/mnt/a"));
    }
}
