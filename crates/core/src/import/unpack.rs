//! Archive extraction for imports.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::ZipArchive;

use super::types::ImportError;

/// Whether the path carries a recognized archive extension.
pub fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Extract `source` into a sibling directory and return that directory.
///
/// Entries escaping the extraction root (zip-slip) are skipped with a
/// warning. Extraction is blocking work and runs off the async runtime.
pub async fn unpack_archive(source: &Path) -> Result<PathBuf, ImportError> {
    let dest = source.with_extension("");
    let source = source.to_path_buf();
    let dest_clone = dest.clone();

    tokio::task::spawn_blocking(move || extract_zip(&source, &dest_clone))
        .await
        .map_err(|e| ImportError::Unpack(format!("Extraction task panicked: {e}")))??;

    Ok(dest)
}

fn extract_zip(source: &Path, dest: &Path) -> Result<(), ImportError> {
    let file = File::open(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ImportError::SourceMissing(source.to_path_buf()),
        _ => ImportError::Io {
            path: source.to_path_buf(),
            source: e,
        },
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| ImportError::Unpack(e.to_string()))?;

    std::fs::create_dir_all(dest).map_err(|e| ImportError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ImportError::Unpack(e.to_string()))?;

        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!(entry = entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ImportError::Io {
                path: out_path.clone(),
                source: e,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ImportError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut out = File::create(&out_path).map_err(|e| ImportError::Io {
            path: out_path.clone(),
            source: e,
        })?;
        io::copy(&mut entry, &mut out).map_err(|e| ImportError::Io {
            path: out_path.clone(),
            source: e,
        })?;
        debug!(path = %out_path.display(), "Extracted archive entry");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_test_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("game/readme.txt", FileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("/downloads/game.zip")));
        assert!(is_archive(Path::new("/downloads/game.ZIP")));
        assert!(!is_archive(Path::new("/downloads/game.iso")));
        assert!(!is_archive(Path::new("/downloads/game")));
    }

    #[tokio::test]
    async fn test_unpack_into_sibling_directory() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("game.zip");
        write_test_zip(&archive);

        let dest = unpack_archive(&archive).await.unwrap();
        assert_eq!(dest, temp.path().join("game"));
        let content = std::fs::read_to_string(dest.join("game/readme.txt")).unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn test_unpack_missing_source() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.zip");
        let err = unpack_archive(&missing).await.unwrap_err();
        assert!(matches!(err, ImportError::SourceMissing(_)));
    }
}
