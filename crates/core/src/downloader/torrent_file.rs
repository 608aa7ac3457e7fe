//! Transfer-description file parsing.
//!
//! Uses librqbit-core to parse bencoded .torrent data and recover the
//! info hash and display name without touching the swarm.

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};

use super::types::DownloadClientError;

/// Hash and name recovered from a .torrent file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMeta {
    /// Lowercase hex info hash.
    pub hash: String,
    pub name: Option<String>,
}

/// Parse raw .torrent bytes into hash and name.
pub fn parse_torrent_meta(bytes: &[u8]) -> Result<TorrentMeta, DownloadClientError> {
    let torrent: TorrentMetaV1Owned =
        torrent_from_bytes(bytes).map_err(|e| DownloadClientError::InvalidFile(e.to_string()))?;

    let name = torrent
        .info
        .name
        .as_ref()
        .map(|b| String::from_utf8_lossy(b.as_ref()).into_owned());

    Ok(TorrentMeta {
        hash: torrent.info_hash.as_string(),
        name,
    })
}
