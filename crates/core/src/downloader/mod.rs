//! Download-client backend adapters.
//!
//! Five backends behind the one [`DownloadClient`] contract. The add flow
//! (magnet direct, server-side URL add, client-side fetch with bounded
//! redirect following) is shared in [`fetch`]; adapters only supply the
//! wire-format primitives.

mod deluge;
mod fetch;
mod nzbget;
mod qbittorrent;
mod sabnzbd;
mod torrent_file;
mod transmission;
mod types;

use std::sync::Arc;

use crate::safenet::SafetyPolicy;
use crate::store::{Downloader, DownloaderKind};

pub use deluge::DelugeClient;
pub use fetch::{
    add_download_with_fallback, extract_hash_from_magnet, is_magnet, resolve_link, AddBackend,
    FetchedLink, TransferKind,
};
pub use nzbget::NzbgetClient;
pub use qbittorrent::QBittorrentClient;
pub use sabnzbd::SabnzbdClient;
pub use torrent_file::{parse_torrent_meta, TorrentMeta};
pub use transmission::TransmissionClient;
pub use types::{
    AddRequest, AddedDownload, DownloadClient, DownloadClientError, DownloadItem, DownloadStatus,
};

/// Instantiate the adapter for a configured backend.
pub fn client_for(config: Downloader, policy: SafetyPolicy) -> Arc<dyn DownloadClient> {
    match config.kind {
        DownloaderKind::QBittorrent => Arc::new(QBittorrentClient::new(config, policy)),
        DownloaderKind::Transmission => Arc::new(TransmissionClient::new(config, policy)),
        DownloaderKind::Deluge => Arc::new(DelugeClient::new(config, policy)),
        DownloaderKind::Sabnzbd => Arc::new(SabnzbdClient::new(config, policy)),
        DownloaderKind::Nzbget => Arc::new(NzbgetClient::new(config, policy)),
    }
}
