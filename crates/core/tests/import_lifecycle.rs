//! Import manager lifecycle integration tests.
//!
//! Exercise the full completed→imported path against real temp-dir
//! filesystems: remote path mapping, optional unpacking, strategy planning,
//! manual-review parking plus confirmation, and the organizer rescan hook.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use arcadia_core::downloader::{DownloadItem, DownloadStatus};
use arcadia_core::import::{ImportConfig, ImportManager, ImportPlan, ImportStrategyKind, PathMapping};
use arcadia_core::store::{
    DownloadProtocol, Downloader, DownloaderKind, Game, GameStatus, ReleaseState, TrackedDownload,
    TrackedDownloadStatus,
};
use arcadia_core::testing::{MockClientFactory, MockDownloadClient, MockOrganizer, MockStore};

struct TestHarness {
    temp: TempDir,
    store: Arc<MockStore>,
    client: Arc<MockDownloadClient>,
    organizer: Arc<MockOrganizer>,
    manager: ImportManager,
}

impl TestHarness {
    /// Harness with downloads under `<temp>/downloads` (the client reports
    /// them as `/remote/downloads`), libraries under `<temp>/library` and
    /// `<temp>/roms`.
    async fn new(mutate: impl FnOnce(&mut ImportConfig)) -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("downloads")).unwrap();

        let mut config = ImportConfig {
            library_root: temp.path().join("library"),
            romm_root: temp.path().join("roms"),
            path_mappings: vec![PathMapping {
                remote: "/remote/downloads".to_string(),
                local: temp.path().join("downloads"),
            }],
            ..Default::default()
        };
        mutate(&mut config);

        let store = Arc::new(MockStore::new());
        store
            .add_downloader(Downloader {
                id: 1,
                name: "qb".to_string(),
                kind: DownloaderKind::QBittorrent,
                url: "http://qb.local:8080".to_string(),
                username: None,
                password: None,
                api_key: None,
                category: None,
                add_paused: false,
                remove_completed: false,
                enabled: true,
                priority: 0,
                settings: serde_json::Value::Null,
            })
            .await;

        let client = Arc::new(MockDownloadClient::new());
        let organizer = Arc::new(MockOrganizer::new());
        let manager = ImportManager::new(
            store.clone(),
            Some(organizer.clone()),
            Arc::new(MockClientFactory::new(client.clone())),
            config,
        );

        Self {
            temp,
            store,
            client,
            organizer,
            manager,
        }
    }

    async fn add_game(&self, title: &str, platform: Option<&str>) {
        self.store
            .add_game(Game {
                id: 1,
                title: title.to_string(),
                platform: platform.map(|p| p.to_string()),
                external_id: None,
                status: GameStatus::Owned,
                release_date: None,
                first_seen_release_date: None,
                release_state: ReleaseState::Released,
            })
            .await;
    }

    /// Seed a completed download whose payload lives at
    /// `<temp>/downloads/<file>`, reported remotely as
    /// `/remote/downloads/<file>`.
    async fn add_completed_download(&self, file: &str, contents: &[u8]) -> PathBuf {
        let local = self.temp.path().join("downloads").join(file);
        std::fs::write(&local, contents).unwrap();
        self.seed_download(Some(format!("/remote/downloads/{file}")))
            .await;
        local
    }

    async fn seed_download(&self, remote_path: Option<String>) {
        self.store
            .add_download(TrackedDownload {
                id: 1,
                game_id: 1,
                downloader_id: 1,
                protocol: DownloadProtocol::Torrent,
                hash: "cafe01".to_string(),
                title: "Test Release".to_string(),
                status: TrackedDownloadStatus::Completed,
                created_at: Utc::now(),
            })
            .await;
        self.client
            .set_item(DownloadItem {
                id: "cafe01".to_string(),
                hash: Some("cafe01".to_string()),
                name: "Test Release".to_string(),
                status: DownloadStatus::Completed,
                progress: 1.0,
                size_bytes: 1024,
                added_at: Some(Utc::now()),
                remote_path,
            })
            .await;
    }

    async fn status(&self) -> TrackedDownloadStatus {
        self.store.download(1).await.unwrap().status
    }
}

#[tokio::test]
async fn test_structured_import_with_rescan() {
    let h = TestHarness::new(|_| {}).await;
    h.add_game("Gran Turismo 3", Some("PlayStation 2")).await;
    let source = h.add_completed_download("gt3.iso", b"iso-data").await;

    h.manager.process(1).await.unwrap();

    assert_eq!(h.status().await, TrackedDownloadStatus::Imported);
    assert_eq!(h.store.game(1).await.unwrap().status, GameStatus::Completed);

    let dest = h.temp.path().join("roms/ps2/gt3.iso");
    assert_eq!(std::fs::read(&dest).unwrap(), b"iso-data");
    // delete_source defaults off: the download payload is kept for seeding.
    assert!(source.exists());

    assert_eq!(h.organizer.rescans().await, vec!["ps2".to_string()]);
    assert!(h
        .store
        .notifications()
        .await
        .iter()
        .any(|n| n.title == "Import complete"));
}

#[tokio::test]
async fn test_generic_import_moves_when_delete_source() {
    let h = TestHarness::new(|c| c.delete_source = true).await;
    h.add_game("Some Game", Some("Windows")).await;
    let source = h.add_completed_download("game.bin", b"payload").await;

    h.manager.process(1).await.unwrap();

    assert_eq!(h.status().await, TrackedDownloadStatus::Imported);
    assert!(!source.exists());
    let dest = h.temp.path().join("library/Some Game/game.bin");
    assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    // No platform slug, so no rescan.
    assert!(h.organizer.rescans().await.is_empty());
}

#[tokio::test]
async fn test_auto_unpack_extracts_archive_before_planning() {
    let h = TestHarness::new(|_| {}).await;
    h.add_game("Some Game", None).await;

    let mut buffer = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
        writer
            .start_file("game.iso", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"inner").unwrap();
        writer.finish().unwrap();
    }
    h.add_completed_download("game.zip", &buffer).await;

    h.manager.process(1).await.unwrap();

    assert_eq!(h.status().await, TrackedDownloadStatus::Imported);
    // The extraction directory is what gets imported, not the archive.
    let dest = h.temp.path().join("library/Some Game/game");
    assert_eq!(std::fs::read(dest.join("game.iso")).unwrap(), b"inner");
}

#[tokio::test]
async fn test_disabled_auto_unpack_imports_archive_untouched() {
    let h = TestHarness::new(|c| c.auto_unpack = false).await;
    h.add_game("Some Game", None).await;
    // Not a valid archive; any extraction attempt would fail the import.
    let source = h.add_completed_download("game.zip", b"not a zip").await;

    h.manager.process(1).await.unwrap();

    assert_eq!(h.status().await, TrackedDownloadStatus::Imported);
    let dest = h.temp.path().join("library/Some Game/game.zip");
    assert_eq!(std::fs::read(&dest).unwrap(), b"not a zip");
    assert!(!source.with_extension("").exists());
}

#[tokio::test]
async fn test_conflicting_destination_parks_for_review_then_confirms() {
    let h = TestHarness::new(|_| {}).await;
    h.add_game("Some Game", None).await;
    h.add_completed_download("game.iso", b"new").await;

    let existing = h.temp.path().join("library/Some Game/game.iso");
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, b"old").unwrap();

    h.manager.process(1).await.unwrap();

    // Parked, nothing touched.
    assert_eq!(h.status().await, TrackedDownloadStatus::ManualReviewRequired);
    assert_eq!(std::fs::read(&existing).unwrap(), b"old");
    assert!(h
        .store
        .notifications()
        .await
        .iter()
        .any(|n| n.title == "Import needs review"));

    // A human picks a new destination; the source is re-resolved through
    // the download client.
    let plan = ImportPlan {
        strategy: ImportStrategyKind::Pc,
        source: PathBuf::new(),
        destination: h.temp.path().join("library/Some Game/game (alt).iso"),
        needs_review: false,
        review_reason: None,
        delete_source: false,
        platform_slug: None,
    };
    h.manager.confirm_manual(1, plan).await.unwrap();

    assert_eq!(h.status().await, TrackedDownloadStatus::Imported);
    assert_eq!(
        std::fs::read(h.temp.path().join("library/Some Game/game (alt).iso")).unwrap(),
        b"new"
    );
    assert_eq!(std::fs::read(&existing).unwrap(), b"old");
}

#[tokio::test]
async fn test_disabled_import_leaves_download_completed() {
    let h = TestHarness::new(|c| c.enabled = false).await;
    h.add_game("Some Game", None).await;
    h.add_completed_download("game.iso", b"data").await;

    h.manager.process(1).await.unwrap();

    assert_eq!(h.status().await, TrackedDownloadStatus::Completed);
    assert!(!h.temp.path().join("library").exists());
    assert!(h.store.notifications().await.is_empty());
}

#[tokio::test]
async fn test_missing_remote_path_fails_the_import() {
    let h = TestHarness::new(|_| {}).await;
    h.add_game("Some Game", None).await;
    h.seed_download(None).await;

    let err = h.manager.process(1).await.unwrap_err();
    assert!(matches!(
        err,
        arcadia_core::import::ImportError::SourceMissing(_)
    ));

    assert_eq!(h.status().await, TrackedDownloadStatus::Error);
    assert!(h
        .store
        .notifications()
        .await
        .iter()
        .any(|n| n.title == "Import failed"));
}

#[tokio::test]
async fn test_unavailable_organizer_does_not_fail_import() {
    let h = TestHarness::new(|_| {}).await;
    h.organizer.set_available(false);
    h.add_game("Gran Turismo 3", Some("PlayStation 2")).await;
    h.add_completed_download("gt3.iso", b"iso").await;

    h.manager.process(1).await.unwrap();

    assert_eq!(h.status().await, TrackedDownloadStatus::Imported);
    assert!(h.organizer.rescans().await.is_empty());
}
