//! Import strategy selection and destination planning.
//!
//! Two strategies: the structured ("romm") layout files a release under a
//! per-platform directory when the game's platform maps to a known slug; the
//! generic ("pc") layout files it under a per-title directory. A plan that
//! cannot be made confidently comes back flagged for manual review instead
//! of guessing.

use std::path::Path;

use crate::store::Game;

use super::config::ImportConfig;
use super::types::{ImportPlan, ImportStrategyKind};

/// Map a stored platform name to the organization-target platform slug.
pub fn platform_slug(platform: &str) -> Option<&'static str> {
    let normalized = platform.trim().to_lowercase();
    Some(match normalized.as_str() {
        "nes" | "nintendo entertainment system" => "nes",
        "snes" | "super nintendo" | "super nintendo entertainment system" => "snes",
        "nintendo 64" | "n64" => "n64",
        "gamecube" | "nintendo gamecube" => "ngc",
        "wii" | "nintendo wii" => "wii",
        "game boy" => "gb",
        "game boy color" => "gbc",
        "game boy advance" | "gba" => "gba",
        "nintendo ds" | "nds" => "nds",
        "nintendo 3ds" | "3ds" => "3ds",
        "nintendo switch" | "switch" => "switch",
        "playstation" | "psx" | "ps1" => "psx",
        "playstation 2" | "ps2" => "ps2",
        "playstation 3" | "ps3" => "ps3",
        "playstation portable" | "psp" => "psp",
        "playstation vita" | "ps vita" => "psvita",
        "xbox" => "xbox",
        "xbox 360" => "xbox360",
        "sega genesis" | "mega drive" | "sega mega drive" => "genesis",
        "sega saturn" => "saturn",
        "dreamcast" | "sega dreamcast" => "dc",
        "sega master system" => "sms",
        _ => return None,
    })
}

/// Propose an import plan for a resolved local source path.
pub fn plan_import(config: &ImportConfig, game: &Game, source: &Path) -> ImportPlan {
    let slug = game.platform.as_deref().and_then(platform_slug);

    let (strategy, base, platform_slug) = match slug {
        Some(slug) => (
            ImportStrategyKind::Romm,
            config.romm_root.join(slug),
            Some(slug.to_string()),
        ),
        None => (
            ImportStrategyKind::Pc,
            config.library_root.join(sanitize_title(&game.title)),
            None,
        ),
    };

    let mut plan = ImportPlan {
        strategy,
        source: source.to_path_buf(),
        destination: base.clone(),
        needs_review: false,
        review_reason: None,
        delete_source: config.delete_source,
        platform_slug,
    };

    let Some(file_name) = source.file_name() else {
        plan.needs_review = true;
        plan.review_reason = Some(format!(
            "Cannot derive a file name from source path '{}'",
            source.display()
        ));
        return plan;
    };
    plan.destination = base.join(file_name);

    if plan.destination.exists() && !config.overwrite {
        plan.needs_review = true;
        plan.review_reason = Some(format!(
            "Destination '{}' already exists and overwriting is disabled",
            plan.destination.display()
        ));
    }

    plan
}

/// Strip path separators and control characters from a title used as a
/// directory name.
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GameStatus, ReleaseState};
    use std::path::PathBuf;

    fn game(title: &str, platform: Option<&str>) -> Game {
        Game {
            id: 1,
            title: title.to_string(),
            platform: platform.map(|p| p.to_string()),
            external_id: None,
            status: GameStatus::Owned,
            release_date: None,
            first_seen_release_date: None,
            release_state: ReleaseState::Released,
        }
    }

    fn config() -> ImportConfig {
        ImportConfig {
            library_root: PathBuf::from("/library"),
            romm_root: PathBuf::from("/roms"),
            ..Default::default()
        }
    }

    #[test]
    fn test_platform_slug_lookup() {
        assert_eq!(platform_slug("PlayStation 2"), Some("ps2"));
        assert_eq!(platform_slug("  game boy advance "), Some("gba"));
        assert_eq!(platform_slug("Mega Drive"), Some("genesis"));
        assert_eq!(platform_slug("Windows"), None);
        assert_eq!(platform_slug(""), None);
    }

    #[test]
    fn test_known_platform_uses_structured_strategy() {
        let plan = plan_import(
            &config(),
            &game("Gran Turismo 3", Some("PlayStation 2")),
            Path::new("/downloads/gt3.iso"),
        );
        assert_eq!(plan.strategy, ImportStrategyKind::Romm);
        assert_eq!(plan.destination, PathBuf::from("/roms/ps2/gt3.iso"));
        assert_eq!(plan.platform_slug.as_deref(), Some("ps2"));
        assert!(!plan.needs_review);
    }

    #[test]
    fn test_unknown_platform_uses_generic_strategy() {
        let plan = plan_import(
            &config(),
            &game("Some Game", Some("Windows")),
            Path::new("/downloads/some-game"),
        );
        assert_eq!(plan.strategy, ImportStrategyKind::Pc);
        assert_eq!(
            plan.destination,
            PathBuf::from("/library/Some Game/some-game")
        );
        assert!(plan.platform_slug.is_none());
    }

    #[test]
    fn test_existing_destination_needs_review() {
        let temp = tempfile::TempDir::new().unwrap();
        let existing = temp.path().join("Some Game").join("game.iso");
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"old").unwrap();

        let mut cfg = config();
        cfg.library_root = temp.path().to_path_buf();
        let plan = plan_import(&cfg, &game("Some Game", None), Path::new("/dl/game.iso"));
        assert!(plan.needs_review);
        assert!(plan.review_reason.as_deref().unwrap().contains("already exists"));

        cfg.overwrite = true;
        let plan = plan_import(&cfg, &game("Some Game", None), Path::new("/dl/game.iso"));
        assert!(!plan.needs_review);
    }

    #[test]
    fn test_sanitize_title_strips_separators() {
        assert_eq!(sanitize_title("Ico / Shadow"), "Ico _ Shadow");
        assert_eq!(sanitize_title("Half-Life 2: Episode One"), "Half-Life 2_ Episode One");
    }
}
