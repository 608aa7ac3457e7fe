//! Post-download import pipeline.
//!
//! Translates backend-reported paths to local ones, optionally unpacks
//! archives, plans a destination per strategy and executes the move, with a
//! manual-review escape hatch for anything ambiguous.

mod config;
mod manager;
mod path_map;
mod strategy;
mod types;
mod unpack;

pub use config::{ImportConfig, PathMapping};
pub use manager::ImportManager;
pub use path_map::map_remote_path;
pub use strategy::{plan_import, platform_slug};
pub use types::{ImportError, ImportPlan, ImportStrategyKind};
pub use unpack::{is_archive, unpack_archive};
