//! Mock library-organization service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::{OrganizerError, OrganizerService};

/// Mock implementation of [`OrganizerService`].
#[derive(Debug)]
pub struct MockOrganizer {
    available: AtomicBool,
    rescans: Arc<RwLock<Vec<String>>>,
}

impl Default for MockOrganizer {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            rescans: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl MockOrganizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Platform slugs rescans were requested for.
    pub async fn rescans(&self) -> Vec<String> {
        self.rescans.read().await.clone()
    }
}

#[async_trait]
impl OrganizerService for MockOrganizer {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn trigger_rescan(&self, platform_slug: &str) -> Result<(), OrganizerError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(OrganizerError::Unavailable("mock offline".to_string()));
        }
        self.rescans.write().await.push(platform_slug.to_string());
        Ok(())
    }
}
