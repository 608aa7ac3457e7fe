//! Mock metadata catalog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::store::{CatalogError, MetadataCatalog};

/// Mock implementation of [`MetadataCatalog`].
#[derive(Debug, Default)]
pub struct MockMetadataCatalog {
    dates: Arc<RwLock<HashMap<i64, Option<DateTime<Utc>>>>>,
    error: Arc<RwLock<Option<String>>>,
}

impl MockMetadataCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_release_date(&self, external_id: i64, date: Option<DateTime<Utc>>) {
        self.dates.write().await.insert(external_id, date);
    }

    pub async fn fail_with(&self, message: &str) {
        *self.error.write().await = Some(message.to_string());
    }
}

#[async_trait]
impl MetadataCatalog for MockMetadataCatalog {
    async fn release_dates(
        &self,
        external_ids: &[i64],
    ) -> Result<HashMap<i64, Option<DateTime<Utc>>>, CatalogError> {
        if let Some(message) = self.error.read().await.as_ref() {
            return Err(CatalogError::Unavailable(message.clone()));
        }
        let dates = self.dates.read().await;
        Ok(external_ids
            .iter()
            .filter_map(|id| dates.get(id).map(|d| (*id, *d)))
            .collect())
    }
}
