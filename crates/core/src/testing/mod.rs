//! Testing utilities and mock implementations.
//!
//! In-memory mocks for every external collaborator trait, so reconciliation
//! and import flows can be exercised end to end without infrastructure.

mod mock_catalog;
mod mock_download_client;
mod mock_indexer_client;
mod mock_listing;
mod mock_organizer;
mod mock_store;

pub use mock_catalog::MockMetadataCatalog;
pub use mock_download_client::{MockClientFactory, MockDownloadClient};
pub use mock_indexer_client::MockIndexerClient;
pub use mock_listing::MockListingService;
pub use mock_organizer::MockOrganizer;
pub use mock_store::MockStore;
