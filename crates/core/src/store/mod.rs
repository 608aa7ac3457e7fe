//! Domain types and external collaborator boundaries.
//!
//! The store itself (CRUD repository), the metadata catalog and the
//! organization service are external to this crate; only their traits and
//! the entities they exchange live here.

mod traits;
mod types;

pub use traits::*;
pub use types::*;
