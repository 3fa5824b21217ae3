//! Revision services: numbering, history and conflict detection.
//!
//! A [`VersionHistory`] keeps, per document path, a base copy and the chain
//! of edit scripts recorded since. Revision numbers come from an injected
//! [`RevisionAllocator`]. The history answers the [`RevisionStore`] queries
//! used to detect concurrent writes.

mod allocator;
mod config;
mod history;
mod store;

pub use allocator::{FileRevisionCounter, MemoryRevisionCounter, RevisionAllocator};
pub use config::VersioningConfig;
pub use history::{StoredDocument, VersionHistory};
pub use store::RevisionStore;
