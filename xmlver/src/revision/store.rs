//! The revision store protocol.

use crate::error::Result;

/// Queries over the stored revisions of documents.
///
/// `key` is the session key a client received together with the revision it
/// started editing from. A revision stored without a key never conflicts.
pub trait RevisionStore: Send + Sync {
    /// Highest stored revision of `path`, 0 if there is none.
    fn current_revision(&self, path: &str) -> Result<u64>;

    /// Whether a revision newer than `base_revision` was stored under a key
    /// other than `key`.
    fn newer_revision_exists(&self, path: &str, base_revision: u64, key: &str) -> Result<bool>;

    /// The revision a client holding `key` last wrote: the newest revision
    /// after `base_revision` stored with `key`, else `base_revision` itself if
    /// it is stored, else 0.
    fn base_revision_for(&self, path: &str, base_revision: u64, key: &str) -> Result<u64>;
}
