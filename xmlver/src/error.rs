//! Error types for xmlver.

use thiserror::Error;

use crate::node::NodeAddress;

/// Result type alias for xmlver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while diffing, patching or recording revisions.
#[derive(Error, Debug)]
pub enum Error {
    /// XML parsing error.
    #[error("XML parse error: {0}")]
    Parse(String),

    /// XML error from quick-xml.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A node address string could not be parsed.
    #[error("invalid node address: {0:?}")]
    InvalidAddress(String),

    /// The edit script does not follow the versioning vocabulary.
    #[error("malformed edit script: {0}")]
    MalformedEditScript(String),

    /// An operation references a node that never appeared in the base stream.
    #[error("unresolvable reference: no node {0} in base revision")]
    UnresolvableReference(NodeAddress),

    /// A diff node was built with a payload that does not fit its kind.
    #[error("ambiguous diff node: {kind} cannot carry a {payload} payload")]
    AmbiguousConstruction {
        kind: &'static str,
        payload: &'static str,
    },

    /// Writing an edit script or patched document failed.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A newer revision written under another session key exists.
    #[error("possible version conflict detected for document {path} (base revision {base_revision})")]
    ConflictDetected { path: String, base_revision: u64 },

    /// An API was used out of order.
    #[error("usage error: {0}")]
    Usage(&'static str),

    /// The requested revision records the removal of the document.
    #[error("document {path} was removed in revision {revision}")]
    DocumentRemoved { path: String, revision: u64 },

    /// A new revision number could not be allocated.
    #[error("revision allocation failed: {0}")]
    Allocation(String),

    /// No history exists for the document.
    #[error("no revision history for document {0}")]
    UnknownDocument(String),

    /// The document has no revision with this number.
    #[error("document {path} has no revision {revision}")]
    UnknownRevision { path: String, revision: u64 },
}
