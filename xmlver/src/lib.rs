//! xmlver - structural revisions of XML documents
//!
//! This library computes edit scripts between two revisions of an XML
//! document, replays them to reconstruct a revision, and annotates a revision
//! with the changes that produced the next one.
//!
//! # Overview
//!
//! Every node of a revision, attributes included, is addressed by a
//! [`NodeAddress`] in dynamic level numbering. The [`Diff`] engine walks both
//! revisions sibling by sibling and emits [`Difference`]s anchored at base
//! addresses. Differences are persisted as a `v:version` document in the
//! `http://exist-db.org/versioning` namespace, read back as an
//! [`EditScript`], and applied in one forward pass by [`Patch`].
//!
//! A [`VersionHistory`] stores a base copy plus the forward chain of scripts
//! per document, allocates revision numbers through a [`RevisionAllocator`]
//! and rejects writes based on a revision another session has replaced.
//!
//! # Example
//!
//! ```
//! use xmlver::{Diff, Document, DocumentBuilder, EditScript, Patch, VersionProperties, XmlWriter};
//!
//! let base = Document::parse_str("<a><b>1</b></a>").unwrap();
//! let target = Document::parse_str("<a><c>1</c></a>").unwrap();
//!
//! let mut diff = Diff::default();
//! diff.diff(&base, &target).unwrap();
//! let mut writer = XmlWriter::new(Vec::new());
//! diff.write_xml(&mut writer, &VersionProperties::new("/db/a.xml", 1, "admin"))
//!     .unwrap();
//! let script = String::from_utf8(writer.finish().unwrap()).unwrap();
//!
//! let script = EditScript::parse_str(&script).unwrap();
//! let mut patched = DocumentBuilder::new();
//! Patch::new(&script).unwrap().patch(base.stream(), &mut patched).unwrap();
//! assert_eq!(
//!     patched.finish().unwrap().to_xml_string().unwrap(),
//!     target.to_xml_string().unwrap()
//! );
//! ```

pub mod constants;
pub mod diff;
pub mod error;
pub mod node;
pub mod revision;
pub mod xml;

pub use constants::*;
pub use error::{Error, Result};
pub use node::{
    DiffNode, Document, NodeAddress, NodeKind, Payload, QName, XmlAttribute, XmlContent,
    XmlElement, XmlText,
};
pub use xml::{
    copy_stream, DocumentBuilder, EventKind, EventSink, NodeStream, ParseFlags, StreamEvent,
    XmlStreamReader, XmlWriter, XmlWriterOptions,
};

pub use diff::{
    Anchor, Boundary, Diff, DiffConfig, Difference, EditScript, Fragment, Operation, Patch,
    ScriptBody, TieBreak, VersionProperties,
};

pub use revision::{
    FileRevisionCounter, MemoryRevisionCounter, RevisionAllocator, RevisionStore,
    StoredDocument, VersionHistory, VersioningConfig,
};
