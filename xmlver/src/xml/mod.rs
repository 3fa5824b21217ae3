//! XML streaming input and output.
//!
//! Revisions are read as a forward-only stream of addressed events
//! ([`NodeStream`]) and written through an [`EventSink`]. The parser, the
//! in-memory [`Document`](crate::node::Document) and the patch engine all
//! speak these two traits.

mod builder;
mod parser;
mod printer;

pub use builder::DocumentBuilder;
pub use parser::XmlStreamReader;
pub use printer::{print_to_string, print_to_string_pretty, XmlWriter, XmlWriterOptions};

use bitflags::bitflags;

use crate::error::Result;
use crate::node::{NodeAddress, QName, XmlAttribute};

bitflags! {
    /// Options controlling how character data and auxiliary nodes are read.
    ///
    /// With no flags set, whitespace-only text is dropped and all other text
    /// is kept verbatim.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParseFlags: u8 {
        /// Keep whitespace-only text nodes inside elements.
        const PRESERVE_WHITESPACE = 0x01;
        /// Collapse whitespace runs to one space and trim the ends.
        const NORMALIZE_WHITESPACE = 0x02;
        /// Drop comments.
        const SKIP_COMMENTS = 0x04;
        /// Drop processing instructions.
        const SKIP_PROCESSING_INSTRUCTIONS = 0x08;
    }
}

/// What a stream event says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    StartElement(QName),
    EndElement(QName),
    Attribute(QName, String),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

/// One event of a node stream, with the address of the node it belongs to.
///
/// A start and end tag of the same element carry the same address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub address: NodeAddress,
    pub kind: EventKind,
}

/// Forward-only source of addressed events.
///
/// Attributes follow their element's start event and precede its children.
/// Implementations release their underlying resources when dropped.
pub trait NodeStream {
    /// Returns the next event, or `None` at the end of the document.
    fn next_event(&mut self) -> Result<Option<StreamEvent>>;
}

impl<S: NodeStream + ?Sized> NodeStream for &mut S {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        (**self).next_event()
    }
}

impl<S: NodeStream + ?Sized> NodeStream for Box<S> {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        (**self).next_event()
    }
}

/// Receiver of document events.
///
/// `attribute` adds an attribute to the element most recently started, as
/// long as no content has been written to it yet.
pub trait EventSink {
    fn start_element(&mut self, name: &QName, attributes: &[XmlAttribute]) -> Result<()>;
    fn end_element(&mut self, name: &QName) -> Result<()>;
    fn characters(&mut self, text: &str) -> Result<()>;
    fn attribute(&mut self, name: &QName, value: &str) -> Result<()>;
    fn comment(&mut self, text: &str) -> Result<()>;
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()>;
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn start_element(&mut self, name: &QName, attributes: &[XmlAttribute]) -> Result<()> {
        (**self).start_element(name, attributes)
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        (**self).end_element(name)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        (**self).characters(text)
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        (**self).attribute(name, value)
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        (**self).comment(text)
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        (**self).processing_instruction(target, data)
    }
}

/// Forwards one event to a sink. Start tags are sent without attributes;
/// attribute events follow separately.
pub fn emit(sink: &mut dyn EventSink, kind: &EventKind) -> Result<()> {
    match kind {
        EventKind::StartElement(name) => sink.start_element(name, &[]),
        EventKind::EndElement(name) => sink.end_element(name),
        EventKind::Attribute(name, value) => sink.attribute(name, value),
        EventKind::Text(text) => sink.characters(text),
        EventKind::Comment(text) => sink.comment(text),
        EventKind::ProcessingInstruction { target, data } => {
            sink.processing_instruction(target, data)
        }
    }
}

/// Copies a whole stream into a sink.
pub fn copy_stream<S: NodeStream>(mut stream: S, sink: &mut dyn EventSink) -> Result<()> {
    while let Some(event) = stream.next_event()? {
        emit(sink, &event.kind)?;
    }
    Ok(())
}
