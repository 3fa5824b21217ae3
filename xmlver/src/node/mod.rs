//! Node structures for addressed XML revisions.
//!
//! A [`Document`] keeps its nodes in an arena in document order. Every node,
//! attributes included, carries a [`NodeAddress`]; children are referenced by
//! arena index so a revision can be walked forward without reference counting.

mod address;
mod diff_node;
pub mod namespace;
mod xml_content;

pub use address::NodeAddress;
pub use diff_node::{DiffNode, NodeKind, Payload};
pub use namespace::{NamespaceContext, QName};
pub use xml_content::{
    XmlAttribute, XmlComment, XmlContent, XmlElement, XmlProcessingInstruction, XmlText,
};

use std::path::Path;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::xml::{
    copy_stream, print_to_string, DocumentBuilder, EventKind, EventSink, NodeStream, ParseFlags,
    StreamEvent, XmlStreamReader,
};

/// Index of a node inside its document's arena.
pub type NodeIndex = usize;

/// One node of a document.
#[derive(Debug, Clone)]
pub struct Node {
    address: NodeAddress,
    content: XmlContent,
    parent: Option<NodeIndex>,
    attributes: Vec<NodeIndex>,
    children: Vec<NodeIndex>,
}

impl Node {
    /// The node's address within its revision.
    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    /// The node's content.
    pub fn content(&self) -> &XmlContent {
        &self.content
    }

    /// Parent element, or `None` for top-level nodes.
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// Attribute nodes, in document order.
    pub fn attributes(&self) -> &[NodeIndex] {
        &self.attributes
    }

    /// Child nodes, in document order.
    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }

    /// Returns the number of children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

/// One revision of an XML document.
#[derive(Debug, Clone, Default)]
pub struct Document {
    nodes: Vec<Node>,
    /// Top-level nodes (children of the document node).
    top_level: Vec<NodeIndex>,
    index: FxHashMap<NodeAddress, NodeIndex>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a document from a string with default flags.
    pub fn parse_str(xml: &str) -> Result<Self> {
        Self::parse_str_with(xml, ParseFlags::default())
    }

    /// Parses a document from a string.
    pub fn parse_str_with(xml: &str, flags: ParseFlags) -> Result<Self> {
        Self::from_stream(XmlStreamReader::from_str(xml, flags))
    }

    /// Parses a document from a file.
    pub fn parse_file<P: AsRef<Path>>(path: P, flags: ParseFlags) -> Result<Self> {
        Self::from_stream(XmlStreamReader::from_file(path, flags)?)
    }

    /// Builds a document from a node stream, renumbering its nodes.
    pub fn from_stream<S: NodeStream>(stream: S) -> Result<Self> {
        let mut builder = DocumentBuilder::new();
        copy_stream(stream, &mut builder)?;
        builder.finish()
    }

    /// Returns the node at `index`.
    ///
    /// # Panics
    /// Panics if the index does not belong to this document.
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    /// Looks up a node by address.
    pub fn lookup(&self, address: &NodeAddress) -> Option<NodeIndex> {
        self.index.get(address).copied()
    }

    /// Top-level nodes: the root element plus surrounding comments and PIs.
    pub fn top_level(&self) -> &[NodeIndex] {
        &self.top_level
    }

    /// The document element, if any.
    pub fn root_element(&self) -> Option<NodeIndex> {
        self.top_level
            .iter()
            .copied()
            .find(|&i| self.nodes[i].content.is_element())
    }

    /// Number of nodes, attributes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the document has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forward-only event stream over the whole document.
    pub fn stream(&self) -> DocumentStream<'_> {
        DocumentStream {
            doc: self,
            stack: Vec::new(),
            next_top: 0,
        }
    }

    /// Address-free event sequence, for content comparisons.
    pub fn events(&self) -> Vec<EventKind> {
        let mut stream = self.stream();
        let mut events = Vec::with_capacity(self.nodes.len() * 2);
        while let Ok(Some(event)) = stream.next_event() {
            events.push(event.kind);
        }
        events
    }

    /// The event a node opens with: its start tag for elements, the node
    /// itself otherwise.
    pub fn head_event(&self, index: NodeIndex) -> StreamEvent {
        let node = &self.nodes[index];
        let kind = match &node.content {
            XmlContent::Element(e) => EventKind::StartElement(e.qname().clone()),
            XmlContent::Attribute(a) => {
                EventKind::Attribute(a.qname().clone(), a.value().to_string())
            }
            XmlContent::Text(t) => EventKind::Text(t.text().to_string()),
            XmlContent::Comment(c) => EventKind::Comment(c.text().to_string()),
            XmlContent::ProcessingInstruction(pi) => EventKind::ProcessingInstruction {
                target: pi.target().to_string(),
                data: pi.content().to_string(),
            },
        };
        StreamEvent {
            address: node.address.clone(),
            kind,
        }
    }

    /// Diff token for the head event of a node.
    pub fn token(&self, index: NodeIndex) -> DiffNode {
        DiffNode::from_event(&self.head_event(index))
    }

    /// Writes the whole document to a sink.
    pub fn write_to(&self, sink: &mut dyn EventSink) -> Result<()> {
        for &index in &self.top_level {
            self.write_node(index, sink)?;
        }
        Ok(())
    }

    /// Writes one node and everything below it to a sink.
    pub fn write_node(&self, index: NodeIndex, sink: &mut dyn EventSink) -> Result<()> {
        let node = &self.nodes[index];
        match &node.content {
            XmlContent::Element(element) => {
                let attributes: Vec<XmlAttribute> = node
                    .attributes
                    .iter()
                    .filter_map(|&a| self.nodes[a].content.as_attribute().cloned())
                    .collect();
                sink.start_element(element.qname(), &attributes)?;
                for &child in &node.children {
                    self.write_node(child, sink)?;
                }
                sink.end_element(element.qname())
            }
            XmlContent::Attribute(attr) => sink.attribute(attr.qname(), attr.value()),
            XmlContent::Text(text) => sink.characters(text.text()),
            XmlContent::Comment(comment) => sink.comment(comment.text()),
            XmlContent::ProcessingInstruction(pi) => {
                sink.processing_instruction(pi.target(), pi.content())
            }
        }
    }

    /// Serializes the document to a string.
    pub fn to_xml_string(&self) -> Result<String> {
        print_to_string(self)
    }

    /// Returns a copy without the root element's attributes in `namespace`,
    /// together with the attributes that were removed.
    pub fn without_root_attributes_in(
        &self,
        namespace: &str,
    ) -> Result<(Document, Vec<XmlAttribute>)> {
        let root = self.root_element();
        let mut removed = Vec::new();
        let mut builder = DocumentBuilder::new();
        let mut stream = self.stream();
        while let Some(event) = stream.next_event()? {
            if let EventKind::Attribute(name, value) = &event.kind {
                let owner = self.lookup(&event.address).and_then(|i| self.nodes[i].parent);
                if owner.is_some() && owner == root && name.namespace() == Some(namespace) {
                    removed.push(XmlAttribute::new(name.clone(), value.clone()));
                    continue;
                }
            }
            builder.push(&event.kind)?;
        }
        Ok((builder.finish()?, removed))
    }

    /// Appends a node below `parent` (or at top level) and assigns its address.
    pub(crate) fn append(
        &mut self,
        parent: Option<NodeIndex>,
        content: XmlContent,
    ) -> Result<NodeIndex> {
        let is_attribute = content.is_attribute();
        let address = match parent {
            Some(p) => {
                let parent_node = &self.nodes[p];
                if !parent_node.content.is_element() {
                    return Err(Error::Parse("only elements can have children".to_string()));
                }
                if is_attribute && !parent_node.children.is_empty() {
                    return Err(Error::Parse(
                        "attribute added after element content".to_string(),
                    ));
                }
                let ordinal = parent_node.attributes.len() + parent_node.children.len() + 1;
                parent_node.address.child(ordinal as u32)
            }
            None => {
                if is_attribute {
                    return Err(Error::Parse("attribute outside of an element".to_string()));
                }
                NodeAddress::document().child(self.top_level.len() as u32 + 1)
            }
        };

        let index = self.nodes.len();
        self.index.insert(address.clone(), index);
        self.nodes.push(Node {
            address,
            content,
            parent,
            attributes: Vec::new(),
            children: Vec::new(),
        });
        match parent {
            Some(p) if is_attribute => self.nodes[p].attributes.push(index),
            Some(p) => self.nodes[p].children.push(index),
            None => self.top_level.push(index),
        }
        Ok(index)
    }

    /// Appends character data, merging it into a preceding text node.
    pub(crate) fn append_text(&mut self, parent: Option<NodeIndex>, text: &str) -> Result<()> {
        let siblings = match parent {
            Some(p) => &self.nodes[p].children,
            None => &self.top_level,
        };
        if let Some(&last) = siblings.last() {
            if let Some(existing) = self.nodes[last].content.as_text_mut() {
                existing.push_str(text);
                return Ok(());
            }
        }
        self.append(parent, XmlContent::Text(XmlText::new(text)))?;
        Ok(())
    }
}

/// Forward-only event stream over a [`Document`].
pub struct DocumentStream<'a> {
    doc: &'a Document,
    stack: Vec<Frame>,
    next_top: usize,
}

struct Frame {
    node: NodeIndex,
    next_attribute: usize,
    next_child: usize,
}

impl DocumentStream<'_> {
    fn enter(&mut self, index: NodeIndex) -> StreamEvent {
        if self.doc.nodes[index].content.is_element() {
            self.stack.push(Frame {
                node: index,
                next_attribute: 0,
                next_child: 0,
            });
        }
        self.doc.head_event(index)
    }
}

impl NodeStream for DocumentStream<'_> {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        let doc = self.doc;
        let Some(frame) = self.stack.last_mut() else {
            if self.next_top < doc.top_level.len() {
                let index = doc.top_level[self.next_top];
                self.next_top += 1;
                return Ok(Some(self.enter(index)));
            }
            return Ok(None);
        };

        let node = &doc.nodes[frame.node];
        if frame.next_attribute < node.attributes.len() {
            let index = node.attributes[frame.next_attribute];
            frame.next_attribute += 1;
            return Ok(Some(self.enter(index)));
        }
        if frame.next_child < node.children.len() {
            let index = node.children[frame.next_child];
            frame.next_child += 1;
            return Ok(Some(self.enter(index)));
        }

        self.stack.pop();
        let name = match &node.content {
            XmlContent::Element(e) => e.qname().clone(),
            _ => unreachable!("only elements are pushed on the stream stack"),
        };
        Ok(Some(StreamEvent {
            address: node.address.clone(),
            kind: EventKind::EndElement(name),
        }))
    }
}
