//! Event sink that materializes a [`Document`].

use super::{EventKind, EventSink};
use crate::error::{Error, Result};
use crate::node::{
    Document, NodeIndex, QName, XmlAttribute, XmlComment, XmlContent, XmlElement,
    XmlProcessingInstruction,
};

/// Builds a document from sink events, numbering nodes as they arrive.
///
/// Adjacent character runs are merged into one text node, so the result is
/// addressed exactly as if its serialization had been parsed.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    doc: Document,
    open: Vec<NodeIndex>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one stream event.
    pub fn push(&mut self, event: &EventKind) -> Result<()> {
        super::emit(self, event)
    }

    /// Returns the finished document.
    pub fn finish(self) -> Result<Document> {
        if !self.open.is_empty() {
            return Err(Error::Parse(format!(
                "{} element(s) left open",
                self.open.len()
            )));
        }
        Ok(self.doc)
    }

    fn parent(&self) -> Option<NodeIndex> {
        self.open.last().copied()
    }
}

impl EventSink for DocumentBuilder {
    fn start_element(&mut self, name: &QName, attributes: &[XmlAttribute]) -> Result<()> {
        let element = self.doc.append(
            self.parent(),
            XmlContent::Element(XmlElement::new(name.clone())),
        )?;
        for attr in attributes {
            self.doc
                .append(Some(element), XmlContent::Attribute(attr.clone()))?;
        }
        self.open.push(element);
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        let index = self
            .open
            .pop()
            .ok_or_else(|| Error::Parse(format!("end tag without start: {}", name)))?;
        match self.doc.node(index).content().as_element() {
            Some(element) if element.qname() == name => Ok(()),
            _ => Err(Error::Parse(format!("mismatched end tag: {}", name))),
        }
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.doc.append_text(self.parent(), text)
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        let parent = self
            .parent()
            .ok_or_else(|| Error::Parse(format!("attribute {} outside of an element", name)))?;
        self.doc.append(
            Some(parent),
            XmlContent::Attribute(XmlAttribute::new(name.clone(), value)),
        )?;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.doc
            .append(self.parent(), XmlContent::Comment(XmlComment::new(text)))?;
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.doc.append(
            self.parent(),
            XmlContent::ProcessingInstruction(XmlProcessingInstruction::new(target, data)),
        )?;
        Ok(())
    }
}
