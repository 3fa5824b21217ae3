//! XML content types for document nodes.
//!
//! This module provides `XmlContent`, which represents the content of a single
//! node: an element, an attribute, text, a comment or a processing instruction.

use std::fmt;

use super::namespace::QName;

/// Represents the content of an XML node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlContent {
    /// An XML element. Its attributes and children are separate nodes.
    Element(XmlElement),
    /// An attribute of the owning element.
    Attribute(XmlAttribute),
    /// XML text content.
    Text(XmlText),
    /// XML comment.
    Comment(XmlComment),
    /// XML processing instruction.
    ProcessingInstruction(XmlProcessingInstruction),
}

impl XmlContent {
    /// Returns true if this is an element node.
    pub fn is_element(&self) -> bool {
        matches!(self, XmlContent::Element(_))
    }

    /// Returns true if this is an attribute node.
    pub fn is_attribute(&self) -> bool {
        matches!(self, XmlContent::Attribute(_))
    }

    /// Returns true if this is a text node.
    pub fn is_text(&self) -> bool {
        matches!(self, XmlContent::Text(_))
    }

    /// Returns a reference to the element, if this is an element node.
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlContent::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Returns a reference to the attribute, if this is an attribute node.
    pub fn as_attribute(&self) -> Option<&XmlAttribute> {
        match self {
            XmlContent::Attribute(a) => Some(a),
            _ => None,
        }
    }

    /// Returns a mutable reference to the text, if this is a text node.
    pub fn as_text_mut(&mut self) -> Option<&mut XmlText> {
        match self {
            XmlContent::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// An XML element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: QName,
}

impl XmlElement {
    /// Creates a new element with the given name.
    pub fn new(name: QName) -> Self {
        XmlElement { name }
    }

    /// Returns the qualified name of the element.
    pub fn qname(&self) -> &QName {
        &self.name
    }
}

impl fmt::Display for XmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.name.lexical())
    }
}

/// A single attribute: name and value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    name: QName,
    value: String,
}

impl XmlAttribute {
    /// Creates a new attribute.
    pub fn new(name: QName, value: impl Into<String>) -> Self {
        XmlAttribute {
            name,
            value: value.into(),
        }
    }

    /// Returns the attribute name.
    pub fn qname(&self) -> &QName {
        &self.name
    }

    /// Returns the attribute value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for XmlAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name.lexical(), self.value)
    }
}

/// XML text content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlText {
    text: String,
}

impl XmlText {
    /// Creates a new text node from a string.
    pub fn new(text: impl Into<String>) -> Self {
        XmlText { text: text.into() }
    }

    /// Returns the text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Appends to the text. Adjacent character runs end up in one node.
    pub fn push_str(&mut self, more: &str) {
        self.text.push_str(more);
    }
}

impl fmt::Display for XmlText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// XML comment content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlComment {
    /// The comment text (without the <!-- and --> markers).
    text: String,
}

impl XmlComment {
    /// Creates a new comment node from a string.
    pub fn new(text: impl Into<String>) -> Self {
        XmlComment { text: text.into() }
    }

    /// Returns the comment text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for XmlComment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<!--{}-->", self.text)
    }
}

/// XML processing instruction content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlProcessingInstruction {
    /// The target of the PI (e.g., "xml-stylesheet").
    target: String,
    /// The content/data of the PI (everything after the target).
    content: String,
}

impl XmlProcessingInstruction {
    /// Creates a new PI from target and content strings.
    pub fn new(target: impl Into<String>, content: impl Into<String>) -> Self {
        XmlProcessingInstruction {
            target: target.into(),
            content: content.into(),
        }
    }

    /// Splits the raw body of a PI (`target data`) at the first whitespace.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim_start();
        match raw.find(char::is_whitespace) {
            Some(pos) => Self::new(&raw[..pos], raw[pos..].trim_start()),
            None => Self::new(raw, ""),
        }
    }

    /// Returns the PI target.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the PI content.
    pub fn content(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for XmlProcessingInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.content.is_empty() {
            write!(f, "<?{}?>", self.target)
        } else {
            write!(f, "<?{} {}?>", self.target, self.content)
        }
    }
}
