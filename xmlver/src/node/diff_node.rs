//! Transient diff tokens.
//!
//! A [`DiffNode`] is one token of a revision's pre-order stream: an element
//! start or end tag, an attribute, or a leaf node. The diff engine compares
//! tokens by content and refers to them by address.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use super::{NodeAddress, QName};
use crate::error::{Error, Result};
use crate::xml::{EventKind, StreamEvent};

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    ElementStart,
    ElementEnd,
    Attribute,
    Comment,
    Text,
    /// Processing instructions and anything else that is copied as-is.
    Other,
}

impl NodeKind {
    fn label(self) -> &'static str {
        match self {
            NodeKind::ElementStart => "element start",
            NodeKind::ElementEnd => "element end",
            NodeKind::Attribute => "attribute",
            NodeKind::Comment => "comment",
            NodeKind::Text => "text",
            NodeKind::Other => "other",
        }
    }
}

/// Token content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Payload {
    /// Element name, for start and end tags.
    Name(QName),
    /// Attribute name and value; both form the attribute's identity.
    Attribute(QName, String),
    /// String value of a text, comment or other node.
    Value(String),
}

impl Payload {
    fn label(&self) -> &'static str {
        match self {
            Payload::Name(_) => "name",
            Payload::Attribute(..) => "attribute",
            Payload::Value(_) => "value",
        }
    }
}

/// One addressed token of a revision.
///
/// There is deliberately no `PartialEq`: use [`DiffNode::content_eq`] to
/// compare what two tokens say and [`DiffNode::same_node`] to compare where
/// they live.
#[derive(Debug, Clone)]
pub struct DiffNode {
    address: NodeAddress,
    kind: NodeKind,
    payload: Payload,
}

impl DiffNode {
    /// Creates a token, rejecting payloads that do not fit the kind.
    pub fn new(address: NodeAddress, kind: NodeKind, payload: Payload) -> Result<Self> {
        let fits = matches!(
            (kind, &payload),
            (NodeKind::ElementStart | NodeKind::ElementEnd, Payload::Name(_))
                | (NodeKind::Attribute, Payload::Attribute(..))
                | (
                    NodeKind::Comment | NodeKind::Text | NodeKind::Other,
                    Payload::Value(_)
                )
        );
        if !fits {
            return Err(Error::AmbiguousConstruction {
                kind: kind.label(),
                payload: payload.label(),
            });
        }
        Ok(DiffNode {
            address,
            kind,
            payload,
        })
    }

    pub(crate) fn start(address: NodeAddress, name: QName) -> Self {
        DiffNode {
            address,
            kind: NodeKind::ElementStart,
            payload: Payload::Name(name),
        }
    }

    pub(crate) fn end(address: NodeAddress, name: QName) -> Self {
        DiffNode {
            address,
            kind: NodeKind::ElementEnd,
            payload: Payload::Name(name),
        }
    }

    /// Converts a stream event into a token.
    pub fn from_event(event: &StreamEvent) -> Self {
        let (kind, payload) = match &event.kind {
            EventKind::StartElement(name) => (NodeKind::ElementStart, Payload::Name(name.clone())),
            EventKind::EndElement(name) => (NodeKind::ElementEnd, Payload::Name(name.clone())),
            EventKind::Attribute(name, value) => (
                NodeKind::Attribute,
                Payload::Attribute(name.clone(), value.clone()),
            ),
            EventKind::Text(text) => (NodeKind::Text, Payload::Value(text.clone())),
            EventKind::Comment(text) => (NodeKind::Comment, Payload::Value(text.clone())),
            EventKind::ProcessingInstruction { target, data } => {
                let value = if data.is_empty() {
                    target.clone()
                } else {
                    format!("{} {}", target, data)
                };
                (NodeKind::Other, Payload::Value(value))
            }
        };
        DiffNode {
            address: event.address.clone(),
            kind,
            payload,
        }
    }

    pub fn address(&self) -> &NodeAddress {
        &self.address
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Element name for start and end tags.
    pub fn name(&self) -> Option<&QName> {
        match &self.payload {
            Payload::Name(name) | Payload::Attribute(name, _) => Some(name),
            Payload::Value(_) => None,
        }
    }

    /// True if both tokens carry the same kind and payload, wherever they live.
    pub fn content_eq(&self, other: &DiffNode) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }

    /// True if both tokens refer to the same address.
    pub fn same_node(&self, other: &DiffNode) -> bool {
        self.address == other.address
    }

    /// Hash of kind and payload, consistent with [`DiffNode::content_eq`].
    pub fn content_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.kind.hash(&mut hasher);
        self.payload.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    fn token(address: &str, kind: NodeKind, payload: Payload) -> Result<DiffNode> {
        DiffNode::new(addr(address), kind, payload)
    }

    fn value(text: &str) -> Payload {
        Payload::Value(text.to_string())
    }

    #[test]
    fn test_rejects_mismatched_payload() {
        let err = token("1.1", NodeKind::ElementStart, value("x")).unwrap_err();
        assert!(matches!(err, Error::AmbiguousConstruction { kind: "element start", .. }));

        assert!(token("1.1", NodeKind::Text, Payload::Name(QName::new("a"))).is_err());
        assert!(token("1.1", NodeKind::Attribute, value("v")).is_err());
        assert!(token("1.1", NodeKind::Other, value("pi")).is_ok());
    }

    #[test]
    fn test_content_eq_ignores_address() {
        let a = token("1.1.2", NodeKind::Text, value("hi")).unwrap();
        let b = token("1.4", NodeKind::Text, value("hi")).unwrap();
        let c = token("1.1.2", NodeKind::Comment, value("hi")).unwrap();

        assert!(a.content_eq(&b));
        assert!(!a.same_node(&b));
        assert_eq!(a.content_hash(), b.content_hash());

        assert!(!a.content_eq(&c));
        assert!(a.same_node(&c));
    }

    #[test]
    fn test_attribute_identity_includes_value() {
        let name = QName::new("id");
        let a = token("1.1.1", NodeKind::Attribute, Payload::Attribute(name.clone(), "x".into()));
        let b = token("1.1.1", NodeKind::Attribute, Payload::Attribute(name, "y".into()));
        assert!(!a.unwrap().content_eq(&b.unwrap()));
    }

    #[test]
    fn test_start_and_end_tags_differ() {
        let start = DiffNode::start(addr("1.1"), QName::new("a"));
        let end = DiffNode::end(addr("1.1"), QName::new("a"));
        assert!(!start.content_eq(&end));
        assert!(start.same_node(&end));
        assert_eq!(start.name(), end.name());
    }
}
