//! Edit operations produced by the diff engine.
//!
//! A [`Difference`] is either an insertion of target tokens, anchored at a
//! node of the base revision, or the deletion of a base node. Differences
//! compare and sort by their reference address only.

use std::cmp::Ordering;

use crate::constants::VERSIONING_NS;
use crate::error::{Error, Result};
use crate::node::{DiffNode, Document, NodeAddress, NodeKind, Payload, QName, XmlAttribute};
use crate::xml::EventSink;

/// Where inserted content goes relative to the reference node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Immediately before the reference node.
    Before,
    /// As the last content of the reference element, before its end tag.
    Append,
}

/// Which tag of an element a boundary-only delete removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Start,
    End,
}

impl Boundary {
    /// Value of the `event` attribute in edit scripts.
    pub fn as_str(self) -> &'static str {
        match self {
            Boundary::Start => "start",
            Boundary::End => "end",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(Boundary::Start),
            "end" => Some(Boundary::End),
            _ => None,
        }
    }
}

/// Target tokens to insert at one place in the base revision.
#[derive(Debug, Clone)]
pub struct Insert {
    reference: NodeAddress,
    anchor: Anchor,
    nodes: Vec<DiffNode>,
}

impl Insert {
    pub fn reference(&self) -> &NodeAddress {
        &self.reference
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    /// Inserted tokens, in target document order.
    pub fn nodes(&self) -> &[DiffNode] {
        &self.nodes
    }

    /// Adds a token at the end of the inserted run.
    pub fn add_node(&mut self, node: DiffNode) {
        self.nodes.push(node);
    }
}

/// Removal of a base node, or of one of its tags.
#[derive(Debug, Clone)]
pub struct Delete {
    reference: NodeAddress,
    boundary: Option<Boundary>,
}

impl Delete {
    pub fn reference(&self) -> &NodeAddress {
        &self.reference
    }

    /// `None` deletes the whole node including its subtree.
    pub fn boundary(&self) -> Option<Boundary> {
        self.boundary
    }
}

/// One edit operation.
#[derive(Debug, Clone)]
pub enum Difference {
    Insert(Insert),
    Delete(Delete),
}

impl Difference {
    /// Insertion before `reference`.
    pub fn insert(reference: NodeAddress) -> Self {
        Difference::Insert(Insert {
            reference,
            anchor: Anchor::Before,
            nodes: Vec::new(),
        })
    }

    /// Insertion at the end of element `reference`.
    pub fn append(reference: NodeAddress) -> Self {
        Difference::Insert(Insert {
            reference,
            anchor: Anchor::Append,
            nodes: Vec::new(),
        })
    }

    /// Deletion of the node at `reference` and everything below it.
    pub fn delete(reference: NodeAddress) -> Self {
        Difference::Delete(Delete {
            reference,
            boundary: None,
        })
    }

    /// Deletion of one tag of the element at `reference`; its content stays.
    pub fn delete_boundary(reference: NodeAddress, boundary: Boundary) -> Self {
        Difference::Delete(Delete {
            reference,
            boundary: Some(boundary),
        })
    }

    pub fn reference(&self) -> &NodeAddress {
        match self {
            Difference::Insert(insert) => &insert.reference,
            Difference::Delete(delete) => &delete.reference,
        }
    }

    /// Writes this operation in the edit-script vocabulary.
    ///
    /// Token payloads that are copied verbatim are read from `target`, the
    /// revision the tokens were taken from.
    pub fn serialize(&self, target: &Document, sink: &mut dyn EventSink) -> Result<()> {
        match self {
            Difference::Insert(insert) => serialize_insert(insert, target, sink),
            Difference::Delete(delete) => {
                let mut attributes = Vec::with_capacity(2);
                if let Some(boundary) = delete.boundary {
                    attributes.push(XmlAttribute::new(QName::new("event"), boundary.as_str()));
                }
                attributes.push(XmlAttribute::new(
                    QName::new("ref"),
                    delete.reference.to_string(),
                ));
                leaf(sink, "delete", &attributes)
            }
        }
    }
}

impl PartialEq for Difference {
    fn eq(&self, other: &Self) -> bool {
        self.reference() == other.reference()
    }
}

impl Eq for Difference {}

impl PartialOrd for Difference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Difference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reference().cmp(other.reference())
    }
}

/// Name in the versioning namespace.
pub(crate) fn vname(local: &str) -> QName {
    QName::with_namespace(local, VERSIONING_NS, Some(crate::constants::VERSIONING_PREFIX))
}

fn leaf(sink: &mut dyn EventSink, local: &str, attributes: &[XmlAttribute]) -> Result<()> {
    let name = vname(local);
    sink.start_element(&name, attributes)?;
    sink.end_element(&name)
}

/// Attributes of a `v:start` / `v:end` marker describing an element name.
pub(crate) fn name_attributes(name: &QName) -> Vec<XmlAttribute> {
    let mut attributes = vec![XmlAttribute::new(QName::new("name"), name.lexical())];
    if let Some(ns) = name.namespace() {
        attributes.push(XmlAttribute::new(QName::new("namespace"), ns));
    }
    attributes
}

fn serialize_insert(insert: &Insert, target: &Document, sink: &mut dyn EventSink) -> Result<()> {
    let tag = vname(match insert.anchor {
        Anchor::Before => "insert",
        Anchor::Append => "append",
    });
    sink.start_element(
        &tag,
        &[XmlAttribute::new(QName::new("ref"), insert.reference.to_string())],
    )?;

    let nodes = &insert.nodes;
    let mut i = 0;
    while i < nodes.len() {
        let node = &nodes[i];
        match (node.kind(), node.payload()) {
            (NodeKind::Attribute, Payload::Attribute(name, value)) => {
                leaf(sink, "attribute", &[XmlAttribute::new(name.clone(), value.as_str())])?;
            }
            (NodeKind::ElementStart, Payload::Name(name)) => {
                let end = nodes[i + 1..]
                    .iter()
                    .position(|n| n.kind() == NodeKind::ElementEnd && n.same_node(node));
                match end {
                    Some(offset) => {
                        copy_from_target(target, node.address(), sink)?;
                        i += offset + 1;
                    }
                    None => leaf(sink, "start", &name_attributes(name))?,
                }
            }
            (NodeKind::ElementEnd, Payload::Name(name)) => {
                leaf(sink, "end", &name_attributes(name))?;
            }
            (NodeKind::Comment, Payload::Value(text)) => {
                let comment = vname("comment");
                sink.start_element(&comment, &[])?;
                sink.characters(text)?;
                sink.end_element(&comment)?;
            }
            _ => copy_from_target(target, node.address(), sink)?,
        }
        i += 1;
    }

    sink.end_element(&tag)
}

fn copy_from_target(
    target: &Document,
    address: &NodeAddress,
    sink: &mut dyn EventSink,
) -> Result<()> {
    let index = target.lookup(address).ok_or_else(|| {
        Error::Serialization(format!("inserted node {} not found in target revision", address))
    })?;
    target.write_node(index, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{NodeStream, XmlWriter};

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    fn render(diff: &Difference, target: &Document) -> Result<String> {
        let mut writer = XmlWriter::new(Vec::new());
        diff.serialize(target, &mut writer)?;
        Ok(String::from_utf8(writer.finish()?).unwrap())
    }

    #[test]
    fn test_order_and_equality_by_reference() {
        let mut diffs = vec![
            Difference::delete(addr("1.1.3")),
            Difference::append(addr("1.1")),
            Difference::insert(addr("1.1.2")),
        ];
        diffs.sort();
        let refs: Vec<String> = diffs.iter().map(|d| d.reference().to_string()).collect();
        assert_eq!(refs, vec!["1.1", "1.1.2", "1.1.3"]);
        assert_eq!(Difference::delete(addr("1.2")), Difference::insert(addr("1.2")));
    }

    #[test]
    fn test_delete_serialization() {
        let target = Document::new();
        assert_eq!(
            render(&Difference::delete(addr("1.1.2")), &target).unwrap(),
            r#"<v:delete xmlns:v="http://exist-db.org/versioning" ref="1.1.2" />"#
        );
        assert_eq!(
            render(&Difference::delete_boundary(addr("1.1.2"), Boundary::End), &target).unwrap(),
            r#"<v:delete xmlns:v="http://exist-db.org/versioning" event="end" ref="1.1.2" />"#
        );
    }

    #[test]
    fn test_insert_copies_complete_subtrees() {
        let target = Document::parse_str(r#"<a><b id="1">x</b><!--c--></a>"#).unwrap();
        let mut events = target.stream();
        let mut insert = Difference::append(addr("1.1"));
        // Skip <a>, take the whole of <b> and the comment.
        events.next_event().unwrap();
        while let Some(event) = events.next_event().unwrap() {
            if event.address == addr("1.1") {
                break;
            }
            if let Difference::Insert(i) = &mut insert {
                i.add_node(DiffNode::from_event(&event));
            }
        }
        let out = render(&insert, &target).unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<v:append xmlns:v="http://exist-db.org/versioning" ref="1.1">"#,
                r#"<b id="1">x</b><v:comment>c</v:comment></v:append>"#
            )
        );
    }

    #[test]
    fn test_unmatched_tags_become_markers() {
        let target = Document::parse_str(r#"<a><p:c xmlns:p="urn:p" k="v"/></a>"#).unwrap();
        let c = target.node(target.lookup(&addr("1.1.1")).unwrap());
        let name = c.content().as_element().unwrap().qname().clone();

        let mut diff = Difference::insert(addr("1.1.1"));
        if let Difference::Insert(insert) = &mut diff {
            insert.add_node(DiffNode::start(addr("1.1.1"), name.clone()));
            insert.add_node(
                DiffNode::new(
                    addr("1.1.1.1"),
                    NodeKind::Attribute,
                    Payload::Attribute(QName::new("k"), "v".into()),
                )
                .unwrap(),
            );
        }
        let out = render(&diff, &target).unwrap();
        assert_eq!(
            out,
            concat!(
                r#"<v:insert xmlns:v="http://exist-db.org/versioning" ref="1.1.1">"#,
                r#"<v:start name="p:c" namespace="urn:p" />"#,
                r#"<v:attribute k="v" /></v:insert>"#
            )
        );

        let mut end = Difference::append(addr("1.1"));
        if let Difference::Insert(insert) = &mut end {
            insert.add_node(DiffNode::end(addr("1.1.1"), name));
        }
        assert!(render(&end, &target)
            .unwrap()
            .contains(r#"<v:end name="p:c" namespace="urn:p" />"#));
    }

    #[test]
    fn test_missing_target_node_fails() {
        let target = Document::parse_str("<a/>").unwrap();
        let mut diff = Difference::insert(addr("1.1"));
        if let Difference::Insert(insert) = &mut diff {
            insert.add_node(
                DiffNode::new(addr("1.9"), NodeKind::Text, Payload::Value("x".into())).unwrap(),
            );
        }
        assert!(matches!(render(&diff, &target), Err(Error::Serialization(_))));
    }
}
