//! Patch application algorithm.
//!
//! Applies an edit script to a streamed base revision in a single forward
//! pass. Operations are indexed by reference address, so scripts are accepted
//! in any order. In annotate mode nothing is dropped: removed nodes are
//! wrapped in `v:removed` and inserted content in `v:inserted`.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{Error, Result};
use crate::node::{NodeAddress, QName, XmlAttribute};
use crate::xml::{emit, EventKind, EventSink, NodeStream};

use super::difference::{name_attributes, vname, Anchor, Boundary};
use super::edit_script::{inserted_tag, removed_tag, EditScript, Fragment, Operation, ScriptBody};

#[derive(Debug, Default, Clone, Copy)]
struct Deletion {
    whole: bool,
    start: bool,
    end: bool,
}

/// Everything the script does at one address.
#[derive(Debug, Default)]
struct Slot<'s> {
    before: Option<&'s [Fragment]>,
    append: Option<&'s [Fragment]>,
    delete: Deletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Patch,
    Annotate,
}

/// A script body that cannot be applied structurally.
#[derive(Debug, Clone)]
enum WholeChange {
    Removed { path: String, revision: u64 },
    ReplacedBinary,
    ReplacedXml,
}

impl WholeChange {
    fn error(&self) -> Error {
        match self {
            WholeChange::Removed { path, revision } => Error::DocumentRemoved {
                path: path.clone(),
                revision: *revision,
            },
            WholeChange::ReplacedBinary => {
                Error::Usage("revision replaced the document with a binary resource")
            }
            WholeChange::ReplacedXml => {
                Error::Usage("revision stores a whole copy; load it instead of patching")
            }
        }
    }
}

/// Patch application for edit scripts.
pub struct Patch<'s> {
    slots: FxHashMap<NodeAddress, Slot<'s>>,
    whole: Option<WholeChange>,
    operations: usize,
}

impl<'s> Patch<'s> {
    /// Prepares a script for application.
    pub fn new(script: &'s EditScript) -> Result<Self> {
        let whole = match &script.body {
            ScriptBody::Changes(operations) => return Self::from_operations(operations),
            ScriptBody::Removed => WholeChange::Removed {
                path: script.properties.document.clone(),
                revision: script.properties.revision,
            },
            ScriptBody::ReplacedBinary(_) => WholeChange::ReplacedBinary,
            ScriptBody::ReplacedXml(_) => WholeChange::ReplacedXml,
        };
        Ok(Patch {
            slots: FxHashMap::default(),
            whole: Some(whole),
            operations: 0,
        })
    }

    /// Indexes operations by reference. Two insertions of the same kind at
    /// one address, or repeated deletions, make the script malformed.
    pub fn from_operations(operations: &'s [Operation]) -> Result<Self> {
        let mut slots: FxHashMap<NodeAddress, Slot<'s>> = FxHashMap::default();
        for operation in operations {
            let slot = slots.entry(operation.reference().clone()).or_default();
            let duplicate = match operation {
                Operation::Insert {
                    anchor: Anchor::Before,
                    fragments,
                    ..
                } => slot.before.replace(fragments).is_some(),
                Operation::Insert {
                    anchor: Anchor::Append,
                    fragments,
                    ..
                } => slot.append.replace(fragments).is_some(),
                Operation::Delete { boundary, .. } => {
                    let flag = match boundary {
                        None => &mut slot.delete.whole,
                        Some(Boundary::Start) => &mut slot.delete.start,
                        Some(Boundary::End) => &mut slot.delete.end,
                    };
                    std::mem::replace(flag, true)
                }
            };
            if duplicate {
                return Err(Error::MalformedEditScript(format!(
                    "conflicting operations at {}",
                    operation.reference()
                )));
            }
        }
        Ok(Patch {
            slots,
            whole: None,
            operations: operations.len(),
        })
    }

    /// Writes the patched revision to `sink`.
    pub fn patch<S: NodeStream>(&self, base: S, sink: &mut dyn EventSink) -> Result<()> {
        self.run(base, sink, Mode::Patch)
    }

    /// Writes the base revision with removed and inserted content marked up.
    pub fn annotate<S: NodeStream>(&self, base: S, sink: &mut dyn EventSink) -> Result<()> {
        self.run(base, sink, Mode::Annotate)
    }

    fn run<S: NodeStream>(&self, mut base: S, sink: &mut dyn EventSink, mode: Mode) -> Result<()> {
        if let Some(whole) = &self.whole {
            return Err(whole.error());
        }

        let mut unresolved: FxHashSet<&NodeAddress> = self.slots.keys().collect();
        let mut merge = Merge {
            sink,
            mode,
            attribute_phase: false,
            deferred: Vec::new(),
        };
        // Depth inside a deleted subtree being skipped (or copied as removed).
        let mut skipping = 0usize;
        // One entry per open base element: true if its start tag was deleted.
        let mut unwrapped: Vec<bool> = Vec::new();

        while let Some(event) = base.next_event()? {
            if skipping > 0 {
                match &event.kind {
                    EventKind::StartElement(_) => skipping += 1,
                    EventKind::EndElement(_) => skipping -= 1,
                    _ => {}
                }
                if mode == Mode::Annotate {
                    emit(merge.sink, &event.kind)?;
                    if skipping == 0 {
                        merge.sink.end_element(&removed_tag())?;
                    }
                }
                continue;
            }

            let slot = self.slots.get(&event.address);
            if slot.is_some() {
                unresolved.remove(&event.address);
            }
            let delete = slot.map(|s| s.delete).unwrap_or_default();
            let before = slot.and_then(|s| s.before);

            match &event.kind {
                EventKind::Attribute(name, value) => {
                    if !delete.whole && unwrapped.last() == Some(&true) {
                        return Err(Error::MalformedEditScript(format!(
                            "attribute {} kept on an element whose start tag is deleted",
                            event.address
                        )));
                    }
                    if let Some(fragments) = before {
                        merge.insert(fragments)?;
                    }
                    if delete.whole {
                        merge.removed_attribute(name, value)?;
                    } else {
                        merge.sink.attribute(name, value)?;
                    }
                }
                EventKind::StartElement(name) => {
                    merge.leave_attribute_phase()?;
                    if let Some(fragments) = before {
                        merge.insert(fragments)?;
                    }
                    if delete.whole {
                        merge.begin_removed()?;
                        if mode == Mode::Annotate {
                            merge.sink.start_element(name, &[])?;
                        }
                        skipping = 1;
                    } else if delete.start {
                        merge.removed_marker("start", name)?;
                        unwrapped.push(true);
                    } else {
                        merge.sink.start_element(name, &[])?;
                        merge.attribute_phase = mode == Mode::Annotate;
                        unwrapped.push(false);
                    }
                }
                EventKind::EndElement(name) => {
                    if unwrapped.pop().unwrap_or(false) != delete.end {
                        return Err(Error::MalformedEditScript(format!(
                            "only one tag of element {} is deleted",
                            event.address
                        )));
                    }
                    if let Some(fragments) = slot.and_then(|s| s.append) {
                        merge.insert(fragments)?;
                    }
                    merge.leave_attribute_phase()?;
                    if delete.end {
                        merge.removed_marker("end", name)?;
                    } else {
                        merge.sink.end_element(name)?;
                    }
                }
                leaf => {
                    merge.leave_attribute_phase()?;
                    if let Some(fragments) = before {
                        merge.insert(fragments)?;
                    }
                    if delete.whole {
                        merge.begin_removed()?;
                        if mode == Mode::Annotate {
                            emit(merge.sink, leaf)?;
                            merge.sink.end_element(&removed_tag())?;
                        }
                    } else {
                        emit(merge.sink, leaf)?;
                    }
                }
            }
        }

        let document = NodeAddress::document();
        if let Some(fragments) = self.slots.get(&document).and_then(|s| s.append) {
            unresolved.remove(&document);
            merge.insert(fragments)?;
        }
        merge.leave_attribute_phase()?;

        if let Some(missing) = unresolved.into_iter().min() {
            return Err(Error::UnresolvableReference(missing.clone()));
        }
        debug!(operations = self.operations, ?mode, "applied edit script");
        Ok(())
    }
}

enum Marker<'s> {
    Inserted(&'s [Fragment]),
    RemovedAttribute(QName, String),
}

/// Output side of a patch run.
struct Merge<'a, 's> {
    sink: &'a mut dyn EventSink,
    mode: Mode,
    /// Annotate mode only: a real start tag is open and may still receive
    /// attributes, so marker elements must wait.
    attribute_phase: bool,
    deferred: Vec<Marker<'s>>,
}

impl<'s> Merge<'_, 's> {
    fn insert(&mut self, fragments: &'s [Fragment]) -> Result<()> {
        match self.mode {
            Mode::Patch => fragments.iter().try_for_each(|f| f.materialize(self.sink)),
            Mode::Annotate if self.attribute_phase => {
                self.deferred.push(Marker::Inserted(fragments));
                Ok(())
            }
            Mode::Annotate => self.write_marker(Marker::Inserted(fragments)),
        }
    }

    fn removed_attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        match self.mode {
            Mode::Patch => Ok(()),
            Mode::Annotate if self.attribute_phase => {
                self.deferred
                    .push(Marker::RemovedAttribute(name.clone(), value.to_string()));
                Ok(())
            }
            Mode::Annotate => {
                self.write_marker(Marker::RemovedAttribute(name.clone(), value.to_string()))
            }
        }
    }

    /// Opens the wrapper for a removed node; patch mode writes nothing.
    fn begin_removed(&mut self) -> Result<()> {
        if self.mode == Mode::Annotate {
            self.sink.start_element(&removed_tag(), &[])?;
        }
        Ok(())
    }

    /// Marks a removed start or end tag.
    fn removed_marker(&mut self, local: &str, name: &QName) -> Result<()> {
        if self.mode == Mode::Annotate {
            let removed = removed_tag();
            let marker = vname(local);
            self.sink.start_element(&removed, &[])?;
            self.sink.start_element(&marker, &name_attributes(name))?;
            self.sink.end_element(&marker)?;
            self.sink.end_element(&removed)?;
        }
        Ok(())
    }

    fn leave_attribute_phase(&mut self) -> Result<()> {
        self.attribute_phase = false;
        for marker in std::mem::take(&mut self.deferred) {
            self.write_marker(marker)?;
        }
        Ok(())
    }

    fn write_marker(&mut self, marker: Marker<'s>) -> Result<()> {
        match marker {
            Marker::Inserted(fragments) => {
                let inserted = inserted_tag();
                self.sink.start_element(&inserted, &[])?;
                for fragment in fragments {
                    fragment.annotate(self.sink)?;
                }
                self.sink.end_element(&inserted)
            }
            Marker::RemovedAttribute(name, value) => {
                let removed = removed_tag();
                let attribute = vname("attribute");
                self.sink.start_element(&removed, &[])?;
                self.sink
                    .start_element(&attribute, &[XmlAttribute::new(name, value)])?;
                self.sink.end_element(&attribute)?;
                self.sink.end_element(&removed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::edit_script::VersionProperties;
    use crate::node::Document;
    use crate::xml::{print_to_string, DocumentBuilder, XmlWriter};

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    fn apply(base: &str, operations: &[Operation]) -> Result<String> {
        let base = Document::parse_str(base).unwrap();
        let patch = Patch::from_operations(operations)?;
        let mut builder = DocumentBuilder::new();
        patch.patch(base.stream(), &mut builder)?;
        print_to_string(&builder.finish()?)
    }

    fn annotate(base: &str, operations: &[Operation]) -> String {
        let base = Document::parse_str(base).unwrap();
        let patch = Patch::from_operations(operations).unwrap();
        let mut writer = XmlWriter::new(Vec::new());
        patch.annotate(base.stream(), &mut writer).unwrap();
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    fn content(xml: &str) -> Fragment {
        let doc = Document::parse_str(xml).unwrap();
        Fragment::Content(doc.events())
    }

    #[test]
    fn test_delete_and_insert() {
        let ops = vec![
            Operation::Delete {
                reference: addr("1.1.1"),
                boundary: None,
            },
            Operation::Insert {
                reference: addr("1.1.2"),
                anchor: Anchor::Before,
                fragments: vec![content("<x>new</x>")],
            },
        ];
        assert_eq!(apply("<a><b>old</b><c/></a>", &ops).unwrap(), "<a><x>new</x><c /></a>");
    }

    #[test]
    fn test_append_to_element_and_document() {
        let ops = vec![
            Operation::Insert {
                reference: addr("1"),
                anchor: Anchor::Append,
                fragments: vec![Fragment::Comment("tail".into())],
            },
            Operation::Insert {
                reference: addr("1.1"),
                anchor: Anchor::Append,
                fragments: vec![content("<b/>")],
            },
        ];
        assert_eq!(apply("<a/>", &ops).unwrap(), "<a><b /></a><!--tail-->");
    }

    #[test]
    fn test_boundary_edit_and_attributes() {
        let ops = vec![
            Operation::Delete {
                reference: addr("1.1.1"),
                boundary: Some(Boundary::Start),
            },
            Operation::Delete {
                reference: addr("1.1.1"),
                boundary: Some(Boundary::End),
            },
            Operation::Delete {
                reference: addr("1.1.1.1"),
                boundary: None,
            },
            Operation::Insert {
                reference: addr("1.1.1.2"),
                anchor: Anchor::Before,
                fragments: vec![
                    Fragment::Start(QName::new("c")),
                    Fragment::Attribute(XmlAttribute::new(QName::new("k"), "2")),
                ],
            },
            Operation::Insert {
                reference: addr("1.1"),
                anchor: Anchor::Append,
                fragments: vec![Fragment::End(QName::new("c"))],
            },
        ];
        let base = r#"<a><b k="1">text</b></a>"#;
        assert_eq!(apply(base, &ops).unwrap(), r#"<a><c k="2">text</c></a>"#);

        let annotated = annotate(base, &ops);
        assert_eq!(
            annotated,
            concat!(
                r#"<a><v:removed xmlns:v="http://exist-db.org/versioning"><v:start name="b" /></v:removed>"#,
                r#"<v:removed xmlns:v="http://exist-db.org/versioning"><v:attribute k="1" /></v:removed>"#,
                r#"<v:inserted xmlns:v="http://exist-db.org/versioning"><v:start name="c" /><v:attribute k="2" /></v:inserted>"#,
                r#"text<v:removed xmlns:v="http://exist-db.org/versioning"><v:end name="b" /></v:removed>"#,
                r#"<v:inserted xmlns:v="http://exist-db.org/versioning"><v:end name="c" /></v:inserted></a>"#
            )
        );
    }

    fn unwrap(reference: &str) -> Vec<Operation> {
        [Boundary::Start, Boundary::End]
            .into_iter()
            .map(|boundary| Operation::Delete {
                reference: addr(reference),
                boundary: Some(boundary),
            })
            .collect()
    }

    #[test]
    fn test_attribute_kept_on_unwrapped_element_rejected() {
        for (base, element) in [
            (r#"<a><b k="1">t</b></a>"#, "1.1.1"),
            (r#"<a>x<b k="1">t</b></a>"#, "1.1.2"),
        ] {
            let ops = unwrap(element);
            assert!(matches!(apply(base, &ops), Err(Error::MalformedEditScript(_))));

            let base = Document::parse_str(base).unwrap();
            let patch = Patch::from_operations(&ops).unwrap();
            let mut writer = XmlWriter::new(Vec::new());
            assert!(matches!(
                patch.annotate(base.stream(), &mut writer),
                Err(Error::MalformedEditScript(_))
            ));
        }
        assert_eq!(apply("<a><b>t</b></a>", &unwrap("1.1.1")).unwrap(), "<a>t</a>");
    }

    #[test]
    fn test_one_sided_tag_deletion_rejected() {
        for (kept, boundary) in [("end", Boundary::Start), ("start", Boundary::End)] {
            let ops = vec![Operation::Delete {
                reference: addr("1.1.1"),
                boundary: Some(boundary),
            }];
            let err = apply("<a><b>t</b></a>", &ops).unwrap_err();
            assert!(
                matches!(err, Error::MalformedEditScript(_)),
                "{} tag kept: {:?}",
                kept,
                err
            );
        }
    }

    #[test]
    fn test_annotate_defers_markers_until_attributes_are_done() {
        let ops = vec![
            Operation::Delete {
                reference: addr("1.1.1"),
                boundary: None,
            },
            Operation::Insert {
                reference: addr("1.1.2"),
                anchor: Anchor::Before,
                fragments: vec![Fragment::Attribute(XmlAttribute::new(QName::new("n"), "1"))],
            },
        ];
        let annotated = annotate(r#"<a x="1" y="2"/>"#, &ops);
        assert_eq!(
            annotated,
            concat!(
                r#"<a y="2"><v:removed xmlns:v="http://exist-db.org/versioning"><v:attribute x="1" /></v:removed>"#,
                r#"<v:inserted xmlns:v="http://exist-db.org/versioning"><v:attribute n="1" /></v:inserted></a>"#
            )
        );
        assert_eq!(apply(r#"<a x="1" y="2"/>"#, &ops).unwrap(), r#"<a n="1" y="2" />"#);
    }

    #[test]
    fn test_annotate_wraps_removed_subtrees() {
        let ops = vec![Operation::Delete {
            reference: addr("1.1.1"),
            boundary: None,
        }];
        assert_eq!(
            annotate(r#"<a><b i="1"><c/></b>t</a>"#, &ops),
            r#"<a><v:removed xmlns:v="http://exist-db.org/versioning"><b i="1"><c /></b></v:removed>t</a>"#
        );
    }

    #[test]
    fn test_unresolvable_reference() {
        let ops = vec![Operation::Delete {
            reference: addr("1.1.9"),
            boundary: None,
        }];
        assert!(matches!(
            apply("<a><b/></a>", &ops),
            Err(Error::UnresolvableReference(a)) if a == addr("1.1.9")
        ));
    }

    #[test]
    fn test_references_inside_deleted_subtree_are_unresolvable() {
        let ops = vec![
            Operation::Delete {
                reference: addr("1.1.1"),
                boundary: None,
            },
            Operation::Delete {
                reference: addr("1.1.1.1"),
                boundary: None,
            },
        ];
        assert!(matches!(
            apply("<a><b>x</b></a>", &ops),
            Err(Error::UnresolvableReference(_))
        ));
    }

    #[test]
    fn test_duplicate_operations_rejected() {
        let ops = vec![
            Operation::Insert {
                reference: addr("1.1"),
                anchor: Anchor::Append,
                fragments: vec![],
            },
            Operation::Insert {
                reference: addr("1.1"),
                anchor: Anchor::Append,
                fragments: vec![],
            },
        ];
        assert!(matches!(
            Patch::from_operations(&ops),
            Err(Error::MalformedEditScript(_))
        ));
    }

    #[test]
    fn test_removed_document() {
        let script = EditScript {
            properties: VersionProperties::new("/db/gone.xml", 4, "admin"),
            body: ScriptBody::Removed,
        };
        let base = Document::parse_str("<a/>").unwrap();
        let patch = Patch::new(&script).unwrap();
        let mut builder = DocumentBuilder::new();
        let err = patch.patch(base.stream(), &mut builder).unwrap_err();
        assert!(matches!(err, Error::DocumentRemoved { revision: 4, .. }));
    }
}
