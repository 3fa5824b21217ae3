//! Persisted edit scripts.
//!
//! A revision is stored as a `v:version` document: a properties block naming
//! the document, revision number, date, author and session key, followed by
//! either the operations turning the previous revision into this one or a
//! marker for a removal or whole-copy replacement.
//!
//! ```xml
//! <v:version xmlns:v="http://exist-db.org/versioning">
//!   <v:properties>
//!     <v:document>/db/test.xml</v:document><v:revision>3</v:revision>
//!     <v:date>2024-01-01T00:00:00+00:00</v:date><v:user>admin</v:user>
//!   </v:properties>
//!   <v:delete ref="1.1.2"/>
//!   <v:append ref="1.1"><b/></v:append>
//! </v:version>
//! ```

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::constants::{
    INSERTED_TAG, PROPERTIES_TAG, PROP_DATE, PROP_DOCUMENT, PROP_KEY, PROP_REVISION, PROP_USER,
    REMOVED_TAG, REPLACED_BINARY_TAG, REPLACED_XML_TAG, VERSIONING_NS, VERSION_TAG,
};
use crate::error::{Error, Result};
use crate::node::{NodeAddress, QName, XmlAttribute};
use crate::xml::{emit, EventKind, EventSink, NodeStream, ParseFlags, StreamEvent, XmlStreamReader};

use super::difference::{name_attributes, vname, Anchor, Boundary};

/// Metadata recorded with every revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProperties {
    /// Path of the versioned document.
    pub document: String,
    pub revision: u64,
    pub date: DateTime<Utc>,
    pub user: String,
    /// Session key of the writer, used for conflict detection.
    pub key: Option<String>,
}

impl VersionProperties {
    /// Properties dated now, without a session key.
    pub fn new(document: impl Into<String>, revision: u64, user: impl Into<String>) -> Self {
        VersionProperties {
            document: document.into(),
            revision,
            date: Utc::now(),
            user: user.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    fn write(&self, sink: &mut dyn EventSink) -> Result<()> {
        let properties = vname(PROPERTIES_TAG);
        sink.start_element(&properties, &[])?;
        text_element(sink, PROP_DOCUMENT, &self.document)?;
        text_element(sink, PROP_REVISION, &self.revision.to_string())?;
        text_element(
            sink,
            PROP_DATE,
            &self.date.to_rfc3339_opts(SecondsFormat::Millis, false),
        )?;
        text_element(sink, PROP_USER, &self.user)?;
        if let Some(key) = &self.key {
            text_element(sink, PROP_KEY, key)?;
        }
        sink.end_element(&properties)
    }
}

fn text_element(sink: &mut dyn EventSink, local: &str, text: &str) -> Result<()> {
    let name = vname(local);
    sink.start_element(&name, &[])?;
    sink.characters(text)?;
    sink.end_element(&name)
}

/// Writes a `v:version` document: properties, then whatever `body` writes.
pub fn write_version<F>(
    sink: &mut dyn EventSink,
    properties: &VersionProperties,
    body: F,
) -> Result<()>
where
    F: FnOnce(&mut dyn EventSink) -> Result<()>,
{
    let root = vname(VERSION_TAG);
    sink.start_element(&root, &[])?;
    properties.write(sink)?;
    body(sink)?;
    sink.end_element(&root)
}

/// One piece of inserted content, as read back from a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// An attribute added to the element being written.
    Attribute(XmlAttribute),
    /// A start tag whose end tag arrives in a later operation.
    Start(QName),
    /// An end tag whose start tag was written by an earlier operation.
    End(QName),
    Comment(String),
    /// Verbatim content: a complete subtree or a single leaf node.
    Content(Vec<EventKind>),
}

impl Fragment {
    /// Writes the fragment as document content.
    pub fn materialize(&self, sink: &mut dyn EventSink) -> Result<()> {
        match self {
            Fragment::Attribute(attr) => sink.attribute(attr.qname(), attr.value()),
            Fragment::Start(name) => sink.start_element(name, &[]),
            Fragment::End(name) => sink.end_element(name),
            Fragment::Comment(text) => sink.comment(text),
            Fragment::Content(events) => events.iter().try_for_each(|event| emit(sink, event)),
        }
    }

    /// Writes the fragment in script form, with markers for partial content.
    fn write_marked(&self, sink: &mut dyn EventSink) -> Result<()> {
        match self {
            Fragment::Attribute(attr) => leaf(sink, "attribute", std::slice::from_ref(attr)),
            Fragment::Start(name) => leaf(sink, "start", &name_attributes(name)),
            Fragment::End(name) => leaf(sink, "end", &name_attributes(name)),
            Fragment::Comment(text) => text_element(sink, "comment", text),
            Fragment::Content(_) => self.materialize(sink),
        }
    }

    /// Writes the fragment for an annotated document: markers for attributes
    /// and unbalanced tags, real nodes otherwise.
    pub(crate) fn annotate(&self, sink: &mut dyn EventSink) -> Result<()> {
        match self {
            Fragment::Comment(text) => sink.comment(text),
            _ => self.write_marked(sink),
        }
    }
}

fn leaf(sink: &mut dyn EventSink, local: &str, attributes: &[XmlAttribute]) -> Result<()> {
    let name = vname(local);
    sink.start_element(&name, attributes)?;
    sink.end_element(&name)
}

/// An edit operation read back from a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert {
        reference: NodeAddress,
        anchor: Anchor,
        fragments: Vec<Fragment>,
    },
    Delete {
        reference: NodeAddress,
        boundary: Option<Boundary>,
    },
}

impl Operation {
    pub fn reference(&self) -> &NodeAddress {
        match self {
            Operation::Insert { reference, .. } | Operation::Delete { reference, .. } => reference,
        }
    }

    fn write(&self, sink: &mut dyn EventSink) -> Result<()> {
        match self {
            Operation::Insert {
                reference,
                anchor,
                fragments,
            } => {
                let tag = vname(match anchor {
                    Anchor::Before => "insert",
                    Anchor::Append => "append",
                });
                sink.start_element(
                    &tag,
                    &[XmlAttribute::new(QName::new("ref"), reference.to_string())],
                )?;
                for fragment in fragments {
                    fragment.write_marked(sink)?;
                }
                sink.end_element(&tag)
            }
            Operation::Delete {
                reference,
                boundary,
            } => {
                let mut attributes = Vec::with_capacity(2);
                if let Some(boundary) = boundary {
                    attributes.push(XmlAttribute::new(QName::new("event"), boundary.as_str()));
                }
                attributes.push(XmlAttribute::new(QName::new("ref"), reference.to_string()));
                leaf(sink, "delete", &attributes)
            }
        }
    }
}

/// What a revision did to its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptBody {
    /// Structural changes against the previous revision.
    Changes(Vec<Operation>),
    /// The document was removed.
    Removed,
    /// The document was replaced by a binary resource, stored whole under the reference.
    ReplacedBinary(String),
    /// A binary resource was replaced by an XML document, stored whole under the reference.
    ReplacedXml(String),
}

/// A parsed revision record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditScript {
    pub properties: VersionProperties,
    pub body: ScriptBody,
}

impl EditScript {
    /// Parses a script from a string.
    pub fn parse_str(xml: &str) -> Result<Self> {
        Self::parse(XmlStreamReader::from_str(xml, ParseFlags::PRESERVE_WHITESPACE))
    }

    /// Parses a script from a file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(XmlStreamReader::from_file(path, ParseFlags::PRESERVE_WHITESPACE)?)
    }

    /// Parses a script from an event stream. Whitespace-only text between
    /// structural elements is ignored.
    pub fn parse<S: NodeStream>(stream: S) -> Result<Self> {
        ScriptReader {
            stream,
            peeked: None,
        }
        .read()
    }

    /// Operations of a structural revision; empty for the other bodies.
    pub fn operations(&self) -> &[Operation] {
        match &self.body {
            ScriptBody::Changes(operations) => operations,
            _ => &[],
        }
    }

    /// Writes the script in its persisted form.
    pub fn write_to(&self, sink: &mut dyn EventSink) -> Result<()> {
        write_version(sink, &self.properties, |sink| match &self.body {
            ScriptBody::Changes(operations) => {
                operations.iter().try_for_each(|operation| operation.write(sink))
            }
            ScriptBody::Removed => leaf(sink, REMOVED_TAG, &[]),
            ScriptBody::ReplacedBinary(reference) => leaf(
                sink,
                REPLACED_BINARY_TAG,
                &[XmlAttribute::new(QName::new("ref"), reference.as_str())],
            ),
            ScriptBody::ReplacedXml(reference) => leaf(
                sink,
                REPLACED_XML_TAG,
                &[XmlAttribute::new(QName::new("ref"), reference.as_str())],
            ),
        })
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedEditScript(message.into())
}

fn is_blank(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Text(text) if text.chars().all(char::is_whitespace))
}

/// Pull parser over the events of a script.
struct ScriptReader<S: NodeStream> {
    stream: S,
    peeked: Option<StreamEvent>,
}

impl<S: NodeStream> ScriptReader<S> {
    fn next(&mut self) -> Result<Option<StreamEvent>> {
        match self.peeked.take() {
            Some(event) => Ok(Some(event)),
            None => self.stream.next_event(),
        }
    }

    fn expect(&mut self) -> Result<EventKind> {
        self.next()?
            .map(|event| event.kind)
            .ok_or_else(|| malformed("unexpected end of script"))
    }

    /// Next event that is not whitespace-only text.
    fn expect_structural(&mut self) -> Result<EventKind> {
        loop {
            let kind = self.expect()?;
            if !is_blank(&kind) {
                return Ok(kind);
            }
        }
    }

    /// Consumes the attribute events following a start tag.
    fn attributes(&mut self) -> Result<Vec<(QName, String)>> {
        let mut attributes = Vec::new();
        loop {
            match self.next()? {
                Some(StreamEvent {
                    kind: EventKind::Attribute(name, value),
                    ..
                }) => attributes.push((name, value)),
                other => {
                    self.peeked = other;
                    return Ok(attributes);
                }
            }
        }
    }

    /// Consumes the end tag of an element that must be empty.
    fn expect_end(&mut self, element: &str) -> Result<()> {
        match self.expect_structural()? {
            EventKind::EndElement(_) => Ok(()),
            other => Err(malformed(format!(
                "unexpected content in v:{}: {:?}",
                element, other
            ))),
        }
    }

    /// Text content up to the end tag of the current element.
    fn text_content(&mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.expect()? {
                EventKind::Text(more) => text.push_str(&more),
                EventKind::EndElement(_) => return Ok(text),
                other => return Err(malformed(format!("expected text, found {:?}", other))),
            }
        }
    }

    fn read(mut self) -> Result<EditScript> {
        match self.expect_structural()? {
            EventKind::StartElement(name) if name.is(VERSIONING_NS, VERSION_TAG) => {}
            other => return Err(malformed(format!("expected v:version, found {:?}", other))),
        }
        self.attributes()?;

        let mut properties = None;
        let mut operations = Vec::new();
        let mut body = None;

        loop {
            let name = match self.expect_structural()? {
                EventKind::EndElement(_) => break,
                EventKind::StartElement(name) if name.namespace() == Some(VERSIONING_NS) => name,
                other => return Err(malformed(format!("unexpected {:?} in v:version", other))),
            };
            let attributes = self.attributes()?;
            match name.local_name() {
                PROPERTIES_TAG => properties = Some(self.read_properties()?),
                "insert" | "append" => {
                    let anchor = if name.local_name() == "insert" {
                        Anchor::Before
                    } else {
                        Anchor::Append
                    };
                    let reference = reference(&attributes, name.local_name())?;
                    let fragments = self.read_fragments()?;
                    operations.push(Operation::Insert {
                        reference,
                        anchor,
                        fragments,
                    });
                }
                "delete" => {
                    let reference = reference(&attributes, "delete")?;
                    let boundary = match attribute(&attributes, "event") {
                        None => None,
                        Some(value) => Some(Boundary::parse(value).ok_or_else(|| {
                            malformed(format!("invalid delete event: {:?}", value))
                        })?),
                    };
                    self.expect_end("delete")?;
                    operations.push(Operation::Delete {
                        reference,
                        boundary,
                    });
                }
                REMOVED_TAG => {
                    self.expect_end(REMOVED_TAG)?;
                    body = Some(ScriptBody::Removed);
                }
                REPLACED_BINARY_TAG | REPLACED_XML_TAG => {
                    let target = attribute(&attributes, "ref")
                        .ok_or_else(|| malformed(format!("v:{} without ref", name.local_name())))?
                        .to_string();
                    self.expect_end(name.local_name())?;
                    body = Some(if name.local_name() == REPLACED_BINARY_TAG {
                        ScriptBody::ReplacedBinary(target)
                    } else {
                        ScriptBody::ReplacedXml(target)
                    });
                }
                other => return Err(malformed(format!("unknown element v:{}", other))),
            }
        }

        let properties = properties.ok_or_else(|| malformed("missing v:properties"))?;
        let body = match body {
            Some(_) if !operations.is_empty() => {
                return Err(malformed("structural operations mixed with a whole-document change"))
            }
            Some(body) => body,
            None => ScriptBody::Changes(operations),
        };
        Ok(EditScript { properties, body })
    }

    fn read_properties(&mut self) -> Result<VersionProperties> {
        let (mut document, mut revision, mut date, mut user, mut key) =
            (None, None, None, None, None);
        loop {
            let name = match self.expect_structural()? {
                EventKind::EndElement(_) => break,
                EventKind::StartElement(name) if name.namespace() == Some(VERSIONING_NS) => name,
                other => return Err(malformed(format!("unexpected {:?} in v:properties", other))),
            };
            self.attributes()?;
            let text = self.text_content()?;
            match name.local_name() {
                PROP_DOCUMENT => document = Some(text),
                PROP_REVISION => {
                    revision = Some(text.trim().parse::<u64>().map_err(|_| {
                        malformed(format!("invalid revision number: {:?}", text))
                    })?)
                }
                PROP_DATE => {
                    date = Some(
                        DateTime::parse_from_rfc3339(text.trim())
                            .map_err(|e| malformed(format!("invalid date {:?}: {}", text, e)))?
                            .with_timezone(&Utc),
                    )
                }
                PROP_USER => user = Some(text),
                PROP_KEY => key = Some(text),
                // Unknown properties are tolerated.
                _ => {}
            }
        }
        Ok(VersionProperties {
            document: document.ok_or_else(|| malformed("missing v:document"))?,
            revision: revision.ok_or_else(|| malformed("missing v:revision"))?,
            date: date.ok_or_else(|| malformed("missing v:date"))?,
            user: user.unwrap_or_default(),
            key,
        })
    }

    /// Reads the content of a `v:insert` or `v:append` up to its end tag.
    fn read_fragments(&mut self) -> Result<Vec<Fragment>> {
        let mut fragments = Vec::new();
        loop {
            match self.expect()? {
                EventKind::EndElement(_) => return Ok(fragments),
                EventKind::StartElement(name) if name.namespace() == Some(VERSIONING_NS) => {
                    let attributes = self.attributes()?;
                    let fragment = match name.local_name() {
                        "attribute" => {
                            let (attr_name, value) = attributes
                                .into_iter()
                                .next()
                                .ok_or_else(|| malformed("v:attribute without an attribute"))?;
                            self.expect_end("attribute")?;
                            Fragment::Attribute(XmlAttribute::new(attr_name, value))
                        }
                        "start" | "end" => {
                            let lexical = attribute(&attributes, "name").ok_or_else(|| {
                                malformed(format!("v:{} without name", name.local_name()))
                            })?;
                            let qname =
                                QName::from_lexical(lexical, attribute(&attributes, "namespace"));
                            self.expect_end(name.local_name())?;
                            if name.local_name() == "start" {
                                Fragment::Start(qname)
                            } else {
                                Fragment::End(qname)
                            }
                        }
                        "comment" => Fragment::Comment(self.text_content()?),
                        other => {
                            return Err(malformed(format!(
                                "unexpected v:{} in inserted content",
                                other
                            )))
                        }
                    };
                    fragments.push(fragment);
                }
                EventKind::StartElement(name) => {
                    fragments.push(Fragment::Content(self.subtree(name)?));
                }
                EventKind::Attribute(..) => {
                    return Err(malformed("attribute on inserted content"));
                }
                leaf => fragments.push(Fragment::Content(vec![leaf])),
            }
        }
    }

    /// Collects a complete subtree whose start tag was just read.
    fn subtree(&mut self, name: QName) -> Result<Vec<EventKind>> {
        let mut events = vec![EventKind::StartElement(name)];
        let mut depth = 1usize;
        while depth > 0 {
            let kind = self.expect()?;
            match &kind {
                EventKind::StartElement(_) => depth += 1,
                EventKind::EndElement(_) => depth -= 1,
                _ => {}
            }
            events.push(kind);
        }
        Ok(events)
    }
}

fn attribute<'a>(attributes: &'a [(QName, String)], local: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(name, _)| !name.has_namespace() && name.local_name() == local)
        .map(|(_, value)| value.as_str())
}

fn reference(attributes: &[(QName, String)], element: &str) -> Result<NodeAddress> {
    attribute(attributes, "ref")
        .ok_or_else(|| malformed(format!("v:{} without ref", element)))?
        .parse()
        .map_err(|_| malformed(format!("invalid ref on v:{}", element)))
}

/// Name of the annotation wrapper for inserted content.
pub(crate) fn inserted_tag() -> QName {
    vname(INSERTED_TAG)
}

/// Name of the annotation wrapper for removed content.
pub(crate) fn removed_tag() -> QName {
    vname(REMOVED_TAG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlWriter;

    fn render(script: &EditScript) -> String {
        let mut writer = XmlWriter::new(Vec::new());
        script.write_to(&mut writer).unwrap();
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    const SCRIPT: &str = r#"<v:version xmlns:v="http://exist-db.org/versioning">
  <v:properties>
    <v:document>/db/test.xml</v:document>
    <v:revision>3</v:revision>
    <v:date>2024-05-01T10:00:00.000+00:00</v:date>
    <v:user>admin</v:user>
    <v:key>18f2a3</v:key>
  </v:properties>
  <v:insert ref="1.1.2"><v:start name="c"/><v:attribute id="x"/> <b>one</b><v:comment>note</v:comment></v:insert>
  <v:append ref="1.1"><v:end name="p:c" namespace="urn:p"/></v:append>
  <v:delete ref="1.1.3" event="start"/>
  <v:delete ref="1.1.4"/>
</v:version>"#;

    #[test]
    fn test_parse_properties_and_operations() {
        let script = EditScript::parse_str(SCRIPT).unwrap();
        assert_eq!(script.properties.document, "/db/test.xml");
        assert_eq!(script.properties.revision, 3);
        assert_eq!(script.properties.user, "admin");
        assert_eq!(script.properties.key.as_deref(), Some("18f2a3"));

        let ops = script.operations();
        assert_eq!(ops.len(), 4);
        match &ops[0] {
            Operation::Insert {
                reference,
                anchor,
                fragments,
            } => {
                assert_eq!(reference, &addr("1.1.2"));
                assert_eq!(*anchor, Anchor::Before);
                assert_eq!(fragments.len(), 5);
                assert_eq!(fragments[0], Fragment::Start(QName::new("c")));
                assert_eq!(
                    fragments[1],
                    Fragment::Attribute(XmlAttribute::new(QName::new("id"), "x"))
                );
                // Whitespace inside inserted content is content.
                assert_eq!(fragments[2], Fragment::Content(vec![EventKind::Text(" ".into())]));
                assert_eq!(fragments[4], Fragment::Comment("note".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &ops[1] {
            Operation::Insert { fragments, .. } => {
                assert_eq!(
                    fragments[0],
                    Fragment::End(QName::with_namespace("c", "urn:p", Some("p")))
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            ops[2],
            Operation::Delete {
                reference: addr("1.1.3"),
                boundary: Some(Boundary::Start)
            }
        );
    }

    #[test]
    fn test_write_then_parse_preserves_script() {
        let script = EditScript::parse_str(SCRIPT).unwrap();
        let reparsed = EditScript::parse_str(&render(&script)).unwrap();
        assert_eq!(reparsed, script);
    }

    #[test]
    fn test_removed_and_binary_bodies() {
        let properties = VersionProperties::new("/db/a.xml", 7, "guest");
        let removed = EditScript {
            properties: properties.clone(),
            body: ScriptBody::Removed,
        };
        let output = render(&removed);
        assert!(output.contains("<v:removed />"));
        assert_eq!(EditScript::parse_str(&output).unwrap().body, ScriptBody::Removed);

        let binary = EditScript {
            properties,
            body: ScriptBody::ReplacedBinary("a.xml.7.binary".into()),
        };
        let parsed = EditScript::parse_str(&render(&binary)).unwrap();
        assert_eq!(parsed.body, ScriptBody::ReplacedBinary("a.xml.7.binary".into()));
        assert!(parsed.operations().is_empty());
    }

    #[test]
    fn test_malformed_scripts() {
        let cases = [
            "<root/>",
            r#"<v:version xmlns:v="http://exist-db.org/versioning"><v:delete ref="1.1"/></v:version>"#,
            r#"<v:version xmlns:v="http://exist-db.org/versioning"><v:properties><v:document>d</v:document><v:revision>x</v:revision><v:date>2024-01-01T00:00:00Z</v:date></v:properties></v:version>"#,
            r#"<v:version xmlns:v="http://exist-db.org/versioning"><v:properties><v:document>d</v:document><v:revision>1</v:revision><v:date>2024-01-01T00:00:00Z</v:date></v:properties><v:delete/></v:version>"#,
            r#"<v:version xmlns:v="http://exist-db.org/versioning"><v:properties><v:document>d</v:document><v:revision>1</v:revision><v:date>2024-01-01T00:00:00Z</v:date></v:properties><v:delete ref="1.1" event="middle"/></v:version>"#,
            r#"<v:version xmlns:v="http://exist-db.org/versioning"><v:properties><v:document>d</v:document><v:revision>1</v:revision><v:date>2024-01-01T00:00:00Z</v:date></v:properties><v:frobnicate/></v:version>"#,
        ];
        for case in cases {
            assert!(
                matches!(EditScript::parse_str(case), Err(Error::MalformedEditScript(_))),
                "accepted {}",
                case
            );
        }
    }

    #[test]
    fn test_date_round_trips_with_millisecond_precision() {
        let date = DateTime::parse_from_rfc3339("2023-11-14T22:13:20.123Z")
            .unwrap()
            .with_timezone(&Utc);
        let script = EditScript {
            properties: VersionProperties::new("/db/a.xml", 1, "u").with_date(date),
            body: ScriptBody::Changes(Vec::new()),
        };
        assert_eq!(EditScript::parse_str(&render(&script)).unwrap().properties.date, date);
    }
}
