//! Per-document revision history.
//!
//! Each versioned document keeps a full copy of the revision it had when it
//! was first changed, followed by a forward chain of persisted edit scripts.
//! Any revision is rebuilt by replaying the chain on the base copy.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::constants::{
    ATTR_VERSION_KEY, ATTR_VERSION_PATH, ATTR_VERSION_REVISION, BINARY_SUFFIX, VERSIONING_NS,
    VERSIONING_PREFIX, XML_SUFFIX,
};
use crate::diff::{Diff, EditScript, Patch, ScriptBody, VersionProperties};
use crate::error::{Error, Result};
use crate::node::{Document, QName, XmlAttribute};
use crate::xml::{DocumentBuilder, EventKind, EventSink, NodeStream, XmlWriter};

use super::allocator::RevisionAllocator;
use super::config::VersioningConfig;
use super::store::RevisionStore;

/// What a document was at some revision.
#[derive(Debug, Clone)]
enum Content {
    Xml(Document),
    /// A binary resource, stored whole outside the history.
    Binary,
}

#[derive(Debug)]
struct StoredRevision {
    key: Option<String>,
    xml: String,
}

#[derive(Debug)]
struct DocumentHistory {
    base: Content,
    /// Content after the newest revision; a removed document keeps its last
    /// content so a recreated one diffs against it.
    last: Content,
    revisions: BTreeMap<u64, StoredRevision>,
    /// Whole XML copies referenced by `replaced-xml` revisions.
    copies: HashMap<String, Document>,
}

impl DocumentHistory {
    fn new(base: Content) -> Self {
        DocumentHistory {
            last: base.clone(),
            base,
            revisions: BTreeMap::new(),
            copies: HashMap::new(),
        }
    }

    fn current(&self) -> u64 {
        self.revisions.keys().next_back().copied().unwrap_or(0)
    }

    fn newer_than(
        &self,
        revision: u64,
    ) -> impl DoubleEndedIterator<Item = (&u64, &StoredRevision)> {
        self.revisions
            .range((Bound::Excluded(revision), Bound::Unbounded))
    }

    fn newer_revision_exists(&self, base_revision: u64, key: &str) -> bool {
        self.newer_than(base_revision)
            .any(|(_, stored)| stored.key.as_deref().is_some_and(|k| k != key))
    }

    fn base_revision_for(&self, base_revision: u64, key: &str) -> u64 {
        self.newer_than(base_revision)
            .rev()
            .find(|(_, stored)| stored.key.as_deref() == Some(key))
            .map(|(revision, _)| *revision)
            .or_else(|| {
                self.revisions
                    .contains_key(&base_revision)
                    .then_some(base_revision)
            })
            .unwrap_or(0)
    }

    fn script(&self, path: &str, revision: u64) -> Result<EditScript> {
        let stored = self
            .revisions
            .get(&revision)
            .ok_or_else(|| Error::UnknownRevision {
                path: path.to_string(),
                revision,
            })?;
        EditScript::parse_str(&stored.xml)
    }

    /// Replays every revision older than `revision` on the base copy.
    fn state_before(&self, revision: u64) -> Result<Content> {
        let mut state = self.base.clone();
        for stored in self.revisions.range(..revision).map(|(_, stored)| stored) {
            let script = EditScript::parse_str(&stored.xml)?;
            state = self.apply(state, &script)?;
        }
        Ok(state)
    }

    fn apply(&self, state: Content, script: &EditScript) -> Result<Content> {
        match &script.body {
            ScriptBody::Changes(_) => {
                let Content::Xml(document) = state else {
                    return Err(Error::Usage("cannot patch a binary revision"));
                };
                let mut builder = DocumentBuilder::new();
                Patch::new(script)?.patch(document.stream(), &mut builder)?;
                Ok(Content::Xml(builder.finish()?))
            }
            ScriptBody::Removed => Ok(state),
            ScriptBody::ReplacedBinary(_) => Ok(Content::Binary),
            ScriptBody::ReplacedXml(reference) => self
                .copies
                .get(reference)
                .cloned()
                .map(Content::Xml)
                .ok_or_else(|| {
                    Error::MalformedEditScript(format!("no stored copy named {reference}"))
                }),
        }
    }
}

/// A document after [`VersionHistory::store`] accepted it.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// The incoming document without its versioning attributes.
    pub document: Document,
    /// Revision recorded for the write, if the document was versioned.
    pub revision: Option<u64>,
}

/// In-memory revision history of a set of documents.
///
/// All state sits behind one lock that each operation holds for its whole
/// duration, so a conflict check and the write it guards cannot interleave
/// with another write.
pub struct VersionHistory {
    documents: Mutex<HashMap<String, DocumentHistory>>,
    allocator: Arc<dyn RevisionAllocator>,
    config: VersioningConfig,
}

impl VersionHistory {
    pub fn new(allocator: Arc<dyn RevisionAllocator>, config: VersioningConfig) -> Self {
        VersionHistory {
            documents: Mutex::new(HashMap::new()),
            allocator,
            config,
        }
    }

    pub fn config(&self) -> &VersioningConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, DocumentHistory>>> {
        self.documents
            .lock()
            .map_err(|e| Error::Allocation(format!("lock poisoned: {e}")))
    }

    /// Records the change from `previous` to `current` and returns the new
    /// revision number.
    ///
    /// The first recorded change of `path` keeps `previous` as the base copy.
    /// Later changes are diffed against the last recorded content, and
    /// `previous` is ignored.
    pub fn record(
        &self,
        path: &str,
        previous: &Document,
        current: &Document,
        user: &str,
        key: Option<&str>,
    ) -> Result<u64> {
        let mut documents = self.lock()?;
        let history = documents
            .entry(path.to_string())
            .or_insert_with(|| DocumentHistory::new(Content::Xml(previous.clone())));
        self.record_change(path, history, current, user, key)
    }

    fn record_change(
        &self,
        path: &str,
        history: &mut DocumentHistory,
        current: &Document,
        user: &str,
        key: Option<&str>,
    ) -> Result<u64> {
        let (revision, xml) = match &history.last {
            Content::Xml(last) => {
                let mut diff = Diff::new(self.config.diff);
                let changes = diff.diff(last, current)?.len();
                let revision = self.allocator.next_revision()?;
                let properties = properties(path, revision, user, key);
                let xml = render(|sink| diff.write_xml(sink, &properties))?;
                debug!(path, revision, changes, "diffed revision");
                (revision, xml)
            }
            Content::Binary => {
                let revision = self.allocator.next_revision()?;
                let reference = copy_name(path, revision, XML_SUFFIX);
                let script = EditScript {
                    properties: properties(path, revision, user, key),
                    body: ScriptBody::ReplacedXml(reference.clone()),
                };
                let xml = render(|sink| script.write_to(sink))?;
                history.copies.insert(reference, current.clone());
                (revision, xml)
            }
        };

        history.revisions.insert(
            revision,
            StoredRevision {
                key: key.map(str::to_string),
                xml,
            },
        );
        history.last = Content::Xml(current.clone());
        info!(path, revision, user, "recorded revision");
        Ok(revision)
    }

    /// Records the removal of `path`. `document` is its content at removal
    /// time, kept as the base copy if the document had no history yet.
    pub fn record_removal(&self, path: &str, document: &Document, user: &str) -> Result<u64> {
        let mut documents = self.lock()?;
        let history = documents
            .entry(path.to_string())
            .or_insert_with(|| DocumentHistory::new(Content::Xml(document.clone())));
        let revision = self.allocator.next_revision()?;
        let script = EditScript {
            properties: properties(path, revision, user, None),
            body: ScriptBody::Removed,
        };
        let xml = render(|sink| script.write_to(sink))?;
        history
            .revisions
            .insert(revision, StoredRevision { key: None, xml });
        info!(path, revision, user, "recorded removal");
        Ok(revision)
    }

    /// Records that `path` became a binary resource, stored whole by the
    /// caller under the returned reference. `previous` is the XML content it
    /// replaced, or `None` when it replaced a binary resource.
    pub fn record_binary(
        &self,
        path: &str,
        previous: Option<&Document>,
        user: &str,
    ) -> Result<(u64, String)> {
        let mut documents = self.lock()?;
        let history = documents.entry(path.to_string()).or_insert_with(|| {
            DocumentHistory::new(match previous {
                Some(document) => Content::Xml(document.clone()),
                None => Content::Binary,
            })
        });
        let revision = self.allocator.next_revision()?;
        let reference = copy_name(path, revision, BINARY_SUFFIX);
        let script = EditScript {
            properties: properties(path, revision, user, None),
            body: ScriptBody::ReplacedBinary(reference.clone()),
        };
        let xml = render(|sink| script.write_to(sink))?;
        history
            .revisions
            .insert(revision, StoredRevision { key: None, xml });
        history.last = Content::Binary;
        info!(path, revision, user, reference = %reference, "recorded binary revision");
        Ok((revision, reference))
    }

    /// Accepts a write of `incoming` to `path`.
    ///
    /// When conflict checks are enabled and the root element carries both
    /// `v:revision` and `v:key`, a write based on a revision that another
    /// session has since replaced is rejected with
    /// [`Error::ConflictDetected`] before anything is recorded. Versioning
    /// attributes are stripped from the root either way. A change is recorded
    /// when `previous` is given or the document already has a history.
    pub fn store(
        &self,
        path: &str,
        previous: Option<&Document>,
        incoming: &Document,
        user: &str,
    ) -> Result<StoredDocument> {
        let (document, versioning) = incoming.without_root_attributes_in(VERSIONING_NS)?;
        let find = |local: &str| {
            versioning
                .iter()
                .find(|attr| attr.qname().local_name() == local)
                .map(|attr| attr.value())
        };
        let key = find(ATTR_VERSION_KEY);
        let base = find(ATTR_VERSION_REVISION);

        let mut documents = self.lock()?;
        if self.config.check_for_conflicts {
            if let (Some(key), Some(base)) = (key, base) {
                debug!(path, key, revision = base, "checking for version conflict");
                match base.parse::<u64>() {
                    Ok(base) => {
                        if let Some(history) = documents.get(path) {
                            if history.newer_revision_exists(base, key) {
                                let base_revision = history.base_revision_for(base, key);
                                warn!(path, base_revision, "possible version conflict detected");
                                return Err(Error::ConflictDetected {
                                    path: path.to_string(),
                                    base_revision,
                                });
                            }
                        }
                    }
                    Err(_) => warn!(
                        path,
                        revision = base,
                        "illegal revision number, skipping conflict check"
                    ),
                }
            }
        }

        let history = match (documents.contains_key(path), previous) {
            (true, _) => documents.get_mut(path),
            (false, Some(previous)) => Some(
                documents
                    .entry(path.to_string())
                    .or_insert_with(|| DocumentHistory::new(Content::Xml(previous.clone()))),
            ),
            (false, None) => None,
        };
        let revision = match history {
            Some(history) => Some(self.record_change(path, history, &document, user, key)?),
            None => None,
        };
        Ok(StoredDocument { document, revision })
    }

    /// The base copy of `path`.
    pub fn base(&self, path: &str) -> Result<Document> {
        let documents = self.lock()?;
        let history = lookup(&documents, path)?;
        into_xml(history.base.clone())
    }

    /// Rebuilds `path` as of `revision`.
    pub fn reconstruct(&self, path: &str, revision: u64) -> Result<Document> {
        let documents = self.lock()?;
        let history = lookup(&documents, path)?;
        let script = history.script(path, revision)?;
        if script.body == ScriptBody::Removed {
            return Err(Error::DocumentRemoved {
                path: path.to_string(),
                revision,
            });
        }
        let state = history.state_before(revision)?;
        into_xml(history.apply(state, &script)?)
    }

    /// The revision before `revision`, with the changes `revision` made
    /// marked up in place.
    pub fn annotate(&self, path: &str, revision: u64) -> Result<Document> {
        let documents = self.lock()?;
        let history = lookup(&documents, path)?;
        let script = history.script(path, revision)?;
        let patch = Patch::new(&script)?;
        let document = into_xml(history.state_before(revision)?)?;
        let mut builder = DocumentBuilder::new();
        patch.annotate(document.stream(), &mut builder)?;
        builder.finish()
    }

    /// Properties of every stored revision of `path`, oldest first.
    pub fn revisions(&self, path: &str) -> Result<Vec<VersionProperties>> {
        let documents = self.lock()?;
        let history = lookup(&documents, path)?;
        history
            .revisions
            .values()
            .map(|stored| EditScript::parse_str(&stored.xml).map(|script| script.properties))
            .collect()
    }

    /// The persisted edit script of one revision.
    pub fn script(&self, path: &str, revision: u64) -> Result<String> {
        let documents = self.lock()?;
        lookup(&documents, path)?
            .revisions
            .get(&revision)
            .map(|stored| stored.xml.clone())
            .ok_or_else(|| Error::UnknownRevision {
                path: path.to_string(),
                revision,
            })
    }

    /// Attributes a served copy of `path` carries on its root element so a
    /// later write can be checked for conflicts: `v:revision`, a fresh
    /// `v:key` and `v:path`.
    pub fn versioning_attributes(&self, path: &str) -> Result<Vec<XmlAttribute>> {
        let revision = self.current_revision(path)?;
        let key = format!("{:x}{:x}", Utc::now().timestamp_millis(), revision);
        Ok(vec![
            XmlAttribute::new(versioning_name(ATTR_VERSION_REVISION), revision.to_string()),
            XmlAttribute::new(versioning_name(ATTR_VERSION_KEY), key),
            XmlAttribute::new(versioning_name(ATTR_VERSION_PATH), path),
        ])
    }

    /// A copy of `document` whose root element carries the versioning
    /// attributes of `path`, replacing any it had.
    pub fn with_versioning_attributes(&self, path: &str, document: &Document) -> Result<Document> {
        let attributes = self.versioning_attributes(path)?;
        let (document, _) = document.without_root_attributes_in(VERSIONING_NS)?;
        let mut builder = DocumentBuilder::new();
        let mut stream = document.stream();
        let mut depth = 0usize;
        let mut pending = Some(attributes);
        while let Some(event) = stream.next_event()? {
            builder.push(&event.kind)?;
            match &event.kind {
                EventKind::StartElement(_) => {
                    if depth == 0 {
                        if let Some(attributes) = pending.take() {
                            for attr in &attributes {
                                builder.attribute(attr.qname(), attr.value())?;
                            }
                        }
                    }
                    depth += 1;
                }
                EventKind::EndElement(_) => depth -= 1,
                _ => {}
            }
        }
        builder.finish()
    }
}

impl RevisionStore for VersionHistory {
    fn current_revision(&self, path: &str) -> Result<u64> {
        Ok(self.lock()?.get(path).map_or(0, DocumentHistory::current))
    }

    fn newer_revision_exists(&self, path: &str, base_revision: u64, key: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .get(path)
            .is_some_and(|history| history.newer_revision_exists(base_revision, key)))
    }

    fn base_revision_for(&self, path: &str, base_revision: u64, key: &str) -> Result<u64> {
        Ok(self
            .lock()?
            .get(path)
            .map_or(0, |history| history.base_revision_for(base_revision, key)))
    }
}

fn lookup<'a>(
    documents: &'a HashMap<String, DocumentHistory>,
    path: &str,
) -> Result<&'a DocumentHistory> {
    documents
        .get(path)
        .ok_or_else(|| Error::UnknownDocument(path.to_string()))
}

fn into_xml(content: Content) -> Result<Document> {
    match content {
        Content::Xml(document) => Ok(document),
        Content::Binary => Err(Error::Usage("revision is a binary resource")),
    }
}

fn properties(path: &str, revision: u64, user: &str, key: Option<&str>) -> VersionProperties {
    let properties = VersionProperties::new(path, revision, user);
    match key {
        Some(key) => properties.with_key(key),
        None => properties,
    }
}

fn versioning_name(local: &str) -> QName {
    QName::with_namespace(local, VERSIONING_NS, Some(VERSIONING_PREFIX))
}

/// Name of a whole copy: `<document name>.<revision><suffix>`.
fn copy_name(path: &str, revision: u64, suffix: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    format!("{name}.{revision}{suffix}")
}

/// Writes a script into a string. Nothing is returned unless the whole
/// script was written.
fn render<F>(write: F) -> Result<String>
where
    F: FnOnce(&mut dyn EventSink) -> Result<()>,
{
    let mut writer = XmlWriter::new(Vec::new());
    let sink: &mut dyn EventSink = &mut writer;
    write(sink)?;
    String::from_utf8(writer.finish()?)
        .map_err(|e| Error::Serialization(format!("edit script is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::MemoryRevisionCounter;

    fn history(check_for_conflicts: bool) -> VersionHistory {
        VersionHistory::new(
            Arc::new(MemoryRevisionCounter::new()),
            VersioningConfig {
                check_for_conflicts,
                ..VersioningConfig::default()
            },
        )
    }

    fn doc(xml: &str) -> Document {
        Document::parse_str(xml).unwrap()
    }

    /// A served copy carrying `v:revision` and `v:key`.
    fn versioned(revision: &str, key: &str, body: &str) -> Document {
        doc(&format!(
            r#"<a xmlns:v="{}" v:revision="{}" v:key="{}">{}</a>"#,
            VERSIONING_NS, revision, key, body
        ))
    }

    fn xml(document: &Document) -> String {
        document.to_xml_string().unwrap()
    }

    #[test]
    fn test_record_and_reconstruct_chain() {
        let history = history(false);
        let v0 = doc("<a><b>1</b></a>");
        let v1 = doc("<a><b>1</b><c/></a>");
        let v2 = doc("<a><c>2</c></a>");

        let r1 = history.record("/db/a.xml", &v0, &v1, "admin", None).unwrap();
        let r2 = history.record("/db/a.xml", &v1, &v2, "admin", None).unwrap();
        assert_eq!((r1, r2), (1, 2));

        assert_eq!(xml(&history.base("/db/a.xml").unwrap()), xml(&v0));
        assert_eq!(xml(&history.reconstruct("/db/a.xml", 1).unwrap()), xml(&v1));
        assert_eq!(xml(&history.reconstruct("/db/a.xml", 2).unwrap()), xml(&v2));
        assert_eq!(history.current_revision("/db/a.xml").unwrap(), 2);
        assert_eq!(history.current_revision("/db/other.xml").unwrap(), 0);
    }

    #[test]
    fn test_revisions_and_scripts() {
        let history = history(false);
        let v0 = doc("<a/>");
        let v1 = doc("<a><b/></a>");
        history.record("/db/a.xml", &v0, &v1, "alice", Some("k1")).unwrap();

        let revisions = history.revisions("/db/a.xml").unwrap();
        assert_eq!(revisions.len(), 1);
        assert_eq!(revisions[0].document, "/db/a.xml");
        assert_eq!(revisions[0].user, "alice");
        assert_eq!(revisions[0].key.as_deref(), Some("k1"));

        let script = history.script("/db/a.xml", 1).unwrap();
        assert!(script.contains(r#"<v:append ref="1.1"><b /></v:append>"#));
        assert!(matches!(
            history.script("/db/a.xml", 7),
            Err(Error::UnknownRevision { revision: 7, .. })
        ));
        assert!(matches!(
            history.reconstruct("/db/none.xml", 1),
            Err(Error::UnknownDocument(_))
        ));
    }

    #[test]
    fn test_removal_and_recreation() {
        let history = history(false);
        let v0 = doc("<a>x</a>");
        let v1 = doc("<a>y</a>");
        history.record("/db/a.xml", &v0, &v1, "admin", None).unwrap();
        let removed = history.record_removal("/db/a.xml", &v1, "admin").unwrap();
        assert!(matches!(
            history.reconstruct("/db/a.xml", removed),
            Err(Error::DocumentRemoved { revision, .. }) if revision == removed
        ));

        let v3 = doc("<a>z</a>");
        let r3 = history.record("/db/a.xml", &v1, &v3, "admin", None).unwrap();
        assert_eq!(xml(&history.reconstruct("/db/a.xml", r3).unwrap()), xml(&v3));
    }

    #[test]
    fn test_binary_replacement_round_trip() {
        let history = history(false);
        let v0 = doc("<a/>");
        let (r1, reference) = history.record_binary("/db/col/a.xml", Some(&v0), "admin").unwrap();
        assert_eq!(reference, format!("a.xml.{r1}.binary"));
        assert!(matches!(
            history.reconstruct("/db/col/a.xml", r1),
            Err(Error::Usage(_))
        ));

        let v2 = doc("<a><b/></a>");
        let r2 = history.record("/db/col/a.xml", &v0, &v2, "admin", None).unwrap();
        assert!(history
            .script("/db/col/a.xml", r2)
            .unwrap()
            .contains(&format!(r#"<v:replaced-xml ref="a.xml.{r2}.xml" />"#)));
        assert_eq!(xml(&history.reconstruct("/db/col/a.xml", r2).unwrap()), xml(&v2));

        let v3 = doc("<a><b/><c/></a>");
        let r3 = history.record("/db/col/a.xml", &v2, &v3, "admin", None).unwrap();
        assert_eq!(xml(&history.reconstruct("/db/col/a.xml", r3).unwrap()), xml(&v3));
    }

    #[test]
    fn test_annotate_marks_changes() {
        let history = history(false);
        let v0 = doc("<a><b>1</b><c/></a>");
        let v1 = doc("<a><b>1</b><d/></a>");
        let revision = history.record("/db/a.xml", &v0, &v1, "admin", None).unwrap();
        let annotated = xml(&history.annotate("/db/a.xml", revision).unwrap());
        assert!(annotated.contains("<v:removed"));
        assert!(annotated.contains("<c />"));
        assert!(annotated.contains("<v:inserted"));
        assert!(annotated.contains("<d />"));
    }

    #[test]
    fn test_store_protocol_queries() {
        let history = history(false);
        let v0 = doc("<a/>");
        let v1 = doc("<a>1</a>");
        let v2 = doc("<a>2</a>");
        let v3 = doc("<a>3</a>");
        history.record("/p", &v0, &v1, "u", Some("k1")).unwrap();
        history.record("/p", &v1, &v2, "u", Some("k2")).unwrap();
        history.record("/p", &v2, &v3, "u", None).unwrap();

        assert!(history.newer_revision_exists("/p", 1, "k1").unwrap());
        assert!(!history.newer_revision_exists("/p", 1, "k2").unwrap());
        assert!(!history.newer_revision_exists("/p", 2, "k1").unwrap());
        assert!(!history.newer_revision_exists("/missing", 0, "k").unwrap());

        assert_eq!(history.base_revision_for("/p", 0, "k2").unwrap(), 2);
        assert_eq!(history.base_revision_for("/p", 1, "k9").unwrap(), 1);
        assert_eq!(history.base_revision_for("/p", 7, "k9").unwrap(), 0);
    }

    #[test]
    fn test_store_strips_versioning_attributes() {
        let history = history(true);
        let previous = doc("<a/>");
        let incoming = doc(
            r#"<a xmlns:v="http://exist-db.org/versioning" v:revision="0" v:key="abc" id="1"/>"#,
        );
        let stored = history
            .store("/db/a.xml", Some(&previous), &incoming, "admin")
            .unwrap();
        assert_eq!(stored.revision, Some(1));
        assert_eq!(xml(&stored.document), r#"<a id="1" />"#);
        let revisions = history.revisions("/db/a.xml").unwrap();
        assert_eq!(revisions[0].key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_store_new_document_records_nothing() {
        let history = history(true);
        let stored = history.store("/db/new.xml", None, &doc("<a/>"), "admin").unwrap();
        assert_eq!(stored.revision, None);
        assert_eq!(history.current_revision("/db/new.xml").unwrap(), 0);
    }

    #[test]
    fn test_store_detects_conflict() {
        let history = history(true);
        let v0 = doc("<a/>");
        history
            .store(
                "/p",
                Some(&v0),
                &versioned("0", "k1", "1"),
                "alice",
            )
            .unwrap();

        let stale = versioned("0", "k2", "2");
        let err = history.store("/p", None, &stale, "bob").unwrap_err();
        assert!(matches!(err, Error::ConflictDetected { base_revision: 0, .. }));
        assert_eq!(history.current_revision("/p").unwrap(), 1);

        // The same session may keep writing on top of its own revision.
        let own = versioned("0", "k1", "3");
        assert_eq!(history.store("/p", None, &own, "alice").unwrap().revision, Some(2));
    }

    #[test]
    fn test_store_ignores_conflicts_when_disabled_or_unparsable() {
        let history = history(false);
        let v0 = doc("<a/>");
        history.record("/p", &v0, &doc("<a>1</a>"), "alice", Some("k1")).unwrap();
        let stale = versioned("0", "k2", "2");
        assert!(history.store("/p", None, &stale, "bob").is_ok());

        let checked = self::history(true);
        checked.record("/p", &v0, &doc("<a>1</a>"), "alice", Some("k1")).unwrap();
        let bad = versioned("x", "k2", "2");
        assert!(checked.store("/p", None, &bad, "bob").is_ok());
    }

    #[test]
    fn test_versioning_attributes() {
        let history = history(false);
        history
            .record("/db/a.xml", &doc("<a/>"), &doc("<a><b/></a>"), "admin", None)
            .unwrap();
        let attributes = history.versioning_attributes("/db/a.xml").unwrap();
        assert_eq!(attributes.len(), 3);
        assert_eq!(attributes[0].value(), "1");
        assert!(attributes[1].value().ends_with('1'));
        assert_eq!(attributes[2].value(), "/db/a.xml");
        assert!(attributes
            .iter()
            .all(|attr| attr.qname().namespace() == Some(VERSIONING_NS)));

        let served = history
            .with_versioning_attributes("/db/a.xml", &doc(r#"<a x="1"><b/></a>"#))
            .unwrap();
        let text = xml(&served);
        assert!(text.contains(r#"v:revision="1""#));
        assert!(text.contains(r#"v:path="/db/a.xml""#));
        assert!(text.contains(r#"x="1""#));

        let (stripped, removed) = served.without_root_attributes_in(VERSIONING_NS).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(xml(&stripped), r#"<a x="1"><b /></a>"#);
    }
}
