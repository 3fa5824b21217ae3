//! Diff generation algorithm.
//!
//! Walks the base and target revisions sibling list by sibling list with two
//! cursors. Heads with equal content are kept; otherwise a bounded lookahead
//! decides between deleting base nodes, inserting target nodes, or replacing
//! the head pair. Inserted tokens collect in a pending run that is anchored at
//! the next base token that survives.

use tracing::debug;

use crate::constants::DEFAULT_LOOKAHEAD;
use crate::error::{Error, Result};
use crate::node::{DiffNode, Document, NodeAddress, NodeIndex, XmlContent};
use crate::xml::{DocumentBuilder, EventSink};

use super::difference::{Boundary, Difference};
use super::edit_script::{write_version, VersionProperties};

/// Which side wins when a base head and a target head are found ahead at
/// the same distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Delete the intervening base nodes.
    #[default]
    PreferDelete,
    /// Insert the intervening target nodes.
    PreferInsert,
}

/// Tuning parameters of the diff walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffConfig {
    /// Number of siblings searched ahead of each cursor for a match.
    pub lookahead: usize,
    pub tie_break: TieBreak,
}

impl Default for DiffConfig {
    fn default() -> Self {
        DiffConfig {
            lookahead: DEFAULT_LOOKAHEAD,
            tie_break: TieBreak::default(),
        }
    }
}

/// Diff generator for two revisions of a document.
pub struct Diff<'a> {
    config: DiffConfig,
    target: Option<&'a Document>,
    changes: Vec<Difference>,
}

impl Default for Diff<'_> {
    fn default() -> Self {
        Self::new(DiffConfig::default())
    }
}

impl<'a> Diff<'a> {
    /// Creates a diff generator.
    pub fn new(config: DiffConfig) -> Self {
        Diff {
            config,
            target: None,
            changes: Vec::new(),
        }
    }

    /// Computes the differences turning `base` into `target`, sorted by
    /// reference address. Identical revisions yield no differences.
    pub fn diff(&mut self, base: &Document, target: &'a Document) -> Result<&[Difference]> {
        let mut walk = Walk {
            base,
            target,
            base_tokens: Tokens::of(base),
            target_tokens: Tokens::of(target),
            lookahead: self.config.lookahead.max(1),
            tie_break: self.config.tie_break,
            out: Vec::new(),
            pending: Vec::new(),
        };
        walk.align(base.top_level(), target.top_level());
        walk.flush(NodeAddress::document(), true);

        let mut changes = walk.out;
        changes.sort();
        debug!(
            base_nodes = base.len(),
            target_nodes = target.len(),
            differences = changes.len(),
            "computed differences"
        );

        self.target = Some(target);
        self.changes = changes;
        Ok(&self.changes)
    }

    /// Differences computed by the last call to [`Diff::diff`].
    pub fn differences(&self) -> &[Difference] {
        &self.changes
    }

    /// Writes a complete `v:version` document for the computed differences.
    ///
    /// Nothing reaches the sink unless the whole script serializes.
    pub fn write_xml(
        &self,
        sink: &mut dyn EventSink,
        properties: &VersionProperties,
    ) -> Result<()> {
        let target = self
            .target
            .ok_or(Error::Usage("write_xml called before diff"))?;

        let mut script = DocumentBuilder::new();
        write_version(&mut script, properties, |sink| {
            for change in &self.changes {
                change.serialize(target, sink)?;
            }
            Ok(())
        })?;
        script.finish()?.write_to(sink)
    }
}

/// Head token of every node of a revision, with its content hash.
struct Tokens {
    tokens: Vec<DiffNode>,
    hashes: Vec<u64>,
}

impl Tokens {
    fn of(document: &Document) -> Self {
        let tokens: Vec<DiffNode> = (0..document.len()).map(|i| document.token(i)).collect();
        let hashes = tokens.iter().map(DiffNode::content_hash).collect();
        Tokens { tokens, hashes }
    }
}

struct Walk<'d> {
    base: &'d Document,
    target: &'d Document,
    base_tokens: Tokens,
    target_tokens: Tokens,
    lookahead: usize,
    tie_break: TieBreak,
    out: Vec<Difference>,
    /// Target tokens waiting for the next surviving base token.
    pending: Vec<DiffNode>,
}

impl Walk<'_> {
    fn same_content(&self, b: NodeIndex, t: NodeIndex) -> bool {
        self.base_tokens.hashes[b] == self.target_tokens.hashes[t]
            && self.base_tokens.tokens[b].content_eq(&self.target_tokens.tokens[t])
    }

    /// Aligns one base sibling list against one target sibling list.
    fn align(&mut self, base: &[NodeIndex], target: &[NodeIndex]) {
        let (mut i, mut j) = (0, 0);
        while i < base.len() && j < target.len() {
            let (b, t) = (base[i], target[j]);
            if self.same_content(b, t) {
                self.keep(b, t);
                i += 1;
                j += 1;
                continue;
            }

            let deletions = (1..=self.lookahead)
                .take_while(|k| i + k < base.len())
                .find(|k| self.same_content(base[i + k], t));
            let insertions = (1..=self.lookahead)
                .take_while(|k| j + k < target.len())
                .find(|k| self.same_content(b, target[j + k]));

            let delete_first = match (deletions, insertions) {
                (Some(d), Some(n)) => d < n || (d == n && self.tie_break == TieBreak::PreferDelete),
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => {
                    if self.overlaps(b, t) {
                        self.rewrap(b, t);
                    } else {
                        self.delete(b);
                        self.insert(t);
                    }
                    i += 1;
                    j += 1;
                    continue;
                }
            };

            if delete_first {
                let k = deletions.unwrap_or(1);
                for &node in &base[i..i + k] {
                    self.delete(node);
                }
                i += k;
            } else {
                let k = insertions.unwrap_or(1);
                for &node in &target[j..j + k] {
                    self.insert(node);
                }
                j += k;
            }
        }

        for &node in &base[i..] {
            self.delete(node);
        }
        for &node in &target[j..] {
            self.insert(node);
        }
    }

    /// Both nodes are elements and some child of one equals a child of the
    /// other within the lookahead window.
    fn overlaps(&self, b: NodeIndex, t: NodeIndex) -> bool {
        let (base_node, target_node) = (self.base.node(b), self.target.node(t));
        if !base_node.content().is_element() || !target_node.content().is_element() {
            return false;
        }
        let window = self.lookahead + 1;
        let base_children = &base_node.children()[..base_node.child_count().min(window)];
        let target_children = &target_node.children()[..target_node.child_count().min(window)];
        base_children
            .iter()
            .any(|&bc| target_children.iter().any(|&tc| self.same_content(bc, tc)))
    }

    /// Keeps a base node matched to a target node with equal content.
    fn keep(&mut self, b: NodeIndex, t: NodeIndex) {
        let (base, target) = (self.base, self.target);
        let base_node = base.node(b);
        self.flush(base_node.address().clone(), false);
        if base_node.content().is_element() {
            let target_node = target.node(t);
            self.align(base_node.attributes(), target_node.attributes());
            self.align(base_node.children(), target_node.children());
            self.flush(base_node.address().clone(), true);
        }
    }

    /// Replaces the tags of `b` by those of `t`, aligning their content.
    fn rewrap(&mut self, b: NodeIndex, t: NodeIndex) {
        let (base, target) = (self.base, self.target);
        let base_node = base.node(b);
        let target_node = target.node(t);
        let address = base_node.address().clone();
        self.out
            .push(Difference::delete_boundary(address.clone(), Boundary::Start));
        self.out.push(Difference::delete_boundary(address, Boundary::End));
        for &attr in base_node.attributes() {
            self.delete(attr);
        }

        if let XmlContent::Element(element) = target_node.content() {
            self.pending.push(DiffNode::start(
                target_node.address().clone(),
                element.qname().clone(),
            ));
            for &attr in target_node.attributes() {
                self.insert(attr);
            }
            self.align(base_node.children(), target_node.children());
            self.pending.push(DiffNode::end(
                target_node.address().clone(),
                element.qname().clone(),
            ));
        }
    }

    fn delete(&mut self, b: NodeIndex) {
        let address = self.base.node(b).address().clone();
        self.out.push(Difference::delete(address));
    }

    /// Queues every token of a target subtree.
    fn insert(&mut self, t: NodeIndex) {
        let target = self.target;
        let node = target.node(t);
        match node.content() {
            XmlContent::Element(element) => {
                self.pending
                    .push(DiffNode::start(node.address().clone(), element.qname().clone()));
                for &attr in node.attributes() {
                    self.insert(attr);
                }
                for &child in node.children() {
                    self.insert(child);
                }
                self.pending
                    .push(DiffNode::end(node.address().clone(), element.qname().clone()));
            }
            _ => self.pending.push(self.target_tokens.tokens[t].clone()),
        }
    }

    /// Anchors the pending run before `reference`, or appends it to the
    /// element at `reference`.
    fn flush(&mut self, reference: NodeAddress, append: bool) {
        if self.pending.is_empty() {
            return;
        }
        let mut change = if append {
            Difference::append(reference)
        } else {
            Difference::insert(reference)
        };
        if let Difference::Insert(insert) = &mut change {
            for node in self.pending.drain(..) {
                insert.add_node(node);
            }
        }
        self.out.push(change);
    }
}
