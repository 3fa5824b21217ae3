//! Streaming XML reader producing addressed events.
//!
//! The reader wraps quick-xml's pull parser, resolves namespaces and numbers
//! every node on the fly, so a revision can be patched without building a tree.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{EventKind, NodeStream, ParseFlags, StreamEvent};
use crate::error::{Error, Result};
use crate::node::namespace::{is_xmlns_attr, split_qname};
use crate::node::{NamespaceContext, NodeAddress, QName, XmlProcessingInstruction};

/// An open element (or the document node) and the next ordinal below it.
struct Level {
    address: NodeAddress,
    name: Option<QName>,
    next: u32,
}

/// Pull reader turning XML text into a [`NodeStream`].
pub struct XmlStreamReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    flags: ParseFlags,
    namespaces: NamespaceContext,
    levels: Vec<Level>,
    queue: VecDeque<StreamEvent>,
    /// Character data not yet emitted; adjacent text, CDATA and references merge.
    text: Option<String>,
    done: bool,
}

impl<'a> XmlStreamReader<&'a [u8]> {
    /// Reads from a string.
    pub fn from_str(xml: &'a str, flags: ParseFlags) -> Self {
        Self::new(Reader::from_str(xml), flags)
    }
}

impl XmlStreamReader<BufReader<File>> {
    /// Reads from a file.
    pub fn from_file<P: AsRef<Path>>(path: P, flags: ParseFlags) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(Reader::from_reader(BufReader::new(file)), flags))
    }
}

impl<R: BufRead> XmlStreamReader<R> {
    /// Wraps a quick-xml reader.
    pub fn new(mut reader: Reader<R>, flags: ParseFlags) -> Self {
        // Whitespace handling is ours
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;
        XmlStreamReader {
            reader,
            buf: Vec::new(),
            flags,
            namespaces: NamespaceContext::new(),
            levels: vec![Level {
                address: NodeAddress::document(),
                name: None,
                next: 1,
            }],
            queue: VecDeque::new(),
            text: None,
            done: false,
        }
    }

    fn next_address(&mut self) -> NodeAddress {
        let level = self
            .levels
            .last_mut()
            .unwrap_or_else(|| unreachable!("document level is never popped"));
        let address = level.address.child(level.next);
        level.next += 1;
        address
    }

    fn push_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }

    /// Emits accumulated character data, subject to the whitespace flags.
    fn flush_text(&mut self) -> Result<()> {
        let Some(text) = self.text.take() else {
            return Ok(());
        };
        let at_top_level = self.levels.len() == 1;
        let blank = text.chars().all(char::is_whitespace);
        if blank && (at_top_level || !self.flags.contains(ParseFlags::PRESERVE_WHITESPACE)) {
            return Ok(());
        }
        if at_top_level {
            return Err(Error::Parse(format!(
                "text outside of the document element: {:?}",
                text.trim()
            )));
        }
        let text = if self.flags.contains(ParseFlags::NORMALIZE_WHITESPACE) {
            normalize_whitespace(&text)
        } else {
            text
        };
        if text.is_empty() {
            return Ok(());
        }
        let address = self.next_address();
        self.queue.push_back(StreamEvent {
            address,
            kind: EventKind::Text(text),
        });
        Ok(())
    }

    fn start_element(&mut self, e: &BytesStart, empty: bool) -> Result<()> {
        self.namespaces.push_scope();

        let mut raw_attributes = Vec::new();
        for attr_result in e.attributes() {
            let attr = attr_result.map_err(|e| Error::Parse(format!("Attribute error: {}", e)))?;
            let key = self
                .reader
                .decoder()
                .decode(attr.key.as_ref())
                .map_err(|e| Error::Parse(e.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Parse(e.to_string()))?
                .to_string();
            if is_xmlns_attr(&key) {
                let prefix = split_qname(&key).1;
                let prefix = if key == "xmlns" { "" } else { prefix };
                self.namespaces.bind(prefix, &value);
            } else {
                raw_attributes.push((key, value));
            }
        }

        let lexical = self
            .reader
            .decoder()
            .decode(e.name().as_ref())
            .map_err(|e| Error::Parse(e.to_string()))?
            .to_string();
        let name = self.namespaces.resolve_element(&lexical)?;
        let address = self.next_address();
        self.queue.push_back(StreamEvent {
            address: address.clone(),
            kind: EventKind::StartElement(name.clone()),
        });

        self.levels.push(Level {
            address,
            name: Some(name),
            next: 1,
        });
        for (key, value) in raw_attributes {
            let attr_name = self.namespaces.resolve_attribute(&key)?;
            let address = self.next_address();
            self.queue.push_back(StreamEvent {
                address,
                kind: EventKind::Attribute(attr_name, value),
            });
        }

        if empty {
            self.end_element()?;
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        if self.levels.len() <= 1 {
            return Err(Error::Parse("unbalanced end tag".to_string()));
        }
        let level = self
            .levels
            .pop()
            .unwrap_or_else(|| unreachable!("checked above"));
        self.namespaces.pop_scope();
        let name = level
            .name
            .unwrap_or_else(|| unreachable!("only the document level has no name"));
        self.queue.push_back(StreamEvent {
            address: level.address,
            kind: EventKind::EndElement(name),
        });
        Ok(())
    }

    /// Reads parser events until at least one stream event is queued.
    fn fill(&mut self) -> Result<()> {
        while self.queue.is_empty() && !self.done {
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| Error::Parse(format!("XML parse error: {}", e)))?
                .into_owned();
            self.buf.clear();

            match event {
                Event::Start(ref e) => {
                    self.flush_text()?;
                    self.start_element(e, false)?;
                }
                Event::Empty(ref e) => {
                    self.flush_text()?;
                    self.start_element(e, true)?;
                }
                Event::End(_) => {
                    self.flush_text()?;
                    self.end_element()?;
                }
                Event::Text(e) => {
                    let raw =
                        std::str::from_utf8(e.as_ref()).map_err(|e| Error::Parse(e.to_string()))?;
                    let text = unescape(raw).map_err(|e| Error::Parse(e.to_string()))?;
                    self.push_text(&text);
                }
                Event::CData(e) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    self.push_text(&text);
                }
                Event::GeneralRef(e) => {
                    if let Some(ch) = e
                        .resolve_char_ref()
                        .map_err(|e| Error::Parse(e.to_string()))?
                    {
                        self.push_text(ch.encode_utf8(&mut [0u8; 4]));
                    } else {
                        let name = e.decode().map_err(|e| Error::Parse(e.to_string()))?;
                        let resolved = resolve_predefined_entity(&name).ok_or_else(|| {
                            Error::Parse(format!("unknown entity reference: &{};", name))
                        })?;
                        self.push_text(resolved);
                    }
                }
                Event::Comment(e) => {
                    self.flush_text()?;
                    if !self.flags.contains(ParseFlags::SKIP_COMMENTS) {
                        let text = String::from_utf8_lossy(e.as_ref()).to_string();
                        let address = self.next_address();
                        self.queue.push_back(StreamEvent {
                            address,
                            kind: EventKind::Comment(text),
                        });
                    }
                }
                Event::PI(e) => {
                    self.flush_text()?;
                    if !self.flags.contains(ParseFlags::SKIP_PROCESSING_INSTRUCTIONS) {
                        let pi = XmlProcessingInstruction::from_raw(&String::from_utf8_lossy(&e));
                        let address = self.next_address();
                        self.queue.push_back(StreamEvent {
                            address,
                            kind: EventKind::ProcessingInstruction {
                                target: pi.target().to_string(),
                                data: pi.content().to_string(),
                            },
                        });
                    }
                }
                Event::Decl(_) | Event::DocType(_) => {}
                Event::Eof => {
                    self.flush_text()?;
                    if self.levels.len() > 1 {
                        return Err(Error::Parse("unexpected end of document".to_string()));
                    }
                    self.done = true;
                }
            }
        }
        Ok(())
    }
}

impl<R: BufRead> NodeStream for XmlStreamReader<R> {
    fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        self.fill()?;
        Ok(self.queue.pop_front())
    }
}

/// Collapses whitespace runs to a single space and trims both ends.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
