//! XML writer driven by sink events.
//!
//! Start tags are left open until the first piece of content arrives, so
//! attributes can still be added after `start_element`. Namespace
//! declarations are generated for every name whose namespace is not already
//! in scope.

use std::io::Write;

use super::EventSink;
use crate::error::{Error, Result};
use crate::node::namespace::XML_NS;
use crate::node::{Document, QName, XmlAttribute};

/// Options for XML output.
#[derive(Debug, Clone, Default)]
pub struct XmlWriterOptions {
    /// Indent nested elements. Changes whitespace, so only for human readers.
    pub pretty_print: bool,
    /// Write an XML declaration first.
    pub xml_declaration: bool,
}

struct OpenElement {
    lexical: String,
    /// Prefix bindings declared on this element.
    bindings: Vec<(String, String)>,
}

/// Event sink writing XML text.
pub struct XmlWriter<W: Write> {
    writer: W,
    options: XmlWriterOptions,
    open: Vec<OpenElement>,
    /// A start tag has been written without its closing `>`.
    tag_open: bool,
    last_was_text: bool,
    started: bool,
    generated_prefixes: usize,
}

impl<W: Write> XmlWriter<W> {
    /// Creates a compact writer.
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, XmlWriterOptions::default())
    }

    /// Creates a writer with the given options.
    pub fn with_options(writer: W, options: XmlWriterOptions) -> Self {
        XmlWriter {
            writer,
            options,
            open: Vec::new(),
            tag_open: false,
            last_was_text: false,
            started: false,
            generated_prefixes: 0,
        }
    }

    /// Flushes the output and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        if let Some(element) = self.open.last() {
            return Err(Error::Serialization(format!(
                "element <{}> left open",
                element.lexical
            )));
        }
        if self.options.pretty_print && self.started {
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn begin(&mut self) -> Result<()> {
        if !self.started && self.options.xml_declaration {
            write!(self.writer, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
            if !self.options.pretty_print {
                writeln!(self.writer)?;
            }
            // The declaration counts as a previous node for indentation.
            self.started = true;
        }
        Ok(())
    }

    fn close_start_tag(&mut self) -> Result<()> {
        if self.tag_open {
            write!(self.writer, ">")?;
            self.tag_open = false;
        }
        Ok(())
    }

    fn indent(&mut self, depth: usize) -> Result<()> {
        if self.options.pretty_print && self.started && !self.last_was_text {
            write!(self.writer, "\n{}", "  ".repeat(depth))?;
        }
        Ok(())
    }

    /// Resolves a prefix against the bindings written so far.
    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NS);
        }
        self.open
            .iter()
            .rev()
            .flat_map(|e| e.bindings.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    fn bound_on_current(&self, prefix: &str) -> bool {
        self.open
            .last()
            .is_some_and(|e| e.bindings.iter().any(|(p, _)| p == prefix))
    }

    fn declare(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if prefix.is_empty() {
            write!(self.writer, " xmlns=\"{}\"", to_entities(uri))?;
        } else {
            write!(self.writer, " xmlns:{}=\"{}\"", prefix, to_entities(uri))?;
        }
        if let Some(element) = self.open.last_mut() {
            element.bindings.push((prefix.to_string(), uri.to_string()));
        }
        Ok(())
    }

    /// Picks a prefix for a namespaced attribute, declaring it if needed.
    fn attribute_prefix(&mut self, name: &QName, namespace: &str) -> Result<String> {
        if namespace == XML_NS {
            return Ok("xml".to_string());
        }
        if let Some(prefix) = name.prefix() {
            if self.resolve(prefix) == Some(namespace) {
                return Ok(prefix.to_string());
            }
            if !self.bound_on_current(prefix) {
                self.declare(prefix, namespace)?;
                return Ok(prefix.to_string());
            }
        }
        let visible = self
            .open
            .iter()
            .rev()
            .flat_map(|e| e.bindings.iter().rev())
            .find(|(p, uri)| !p.is_empty() && uri == namespace)
            .map(|(p, _)| p.clone());
        if let Some(prefix) = visible {
            if self.resolve(&prefix) == Some(namespace) {
                return Ok(prefix);
            }
        }
        let prefix = loop {
            let candidate = format!("ns{}", self.generated_prefixes);
            self.generated_prefixes += 1;
            if self.resolve(&candidate).is_none() && !self.bound_on_current(&candidate) {
                break candidate;
            }
        };
        self.declare(&prefix, namespace)?;
        Ok(prefix)
    }
}

impl<W: Write> EventSink for XmlWriter<W> {
    fn start_element(&mut self, name: &QName, attributes: &[XmlAttribute]) -> Result<()> {
        self.begin()?;
        self.close_start_tag()?;
        self.indent(self.open.len())?;

        let prefix = name.prefix().unwrap_or("");
        let declaration = match name.namespace() {
            Some(ns) if self.resolve(prefix) != Some(ns) => {
                Some((prefix.to_string(), ns.to_string()))
            }
            None if self.resolve("").is_some() => Some((String::new(), String::new())),
            _ => None,
        };
        let lexical = match name.namespace() {
            Some(_) => name.lexical(),
            None => name.local_name().to_string(),
        };

        write!(self.writer, "<{}", lexical)?;
        self.open.push(OpenElement {
            lexical,
            bindings: Vec::new(),
        });
        self.tag_open = true;
        self.started = true;
        self.last_was_text = false;
        if let Some((prefix, uri)) = declaration {
            self.declare(&prefix, &uri)?;
        }

        for attr in attributes {
            self.attribute(attr.qname(), attr.value())?;
        }
        Ok(())
    }

    fn end_element(&mut self, _name: &QName) -> Result<()> {
        let element = self
            .open
            .pop()
            .ok_or_else(|| Error::Serialization("end tag without start tag".to_string()))?;
        if self.tag_open {
            write!(self.writer, " />")?;
            self.tag_open = false;
        } else {
            self.indent(self.open.len())?;
            write!(self.writer, "</{}>", element.lexical)?;
        }
        self.last_was_text = false;
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.begin()?;
        self.close_start_tag()?;
        write!(self.writer, "{}", to_entities(text))?;
        self.started = true;
        self.last_was_text = true;
        Ok(())
    }

    fn attribute(&mut self, name: &QName, value: &str) -> Result<()> {
        if !self.tag_open {
            return Err(Error::Serialization(format!(
                "attribute {} written after element content",
                name
            )));
        }
        let lexical = match name.namespace() {
            Some(ns) => format!("{}:{}", self.attribute_prefix(name, ns)?, name.local_name()),
            None => name.local_name().to_string(),
        };
        write!(self.writer, " {}=\"{}\"", lexical, to_entities(value))?;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.begin()?;
        self.close_start_tag()?;
        self.indent(self.open.len())?;
        write!(self.writer, "<!--{}-->", text)?;
        self.started = true;
        self.last_was_text = false;
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.begin()?;
        self.close_start_tag()?;
        self.indent(self.open.len())?;
        if data.is_empty() {
            write!(self.writer, "<?{}?>", target)?;
        } else {
            write!(self.writer, "<?{} {}?>", target, data)?;
        }
        self.started = true;
        self.last_was_text = false;
        Ok(())
    }
}

/// Converts special characters to XML entities.
fn to_entities(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '\'' => result.push_str("&apos;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

/// Writes a document to a string without declaration or indentation.
pub fn print_to_string(doc: &Document) -> Result<String> {
    print_with(doc, XmlWriterOptions::default())
}

/// Writes a document to an indented string.
pub fn print_to_string_pretty(doc: &Document) -> Result<String> {
    print_with(
        doc,
        XmlWriterOptions {
            pretty_print: true,
            xml_declaration: false,
        },
    )
}

fn print_with(doc: &Document, options: XmlWriterOptions) -> Result<String> {
    let mut writer = XmlWriter::with_options(Vec::new(), options);
    doc.write_to(&mut writer)?;
    let output = writer.finish()?;
    String::from_utf8(output).map_err(|e| Error::Serialization(e.to_string()))
}
