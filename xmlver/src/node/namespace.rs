//! Qualified names and namespace scope tracking.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// URI permanently bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A namespace-qualified XML name.
///
/// Equality and hashing use the namespace URI and local name only; the prefix
/// is carried so documents can be written back with the prefixes they came with.
#[derive(Debug, Clone)]
pub struct QName {
    local_name: String,
    namespace: Option<String>,
    prefix: Option<String>,
}

impl QName {
    /// Creates a name with no namespace.
    pub fn new(local_name: impl Into<String>) -> Self {
        QName {
            local_name: local_name.into(),
            namespace: None,
            prefix: None,
        }
    }

    /// Creates a name in `namespace`, written with `prefix` (`None` for the
    /// default namespace). An empty namespace URI means no namespace.
    pub fn with_namespace(
        local_name: impl Into<String>,
        namespace: impl Into<String>,
        prefix: Option<&str>,
    ) -> Self {
        let namespace = namespace.into();
        if namespace.is_empty() {
            return QName::new(local_name);
        }
        QName {
            local_name: local_name.into(),
            namespace: Some(namespace),
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    /// Creates a name from its lexical form (`prefix:local` or `local`) and an
    /// optional namespace URI.
    pub fn from_lexical(name: &str, namespace: Option<&str>) -> Self {
        let (prefix, local) = split_qname(name);
        match namespace {
            Some(ns) => QName::with_namespace(local, ns, prefix),
            None => QName::new(local),
        }
    }

    /// The local part of the name.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// The namespace URI, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// The prefix the name was read or should be written with.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// True if the name is in a namespace.
    pub fn has_namespace(&self) -> bool {
        self.namespace.is_some()
    }

    /// The lexical form, `prefix:local` or `local`.
    pub fn lexical(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// True if the name is `local` in `namespace`.
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name == local
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local_name == other.local_name && self.namespace == other.namespace
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

/// Tracks prefix bindings while reading or writing a document.
#[derive(Debug)]
pub struct NamespaceContext {
    /// Stack of scopes, each containing prefix -> URI bindings.
    scopes: Vec<HashMap<String, String>>,
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceContext {
    /// Creates a new namespace context with the `xml` prefix pre-bound.
    pub fn new() -> Self {
        let mut ctx = NamespaceContext {
            scopes: vec![HashMap::new()],
        };
        ctx.bind("xml", XML_NS);
        ctx
    }

    /// Pushes a new scope for entering an element.
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pops the current scope when leaving an element.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Binds a prefix to a URI in the current scope. The empty prefix is the
    /// default namespace; binding it to `""` undeclares it.
    pub fn bind(&mut self, prefix: &str, uri: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(prefix.to_string(), uri.to_string());
        }
    }

    /// Resolves a prefix to its URI, searching from the innermost scope.
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(prefix))
            .map(String::as_str)
            .filter(|uri| !uri.is_empty())
    }

    /// Returns the default namespace (empty prefix binding).
    pub fn default_namespace(&self) -> Option<&str> {
        self.resolve("")
    }

    /// Resolves an element name; unprefixed names take the default namespace.
    pub fn resolve_element(&self, lexical: &str) -> Result<QName> {
        match split_qname(lexical) {
            (Some(prefix), local) => {
                let uri = self
                    .resolve(prefix)
                    .ok_or_else(|| Error::Parse(format!("unbound namespace prefix: {}", prefix)))?;
                Ok(QName::with_namespace(local, uri, Some(prefix)))
            }
            (None, local) => Ok(match self.default_namespace() {
                Some(uri) => QName::with_namespace(local, uri, None),
                None => QName::new(local),
            }),
        }
    }

    /// Resolves an attribute name; unprefixed attributes have no namespace.
    pub fn resolve_attribute(&self, lexical: &str) -> Result<QName> {
        match split_qname(lexical) {
            (Some(prefix), local) => {
                let uri = self
                    .resolve(prefix)
                    .ok_or_else(|| Error::Parse(format!("unbound namespace prefix: {}", prefix)))?;
                Ok(QName::with_namespace(local, uri, Some(prefix)))
            }
            (None, local) => Ok(QName::new(local)),
        }
    }
}

/// Splits a qualified name into prefix and local name.
///
/// Returns (Some(prefix), local) for "prefix:local"
/// Returns (None, name) for "name" without prefix
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    if let Some(pos) = qname.find(':') {
        (Some(&qname[..pos]), &qname[pos + 1..])
    } else {
        (None, qname)
    }
}

/// Checks if an attribute name is a namespace declaration.
pub fn is_xmlns_attr(name: &str) -> bool {
    name == "xmlns" || name.starts_with("xmlns:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("svg:rect"), (Some("svg"), "rect"));
        assert_eq!(split_qname("rect"), (None, "rect"));
        assert_eq!(split_qname("ns:foo:bar"), (Some("ns"), "foo:bar"));
    }

    #[test]
    fn test_qname_equality_ignores_prefix() {
        let a = QName::with_namespace("rect", "http://www.w3.org/2000/svg", Some("svg"));
        let b = QName::with_namespace("rect", "http://www.w3.org/2000/svg", Some("s"));
        let c = QName::new("rect");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.lexical(), "svg:rect");
        assert_eq!(QName::with_namespace("x", "", Some("p")), QName::new("x"));
    }

    #[test]
    fn test_namespace_context() {
        let mut ctx = NamespaceContext::new();
        ctx.push_scope();
        ctx.bind("svg", "http://www.w3.org/2000/svg");
        assert_eq!(ctx.resolve("svg"), Some("http://www.w3.org/2000/svg"));

        ctx.pop_scope();
        assert!(ctx.resolve("svg").is_none());
    }

    #[test]
    fn test_is_xmlns() {
        assert!(is_xmlns_attr("xmlns"));
        assert!(is_xmlns_attr("xmlns:svg"));
        assert!(!is_xmlns_attr("xml:space"));
        assert!(!is_xmlns_attr("href"));
    }

    #[test]
    fn test_default_namespace_and_undeclaring() {
        let mut ctx = NamespaceContext::new();
        assert!(ctx.default_namespace().is_none());

        ctx.push_scope();
        ctx.bind("", "http://www.w3.org/1999/xhtml");
        let p = ctx.resolve_element("p").unwrap();
        assert_eq!(p.namespace(), Some("http://www.w3.org/1999/xhtml"));
        // Unprefixed attributes never take the default namespace.
        assert!(!ctx.resolve_attribute("class").unwrap().has_namespace());

        ctx.push_scope();
        ctx.bind("", "");
        assert!(ctx.default_namespace().is_none());
        ctx.pop_scope();
        ctx.pop_scope();
        assert!(ctx.default_namespace().is_none());
    }

    #[test]
    fn test_unbound_prefix() {
        let ctx = NamespaceContext::new();
        assert!(ctx.resolve_element("foo:bar").is_err());
        assert_eq!(ctx.resolve_attribute("xml:lang").unwrap().namespace(), Some(XML_NS));
    }
}
