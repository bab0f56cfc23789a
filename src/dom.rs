//! Owned XML tree used to assemble signed documents.
//!
//! Nodes live in an arena indexed by [`NodeId`]; construction appends in
//! document order and lookups are either namespace-qualified or by tag
//! name. Canonical serialization lives in [`c14n`]; [`to_xml_string`]
//! produces the plain output form.
//!
//! [`to_xml_string`]: Document::to_xml_string

pub mod c14n;

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;
use uuid::Uuid;

/// Namespace implicitly bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Handle to a node inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Qualified element name with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns: Option<String>,
}

impl QName {
    fn new(qualified: &str, ns: Option<&str>) -> Self {
        match qualified.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
                ns: ns.map(str::to_string),
            },
            None => Self {
                prefix: None,
                local: qualified.to_string(),
                ns: ns.map(str::to_string),
            },
        }
    }

    /// The name as written in a tag, `prefix:local` or `local`.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ElementData {
    pub(crate) name: QName,
    /// Attributes as written, in insertion order.
    pub(crate) attrs: Vec<(String, String)>,
    /// Explicit `xmlns`/`xmlns:prefix` declarations on this element.
    pub(crate) ns_decls: Vec<(Option<String>, String)>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned XML document. Created either by parsing payload text or by
/// building a tree root-first; every mutation appends in document order.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Create a document with a single root element.
    pub fn with_root(ns: Option<&str>, qualified_name: &str) -> Self {
        let root = Node {
            kind: NodeKind::Element(ElementData {
                name: QName::new(qualified_name, ns),
                attrs: Vec::new(),
                ns_decls: Vec::new(),
            }),
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    /// Parse XML text into an owned tree.
    ///
    /// Namespace declarations are recorded per element and element names are
    /// resolved against the bindings in scope. Comments are kept (the
    /// `#WithComments` canonicalization methods need them), CDATA collapses
    /// to text and line endings normalize to LF.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);
        reader.config_mut().expand_empty_elements = true;
        reader.config_mut().check_end_names = true;

        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let mut attrs = Vec::new();
                    let mut ns_decls = Vec::new();
                    for attr in e.attributes() {
                        let attr = attr.map_err(|e| Error::MalformedPayload(e.to_string()))?;
                        let key = std::str::from_utf8(attr.key.as_ref())
                            .map_err(|e| Error::MalformedPayload(e.to_string()))?
                            .to_string();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| Error::MalformedPayload(e.to_string()))?
                            .into_owned();
                        if key == "xmlns" {
                            ns_decls.push((None, value));
                        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                            ns_decls.push((Some(prefix.to_string()), value));
                        } else {
                            attrs.push((key, value));
                        }
                    }

                    let qualified = std::str::from_utf8(e.name().as_ref())
                        .map_err(|e| Error::MalformedPayload(e.to_string()))?
                        .to_string();
                    if stack.is_empty() && root.is_some() {
                        return Err(Error::MalformedPayload(
                            "multiple root elements".to_string(),
                        ));
                    }

                    let parent = stack.last().copied();
                    let id = doc.push_node(
                        Node {
                            kind: NodeKind::Element(ElementData {
                                name: QName::new(&qualified, None),
                                attrs,
                                ns_decls,
                            }),
                            parent,
                            children: Vec::new(),
                        },
                        parent,
                    );
                    // Resolve the element namespace now that the node (and
                    // its declarations) sit on the ancestor chain.
                    let ns = doc.resolve_prefix(id, doc.prefix_of(id).as_deref());
                    if let NodeKind::Element(el) = &mut doc.nodes[id.0].kind {
                        el.name.ns = ns;
                    }
                    if root.is_none() {
                        root = Some(id);
                    }
                    stack.push(id);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| Error::MalformedPayload(e.to_string()))?;
                    match stack.last().copied() {
                        Some(parent) => {
                            let text = normalize_line_endings(&text);
                            doc.push_node(
                                Node {
                                    kind: NodeKind::Text(text),
                                    parent: Some(parent),
                                    children: Vec::new(),
                                },
                                Some(parent),
                            );
                        }
                        None if text.trim().is_empty() => {}
                        None => {
                            return Err(Error::MalformedPayload(
                                "text content outside the root element".to_string(),
                            ));
                        }
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(parent) = stack.last().copied() {
                        let text = String::from_utf8(e.into_inner().into_owned())
                            .map_err(|e| Error::MalformedPayload(e.to_string()))?;
                        let text = normalize_line_endings(&text);
                        doc.push_node(
                            Node {
                                kind: NodeKind::Text(text),
                                parent: Some(parent),
                                children: Vec::new(),
                            },
                            Some(parent),
                        );
                    }
                }
                Ok(Event::Comment(e)) => {
                    if let Some(parent) = stack.last().copied() {
                        let text = std::str::from_utf8(e.as_ref())
                            .map_err(|e| Error::MalformedPayload(e.to_string()))?;
                        let text = normalize_line_endings(text);
                        doc.push_node(
                            Node {
                                kind: NodeKind::Comment(text),
                                parent: Some(parent),
                                children: Vec::new(),
                            },
                            Some(parent),
                        );
                    }
                }
                Ok(Event::Decl(_)) | Ok(Event::PI(_)) | Ok(Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(Error::MalformedPayload(e.to_string())),
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(Error::MalformedPayload(
                "unexpected end of input inside an open element".to_string(),
            ));
        }
        match root {
            Some(id) => {
                doc.root = id;
                Ok(doc)
            }
            None => Err(Error::MalformedPayload("no root element".to_string())),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// First element matching in document order. With a namespace the match
    /// is on (namespace, local name); without, on the qualified tag name.
    pub fn find_node(&self, ns: Option<&str>, name: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.matches(id, ns, name))
    }

    /// All elements matching in document order.
    pub fn find_nodes(&self, ns: Option<&str>, name: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&id| self.matches(id, ns, name))
            .collect()
    }

    fn matches(&self, id: NodeId, ns: Option<&str>, name: &str) -> bool {
        match (&self.nodes[id.0].kind, ns) {
            (NodeKind::Element(el), Some(ns)) => {
                el.name.local == name && el.name.ns.as_deref() == Some(ns)
            }
            (NodeKind::Element(el), None) => el.name.qualified() == name,
            _ => false,
        }
    }

    /// Create a namespace-qualified element, optionally with text content
    /// and attributes, appended as last child of `parent`.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        ns: Option<&str>,
        qualified_name: &str,
        text: Option<&str>,
        attrs: &[(&str, &str)],
    ) -> Result<NodeId> {
        self.element(parent)?;
        let id = self.push_node(
            Node {
                kind: NodeKind::Element(ElementData {
                    name: QName::new(qualified_name, ns),
                    attrs: Vec::new(),
                    ns_decls: Vec::new(),
                }),
                parent: Some(parent),
                children: Vec::new(),
            },
            Some(parent),
        );
        if let Some(text) = text {
            self.push_node(
                Node {
                    kind: NodeKind::Text(text.to_string()),
                    parent: Some(id),
                    children: Vec::new(),
                },
                Some(id),
            );
        }
        if !attrs.is_empty() {
            self.add_attribute(id, attrs)?;
        }
        Ok(id)
    }

    /// Set attributes on an element; last write wins on key collision.
    pub fn add_attribute(&mut self, node: NodeId, attrs: &[(&str, &str)]) -> Result<()> {
        let el = self.element_mut(node)?;
        for (key, value) in attrs {
            match el.attrs.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.to_string(),
                None => el.attrs.push((key.to_string(), value.to_string())),
            }
        }
        Ok(())
    }

    /// Record an explicit `xmlns:prefix` declaration on an element.
    pub fn declare_namespace(&mut self, node: NodeId, prefix: &str, uri: &str) -> Result<()> {
        let el = self.element_mut(node)?;
        let key = Some(prefix.to_string());
        match el.ns_decls.iter_mut().find(|(p, _)| *p == key) {
            Some(existing) => existing.1 = uri.to_string(),
            None => el.ns_decls.push((key, uri.to_string())),
        }
        Ok(())
    }

    /// Replace an element's children with a single text node.
    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<()> {
        self.element(node)?;
        self.nodes[node.0].children.clear();
        self.push_node(
            Node {
                kind: NodeKind::Text(text.to_string()),
                parent: Some(node),
                children: Vec::new(),
            },
            Some(node),
        );
        Ok(())
    }

    /// Deep-copy a subtree from another document under `parent`.
    pub fn import(&mut self, other: &Document, node: NodeId, parent: NodeId) -> Result<NodeId> {
        self.element(parent)?;
        Ok(self.import_rec(other, node, parent))
    }

    fn import_rec(&mut self, other: &Document, node: NodeId, parent: NodeId) -> NodeId {
        let kind = other.nodes[node.0].kind.clone();
        let id = self.push_node(
            Node {
                kind,
                parent: Some(parent),
                children: Vec::new(),
            },
            Some(parent),
        );
        for child in other.nodes[node.0].children.clone() {
            self.import_rec(other, child, id);
        }
        id
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Element(_))
    }

    pub fn qname(&self, node: NodeId) -> Option<&QName> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => Some(&el.name),
            _ => None,
        }
    }

    pub fn attr(&self, node: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => el
                .attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Comment(_) => {}
            NodeKind::Element(_) => {
                for &child in &self.nodes[node.0].children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// Subtree in document order, `from` included.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            out.push(id);
            for &child in self.nodes[id.0].children.iter().rev() {
                pending.push(child);
            }
        }
        out
    }

    /// Bindings in scope on a node: explicit declarations along the
    /// ancestor chain plus the implicit binding of each element's own
    /// qualified name. An empty declaration value unbinds the prefix.
    pub(crate) fn in_scope_ns(&self, node: NodeId) -> HashMap<Option<String>, String> {
        let mut chain = Vec::new();
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.nodes[id.0].parent;
        }
        let mut scope = HashMap::new();
        for id in chain.into_iter().rev() {
            self.apply_scope(id, &mut scope);
        }
        scope
    }

    fn apply_scope(&self, node: NodeId, scope: &mut HashMap<Option<String>, String>) {
        if let NodeKind::Element(el) = &self.nodes[node.0].kind {
            for (prefix, uri) in &el.ns_decls {
                if uri.is_empty() {
                    scope.remove(prefix);
                } else {
                    scope.insert(prefix.clone(), uri.clone());
                }
            }
            if let Some(ns) = &el.name.ns {
                scope.insert(el.name.prefix.clone(), ns.clone());
            }
        }
    }

    fn prefix_of(&self, node: NodeId) -> Option<String> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => el.name.prefix.clone(),
            _ => None,
        }
    }

    fn resolve_prefix(&self, node: NodeId, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NS.to_string());
        }
        self.in_scope_ns(node)
            .get(&prefix.map(str::to_string))
            .cloned()
    }

    pub(crate) fn element(&self, node: NodeId) -> Result<&ElementData> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => Ok(el),
            _ => Err(Error::XmlStructure("expected an element node".to_string())),
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut ElementData> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(el) => Ok(el),
            _ => Err(Error::XmlStructure("expected an element node".to_string())),
        }
    }

    pub(crate) fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    fn push_node(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    /// Serialize the document as XML text with a declaration.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.write_node(self.root, &HashMap::new(), &mut out);
        out
    }

    fn write_node(&self, node: NodeId, scope: &HashMap<Option<String>, String>, out: &mut String) {
        match &self.nodes[node.0].kind {
            NodeKind::Text(t) => out.push_str(&escape_text(t)),
            NodeKind::Comment(t) => {
                out.push_str("<!--");
                out.push_str(t);
                out.push_str("-->");
            }
            NodeKind::Element(el) => {
                let mut scope = scope.clone();
                out.push('<');
                out.push_str(&el.name.qualified());
                for (prefix, uri) in &el.ns_decls {
                    write_ns_decl(prefix, uri, out);
                    scope.insert(prefix.clone(), uri.clone());
                }
                if let Some(ns) = &el.name.ns {
                    if el.name.prefix.as_deref() != Some("xml")
                        && scope.get(&el.name.prefix) != Some(ns)
                    {
                        write_ns_decl(&el.name.prefix, ns, out);
                        scope.insert(el.name.prefix.clone(), ns.clone());
                    }
                }
                for (key, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(value));
                    out.push('"');
                }
                if self.nodes[node.0].children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in &self.nodes[node.0].children {
                    self.write_node(child, &scope, out);
                }
                out.push_str("</");
                out.push_str(&el.name.qualified());
                out.push('>');
            }
        }
    }
}

fn write_ns_decl(prefix: &Option<String>, uri: &str, out: &mut String) {
    match prefix {
        Some(p) => {
            out.push_str(" xmlns:");
            out.push_str(p);
        }
        None => out.push_str(" xmlns"),
    }
    out.push_str("=\"");
    out.push_str(&escape_attr(uri));
    out.push('"');
}

fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Normalize line endings to LF.
fn normalize_line_endings(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Produce a practically-unique token for `Id` attributes, optionally
/// prefixed.
pub fn generate_id(prefix: Option<&str>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match prefix {
        Some(p) => format!("{p}-{token}"),
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_find() {
        let doc = Document::parse(r#"<root><a>1</a><b xmlns:x="http://x/"><x:c/></b></root>"#)
            .unwrap();
        assert!(doc.find_node(None, "a").is_some());
        assert!(doc.find_node(None, "missing").is_none());
        let c = doc.find_node(Some("http://x/"), "c").unwrap();
        assert_eq!(doc.qname(c).unwrap().qualified(), "x:c");
    }

    #[test]
    fn test_parse_malformed() {
        for bad in ["<unclosed", "", "text only", "<a></b>", "<a/><b/>"] {
            assert!(
                matches!(Document::parse(bad), Err(Error::MalformedPayload(_))),
                "expected MalformedPayload for {bad:?}"
            );
        }
    }

    #[test]
    fn test_add_node_appends_in_order() {
        let mut doc = Document::with_root(None, "root");
        let first = doc
            .add_node(doc.root(), None, "first", Some("1"), &[])
            .unwrap();
        let second = doc
            .add_node(doc.root(), None, "second", None, &[("Id", "s")])
            .unwrap();
        assert_eq!(doc.children(doc.root()), &[first, second]);
        assert_eq!(doc.text_content(first), "1");
        assert_eq!(doc.attr(second, "Id"), Some("s"));
    }

    #[test]
    fn test_add_attribute_last_write_wins() {
        let mut doc = Document::with_root(None, "root");
        doc.add_attribute(doc.root(), &[("Id", "a"), ("Id", "b")])
            .unwrap();
        assert_eq!(doc.attr(doc.root(), "Id"), Some("b"));
    }

    #[test]
    fn test_set_text_replaces_children() {
        let mut doc = Document::with_root(None, "root");
        doc.add_node(doc.root(), None, "child", None, &[]).unwrap();
        doc.set_text(doc.root(), "value").unwrap();
        assert_eq!(doc.children(doc.root()).len(), 1);
        assert_eq!(doc.text_content(doc.root()), "value");
    }

    #[test]
    fn test_import_deep_copies() {
        let payload = Document::parse("<data attr=\"v\"><inner>x</inner></data>").unwrap();
        let mut doc = Document::with_root(None, "root");
        let imported = doc.import(&payload, payload.root(), doc.root()).unwrap();
        assert_eq!(doc.attr(imported, "attr"), Some("v"));
        assert_eq!(doc.text_content(imported), "x");
    }

    #[test]
    fn test_serialize_declares_namespace_at_first_use() {
        let mut doc = Document::with_root(None, "root");
        let child = doc
            .add_node(doc.root(), Some("http://ns/"), "p:child", None, &[])
            .unwrap();
        doc.add_node(child, Some("http://ns/"), "p:inner", Some("t"), &[])
            .unwrap();
        let xml = doc.to_xml_string();
        assert_eq!(xml.matches("xmlns:p=\"http://ns/\"").count(), 1);
        assert!(xml.contains("<p:child xmlns:p=\"http://ns/\"><p:inner>t</p:inner></p:child>"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let xml = r#"<root><a Id="1">text &amp; more</a><b/></root>"#;
        let doc = Document::parse(xml).unwrap();
        let out = doc.to_xml_string();
        let again = Document::parse(&out).unwrap();
        assert_eq!(again.text_content(again.root()), "text & more");
    }

    #[test]
    fn test_generate_id() {
        let a = generate_id(Some("Signature"));
        let b = generate_id(Some("Signature"));
        assert!(a.starts_with("Signature-"));
        assert_ne!(a, b);
        assert!(!generate_id(None).contains('-'));
    }
}
