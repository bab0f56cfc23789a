//! Canonical XML serialization of a subtree.
//!
//! Supports the four admissible W3C methods: canonical XML 1.0 and
//! exclusive canonicalization, each with or without comments. Namespace
//! rendering follows the declared/rendered distinction: inclusive methods
//! emit every in-scope binding not already emitted identically by the
//! nearest output ancestor, exclusive methods emit only visibly-utilized
//! prefixes plus an optional inclusive-prefix list.

use super::{Document, ElementData, NodeId, NodeKind, XML_NS};
use crate::algorithms::CanonicalizationMethod;
use crate::error::Result;
use std::collections::{BTreeSet, HashMap};

/// Canonicalize the subtree rooted at `node`.
///
/// The namespace context inherited from ancestors outside the subtree is
/// taken into account, so canonicalizing a node of a freshly built tree
/// and canonicalizing the same node after a serialize/parse round trip
/// produce identical bytes.
pub fn canonicalize(
    doc: &Document,
    node: NodeId,
    method: CanonicalizationMethod,
    inclusive_ns: Option<&[&str]>,
) -> Result<Vec<u8>> {
    doc.element(node)?;
    let parent_scope = match doc.parent(node) {
        Some(parent) => doc.in_scope_ns(parent),
        None => HashMap::new(),
    };
    let mut out = String::new();
    render_element(
        doc,
        node,
        &parent_scope,
        &HashMap::new(),
        method,
        inclusive_ns,
        &mut out,
    )?;
    Ok(out.into_bytes())
}

fn render_element(
    doc: &Document,
    node: NodeId,
    parent_scope: &HashMap<Option<String>, String>,
    rendered: &HashMap<Option<String>, String>,
    method: CanonicalizationMethod,
    inclusive_ns: Option<&[&str]>,
    out: &mut String,
) -> Result<()> {
    let el = doc.element(node)?;

    let mut scope = parent_scope.clone();
    for (prefix, uri) in &el.ns_decls {
        if uri.is_empty() {
            scope.remove(prefix);
        } else {
            scope.insert(prefix.clone(), uri.clone());
        }
    }
    if let Some(ns) = &el.name.ns {
        if el.name.prefix.as_deref() != Some("xml") {
            scope.insert(el.name.prefix.clone(), ns.clone());
        }
    }

    let render_ns = namespaces_to_render(el, &scope, rendered, method, inclusive_ns);

    out.push('<');
    out.push_str(&el.name.qualified());
    for (prefix, uri) in &render_ns {
        match prefix {
            Some(p) => {
                out.push_str(" xmlns:");
                out.push_str(p);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        out.push_str(&escape_attr_value(uri));
        out.push('"');
    }

    // Attributes sort by (namespace URI, local name); unqualified first.
    let mut attrs: Vec<(String, String, &str, &str)> = Vec::new();
    for (key, value) in &el.attrs {
        let (ns_uri, local) = match key.split_once(':') {
            Some(("xml", local)) => (XML_NS.to_string(), local.to_string()),
            Some((prefix, local)) => (
                scope
                    .get(&Some(prefix.to_string()))
                    .cloned()
                    .unwrap_or_default(),
                local.to_string(),
            ),
            None => (String::new(), key.clone()),
        };
        attrs.push((ns_uri, local, key, value));
    }
    attrs.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    for (_, _, key, value) in &attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr_value(value));
        out.push('"');
    }
    out.push('>');

    let mut child_rendered = rendered.clone();
    for (prefix, uri) in &render_ns {
        child_rendered.insert(prefix.clone(), uri.clone());
    }

    for &child in doc.children(node) {
        match doc.kind(child) {
            NodeKind::Text(text) => out.push_str(&escape_text_value(text)),
            NodeKind::Comment(text) => {
                if method.with_comments() {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
            }
            NodeKind::Element(_) => {
                render_element(doc, child, &scope, &child_rendered, method, inclusive_ns, out)?;
            }
        }
    }

    out.push_str("</");
    out.push_str(&el.name.qualified());
    out.push('>');
    Ok(())
}

fn namespaces_to_render(
    el: &ElementData,
    scope: &HashMap<Option<String>, String>,
    rendered: &HashMap<Option<String>, String>,
    method: CanonicalizationMethod,
    inclusive_ns: Option<&[&str]>,
) -> Vec<(Option<String>, String)> {
    let mut render = Vec::new();

    if method.is_exclusive() {
        let mut visibly_utilized: BTreeSet<Option<String>> = BTreeSet::new();
        visibly_utilized.insert(el.name.prefix.clone());
        for (key, _) in &el.attrs {
            if let Some((prefix, _)) = key.split_once(':') {
                if prefix != "xml" {
                    visibly_utilized.insert(Some(prefix.to_string()));
                }
            }
        }
        if let Some(prefixes) = inclusive_ns {
            for prefix in prefixes {
                let key = Some(prefix.to_string());
                if scope.contains_key(&key) {
                    visibly_utilized.insert(key);
                }
            }
        }

        for prefix in visibly_utilized {
            if prefix.as_deref() == Some("xml") {
                continue;
            }
            match scope.get(&prefix) {
                Some(uri) => {
                    if rendered.get(&prefix) != Some(uri) {
                        render.push((prefix, uri.clone()));
                    }
                }
                None => {
                    if prefix.is_none() && rendered.get(&None).is_some_and(|u| !u.is_empty()) {
                        render.push((None, String::new()));
                    }
                }
            }
        }
    } else {
        for (prefix, uri) in scope {
            if prefix.as_deref() == Some("xml") {
                continue;
            }
            if rendered.get(prefix) != Some(uri) {
                render.push((prefix.clone(), uri.clone()));
            }
        }
        if !scope.contains_key(&None) && rendered.get(&None).is_some_and(|u| !u.is_empty()) {
            render.push((None, String::new()));
        }
    }

    render.sort_by(|a, b| a.0.cmp(&b.0));
    render
}

/// Escape attribute value per C14N rules.
fn escape_attr_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 4);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text node value per C14N rules.
fn escape_text_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + value.len() / 4);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}
