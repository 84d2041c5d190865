//! Hardened XML handling.
//!
//! All inbound XML goes through [`parse_document`], which refuses DTDs (and
//! with them external entities and entity expansion) and enforces size,
//! node count and nesting depth limits before any SAML logic looks at the
//! tree. The DOM is `roxmltree`, which keeps the exact source text around so
//! that canonicalization can see original prefixes.

pub mod c14n;
mod pretty;

use std::collections::HashMap;

use roxmltree::{Document, Node, NodeId, ParsingOptions};

use crate::error::{SamlError, SamlResult};

pub use pretty::pretty_print;

/// Namespace URIs used by the engine.
pub mod ns {
    /// SAML 2.0 protocol namespace.
    pub const SAMLP: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
    /// SAML 2.0 assertion namespace.
    pub const SAML: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
    /// SAML 2.0 metadata namespace.
    pub const MD: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
    /// XML-DSig namespace.
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
    /// Exclusive C14N namespace (for `InclusiveNamespaces`).
    pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
    /// XML Schema instance namespace.
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
    /// Reserved `xml:` namespace.
    pub const XML: &str = "http://www.w3.org/XML/1998/namespace";
}

/// Resource limits applied to every parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum document size in bytes.
    pub max_bytes: usize,
    /// Maximum element nesting depth.
    pub max_depth: usize,
    /// Maximum number of DOM nodes.
    pub max_nodes: u32,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_bytes: 512 * 1024,
            max_depth: 64,
            max_nodes: 100_000,
        }
    }
}

/// Parses `xml` with DTDs disabled and the given limits enforced.
///
/// # Errors
///
/// Returns [`SamlError::XmlParse`] if the document is malformed, carries a
/// DOCTYPE, or exceeds any limit.
pub fn parse_document<'i>(xml: &'i str, limits: &ParseLimits) -> SamlResult<Document<'i>> {
    if xml.len() > limits.max_bytes {
        return Err(SamlError::XmlParse(format!(
            "document of {} bytes exceeds the limit of {} bytes",
            xml.len(),
            limits.max_bytes
        )));
    }

    let mut options = ParsingOptions::default();
    options.allow_dtd = false;
    options.nodes_limit = limits.max_nodes;

    let doc = Document::parse_with_options(xml, options)?;
    check_depth(doc.root(), limits.max_depth)?;
    Ok(doc)
}

fn check_depth(root: Node<'_, '_>, max_depth: usize) -> SamlResult<()> {
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > max_depth {
            return Err(SamlError::XmlParse(format!(
                "element nesting exceeds the limit of {max_depth}"
            )));
        }
        stack.extend(node.children().filter(Node::is_element).map(|c| (c, depth + 1)));
    }
    Ok(())
}

/// Returns true if `node` is the element `{ns}name`.
#[must_use]
pub fn is_element(node: Node<'_, '_>, ns: &str, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(ns)
}

/// Returns the first child element `{ns}name`.
#[must_use]
pub fn child<'a, 'i>(node: Node<'a, 'i>, ns: &str, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|c| is_element(*c, ns, name))
}

/// Returns all child elements `{ns}name`.
pub fn children<'a, 'i: 'a>(
    node: Node<'a, 'i>,
    ns: &'a str,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children().filter(move |c| is_element(*c, ns, name))
}

/// Returns the first child element `{ns}name` or a missing element error.
///
/// # Errors
///
/// Returns [`SamlError::MissingElement`] naming the absent element.
pub fn require_child<'a, 'i>(node: Node<'a, 'i>, ns: &str, name: &str) -> SamlResult<Node<'a, 'i>> {
    child(node, ns, name).ok_or_else(|| {
        SamlError::MissingElement(format!("{name} in {}", node.tag_name().name()))
    })
}

/// Returns a required attribute value.
///
/// # Errors
///
/// Returns [`SamlError::MissingElement`] naming the absent attribute.
pub fn require_attribute<'a>(node: Node<'a, '_>, name: &str) -> SamlResult<&'a str> {
    node.attribute(name).ok_or_else(|| {
        SamlError::MissingElement(format!("{name} attribute on {}", node.tag_name().name()))
    })
}

/// Returns the concatenated, trimmed text content of an element.
#[must_use]
pub fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Maps every `ID` attribute in the document to its element.
///
/// # Errors
///
/// Returns [`SamlError::SignatureInvalid`] if an ID occurs twice, since a
/// duplicated ID lets an attacker point a signature reference at a
/// different element than the one that is consumed.
pub fn id_map<'a, 'i>(doc: &'a Document<'i>) -> SamlResult<HashMap<&'a str, NodeId>> {
    let mut ids = HashMap::new();
    for node in doc.descendants().filter(Node::is_element) {
        if let Some(id) = node.attribute("ID") {
            if ids.insert(id, node.id()).is_some() {
                return Err(SamlError::SignatureInvalid(format!("duplicate ID {id}")));
            }
        }
    }
    Ok(ids)
}

/// Escapes text for inclusion in element content or attribute values of
/// documents generated by this crate.
#[must_use]
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
