//! Exclusive XML Canonicalization 1.0.
//!
//! Implements <http://www.w3.org/2001/10/xml-exc-c14n#> (with and without
//! comments) over a `roxmltree` subtree, optionally skipping one node so the
//! enveloped-signature transform can be applied in the same pass.
//!
//! Only namespaces that are visibly utilized by an element or its attributes
//! (plus any listed in the `InclusiveNamespaces` prefix list) are rendered,
//! and only where the nearest output ancestor has not already rendered the
//! same binding.

use std::collections::BTreeMap;

use roxmltree::{Attribute, Node, NodeId};

use super::ns;
use crate::error::{SamlError, SamlResult};

/// Canonicalization method URI without comments.
pub const EXC_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
/// Canonicalization method URI with comments.
pub const EXC_C14N_WITH_COMMENTS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#WithComments";

/// Canonicalization parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusiveC14n {
    /// Keep comment nodes.
    pub with_comments: bool,
    /// `InclusiveNamespaces PrefixList` entries; `#default` means the
    /// default namespace.
    pub inclusive_prefixes: Vec<String>,
}

impl ExclusiveC14n {
    /// Returns the parameters for an algorithm URI, or `None` if the URI is
    /// not an exclusive canonicalization method.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            EXC_C14N => Some(Self::default()),
            EXC_C14N_WITH_COMMENTS => Some(Self {
                with_comments: true,
                ..Self::default()
            }),
            _ => None,
        }
    }

    /// Sets the inclusive prefix list from its whitespace separated form.
    #[must_use]
    pub fn with_prefix_list(mut self, prefix_list: &str) -> Self {
        self.inclusive_prefixes = prefix_list.split_whitespace().map(str::to_string).collect();
        self
    }
}

/// Canonicalizes the subtree rooted at `node`, leaving out `exclude` and
/// its descendants.
///
/// # Errors
///
/// Returns [`SamlError::XmlParse`] if a namespaced attribute has no bound
/// prefix.
pub fn canonicalize(
    node: Node<'_, '_>,
    exclude: Option<NodeId>,
    options: &ExclusiveC14n,
) -> SamlResult<String> {
    let mut writer = Writer {
        out: String::new(),
        exclude,
        options,
    };
    writer.element(node, &BTreeMap::new())?;
    Ok(writer.out)
}

struct Writer<'o> {
    out: String,
    exclude: Option<NodeId>,
    options: &'o ExclusiveC14n,
}

impl Writer<'_> {
    fn element<'a>(
        &mut self,
        node: Node<'a, '_>,
        inherited: &BTreeMap<&'a str, &'a str>,
    ) -> SamlResult<()> {
        let qname = element_qname(node);
        let prefix = qname.split_once(':').map_or("", |(p, _)| p);
        let element_ns = node.tag_name().namespace().unwrap_or("");

        let mut attributes = Vec::new();
        let mut utilized: BTreeMap<&'a str, &'a str> = BTreeMap::new();
        utilized.insert(prefix, element_ns);

        for attr in node.attributes() {
            let (name, ns_uri) = match attr.namespace() {
                None => (attr.name().to_string(), ""),
                Some(uri) if uri == ns::XML => (format!("xml:{}", attr.name()), uri),
                Some(uri) => {
                    let attr_prefix = attribute_prefix(node, &attr)
                        .or_else(|| node.lookup_prefix(uri))
                        .ok_or_else(|| {
                            SamlError::XmlParse(format!("no prefix bound for namespace {uri}"))
                        })?;
                    utilized.insert(attr_prefix, uri);
                    (format!("{attr_prefix}:{}", attr.name()), uri)
                }
            };
            attributes.push((ns_uri, attr.name(), name, attr.value()));
        }

        for listed in &self.options.inclusive_prefixes {
            if listed == "#default" {
                let uri = node
                    .namespaces()
                    .find(|n| n.name().is_none())
                    .map_or("", |n| n.uri());
                utilized.entry("").or_insert(uri);
            } else if let Some(bound) = node.namespaces().find(|n| n.name() == Some(listed.as_str())) {
                if let Some(name) = bound.name() {
                    utilized.entry(name).or_insert(bound.uri());
                }
            }
        }

        let mut rendered = inherited.clone();
        self.out.push('<');
        self.out.push_str(qname);

        // BTreeMap iteration puts the default namespace ("") first.
        for (ns_prefix, uri) in utilized {
            let already = rendered.get(ns_prefix).copied();
            if ns_prefix.is_empty() && uri.is_empty() && already.map_or(true, str::is_empty) {
                continue;
            }
            if already == Some(uri) {
                continue;
            }
            if ns_prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(ns_prefix);
                self.out.push_str("=\"");
            }
            escape_attribute(&mut self.out, uri);
            self.out.push('"');
            rendered.insert(ns_prefix, uri);
        }

        attributes.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        for (_, _, name, value) in attributes {
            self.out.push(' ');
            self.out.push_str(&name);
            self.out.push_str("=\"");
            escape_attribute(&mut self.out, value);
            self.out.push('"');
        }
        self.out.push('>');

        for child in node.children() {
            if Some(child.id()) == self.exclude {
                continue;
            }
            if child.is_element() {
                self.element(child, &rendered)?;
            } else if child.is_text() {
                escape_text(&mut self.out, child.text().unwrap_or_default());
            } else if child.is_comment() && self.options.with_comments {
                self.out.push_str("<!--");
                self.out.push_str(child.text().unwrap_or_default());
                self.out.push_str("-->");
            } else if let Some(pi) = child.pi() {
                self.out.push_str("<?");
                self.out.push_str(pi.target);
                if let Some(value) = pi.value {
                    self.out.push(' ');
                    self.out.push_str(value);
                }
                self.out.push_str("?>");
            }
        }

        self.out.push_str("</");
        self.out.push_str(qname);
        self.out.push('>');
        Ok(())
    }
}

/// Returns the element's qualified name as written in the source.
fn element_qname<'a>(node: Node<'a, '_>) -> &'a str {
    let source = &node.document().input_text()[node.range()];
    let name = source
        .strip_prefix('<')
        .map(|rest| {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .unwrap_or(rest.len());
            &rest[..end]
        })
        .filter(|name| name.ends_with(node.tag_name().name()));
    name.unwrap_or_else(|| node.tag_name().name())
}

/// Returns the attribute's prefix as written in the source.
fn attribute_prefix<'a>(node: Node<'a, '_>, attr: &Attribute<'a, '_>) -> Option<&'a str> {
    let qname = node.document().input_text().get(attr.range_qname())?;
    qname
        .split_once(':')
        .filter(|(_, local)| *local == attr.name())
        .map(|(prefix, _)| prefix)
}

fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{parse_document, ParseLimits};

    fn c14n(xml: &str) -> String {
        let doc = parse_document(xml, &ParseLimits::default()).unwrap();
        canonicalize(doc.root_element(), None, &ExclusiveC14n::default()).unwrap()
    }

    #[test]
    fn empty_elements_are_expanded_and_attributes_sorted() {
        assert_eq!(c14n(r#"<a z="1" b='2'/>"#), r#"<a b="2" z="1"></a>"#);
    }

    #[test]
    fn unused_namespaces_are_dropped() {
        let xml = r#"<p:a xmlns:p="urn:p" xmlns:q="urn:q"><p:b>t</p:b></p:a>"#;
        assert_eq!(c14n(xml), r#"<p:a xmlns:p="urn:p"><p:b>t</p:b></p:a>"#);
    }

    #[test]
    fn inherited_namespace_is_rendered_on_apex() {
        let xml = r#"<r xmlns:s="urn:s"><s:inner s:attr="v"><s:leaf/></s:inner></r>"#;
        let doc = parse_document(xml, &ParseLimits::default()).unwrap();
        let inner = doc.root_element().first_element_child().unwrap();
        let out = canonicalize(inner, None, &ExclusiveC14n::default()).unwrap();
        assert_eq!(out, r#"<s:inner xmlns:s="urn:s" s:attr="v"><s:leaf></s:leaf></s:inner>"#);
    }

    #[test]
    fn default_namespace_is_rendered_once() {
        let xml = r#"<a xmlns="urn:d"><b><c/></b></a>"#;
        assert_eq!(c14n(xml), r#"<a xmlns="urn:d"><b><c></c></b></a>"#);
    }

    #[test]
    fn text_and_attribute_escaping() {
        let xml = "<a v=\"x&amp;&lt;&quot;&#9;\">1 &lt; 2 &amp;&amp; 3 &gt; 2</a>";
        assert_eq!(c14n(xml), "<a v=\"x&amp;&lt;&quot;&#x9;\">1 &lt; 2 &amp;&amp; 3 &gt; 2</a>");
    }

    #[test]
    fn comments_only_with_comments() {
        let xml = "<a><!-- note --><b/></a>";
        assert_eq!(c14n(xml), "<a><b></b></a>");

        let doc = parse_document(xml, &ParseLimits::default()).unwrap();
        let options = ExclusiveC14n::from_uri(EXC_C14N_WITH_COMMENTS).unwrap();
        let out = canonicalize(doc.root_element(), None, &options).unwrap();
        assert_eq!(out, "<a><!-- note --><b></b></a>");
    }

    #[test]
    fn excluded_node_is_skipped() {
        let xml = r#"<a ID="1"><x/><sig/><y/></a>"#;
        let doc = parse_document(xml, &ParseLimits::default()).unwrap();
        let sig = doc
            .descendants()
            .find(|n| n.has_tag_name("sig"))
            .unwrap();
        let out = canonicalize(doc.root_element(), Some(sig.id()), &ExclusiveC14n::default()).unwrap();
        assert_eq!(out, r#"<a ID="1"><x></x><y></y></a>"#);
    }

    #[test]
    fn inclusive_prefix_list_forces_declaration() {
        let xml = r#"<r xmlns:xs="urn:xs" xmlns:p="urn:p"><p:a/></r>"#;
        let doc = parse_document(xml, &ParseLimits::default()).unwrap();
        let a = doc.root_element().first_element_child().unwrap();
        let options = ExclusiveC14n::default().with_prefix_list("xs");
        let out = canonicalize(a, None, &options).unwrap();
        assert_eq!(out, r#"<p:a xmlns:p="urn:p" xmlns:xs="urn:xs"></p:a>"#);
    }

    #[test]
    fn attribute_order_puts_unqualified_first() {
        let xml = r#"<a xmlns:x="urn:x" x:b="1" c="2"/>"#;
        assert_eq!(c14n(xml), r#"<a xmlns:x="urn:x" c="2" x:b="1"></a>"#);
    }

    #[test]
    fn attribute_keeps_its_source_prefix() {
        let xml = r#"<a xmlns:p="urn:same" xmlns:q="urn:same" q:b="1"/>"#;
        assert_eq!(c14n(xml), r#"<a xmlns:q="urn:same" q:b="1"></a>"#);
    }

    #[test]
    fn xml_lang_attribute_needs_no_declaration() {
        let xml = r#"<a xml:lang="en">t</a>"#;
        assert_eq!(c14n(xml), r#"<a xml:lang="en">t</a>"#);
    }
}
