//! XML element helpers and the ISO-8859-1 serializer.
//!
//! Documents are built on [`xmltree::Element`] and written through the
//! xml-rs emitter. I3D files only use attributes, never text content, so
//! [`ElementExt`] adds the attribute and child builders the writer needs.

use crate::error::{ExportError, Result};
use xmltree::EmitterConfig;

pub use xmltree::{Element, XMLNode};

/// Declaration written at the top of every document.
pub const DECLARATION: &str = r#"<?xml version="1.0" encoding="iso-8859-1"?>"#;

/// Attribute and child builders over [`Element`].
pub trait ElementExt: Sized {
    /// Builder form of [`ElementExt::set`].
    fn attr(self, name: impl Into<String>, value: impl ToString) -> Self;

    fn set(&mut self, name: impl Into<String>, value: impl ToString);

    /// Set the attribute only when a value is present.
    fn set_opt<T: ToString>(&mut self, name: impl Into<String>, value: Option<T>);

    /// Write `"true"` when `value` holds.
    fn flag(&mut self, name: impl Into<String>, value: bool);

    fn push(&mut self, child: Element);

    /// Builder form of [`ElementExt::push`].
    fn child(self, child: Element) -> Self;

    fn extend_children<I: IntoIterator<Item = Element>>(&mut self, children: I);
}

impl ElementExt for Element {
    fn attr(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set(name, value);
        self
    }

    fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        self.attributes.insert(name.into(), value.to_string());
    }

    fn set_opt<T: ToString>(&mut self, name: impl Into<String>, value: Option<T>) {
        if let Some(value) = value {
            self.set(name, value);
        }
    }

    fn flag(&mut self, name: impl Into<String>, value: bool) {
        if value {
            self.set(name, "true");
        }
    }

    fn push(&mut self, child: Element) {
        self.children.push(XMLNode::Element(child));
    }

    fn child(mut self, child: Element) -> Self {
        self.push(child);
        self
    }

    fn extend_children<I: IntoIterator<Item = Element>>(&mut self, children: I) {
        self.children
            .extend(children.into_iter().map(XMLNode::Element));
    }
}

fn emitter_config() -> EmitterConfig {
    let mut config = EmitterConfig::new();
    config.perform_indent = true;
    config.indent_string = "  ".into();
    config.write_document_declaration = false;
    config.pad_self_closing = false;
    config
}

/// Serialize a document with its declaration.
///
/// The emitter escapes markup characters. Characters outside Latin-1 are
/// then replaced with numeric character references so the text encodes
/// cleanly with [`encode_latin1`].
pub fn to_string(root: &Element) -> Result<String> {
    let mut body = Vec::with_capacity(4096);
    root.write_with_config(&mut body, emitter_config())
        .map_err(|e| ExportError::Xml(e.to_string()))?;
    let body = String::from_utf8_lossy(&body);

    let mut out = String::with_capacity(DECLARATION.len() + body.len() + 2);
    out.push_str(DECLARATION);
    out.push('\n');
    push_latin1_safe(&mut out, &body);
    out.push('\n');
    Ok(out)
}

fn push_latin1_safe(out: &mut String, text: &str) {
    for c in text.chars() {
        if (c as u32) > 0xFF {
            out.push_str(&format!("&#{};", c as u32));
        } else {
            out.push(c);
        }
    }
}

/// Encode serialized document text as ISO-8859-1 bytes.
///
/// After [`to_string`] every character fits in one byte; anything else is
/// replaced with `?`.
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_indentation() {
        let root = Element::new("a").attr("x", 1).child(Element::new("b").child(Element::new("c")));
        let text = to_string(&root).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![DECLARATION, r#"<a x="1">"#, "  <b>", "    <c/>", "  </b>", "</a>"]
        );
    }

    #[test]
    fn test_attribute_order_is_kept() {
        let root = Element::new("Shape")
            .attr("name", "n")
            .attr("nodeId", 3)
            .attr("translation", "0 0 0");
        let text = to_string(&root).unwrap();
        let name = text.find("name=").unwrap();
        let node_id = text.find("nodeId=").unwrap();
        let translation = text.find("translation=").unwrap();
        assert!(name < node_id && node_id < translation);
    }

    #[test]
    fn test_escaped_values_parse_back() {
        let value = r#"a&b<c>"d""#;
        let text = to_string(&Element::new("e").attr("v", value)).unwrap();
        assert!(text.contains("&amp;"));
        assert!(text.contains("&lt;"));
        assert!(!text.contains(value));

        let doc = roxmltree::Document::parse(&text).unwrap();
        assert_eq!(doc.root_element().attribute("v"), Some(value));
    }

    #[test]
    fn test_non_latin1_becomes_char_reference() {
        let text = to_string(&Element::new("e").attr("v", "caf\u{e9} \u{20ac}")).unwrap();
        assert!(text.contains("caf\u{e9} &#8364;"));

        let doc = roxmltree::Document::parse(&text).unwrap();
        assert_eq!(doc.root_element().attribute("v"), Some("caf\u{e9} \u{20ac}"));
    }

    #[test]
    fn test_latin1_bytes() {
        let text = to_string(&Element::new("e").attr("v", "\u{e9}\u{20ac}")).unwrap();
        let bytes = encode_latin1(&text);
        assert!(bytes.windows(8).any(|w| w == b"\xe9&#8364;"));
    }

    #[test]
    fn test_optional_attributes() {
        let mut e = Element::new("Shape");
        e.set_opt("clipDistance", None::<f32>);
        e.set_opt("objectMask", Some(255));
        e.flag("static", false);
        e.flag("dynamic", true);
        assert_eq!(e.attributes.get("objectMask").map(String::as_str), Some("255"));
        assert_eq!(e.attributes.get("dynamic").map(String::as_str), Some("true"));
        assert!(e.attributes.get("static").is_none());
        assert_eq!(e.attributes.len(), 2);
    }
}
