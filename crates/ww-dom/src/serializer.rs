//! Element tree to HTML string.

use crate::node::{Element, Node};

/// Elements whose text children are written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Serialize an element including its own tags.
pub fn outer_html(el: &Element) -> String {
    let mut out = String::with_capacity(256);
    write_element(el, &mut out);
    out
}

/// Serialize only the children of an element.
pub fn inner_html(el: &Element) -> String {
    let mut out = String::with_capacity(256);
    let raw = RAW_TEXT_ELEMENTS.contains(&el.tag.as_str());
    for child in &el.children {
        write_node(child, raw, &mut out);
    }
    out
}

/// Serialize a sequence of sibling nodes.
pub fn serialize_nodes(nodes: &[Node]) -> String {
    let mut out = String::with_capacity(256);
    for node in nodes {
        write_node(node, false, &mut out);
    }
    out
}

fn write_node(node: &Node, raw: bool, out: &mut String) {
    match node {
        Node::Text(text) if raw => out.push_str(text),
        Node::Text(text) => out.push_str(&escape_text(text)),
        Node::Element(el) => write_element(el, out),
    }
}

fn write_element(el: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (key, value) in &el.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }

    if el.is_void() {
        out.push_str(" />");
        return;
    }

    out.push('>');
    out.push_str(&inner_html(el));
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}

/// Escape text for element content.
pub fn escape_text(text: &str) -> String {
    escape_html(text, false)
}

/// Escape text for a double-quoted attribute value.
pub fn escape_attr(text: &str) -> String {
    escape_html(text, true)
}

fn escape_html(text: &str, escape_quotes: bool) -> String {
    let mut result = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' if escape_quotes => result.push_str("&quot;"),
            _ => result.push(ch),
        }
    }
    result
}
