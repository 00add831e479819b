//! HTML fragment parsing with html5ever, through `kuchiki`.
//!
//! Markup is parsed the way a browser parses it, so host `innerHTML`, our
//! own renderer output and hand-written snippets all end up in the same
//! shape. The contents of `<head>` and `<body>` are then copied into an
//! owned [`Element`] tree. Comments, doctypes and processing instructions
//! are dropped.

use kuchiki::{NodeData, NodeRef};
use tendril::TendrilSink;

use crate::node::{Element, Node};

/// Tag of the synthetic root returned by [`parse_fragment`].
pub const FRAGMENT_TAG: &str = "#fragment";

/// Parse an HTML fragment into an element tree.
///
/// The returned element has tag [`FRAGMENT_TAG`] and holds the parsed nodes
/// as children. A full document is accepted too; its head and body contents
/// become the children.
pub fn parse_fragment(html: &str) -> Element {
    let document = kuchiki::parse_html().one(html);
    let mut root = Element::new(FRAGMENT_TAG);
    for section in ["head", "body"] {
        if let Ok(el) = document.select_first(section) {
            copy_children(el.as_node(), &mut root.children);
        }
    }
    root
}

fn copy_children(parent: &NodeRef, out: &mut Vec<Node>) {
    for child in parent.children() {
        match child.data() {
            NodeData::Element(data) => {
                let mut el = Element::new(data.name.local.to_string());
                el.attrs = data
                    .attributes
                    .borrow()
                    .map
                    .iter()
                    .map(|(name, attr)| {
                        let key = match &attr.prefix {
                            Some(prefix) => format!("{prefix}:{}", name.local),
                            None => name.local.to_string(),
                        };
                        (key, attr.value.clone())
                    })
                    .collect();
                let contents = data.template_contents.as_ref().unwrap_or(&child);
                copy_children(contents, &mut el.children);
                out.push(Node::Element(el));
            }
            NodeData::Text(text) => push_text(out, &text.borrow()),
            _ => {}
        }
    }
}

fn push_text(out: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = out.last_mut() {
        last.push_str(text);
    } else {
        out.push(Node::Text(text.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::serializer::inner_html;

    #[test]
    fn test_parse_nested_elements() {
        let root = parse_fragment("<p><strong>Bold</strong> text</p>");
        assert_eq!(root.tag, FRAGMENT_TAG);
        let p = root.element_children().next().unwrap();
        assert_eq!(p.tag, "p");
        assert_eq!(p.children.len(), 2);
        assert_eq!(p.children[1], Node::Text(" text".to_owned()));
    }

    #[test]
    fn test_void_elements_without_slash() {
        let root = parse_fragment("<p>a<br>b<img src=\"x.png\">c</p><p>d</p>");
        let paragraphs: Vec<_> = root.element_children().collect();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].text_content(), "abc");
        assert_eq!(paragraphs[0].element_children().count(), 2);
    }

    #[test]
    fn test_html_entities_and_bare_ampersand() {
        let root = parse_fragment("<p>A&nbsp;&amp; B & C&#x4e2d;</p>");
        assert_eq!(root.text_content(), "A\u{00a0}& B & C中");
    }

    #[test]
    fn test_valueless_and_unquoted_attributes() {
        let root = parse_fragment("<input type=checkbox checked>");
        let input = root.element_children().next().unwrap();
        assert_eq!(input.attr("type"), Some("checkbox"));
        assert_eq!(input.attr("checked"), Some(""));
    }

    #[test]
    fn test_mismatched_end_tags_are_tolerated() {
        let root = parse_fragment("<div><span>x</div><p>y</p>");
        let tags: Vec<_> = root.element_children().map(|el| el.tag.as_str()).collect();
        assert_eq!(tags, vec!["div", "p"]);
        assert_eq!(root.text_content(), "xy");
    }

    #[test]
    fn test_block_inside_paragraph_is_split_like_a_browser() {
        let root = parse_fragment("<p><section>x</section></p>");
        assert_eq!(inner_html(&root), "<p></p><section>x</section><p></p>");
    }

    #[test]
    fn test_svg_keeps_case_and_namespace_attributes() {
        let root = parse_fragment(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 1 1"><path d="M0 0"/></svg>"#,
        );
        let svg = root.element_children().next().unwrap();
        assert_eq!(svg.attr("xmlns"), Some("http://www.w3.org/2000/svg"));
        assert_eq!(svg.attr("viewBox"), Some("0 0 1 1"));
        assert_eq!(svg.element_children().next().map(|el| el.tag.as_str()), Some("path"));
    }

    #[test]
    fn test_full_document_yields_body_contents() {
        let root = parse_fragment("<!DOCTYPE html><html><body><p>x</p></body></html>");
        assert_eq!(inner_html(&root), "<p>x</p>");
    }

    #[test]
    fn test_comments_are_dropped() {
        let root = parse_fragment("<p>a<!-- note -->b</p>");
        assert_eq!(root.text_content(), "ab");
        let p = root.element_children().next().unwrap();
        assert_eq!(p.children.len(), 1);
    }
}
