//! CSS selectors over owned element trees.
//!
//! Compilation and matching are done by `kuchiki` (Servo's `selectors`).
//! An owned tree is mirrored into a `kuchiki` document for each query and
//! both trees are walked side by side, so matches come back as child-index
//! paths into the owned tree.

use std::fmt;

use kuchiki::{Attribute, ExpandedName, NodeRef, Selectors};
use markup5ever::{LocalName, QualName, namespace_url, ns};

use crate::error::DomError;
use crate::node::{Element, Node, NodePath};

/// A compiled selector list.
pub struct Selector {
    source: String,
    compiled: Selectors,
}

impl Selector {
    /// Compile a selector string.
    ///
    /// # Errors
    ///
    /// Returns [`DomError::Selector`] if the string is not a valid selector
    /// list.
    pub fn parse(source: &str) -> Result<Self, DomError> {
        let compiled = Selectors::compile(source).map_err(|()| DomError::Selector {
            selector: source.to_owned(),
        })?;
        Ok(Self {
            source: source.to_owned(),
            compiled,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Paths of the descendants of `root` that match, in document order.
    pub(crate) fn matching_paths(&self, root: &Element) -> Vec<NodePath> {
        let document = NodeRef::new_document();
        mirror(&root.children, &document);
        let mut out = Vec::new();
        self.collect(&root.children, &document, &mut Vec::new(), &mut out);
        out
    }

    fn collect(&self, nodes: &[Node], parent: &NodeRef, path: &mut NodePath, out: &mut Vec<NodePath>) {
        for ((idx, node), mirrored) in nodes.iter().enumerate().zip(parent.children()) {
            let Node::Element(el) = node else {
                continue;
            };
            path.push(idx);
            if let Some(element) = mirrored.clone().into_element_ref()
                && self.compiled.matches(&element)
            {
                out.push(path.clone());
            }
            self.collect(&el.children, &mirrored, path, out);
            path.pop();
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.source).finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Append one `kuchiki` node per owned node, keeping child indices aligned.
fn mirror(nodes: &[Node], parent: &NodeRef) {
    for node in nodes {
        match node {
            Node::Text(text) => parent.append(NodeRef::new_text(text.clone())),
            Node::Element(el) => {
                let attrs = el.attrs.iter().map(|(name, value)| {
                    (
                        ExpandedName::new("", name.as_str()),
                        Attribute {
                            prefix: None,
                            value: value.clone(),
                        },
                    )
                });
                let child = NodeRef::new_element(
                    QualName::new(None, ns!(html), LocalName::from(el.tag.as_str())),
                    attrs,
                );
                mirror(&el.children, &child);
                parent.append(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::parse_fragment;

    fn classes_of(html: &str, selector: &str) -> Vec<String> {
        let root = parse_fragment(html);
        let selector = Selector::parse(selector).unwrap();
        root.select(&selector)
            .into_iter()
            .map(|el| el.attr("class").unwrap_or_default().to_owned())
            .collect()
    }

    #[test]
    fn test_class_and_compound() {
        let html = r#"<div class="callout admonition"></div><div class="callout"></div>"#;
        assert_eq!(classes_of(html, ".callout.admonition"), vec!["callout admonition"]);
        assert_eq!(classes_of(html, "div.callout").len(), 2);
    }

    #[test]
    fn test_not_pseudo_class() {
        let html = r#"<div class="callout admonition"></div><div class="callout"></div>"#;
        assert_eq!(classes_of(html, ".callout:not(.admonition)"), vec!["callout"]);
    }

    #[test]
    fn test_child_and_descendant_combinators() {
        let html = r#"<div class="a"><p class="b"><span class="c"></span></p></div>"#;
        assert_eq!(classes_of(html, ".a .c"), vec!["c"]);
        assert!(classes_of(html, ".a > .c").is_empty());
        assert_eq!(classes_of(html, ".a > .b > .c"), vec!["c"]);
    }

    #[test]
    fn test_sibling_combinator() {
        let html = r#"<h2 class="t"></h2><p class="first"></p><p class="second"></p>"#;
        assert_eq!(classes_of(html, "h2 + p"), vec!["first"]);
    }

    #[test]
    fn test_attribute_selectors() {
        let html = r#"<div data-callout="note" class="x"></div><div class="y"></div>"#;
        assert_eq!(classes_of(html, "[data-callout]"), vec!["x"]);
        assert_eq!(classes_of(html, r#"div[data-callout="note"]"#), vec!["x"]);
        assert!(classes_of(html, "[data-callout=tip]").is_empty());
    }

    #[test]
    fn test_groups_keep_document_order() {
        let html = r#"<i class="b"></i><i class="a"></i>"#;
        assert_eq!(classes_of(html, ".a, .b"), vec!["b", "a"]);
    }

    #[test]
    fn test_root_is_never_a_candidate() {
        let root = Element::new("div").with_attr("class", "a");
        let selector = Selector::parse(".a").unwrap();
        assert!(root.select(&selector).is_empty());
    }

    #[test]
    fn test_paths_skip_text_nodes() {
        let root = parse_fragment("<p>a<em>b</em>c<em>d</em></p>");
        let selector = Selector::parse("em").unwrap();
        assert_eq!(root.select_paths(&selector), vec![vec![0, 1], vec![0, 3]]);
    }

    #[test]
    fn test_rejects_invalid_syntax() {
        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("a[").is_err());
        assert!(Selector::parse("div >").is_err());
    }
}
