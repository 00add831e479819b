//! List cleanup: empty items and lists are dropped, item content is wrapped
//! in a `<section>` so editor styles apply to it.

use async_trait::async_trait;
use ww_dom::{Element, Node, inner_html, parse_fragment};
use ww_renderer::{Extension, ExtensionError, PostprocessContext};

fn is_list(el: &Element) -> bool {
    matches!(el.tag.as_str(), "ul" | "ol")
}

fn has_items(list: &Element) -> bool {
    list.element_children().any(|child| child.tag == "li")
}

fn wrap_item(item: &mut Element) {
    let wrapped = matches!(
        item.children.as_slice(),
        [Node::Element(only)] if only.tag == "section"
    );
    if wrapped {
        return;
    }
    let mut section = Element::new("section");
    section.children = std::mem::take(&mut item.children);
    item.children.push(Node::Element(section));
}

/// Bottom-up so a list emptied by removing nested lists is removed too.
fn clean(el: &mut Element) {
    for child in &mut el.children {
        if let Node::Element(child) = child {
            clean(child);
        }
    }
    if is_list(el) {
        el.children.retain(|child| match child {
            Node::Element(item) if item.tag == "li" => item.has_content(),
            _ => true,
        });
        for child in &mut el.children {
            if let Node::Element(item) = child
                && item.tag == "li"
            {
                wrap_item(item);
            }
        }
    }
    el.children.retain(|child| match child {
        Node::Element(list) if is_list(list) => has_items(list),
        _ => true,
    });
}

pub struct ListItemExtension;

#[async_trait]
impl Extension for ListItemExtension {
    fn name(&self) -> &'static str {
        "list-item"
    }

    async fn postprocess(
        &mut self,
        html: String,
        _ctx: &PostprocessContext<'_>,
    ) -> Result<String, ExtensionError> {
        if !html.contains("<li") {
            return Ok(html);
        }
        let mut root = parse_fragment(&html);
        clean(&mut root);
        Ok(inner_html(&root))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn run(html: &str) -> String {
        let mut root = parse_fragment(html);
        clean(&mut root);
        inner_html(&root)
    }

    #[test]
    fn test_empty_list_removed() {
        assert_eq!(run("<p>a</p><ul>\n<li></li>\n</ul>"), "<p>a</p>");
    }

    #[test]
    fn test_items_wrapped() {
        assert_eq!(
            run("<ol><li>one</li><li> </li><li><em>two</em></li></ol>"),
            "<ol><li><section>one</section></li><li><section><em>two</em></section></li></ol>"
        );
    }

    #[test]
    fn test_nested_empty_list_empties_parent() {
        assert_eq!(run("<ul><li><ul><li></li></ul></li></ul><p>x</p>"), "<p>x</p>");
    }

    #[test]
    fn test_task_checkbox_counts_as_content() {
        assert_eq!(
            run(r#"<ul><li><input type="checkbox" disabled="" /></li></ul>"#),
            r#"<ul><li><section><input disabled="" type="checkbox" /></section></li></ul>"#
        );
    }

    #[test]
    fn test_wrapping_is_stable() {
        let once = run("<ul><li>a</li></ul>");
        assert_eq!(run(&once), once);
    }
}
