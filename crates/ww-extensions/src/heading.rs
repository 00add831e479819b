//! Heading decoration and folding.

use async_trait::async_trait;
use ww_dom::{Element, Node, Selector, inner_html, parse_fragment};
use ww_renderer::{Extension, ExtensionError, PostprocessContext};

/// Heading depth for `h1`..`h6`.
fn heading_depth(el: &Element) -> Option<u8> {
    match el.tag.as_str() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn span(class: &str) -> Element {
    Element::new("span").with_attr("class", class)
}

/// `<hN><span class="prefix"/><span class="content">…</span><span class="suffix"/></hN>`
///
/// Themes style the three spans; already decorated headings are left alone.
fn decorate(heading: &mut Element) {
    let decorated = heading
        .children
        .first()
        .and_then(Node::as_element)
        .is_some_and(|first| first.tag == "span" && first.has_class("prefix"));
    if decorated {
        return;
    }
    let mut content = span("content");
    content.children = std::mem::take(&mut heading.children);
    heading.children = vec![
        Node::Element(span("prefix")),
        Node::Element(content),
        Node::Element(span("suffix")),
    ];
}

/// Fold the top-level heading at `index`: mark it and move the siblings up
/// to the next heading of the same or a higher level into a section.
fn fold(root: &mut Element, index: usize) {
    let Some(depth) = root.children[index].as_element().and_then(heading_depth) else {
        return;
    };
    if let Some(heading) = root.children[index].as_element_mut() {
        heading.add_class("folded");
    }
    let start = index + 1;
    let end = root.children[start..]
        .iter()
        .position(|node| {
            node.as_element()
                .and_then(heading_depth)
                .is_some_and(|d| d <= depth)
        })
        .map_or(root.children.len(), |p| start + p);
    if start == end {
        return;
    }
    let mut section = Element::new("section").with_attr("class", "folded-content");
    section.children = root.children.drain(start..end).collect();
    root.children.insert(start, Node::Element(section));
}

/// Top-level heading indices matching any of `selectors`, in document order.
fn folded_indices(root: &Element, selectors: &[String]) -> Vec<usize> {
    let mut indices: Vec<usize> = selectors
        .iter()
        .filter_map(|source| match Selector::parse(source) {
            Ok(selector) => Some(selector),
            Err(e) => {
                tracing::warn!(selector = %source, error = %e, "Ignoring folded-headings entry");
                None
            }
        })
        .flat_map(|selector| root.select_paths(&selector))
        .filter_map(|path| match path.as_slice() {
            &[index] => Some(index),
            _ => None,
        })
        .filter(|&index| root.children[index].as_element().and_then(heading_depth).is_some())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Postprocess-only extension for headings.
pub struct HeadingExtension;

#[async_trait]
impl Extension for HeadingExtension {
    fn name(&self) -> &'static str {
        "heading"
    }

    async fn postprocess(
        &mut self,
        html: String,
        ctx: &PostprocessContext<'_>,
    ) -> Result<String, ExtensionError> {
        let mut root = parse_fragment(&html);

        let folded = ctx.properties.folded_headings();
        if !folded.is_empty() {
            // Back to front so earlier indices survive the regrouping.
            for index in folded_indices(&root, &folded).into_iter().rev() {
                fold(&mut root, index);
            }
        }

        root.for_each_element_mut(&mut |el| {
            if heading_depth(el).is_some() {
                decorate(el);
            }
        });
        Ok(inner_html(&root))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use ww_renderer::ArticleProperties;

    use super::*;

    async fn run(html: &str, properties: &ArticleProperties) -> String {
        let ctx = PostprocessContext {
            note_path: "note.md",
            properties,
        };
        HeadingExtension
            .postprocess(html.to_owned(), &ctx)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_heading_spans() {
        let html = run("<h2>Intro <em>x</em></h2><p>a</p>", &ArticleProperties::new()).await;
        assert_eq!(
            html,
            "<h2><span class=\"prefix\"></span><span class=\"content\">Intro <em>x</em></span>\
             <span class=\"suffix\"></span></h2><p>a</p>"
        );
    }

    #[tokio::test]
    async fn test_decoration_is_not_repeated() {
        let once = run("<h1>T</h1>", &ArticleProperties::new()).await;
        let twice = run(&once, &ArticleProperties::new()).await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_folded_heading_wraps_its_section() {
        let properties = ArticleProperties::new().with("folded-headings", "h2");
        let html = run("<h2>A</h2><p>1</p><h3>B</h3><p>2</p><h2>C</h2>", &properties).await;
        let root = parse_fragment(&html);
        let tags: Vec<&str> = root.element_children().map(|el| el.tag.as_str()).collect();
        assert_eq!(tags, ["h2", "section", "h2"]);
        let section = root.element_children().nth(1).unwrap();
        assert!(section.has_class("folded-content"));
        assert_eq!(section.element_children().count(), 3);
        assert!(root.element_children().next().unwrap().has_class("folded"));
    }

    #[tokio::test]
    async fn test_invalid_fold_selector_is_ignored() {
        let properties = ArticleProperties::new().with("folded-headings", "h2[, h3");
        let html = run("<h2>A</h2><p>1</p><h3>B</h3><p>2</p>", &properties).await;
        let root = parse_fragment(&html);
        let tags: Vec<&str> = root.element_children().map(|el| el.tag.as_str()).collect();
        assert_eq!(tags, ["h2", "p", "h3", "section"]);
    }
}
