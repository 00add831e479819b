//! External links and footnotes.
//!
//! WeChat articles cannot link off-platform, so external links lose their
//! `href` and point at a numbered entry in a references section appended to
//! the article. Footnotes are renumbered in order of first reference and
//! their definitions gathered at the end.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use ww_dom::{Element, Node, Selector, inner_html, parse_fragment};
use ww_renderer::{Extension, ExtensionError, PostprocessContext, RenderContext};

static ANCHORS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("invalid anchor selector"));

static FOOTNOTE_REFS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("sup.footnote-ref[data-footnote]").expect("invalid footnote selector")
});

static FOOTNOTE_DEFS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("section.footnote-def[data-footnote]").expect("invalid footnote selector")
});

/// Lowercased host of an `http`/`https` URL.
fn external_host(href: &str) -> Option<String> {
    let lower = href.trim().to_ascii_lowercase();
    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"))?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    (!host.is_empty()).then(|| host.to_owned())
}

/// One entry of the references section.
#[derive(Debug, PartialEq, Eq)]
struct Reference {
    text: String,
    url: String,
}

pub struct LinksExtension {
    references_title: String,
    internal_domains: Vec<String>,
}

impl LinksExtension {
    pub fn new(ctx: &RenderContext) -> Self {
        Self {
            references_title: ctx.config.links.references_title.clone(),
            internal_domains: ctx
                .config
                .links
                .internal_domains
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    fn is_internal(&self, host: &str) -> bool {
        self.internal_domains.iter().any(|domain| {
            host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Strip external `href`s in place, returning the references in order.
    fn collect_references(&self, root: &mut Element) -> Vec<Reference> {
        let mut references: Vec<Reference> = Vec::new();
        let mut numbers: HashMap<String, usize> = HashMap::new();

        for path in root.select_paths(&ANCHORS) {
            let Some(anchor) = root.get_mut(&path) else {
                continue;
            };
            let href = anchor.attr("href").unwrap_or_default().trim().to_owned();
            let Some(host) = external_host(&href) else {
                continue;
            };
            if self.is_internal(&host) {
                continue;
            }
            let number = *numbers.entry(href.clone()).or_insert_with(|| {
                let text = anchor.text_content().trim().to_owned();
                references.push(Reference {
                    text,
                    url: href.clone(),
                });
                references.len()
            });
            anchor.remove_attr("href");
            anchor.remove_attr("target");
            anchor.children.push(Node::Element(
                Element::new("sup").with_text(format!("[{number}]")),
            ));
        }
        references
    }

    fn references_section(&self, references: &[Reference]) -> Element {
        let mut section = Element::new("section")
            .with_attr("class", "ww-references")
            .with_child(
                Element::new("p")
                    .with_attr("class", "ww-references-title")
                    .with_text(self.references_title.clone()),
            );
        for (i, reference) in references.iter().enumerate() {
            let line = if reference.text.is_empty() || reference.text == reference.url {
                format!("[{}] {}", i + 1, reference.url)
            } else {
                format!("[{}] {}: {}", i + 1, reference.text, reference.url)
            };
            section = section.with_child(
                Element::new("p")
                    .with_attr("class", "ww-reference")
                    .with_text(line),
            );
        }
        section
    }
}

/// Renumber footnote references in order of first use and move their
/// definitions into one trailing section.
fn gather_footnotes(root: &mut Element, note_path: &str) -> Option<Element> {
    let mut order: Vec<String> = Vec::new();
    for path in root.select_paths(&FOOTNOTE_REFS) {
        let Some(sup) = root.get_mut(&path) else {
            continue;
        };
        let label = sup.attr("data-footnote").unwrap_or_default().to_owned();
        let number = match order.iter().position(|l| *l == label) {
            Some(pos) => pos + 1,
            None => {
                order.push(label);
                order.len()
            }
        };
        sup.children = vec![Node::Text(format!("[{number}]"))];
    }

    let mut definitions: Vec<Element> = Vec::new();
    let mut paths = root.select_paths(&FOOTNOTE_DEFS);
    paths.reverse();
    for path in paths {
        if let Some(Node::Element(def)) = root.remove(&path) {
            definitions.push(def);
        }
    }
    definitions.reverse();
    if order.is_empty() && definitions.is_empty() {
        return None;
    }

    let mut numbered: Vec<(usize, Element)> = Vec::with_capacity(definitions.len());
    for mut def in definitions {
        let label = def.attr("data-footnote").unwrap_or_default().to_owned();
        let number = match order.iter().position(|l| *l == label) {
            Some(pos) => pos + 1,
            None => {
                tracing::debug!(note = note_path, label, "Footnote defined but never referenced");
                order.push(label);
                order.len()
            }
        };
        def.set_attr("class", "ww-footnote");
        def.children.insert(
            0,
            Node::Element(
                Element::new("span")
                    .with_attr("class", "ww-footnote-index")
                    .with_text(format!("[{number}] ")),
            ),
        );
        numbered.push((number, def));
    }
    for (i, label) in order.iter().enumerate() {
        if !numbered.iter().any(|(n, _)| *n == i + 1) {
            tracing::warn!(note = note_path, label, "Footnote referenced but never defined");
        }
    }
    numbered.sort_by_key(|(n, _)| *n);

    let mut section = Element::new("section").with_attr("class", "ww-footnotes");
    section
        .children
        .extend(numbered.into_iter().map(|(_, def)| Node::Element(def)));
    Some(section)
}

#[async_trait]
impl Extension for LinksExtension {
    fn name(&self) -> &'static str {
        "links"
    }

    async fn postprocess(
        &mut self,
        html: String,
        ctx: &PostprocessContext<'_>,
    ) -> Result<String, ExtensionError> {
        if !html.contains("<a ") && !html.contains("footnote") {
            return Ok(html);
        }
        let mut root = parse_fragment(&html);

        let footnotes = gather_footnotes(&mut root, ctx.note_path);
        let references = self.collect_references(&mut root);

        if let Some(footnotes) = footnotes {
            root.children.push(Node::Element(footnotes));
        }
        if !references.is_empty() {
            tracing::debug!(
                note = ctx.note_path,
                count = references.len(),
                "Collected external links"
            );
            root.children
                .push(Node::Element(self.references_section(&references)));
        }
        Ok(inner_html(&root))
    }
}
