//! Deferred content spliced into the output after rendering.
//!
//! Some fragments are not ready when the token walk finishes (a sub-note
//! that must be rendered on its own, a cropped PDF page borrowed from the
//! host). The extension emits an empty placeholder carrying a fresh id and
//! registers what belongs there; the engine splices it in once the final
//! HTML exists.

use ww_dom::{Element, Node, inner_html, parse_fragment};

/// Id prefix of a top-level render.
pub(crate) const ROOT_SCOPE: &str = "ww-el";

/// Content registered for a placeholder id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeferredElement {
    /// A ready element, inserted as the placeholder's only child.
    Node(Element),
    /// Markup replacing the placeholder's children.
    Html(String),
    /// Vault path of a note to render and insert.
    Note(String),
}

/// Callback surface for deferring content into a placeholder.
pub trait ElementSink {
    /// Register or replace the markup for `id`.
    fn update_element_by_id(&mut self, id: &str, html: String);

    /// Register content for `id`.
    fn add_element_by_id(&mut self, id: &str, element: DeferredElement);
}

/// Per-render element map with sequential ids `{scope}-{n}`.
///
/// A fresh registry is created for every render. A top-level render uses
/// the scope `ww-el`; an embedded note is rendered in the scope of the
/// placeholder it fills, so `ww-el-1` holds `ww-el-1-0`, `ww-el-1-1` and so
/// on, and ids stay unique across the whole article.
#[derive(Debug)]
pub struct ElementRegistry {
    scope: String,
    next_id: usize,
    entries: Vec<(String, DeferredElement)>,
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::scoped(ROOT_SCOPE)
    }
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose ids start with `scope`.
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            next_id: 0,
            entries: Vec::new(),
        }
    }

    /// Allocate a placeholder id unique within this render.
    pub fn allocate_id(&mut self) -> String {
        let id = format!("{}-{}", self.scope, self.next_id);
        self.next_id += 1;
        id
    }

    pub fn entries(&self) -> &[(String, DeferredElement)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_entries(self) -> Vec<(String, DeferredElement)> {
        self.entries
    }

    fn upsert(&mut self, id: &str, element: DeferredElement) {
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| key == id) {
            slot.1 = element;
        } else {
            self.entries.push((id.to_owned(), element));
        }
    }
}

impl ElementSink for ElementRegistry {
    fn update_element_by_id(&mut self, id: &str, html: String) {
        self.upsert(id, DeferredElement::Html(html));
    }

    fn add_element_by_id(&mut self, id: &str, element: DeferredElement) {
        self.upsert(id, element);
    }
}

/// Splice resolved entries into `html`, returning the updated markup and the
/// ids that had no matching placeholder.
///
/// Placeholders are located before anything is inserted, so ids inside
/// inserted content never capture an entry. `Note` entries must have been
/// resolved to `Html` beforehand; any left over count as unmatched.
pub fn splice_elements(html: &str, entries: &[(String, DeferredElement)]) -> (String, Vec<String>) {
    if entries.is_empty() {
        return (html.to_owned(), Vec::new());
    }

    let mut root = parse_fragment(html);
    let mut unmatched = Vec::new();
    let mut targets = Vec::new();
    for (id, element) in entries {
        let children = match element {
            DeferredElement::Node(el) => vec![Node::Element(el.clone())],
            DeferredElement::Html(markup) => parse_fragment(markup).children,
            DeferredElement::Note(_) => {
                unmatched.push(id.clone());
                continue;
            }
        };
        match root.path_of_id(id) {
            Some(path) => targets.push((path, children)),
            None => unmatched.push(id.clone()),
        }
    }
    for (path, children) in targets {
        if let Some(target) = root.get_mut(&path) {
            target.children = children;
        }
    }
    (inner_html(&root), unmatched)
}
