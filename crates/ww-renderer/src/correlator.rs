//! Index-correlated access to fragments of the host-rendered DOM.
//!
//! The host renders the same note with its own renderer. Constructs this
//! crate cannot lay out itself (callouts, diagrams, drawings, icons) are
//! borrowed from that output: the Nth occurrence in the Markdown source is
//! paired with the Nth element matching the construct's selector. Each
//! extension keeps one [`ResourceCursor`] per selector to track its position.

use std::collections::HashSet;
use std::sync::LazyLock;

use ww_dom::{Element, Selector, parse_fragment};

use crate::error::ExtensionError;

/// Host-only interactive widgets removed from borrowed fragments.
const CHROME_SELECTOR: &str = ".edit-block-button, .callout-fold, .collapse-indicator, \
     .heading-collapse-indicator, .list-collapse-indicator, .copy-code-button, \
     .markdown-embed-link, .embed-title, .mod-header-button";

static CHROME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(CHROME_SELECTOR).expect("invalid chrome selector"));

/// Read access to the fragments of one host render.
pub trait ResourceSource: Send + Sync {
    /// The `index`-th element matching `selector` in document order, with
    /// interactive chrome removed. `None` when out of range or unavailable.
    fn element(&self, selector: &str, index: usize) -> Option<Element>;

    /// Number of elements matching `selector`.
    fn count(&self, selector: &str) -> usize;
}

/// Parsed output of one host render, keyed by the note it belongs to.
#[derive(Debug)]
pub struct Snapshot {
    note_path: String,
    root: Element,
}

impl Snapshot {
    /// Parse host HTML for `note_path`.
    pub fn parse(note_path: impl Into<String>, html: &str) -> Self {
        Self {
            note_path: note_path.into(),
            root: parse_fragment(html),
        }
    }

    pub fn note_path(&self) -> &str {
        &self.note_path
    }

    fn matches(&self, selector: &str) -> Vec<&Element> {
        match Selector::parse(selector) {
            Ok(selector) => self.root.select(&selector),
            Err(e) => {
                tracing::debug!(selector, error = %e, "unusable resource selector");
                Vec::new()
            }
        }
    }
}

impl ResourceSource for Snapshot {
    fn element(&self, selector: &str, index: usize) -> Option<Element> {
        let mut el = self.matches(selector).get(index).copied()?.clone();
        strip_chrome(&mut el);
        Some(el)
    }

    fn count(&self, selector: &str) -> usize {
        self.matches(selector).len()
    }
}

/// Source with no snapshot; every lookup misses.
pub struct NullResources;

impl ResourceSource for NullResources {
    fn element(&self, _selector: &str, _index: usize) -> Option<Element> {
        None
    }

    fn count(&self, _selector: &str) -> usize {
        0
    }
}

/// Wraps a source and hides the selectors that failed the count check.
pub(crate) struct GatedResources<'a> {
    inner: &'a dyn ResourceSource,
    disabled: HashSet<String>,
}

impl<'a> GatedResources<'a> {
    pub(crate) fn new(inner: &'a dyn ResourceSource, disabled: HashSet<String>) -> Self {
        Self { inner, disabled }
    }
}

impl ResourceSource for GatedResources<'_> {
    fn element(&self, selector: &str, index: usize) -> Option<Element> {
        if self.disabled.contains(selector) {
            return None;
        }
        self.inner.element(selector, index)
    }

    fn count(&self, selector: &str) -> usize {
        self.inner.count(selector)
    }
}

/// An extension's position in the fragment sequence of one selector.
///
/// Advances only on a successful claim, never moves backwards, and returns to
/// zero on [`reset`](Self::reset).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceCursor {
    selector: &'static str,
    next: usize,
}

impl ResourceCursor {
    pub const fn new(selector: &'static str) -> Self {
        Self { selector, next: 0 }
    }

    pub fn selector(&self) -> &'static str {
        self.selector
    }

    /// Index the next claim will request.
    pub fn position(&self) -> usize {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Take the next fragment, advancing on success.
    pub fn claim(&mut self, source: &dyn ResourceSource) -> Option<Element> {
        let el = source.element(self.selector, self.next)?;
        self.next += 1;
        Some(el)
    }

    /// Like [`claim`](Self::claim), reporting a miss as an error.
    pub fn require(&mut self, source: &dyn ResourceSource) -> Result<Element, ExtensionError> {
        let index = self.next;
        self.claim(source)
            .ok_or_else(|| ExtensionError::MissingResource {
                selector: self.selector.to_owned(),
                index,
            })
    }
}

/// Remove edit buttons, fold toggles and similar host widgets in place.
pub fn strip_chrome(el: &mut Element) {
    let mut paths = el.select_paths(&CHROME);
    // Deepest-last order keeps earlier paths valid while removing.
    paths.reverse();
    for path in paths {
        el.remove(&path);
    }
    for attr in ["contenteditable", "draggable", "data-callout-fold"] {
        el.remove_attr(attr);
    }
    el.for_each_element_mut(&mut |child| {
        child.remove_attr("contenteditable");
        child.remove_attr("draggable");
    });
    if el.has_class("is-collapsed") || el.has_class("is-collapsible") {
        let classes: Vec<String> = el
            .classes()
            .filter(|c| !matches!(*c, "is-collapsed" | "is-collapsible"))
            .map(str::to_owned)
            .collect();
        el.set_attr("class", classes.join(" "));
    }
}
