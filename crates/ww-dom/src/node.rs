//! Owned element tree.

use crate::selector::Selector;

/// Elements that never carry children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Whether `tag` is an HTML void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Child-index path from a root element to one of its descendants.
pub type NodePath = Vec<usize>;

/// A node in an element tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    /// Borrow the element if this node is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    /// Mutable variant of [`Node::as_element`].
    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Self::Element(el)
    }
}

/// An HTML element with ordered attributes and children.
///
/// Attributes keep insertion order. Parsed elements list them sorted by
/// name, so serialized output is stable between runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    /// Create an element with no attributes or children.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Builder form of [`Element::set_attr`].
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Append a child element.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Append a text node.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing value in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attrs.iter_mut().find(|(key, _)| *key == name) {
            slot.1 = value;
        } else {
            self.attrs.push((name, value));
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(pos).1)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let joined = match self.attr("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_owned(),
        };
        self.set_attr("class", joined);
    }

    pub fn is_void(&self) -> bool {
        is_void_element(&self.tag)
    }

    /// Direct element children, skipping text nodes.
    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Whether the subtree holds anything visible.
    ///
    /// Non-whitespace text counts, and so do media elements (`img`, `svg`,
    /// `video`, `iframe`, `input`) which render without text.
    pub fn has_content(&self) -> bool {
        self.children.iter().any(|child| match child {
            Node::Text(text) => !text.trim().is_empty(),
            Node::Element(el) => {
                matches!(
                    el.tag.as_str(),
                    "img" | "svg" | "video" | "audio" | "iframe" | "input" | "hr"
                ) || el.has_content()
            }
        })
    }

    /// Descendant elements matching `selector`, in document order.
    ///
    /// The receiver itself is never a candidate.
    pub fn select(&self, selector: &Selector) -> Vec<&Element> {
        self.select_paths(selector)
            .iter()
            .filter_map(|path| self.get(path))
            .collect()
    }

    /// First descendant matching `selector`.
    pub fn select_first(&self, selector: &Selector) -> Option<&Element> {
        self.select(selector).into_iter().next()
    }

    /// Paths of descendants matching `selector`, in document order.
    pub fn select_paths(&self, selector: &Selector) -> Vec<NodePath> {
        selector.matching_paths(self)
    }

    /// Resolve a path produced by [`Element::select_paths`].
    pub fn get(&self, path: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &idx in path {
            current = current.children.get(idx)?.as_element()?;
        }
        Some(current)
    }

    /// Mutable variant of [`Element::get`].
    pub fn get_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &idx in path {
            current = current.children.get_mut(idx)?.as_element_mut()?;
        }
        Some(current)
    }

    /// Detach the node at `path`. An empty path removes nothing.
    pub fn remove(&mut self, path: &[usize]) -> Option<Node> {
        let (&last, parent) = path.split_last()?;
        let parent = self.get_mut(parent)?;
        (last < parent.children.len()).then(|| parent.children.remove(last))
    }

    /// Replace the node at `path` with `nodes`, returning the old node.
    pub fn replace(&mut self, path: &[usize], nodes: Vec<Node>) -> Option<Node> {
        let (&last, parent) = path.split_last()?;
        let parent = self.get_mut(parent)?;
        if last >= parent.children.len() {
            return None;
        }
        parent.children.splice(last..=last, nodes).next()
    }

    /// Path of the first descendant carrying `id`, in pre-order.
    pub fn path_of_id(&self, id: &str) -> Option<NodePath> {
        self.children.iter().enumerate().find_map(|(idx, child)| {
            let el = child.as_element()?;
            if el.id() == Some(id) {
                return Some(vec![idx]);
            }
            let mut path = el.path_of_id(id)?;
            path.insert(0, idx);
            Some(path)
        })
    }

    /// Apply `f` to every descendant element in pre-order.
    pub fn for_each_element_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        for child in &mut self.children {
            if let Node::Element(el) = child {
                f(el);
                el.for_each_element_mut(f);
            }
        }
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(inner) => collect_text(inner, out),
        }
    }
}
