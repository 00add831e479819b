//! Owned HTML element trees for the WeWrite rendering pipeline.
//!
//! Host-rendered HTML is parsed with html5ever into [`Element`] trees,
//! queried with CSS selectors, mutated in place, and serialized back.
//! Parsing and selector matching go through `kuchiki`; the owned tree is
//! what crosses thread and task boundaries.
//!
//! ```
//! use ww_dom::{Selector, inner_html, parse_fragment};
//!
//! let root = parse_fragment(r#"<div class="callout"><p>Note</p></div>"#);
//! let selector = Selector::parse(".callout > p").unwrap();
//! let matches = root.select(&selector);
//! assert_eq!(matches.len(), 1);
//! assert_eq!(inner_html(matches[0]), "Note");
//! ```

mod error;
mod node;
mod parser;
mod selector;
mod serializer;

pub use error::DomError;
pub use node::{Element, Node, NodePath, is_void_element};
pub use parser::{FRAGMENT_TAG, parse_fragment};
pub use selector::Selector;
pub use serializer::{escape_attr, escape_text, inner_html, outer_html, serialize_nodes};
