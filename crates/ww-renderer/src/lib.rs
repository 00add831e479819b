//! Extension-driven Markdown to WeChat HTML rendering.
//!
//! A [`RenderEngine`] owns an ordered list of [`Extension`]s and converts one
//! note per call:
//!
//! 1. every extension is prepared, in registration order;
//! 2. the [`Lexer`] cuts extension constructs out of the Markdown and
//!    [`build_tree`] parses the rest with pulldown-cmark into a [`Token`] tree;
//! 3. the walk phase lets extensions claim tokens, typically borrowing the
//!    matching fragment of the host render through a [`ResourceCursor`];
//! 4. the [`HtmlWriter`] serializes the tree;
//! 5. postprocess hooks rewrite the HTML in registration order.
//!
//! # Example
//!
//! ```
//! use ww_renderer::{NullResources, Note, RenderEngine};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let mut engine = RenderEngine::builder().build();
//! let output = engine
//!     .render_with_resources(&Note::new("a.md", "**Hi**"), &NullResources)
//!     .await;
//! assert_eq!(output.html, "<p><strong>Hi</strong></p>\n");
//! # });
//! ```

mod context;
mod correlator;
mod elements;
mod engine;
mod error;
mod extension;
mod fence;
mod formula;
mod host;
mod html;
mod lexer;
mod properties;
mod token;
mod tree;
mod vault;

pub use context::{FAILURE_CLASS, RenderContext, failure_placeholder};
pub use correlator::{NullResources, ResourceCursor, ResourceSource, Snapshot, strip_chrome};
pub use elements::{DeferredElement, ElementRegistry, ElementSink, splice_elements};
pub use engine::{Note, RenderEngine, RenderEngineBuilder, RenderOutput, RenderState, ResourceCount};
pub use error::{ExtensionError, FormulaError, HostError, RenderError, VaultError};
pub use extension::{
    Extension, ExtensionDefinition, PostprocessContext, Tokenizer, WalkContext, Walked,
};
pub use formula::{FormulaRenderer, FormulaSyntax, PassthroughFormula};
pub use host::{HostFrame, HostRenderer, SettlePolicy, Settled, StaticHost, settle};
pub use html::HtmlWriter;
pub use lexer::{Lexed, Lexer};
pub use properties::{ArticleProperties, FOLDED_HEADINGS, SHOW_CODE_LINE_NUMBER, split_front_matter};
pub use token::{Alignment, ExtToken, Token, TokenKind, TokenLevel};
pub use tree::build_tree;
pub use vault::{FsVault, MemoryVault, Vault};
