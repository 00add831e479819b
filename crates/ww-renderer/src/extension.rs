//! The contract every rendering extension implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::correlator::ResourceSource;
use crate::elements::ElementRegistry;
use crate::error::ExtensionError;
use crate::properties::ArticleProperties;
use crate::token::{Token, TokenKind, TokenLevel};

/// A tokenizer/renderer pair for one syntax construct.
///
/// Both halves are synchronous. Work that needs I/O happens in
/// [`Extension::walk`], which stores its result in [`Token::html`]; `render`
/// then only reads that field.
pub trait Tokenizer: Send + Sync {
    /// Unique name; stored in the tokens this tokenizer produces.
    fn name(&self) -> &'static str;

    fn level(&self) -> TokenLevel;

    /// Cheap scan for the earliest offset in `src` where a match could begin.
    fn start(&self, src: &str) -> Option<usize>;

    /// Match a construct at offset 0 of `src`.
    ///
    /// Returns an extension token whose `raw` is the consumed prefix, or
    /// `None` for no match. Must not panic.
    fn tokenize(&self, src: &str) -> Option<Token>;

    /// Markup for one of this tokenizer's tokens.
    fn render(&self, token: &Token) -> String;
}

/// Parser plugins contributed by one extension.
#[derive(Clone, Default)]
pub struct ExtensionDefinition {
    pub tokenizers: Vec<Arc<dyn Tokenizer>>,
}

impl ExtensionDefinition {
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: impl Tokenizer + 'static) -> Self {
        self.tokenizers.push(Arc::new(tokenizer));
        self
    }
}

/// Outcome of [`Extension::walk`] for one token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Walked {
    /// `token.html` now holds the final markup.
    Claimed,
    /// Not handled; later extensions may claim it.
    Skipped,
}

/// Per-render state visible to the walk phase.
pub struct WalkContext<'a> {
    pub note_path: &'a str,
    pub properties: &'a ArticleProperties,
    pub resources: &'a dyn ResourceSource,
    pub elements: &'a mut ElementRegistry,
    /// Degraded fragments reported back in the render output.
    pub warnings: Vec<String>,
}

impl WalkContext<'_> {
    /// Record a degraded fragment.
    pub fn warn(&mut self, extension: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(extension, note = self.note_path, %message, "Degraded fragment");
        self.warnings.push(format!("{extension}: {message}"));
    }
}

/// Per-render state visible to postprocessing.
pub struct PostprocessContext<'a> {
    pub note_path: &'a str,
    pub properties: &'a ArticleProperties,
}

/// A rendering extension.
///
/// Hooks run in registration order. `prepare` runs before every render and
/// must return the extension to its initial state; calling it twice is the
/// same as calling it once.
#[async_trait]
pub trait Extension: Send {
    fn name(&self) -> &'static str;

    /// Reset cursors and per-render caches.
    async fn prepare(&mut self) {}

    /// Parser plugins. Pure: called once when the engine is built.
    fn definition(&self) -> ExtensionDefinition {
        ExtensionDefinition::default()
    }

    /// Whether [`walk`](Self::walk) wants tokens of this kind.
    fn walks(&self, _kind: &TokenKind) -> bool {
        false
    }

    /// Resolve one token during the walk phase.
    async fn walk(
        &mut self,
        _token: &mut Token,
        _ctx: &mut WalkContext<'_>,
    ) -> Result<Walked, ExtensionError> {
        Ok(Walked::Skipped)
    }

    /// Selector this extension will claim a host fragment from for `token`.
    ///
    /// Used to tally demand per selector before walking.
    fn resource_demand(&self, _token: &Token) -> Option<&'static str> {
        None
    }

    /// Document-wide rewrite of the rendered HTML.
    async fn postprocess(
        &mut self,
        html: String,
        _ctx: &PostprocessContext<'_>,
    ) -> Result<String, ExtensionError> {
        Ok(html)
    }

    /// Side effects before the article is published (asset upload).
    async fn before_publish(&mut self) -> Result<(), ExtensionError> {
        Ok(())
    }

    async fn cleanup(&mut self) {}
}
