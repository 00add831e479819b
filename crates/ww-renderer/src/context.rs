//! Session-wide collaborators shared by the engine and every extension.

use std::sync::Arc;

use ww_cache::{Cache, NullCache};
use ww_config::Config;
use ww_dom::escape_text;

use crate::formula::{FormulaRenderer, PassthroughFormula};
use crate::vault::Vault;

/// Class of the inline placeholder shown for a construct that failed to render.
pub const FAILURE_CLASS: &str = "ww-render-failed";

/// Built once per session and passed to each extension constructor.
///
/// Everything is behind `Arc`, so separate engines built from clones share
/// collaborators but no per-render state.
#[derive(Clone)]
pub struct RenderContext {
    pub config: Arc<Config>,
    pub vault: Arc<dyn Vault>,
    pub formula: Arc<dyn FormulaRenderer>,
    pub cache: Arc<dyn Cache>,
}

impl RenderContext {
    /// Context with pass-through formulas and no embed cache.
    pub fn new(config: Arc<Config>, vault: Arc<dyn Vault>) -> Self {
        Self {
            config,
            vault,
            formula: Arc::new(PassthroughFormula),
            cache: Arc::new(NullCache),
        }
    }

    #[must_use]
    pub fn with_formula(mut self, formula: Arc<dyn FormulaRenderer>) -> Self {
        self.formula = formula;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    /// Inline markup shown in place of a construct that could not be rendered.
    pub fn failure_placeholder(&self) -> String {
        failure_placeholder(&self.config.render.failure_text)
    }
}

/// `<span class="ww-render-failed">text</span>`.
pub fn failure_placeholder(text: &str) -> String {
    format!(r#"<span class="{FAILURE_CLASS}">{}</span>"#, escape_text(text))
}
